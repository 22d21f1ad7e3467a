//! Concurrent Stream Merging
//!
//! Runs several answer streams at once and interleaves them into one
//! stream. Each branch is a tokio task that writes its tokens, then one end
//! marker, onto a shared channel. The consumer side keeps branch output
//! contiguous: the branch currently being emitted passes straight through
//! while the others buffer, and the next branch is picked in the order
//! branches first produced something.
//!
//! ```text
//! branch 0 ──┐
//! branch 1 ──┼─▶ mpsc ─▶ MergeState ─▶ Token / End
//! branch 2 ──┘
//! ```

use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::reasoning::AnswerStream;

const CHANNEL_CAPACITY: usize = 64;

/// Item of a merged stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Merged {
    /// Next piece of text from `branch`
    Token { branch: usize, text: String },
    /// `branch` is finished; sent exactly once per branch
    End { branch: usize },
}

/// Merged stream
pub type MergedStream = Pin<Box<dyn Stream<Item = Merged> + Send>>;

#[derive(Debug)]
enum Event {
    Token(usize, String),
    End(usize),
}

/// Interleaves branch streams running on separate tasks.
///
/// Dropping the merger, or the stream from
/// [`ConcurrentStreamMerger::into_stream`], aborts every branch task still
/// running and joins them on a background task. Call
/// [`ConcurrentStreamMerger::shutdown`] to wait for them in place.
pub struct ConcurrentStreamMerger {
    rx: mpsc::Receiver<Event>,
    workers: JoinSet<()>,
    state: MergeState,
    closed: bool,
}

impl ConcurrentStreamMerger {
    /// Spawn one task per branch. Must be called inside a tokio runtime.
    pub fn new(branches: Vec<AnswerStream>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut workers = JoinSet::new();
        let count = branches.len();
        for (branch, stream) in branches.into_iter().enumerate() {
            workers.spawn(drive(branch, stream, tx.clone()));
        }
        tracing::debug!(branches = count, "merging branch streams");
        Self {
            rx,
            workers,
            state: MergeState::new(count),
            closed: false,
        }
    }

    pub fn branches(&self) -> usize {
        self.state.buffers.len()
    }

    /// Next merged item, `None` once every branch has ended and all tasks
    /// have been joined.
    pub async fn next(&mut self) -> Option<Merged> {
        loop {
            if let Some(item) = self.state.out.pop_front() {
                return Some(item);
            }
            if self.closed {
                return None;
            }
            match self.rx.recv().await {
                Some(Event::Token(branch, text)) => self.state.token(branch, text),
                Some(Event::End(branch)) => self.state.end(branch),
                None => {
                    self.closed = true;
                    self.state.close();
                    self.join().await;
                }
            }
        }
    }

    /// Abort all branch tasks and wait until they have stopped
    pub async fn shutdown(mut self) {
        self.workers.abort_all();
        self.join().await;
    }

    pub fn into_stream(self) -> MergedStream {
        Box::pin(futures::stream::unfold(self, |mut merger| async move {
            merger.next().await.map(|item| (item, merger))
        }))
    }

    async fn join(&mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(err) = result {
                if err.is_panic() {
                    tracing::error!(error = %err, "merge branch panicked");
                }
            }
        }
    }
}

impl Drop for ConcurrentStreamMerger {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        let mut workers = std::mem::take(&mut self.workers);
        workers.abort_all();
        let pending = workers.len();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    while workers.join_next().await.is_some() {}
                    tracing::debug!(branches = pending, "dropped merge branches stopped");
                });
            }
            // no runtime left to join on; the aborted tasks are dropped with it
            Err(_) => drop(workers),
        }
    }
}

async fn drive(branch: usize, mut stream: AnswerStream, tx: mpsc::Sender<Event>) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(text) if text.is_empty() => {}
            Ok(text) => {
                if tx.send(Event::Token(branch, text)).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(branch, error = %err, "merge branch failed, ending it early");
                break;
            }
        }
    }
    // receiver gone means nobody is listening any more
    let _ = tx.send(Event::End(branch)).await;
}

/// Consumer-side ordering state
#[derive(Debug)]
struct MergeState {
    current: Option<usize>,
    buffers: Vec<VecDeque<String>>,
    done: Vec<bool>,
    ended: Vec<bool>,
    /// Branches waiting for their turn, in order of first output
    queue: VecDeque<usize>,
    out: VecDeque<Merged>,
}

impl MergeState {
    fn new(branches: usize) -> Self {
        Self {
            current: None,
            buffers: vec![VecDeque::new(); branches],
            done: vec![false; branches],
            ended: vec![false; branches],
            queue: VecDeque::new(),
            out: VecDeque::new(),
        }
    }

    fn token(&mut self, branch: usize, text: String) {
        if branch >= self.buffers.len() || self.ended[branch] {
            return;
        }
        if self.current.is_none() {
            self.current = Some(branch);
        }
        if self.current == Some(branch) {
            self.out.push_back(Merged::Token { branch, text });
            return;
        }
        if !self.queue.contains(&branch) {
            self.queue.push_back(branch);
        }
        self.buffers[branch].push_back(text);
    }

    fn end(&mut self, branch: usize) {
        if branch >= self.buffers.len() || self.ended[branch] {
            return;
        }
        self.done[branch] = true;
        if self.current == Some(branch) {
            self.finish(branch);
            self.current = None;
            self.advance();
        } else if self.buffers[branch].is_empty() {
            self.queue.retain(|b| *b != branch);
            self.finish(branch);
        } else if self.current.is_none() {
            self.advance();
        }
    }

    /// Pick the next branch: finished ones are flushed whole, the first
    /// unfinished one becomes current.
    fn advance(&mut self) {
        while self.current.is_none() {
            let Some(branch) = self.queue.pop_front() else {
                return;
            };
            self.flush(branch);
            if self.done[branch] {
                self.finish(branch);
            } else {
                self.current = Some(branch);
            }
        }
    }

    /// The channel closed: end whatever did not end on its own
    fn close(&mut self) {
        if let Some(branch) = self.current.take() {
            self.finish(branch);
        }
        while let Some(branch) = self.queue.pop_front() {
            self.flush(branch);
            self.finish(branch);
        }
        for branch in 0..self.ended.len() {
            self.finish(branch);
        }
    }

    fn flush(&mut self, branch: usize) {
        while let Some(text) = self.buffers[branch].pop_front() {
            self.out.push_back(Merged::Token { branch, text });
        }
    }

    fn finish(&mut self, branch: usize) {
        if !self.ended[branch] {
            self.ended[branch] = true;
            self.out.push_back(Merged::End { branch });
        }
    }
}
