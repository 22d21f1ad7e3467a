//! ReAct Output Parser
//!
//! Line-oriented reader for the semi-structured text a ReAct prompt asks
//! the model to produce:
//!
//! ````text
//! Thought: <free text>
//! Action: <tool name>
//! Action Input: ```json
//! { ... }
//! ```
//! Observation: <tool result>
//! Final Answer: <answer, may span lines>
//! ````
//!
//! A line's kind is decided by its leading marker, compared without case
//! and after stripping indentation and markdown emphasis (`*`, `#`).
//! Lines without a marker continue the previous line.

use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

const FINAL_ANSWER: &str = "final answer:";
const ACTION_INPUT: &str = "action input:";
const ACTION: &str = "action:";
const FENCE: &str = "```";

/// Line types of the ReAct format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Thought,
    Action,
    ActionInput,
    Observation,
    FinalAnswer,
    Continuation,
}

/// A classified line
#[derive(Clone, Copy, Debug)]
struct Line<'a> {
    kind: LineKind,
    /// Byte offset of the line in the scanned text
    offset: usize,
    /// Byte offset just past the marker, relative to `offset`
    body_start: usize,
    text: &'a str,
}

impl Line<'_> {
    fn body(&self) -> &str {
        &self.text[self.body_start..]
    }
}

fn classify(offset: usize, text: &str) -> Line<'_> {
    let decoration = text.len()
        - text
            .trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '#')
            .len();
    let rest = text[decoration..].to_ascii_lowercase();

    let markers = [
        (FINAL_ANSWER, LineKind::FinalAnswer),
        (ACTION_INPUT, LineKind::ActionInput),
        (ACTION, LineKind::Action),
        ("thought:", LineKind::Thought),
        ("observation:", LineKind::Observation),
    ];
    for (marker, kind) in markers {
        if rest.starts_with(marker) {
            let mut body_start = decoration + marker.len();
            // closing emphasis, as in `**Final Answer:**`
            body_start += text[body_start..].len() - text[body_start..].trim_start_matches('*').len();
            return Line {
                kind,
                offset,
                body_start,
                text,
            };
        }
    }
    Line {
        kind: LineKind::Continuation,
        offset,
        body_start: 0,
        text,
    }
}

fn lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |raw| {
        let line = classify(offset, raw.trim_end_matches(['\n', '\r']));
        offset += raw.len();
        line
    })
}

/// Tool invocation requested by the model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionRequest {
    /// Tool name as the model wrote it
    pub tool: String,
    /// Raw JSON argument text
    pub input: String,
    /// Byte offset where the action block ends in the scanned text
    pub end: usize,
}

impl ActionRequest {
    /// Arguments as a JSON object
    pub fn arguments(&self) -> Result<Map<String, Value>> {
        match serde_json::from_str::<Value>(self.input.trim())? {
            Value::Object(map) => Ok(map),
            other => Err(AgentError::Parse(format!(
                "action input must be a JSON object, got {other}"
            ))),
        }
    }
}

/// What the accumulated model output asks for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Nothing conclusive yet
    Pending,
    /// Answer text starts at this byte offset
    FinalAnswer { start: usize },
    /// A complete action block
    Action(ActionRequest),
}

/// Inspect accumulated output.
///
/// A `Final Answer:` line always wins over an action block. While the
/// stream is still open (`complete == false`) an action only counts once
/// its fenced JSON block is closed; on a finished reply a bare JSON object
/// after `Action Input:` is accepted as well.
pub fn scan(text: &str, complete: bool) -> Signal {
    if let Some(start) = final_answer_start(text) {
        return Signal::FinalAnswer { start };
    }
    scan_action(text, complete).map_or(Signal::Pending, Signal::Action)
}

/// Byte offset where the answer after the first `Final Answer:` marker
/// begins. A marker opening a line is preferred; otherwise the first one
/// run together with earlier text counts, as in `Thought: easy.Final Answer: 4`.
/// Without the colon the phrase is prose, not a marker.
pub fn final_answer_start(text: &str) -> Option<usize> {
    lines(text)
        .find(|l| l.kind == LineKind::FinalAnswer)
        .map(|l| l.offset + l.body_start)
        .or_else(|| final_answer_inline(text))
}

fn final_answer_inline(text: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets valid for `text`
    let at = text.to_ascii_lowercase().find(FINAL_ANSWER)? + FINAL_ANSWER.len();
    let emphasis = text[at..].len() - text[at..].trim_start_matches('*').len();
    Some(at + emphasis)
}

/// Trimmed answer after `Final Answer:`, or the whole trimmed text
pub fn final_answer_or_all(text: &str) -> String {
    final_answer_start(text)
        .map_or(text, |start| &text[start..])
        .trim()
        .to_string()
}

fn scan_action(text: &str, complete: bool) -> Option<ActionRequest> {
    let (tool, region_start) = action_by_lines(text).or_else(|| action_inline(text))?;
    if tool.is_empty() {
        return None;
    }
    let region = &text[region_start..];

    if let Some((input, end)) = fenced_block(region) {
        return Some(ActionRequest {
            tool,
            input: input.to_string(),
            end: region_start + end,
        });
    }
    if complete && !region.contains(FENCE) {
        let open = region.find('{')?;
        let close = region.rfind('}')?;
        if close > open {
            return Some(ActionRequest {
                tool,
                input: region[open..=close].to_string(),
                end: region_start + close + 1,
            });
        }
    }
    None
}

/// Last `Action:` line followed by an `Action Input:` line
fn action_by_lines(text: &str) -> Option<(String, usize)> {
    let mut tool: Option<String> = None;
    let mut input_at: Option<usize> = None;

    for line in lines(text) {
        match line.kind {
            LineKind::Action => {
                tool = Some(clean_tool_name(line.body()));
                input_at = None;
            }
            LineKind::ActionInput if tool.is_some() => {
                input_at = Some(line.offset + line.body_start);
            }
            _ => {}
        }
    }
    Some((tool?, input_at?))
}

/// Markers run together without line breaks, e.g.
/// `Action: Search EngineAction Input: ...`
fn action_inline(text: &str) -> Option<(String, usize)> {
    // ASCII lowercasing keeps byte offsets valid for `text`
    let lower = text.to_ascii_lowercase();
    let input = lower.rfind(ACTION_INPUT)?;
    let action = lower[..input].rfind(ACTION)?;
    let tool = clean_tool_name(&text[action + ACTION.len()..input]);
    Some((tool, input + ACTION_INPUT.len()))
}

fn clean_tool_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '*' || c == '`' || c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Contents of the first closed fenced block and the offset just past its
/// closing fence. A language tag on the opening fence line is skipped.
fn fenced_block(text: &str) -> Option<(&str, usize)> {
    let open = text.find(FENCE)?;
    let after_open = open + FENCE.len();
    let body_start = text[after_open..]
        .find('\n')
        .map_or(after_open, |nl| after_open + nl + 1);
    let close = text[body_start..].find(FENCE)? + body_start;
    Some((&text[body_start..close], close + FENCE.len()))
}

/// Contents of the last closed fenced block
pub fn last_fenced_block(text: &str) -> Option<&str> {
    let mut rest = text;
    let mut last = None;
    while let Some((body, end)) = fenced_block(rest) {
        last = Some(body);
        rest = &rest[end..];
    }
    last
}
