//! Conversation Messages
//!
//! A [`Transcript`] is the ordered list of turns sent to the model. The
//! first turn is always the system turn and stays fixed for the lifetime
//! of the transcript; everything else is appended, never edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input (tool observations are fed back as user turns too)
    User,
    /// Assistant (LLM) response
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single turn in a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Who wrote a persisted history row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One row of persisted conversation history
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub sender: Sender,
    pub content: String,
    pub insert_time: DateTime<Utc>,
}

/// Ordered conversation turns, system turn first
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Start a transcript with its fixed system turn
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// System turn followed by the most recent `max_history` non-system turns
    pub fn with_history(
        system_prompt: impl Into<String>,
        history: &[Message],
        max_history: usize,
    ) -> Self {
        let turns: Vec<&Message> = history.iter().filter(|m| m.role != Role::System).collect();
        let skip = turns.len().saturating_sub(max_history);

        let mut transcript = Self::new(system_prompt);
        transcript
            .messages
            .extend(turns.into_iter().skip(skip).cloned());
        transcript
    }

    /// Build from persisted rows: the `limit` most recent rows, oldest first
    pub fn from_records(
        system_prompt: impl Into<String>,
        records: &[HistoryRecord],
        limit: usize,
    ) -> Self {
        let mut rows: Vec<&HistoryRecord> = records.iter().collect();
        rows.sort_by_key(|r| r.insert_time);
        let skip = rows.len().saturating_sub(limit);

        let mut transcript = Self::new(system_prompt);
        for row in rows.into_iter().skip(skip) {
            let role = match row.sender {
                Sender::User => Role::User,
                Sender::Assistant => Role::Assistant,
            };
            transcript.push(Message::new(role, row.content.clone()));
        }
        transcript
    }

    /// Append a turn. A later system turn is stored as a user turn; the
    /// system slot stays fixed.
    pub fn push(&mut self, message: Message) {
        let message = if message.role == Role::System {
            Message::user(message.content)
        } else {
            message
        };
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        self.messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Copy of this transcript with the system turn replaced
    pub fn with_system_prompt(&self, system_prompt: impl Into<String>) -> Self {
        let mut messages = self.messages.clone();
        if let Some(first) = messages.first_mut() {
            *first = Message::system(system_prompt);
        }
        Self { messages }
    }

    /// Drop everything except the system turn
    pub fn clear_history(&mut self) {
        self.messages.truncate(1);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// A transcript always holds its system turn
    pub const fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_transcript_starts_with_system() {
        let mut t = Transcript::new("You are helpful.");
        t.push(Message::user("Hi"));
        t.push(Message::assistant("Hello!"));

        assert_eq!(t.len(), 3);
        assert_eq!(t.messages()[0].role, Role::System);
        assert_eq!(t.last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn test_system_slot_is_fixed() {
        let mut t = Transcript::new("sys");
        t.push(Message::system("injected"));
        assert_eq!(t.system_prompt(), "sys");
        assert_eq!(t.messages()[1].role, Role::User);
    }

    #[test]
    fn test_history_window_keeps_most_recent() {
        let history: Vec<Message> = (0..5).map(|i| Message::user(format!("q{i}"))).collect();
        let t = Transcript::with_history("sys", &history, 2);
        let contents: Vec<&str> = t.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["sys", "q3", "q4"]);
    }

    #[test]
    fn test_records_sorted_and_limited() {
        let at = |s| Utc.timestamp_opt(s, 0).unwrap();
        let records = vec![
            HistoryRecord { sender: Sender::Assistant, content: "a2".into(), insert_time: at(40) },
            HistoryRecord { sender: Sender::User, content: "q1".into(), insert_time: at(10) },
            HistoryRecord { sender: Sender::Assistant, content: "a1".into(), insert_time: at(20) },
            HistoryRecord { sender: Sender::User, content: "q2".into(), insert_time: at(30) },
        ];
        let t = Transcript::from_records("sys", &records, 3);
        let turns: Vec<(Role, &str)> = t.messages()[1..]
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            [(Role::Assistant, "a1"), (Role::User, "q2"), (Role::Assistant, "a2")]
        );
    }

    #[test]
    fn test_replace_system_prompt() {
        let mut t = Transcript::new("old");
        t.push(Message::user("q"));
        let swapped = t.with_system_prompt("new");
        assert_eq!(swapped.system_prompt(), "new");
        assert_eq!(swapped.len(), 2);
        assert_eq!(t.system_prompt(), "old");
    }
}
