//! Session Management
//!
//! A session holds one conversation's transcript between HTTP requests.
//! Stores are passed to whoever needs them; there is no global session
//! table. [`MemorySessionStore`] expires sessions a fixed time after their
//! last activity.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Message, Transcript};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chatbot conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,

    /// Chatbot this session talks to
    pub agent: String,

    /// Conversation so far
    pub transcript: Transcript,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session
    pub fn new(id: SessionId, agent: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent: agent.into(),
            transcript: Transcript::new(system_prompt),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record one question and its answer
    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.transcript.push(Message::user(question));
        self.transcript.push(Message::assistant(answer));
        self.touch();
    }

    /// Turns after the system turn
    pub fn history(&self) -> &[Message] {
        self.transcript.messages().get(1..).unwrap_or_default()
    }

    /// Message count, system turn included
    pub fn message_count(&self) -> usize {
        self.transcript.len()
    }

    /// Whether the session was idle for longer than `ttl` at `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(ttl).is_ok_and(|ttl| now - self.updated_at > ttl)
    }
}

/// Session store trait for persistence
pub trait SessionStore: Send + Sync {
    /// Save a session, replacing any session with the same ID
    fn insert(&self, session: Session) -> Result<()>;

    /// Load a live session by ID
    fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Apply `f` to a live session and mark it active. Returns `false` when
    /// the session does not exist.
    fn update(&self, id: &SessionId, f: &mut dyn FnMut(&mut Session)) -> Result<bool>;

    /// Delete a session
    fn remove(&self, id: &SessionId) -> Result<()>;

    /// Drop expired sessions, returning how many were dropped
    fn evict_expired(&self) -> Result<usize>;
}

/// In-memory session store with idle expiry
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::Session("session store lock poisoned".into())
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, session: Session) -> Result<()> {
        tracing::info!(session = %session.id, agent = %session.agent, "session started");
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(session.id.clone(), session);
        Ok(())
    }

    fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions
            .get(id)
            .filter(|s| !s.is_expired(self.ttl, Utc::now()))
            .cloned())
    }

    fn update(&self, id: &SessionId, f: &mut dyn FnMut(&mut Session)) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        match sessions.get_mut(id) {
            Some(session) if !session.is_expired(self.ttl, Utc::now()) => {
                f(session);
                session.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remove(&self, id: &SessionId) -> Result<()> {
        self.sessions.write().map_err(poisoned)?.remove(id);
        Ok(())
    }

    fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.ttl, now));
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "expired sessions evicted");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> Session {
        Session::new(SessionId::from_string(id), "paper", "sys")
    }

    #[test]
    fn test_session_creation() {
        let session = session("a");
        assert_eq!(session.message_count(), 1);
        assert!(session.history().is_empty());
        assert_eq!(session.transcript.system_prompt(), "sys");
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::default();
        let id = SessionId::from_string("a");
        store.insert(session("a")).unwrap();

        let loaded = store.get(&id).unwrap();
        assert_eq!(loaded.unwrap().id, id);

        store.remove(&id).unwrap();
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn test_update_records_exchange() {
        let store = MemorySessionStore::default();
        let id = SessionId::from_string("a");
        store.insert(session("a")).unwrap();

        let updated = store
            .update(&id, &mut |s| s.record_exchange("hi", "hello"))
            .unwrap();
        assert!(updated);
        let history = store.get(&id).unwrap().unwrap().history().to_vec();
        assert_eq!(history, [Message::user("hi"), Message::assistant("hello")]);

        let missing = SessionId::from_string("missing");
        assert!(!store.update(&missing, &mut |_| {}).unwrap());
    }

    #[test]
    fn test_expired_sessions_are_hidden_and_evicted() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let mut stale = session("stale");
        stale.updated_at = Utc::now() - chrono::Duration::minutes(5);
        store.insert(stale).unwrap();
        store.insert(session("fresh")).unwrap();

        assert!(store.get(&SessionId::from_string("stale")).unwrap().is_none());
        assert_eq!(store.evict_expired().unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&SessionId::from_string("fresh")).unwrap().is_some());
    }
}
