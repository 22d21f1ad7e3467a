//! Application State

use std::collections::HashMap;
use std::sync::Arc;

use agent_core::SessionStore;
use agent_toolkit::ReferenceChatbot;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Chatbots by route name
    pub chatbots: Arc<HashMap<String, Arc<ReferenceChatbot>>>,

    /// Live conversations
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(chatbots: Vec<ReferenceChatbot>, sessions: Arc<dyn SessionStore>) -> Self {
        let chatbots = chatbots
            .into_iter()
            .map(|bot| (bot.name().to_string(), Arc::new(bot)))
            .collect();
        Self {
            chatbots: Arc::new(chatbots),
            sessions,
        }
    }

    pub fn chatbot(&self, name: &str) -> Option<Arc<ReferenceChatbot>> {
        self.chatbots.get(name).cloned()
    }
}
