//! react-agents HTTP Server
//!
//! Axum-based server exposing the reference chatbot:
//! session reset plus a chunked `text/plain` chat stream per chatbot.

mod app;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use agent_core::{LlmProvider, MemorySessionStore, SessionStore, Tool};
use agent_runtime::OpenAiProvider;
use agent_toolkit::{ChatbotConfig, HttpRetriever, ReferenceChatbot, Retriever, SerpApiSearch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize LLM provider
    let provider = Arc::new(OpenAiProvider::from_env()?);
    match provider.health_check().await {
        Ok(true) => tracing::info!(endpoint = %provider.config().base_url, "model endpoint reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!(endpoint = %provider.config().base_url, "model endpoint not reachable, answers will fail");
        }
    }

    // Collaborators
    let search: Option<Arc<dyn Tool>> = match SerpApiSearch::from_env() {
        Ok(search) => Some(Arc::new(search)),
        Err(e) => {
            tracing::warn!(error = %e, "web search disabled");
            None
        }
    };
    let retriever: Option<Arc<dyn Retriever>> = match HttpRetriever::from_env() {
        Ok(retriever) => Some(Arc::new(retriever)),
        Err(e) => {
            tracing::warn!(error = %e, "retrieval disabled, every question is answered generally");
            None
        }
    };

    let chatbot = ReferenceChatbot::build(ChatbotConfig::from_env(), provider, search, retriever)?;
    tracing::info!(chatbot = %chatbot.name(), domain = %chatbot.config().domain, "chatbot ready");

    // Sessions
    let ttl = std::env::var("SESSION_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600);
    let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(ttl)));
    spawn_eviction(sessions.clone());

    let state = AppState::new(vec![chatbot], sessions);
    let app = app::router(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8002".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("react-agents server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                        - Health check");
    tracing::info!("  GET  /test_get                      - Readiness probe");
    tracing::info!("  POST /api/chatbots/{{agent}}/reset  - Start a session");
    tracing::info!("  POST /api/chatbots/{{agent}}/chat   - Stream an answer");

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_eviction(sessions: Arc<dyn SessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.evict_expired() {
                tracing::error!(error = %e, "session eviction failed");
            }
        }
    });
}
