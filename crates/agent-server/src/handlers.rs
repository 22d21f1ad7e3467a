//! HTTP Handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use agent_core::{AnswerStream, Session, SessionId, SessionStore};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status_code: u16,
    pub result: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(error: impl Into<String>, code: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

const SESSION_INVALID: &str = "Error: session_id invalid, please reset session first.";

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Static readiness probe
pub async fn test_get() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Welcome to the API" }))
}

/// Start (or restart) a session with a chatbot
pub async fn reset_session(
    State(state): State<AppState>,
    Path(agent): Path<String>,
    body: Bytes,
) -> Result<Json<ResetResponse>, ApiError> {
    let chatbot = state
        .chatbot(&agent)
        .ok_or_else(|| not_found(format!("Unknown chatbot: {agent}"), "UNKNOWN_AGENT"))?;

    // an empty or unreadable body starts a fresh session
    let payload: ResetRequest = serde_json::from_slice(&body).unwrap_or_default();
    let id = payload
        .session_id
        .filter(|id| !id.is_empty())
        .map_or_else(SessionId::new, SessionId::from_string);

    state
        .sessions
        .insert(Session::new(id.clone(), &agent, chatbot.system_prompt()))
        .map_err(|e| {
            tracing::error!(error = %e, "session insert failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.user_message(),
                    code: "SESSION_ERROR".into(),
                }),
            )
        })?;

    Ok(Json(ResetResponse {
        status_code: 200,
        result: id.to_string(),
        message: chatbot.greeting().to_string(),
    }))
}

/// Stream the answer to one question as chunked `text/plain`.
///
/// Failures before the first chunk are reported as 404; a failure after
/// that ends the body early.
pub async fn chat(
    State(state): State<AppState>,
    Path(agent): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let chatbot = state
        .chatbot(&agent)
        .ok_or_else(|| not_found(format!("Unknown chatbot: {agent}"), "UNKNOWN_AGENT"))?;

    let id = SessionId::from_string(payload.session_id);
    let session = state
        .sessions
        .get(&id)
        .ok()
        .flatten()
        .filter(|s| s.agent == agent)
        .ok_or_else(|| not_found(SESSION_INVALID, "SESSION_NOT_FOUND"))?;

    let generation_failed = |e: agent_core::AgentError| {
        tracing::error!(session = %id, error = %e, "answer generation failed");
        not_found("Error: generate answer failed.", "GENERATION_FAILED")
    };

    let mut answer = chatbot
        .answer(&payload.question, session.history())
        .await
        .map_err(generation_failed)?;
    let first = match answer.next().await {
        Some(Ok(first)) => first,
        Some(Err(e)) => return Err(generation_failed(e)),
        None => String::new(),
    };

    let relay = Relay {
        pending: Some(first),
        answer,
        text: String::new(),
        sessions: state.sessions.clone(),
        session_id: id,
        question: payload.question,
    };

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(relay.into_stream()),
    )
        .into_response())
}

// ============================================================================
// Answer Relay
// ============================================================================

/// Forwards answer pieces to the response body and records the exchange
/// in the session once the answer is complete
struct Relay {
    pending: Option<String>,
    answer: AnswerStream,
    text: String,
    sessions: Arc<dyn SessionStore>,
    session_id: SessionId,
    question: String,
}

impl Relay {
    fn into_stream(self) -> impl Stream<Item = Result<String, Infallible>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut relay = state?;
            let piece = match relay.pending.take() {
                Some(piece) => Some(Ok(piece)),
                None => relay.answer.next().await,
            };
            match piece {
                Some(Ok(piece)) => {
                    relay.text.push_str(&piece);
                    Some((Ok(piece), Some(relay)))
                }
                Some(Err(e)) => {
                    tracing::error!(session = %relay.session_id, error = %e, "answer aborted mid-stream");
                    None
                }
                None => {
                    relay.record();
                    None
                }
            }
        })
    }

    fn record(self) {
        let Self {
            sessions,
            session_id,
            question,
            text,
            ..
        } = self;
        let mut exchange = Some((question, text));
        let result = sessions.update(&session_id, &mut |session| {
            if let Some((question, answer)) = exchange.take() {
                session.record_exchange(question, answer);
            }
        });
        match result {
            Ok(true) => tracing::debug!(session = %session_id, "exchange recorded"),
            Ok(false) => tracing::warn!(session = %session_id, "session expired before the answer finished"),
            Err(e) => tracing::error!(session = %session_id, error = %e, "recording exchange failed"),
        }
    }
}
