//! Router

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{chat, health_check, reset_session, test_get};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/test_get", get(test_get))
        // Chatbots
        .route("/api/chatbots/{agent}/reset", post(reset_session))
        .route("/api/chatbots/{agent}/chat", post(chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agent_core::testing::{Reply, ScriptedProvider};
    use agent_core::{
        AgentBuilder, MemorySessionStore, Message, RetryPolicy, SessionId, SessionStore,
    };
    use agent_toolkit::{ChatbotConfig, ReferenceChatbot};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn state(replies: Vec<Reply>) -> (AppState, Arc<MemorySessionStore>) {
        let provider = Arc::new(ScriptedProvider::new(replies));
        let agent = AgentBuilder::new()
            .provider(provider)
            .model_retry(RetryPolicy::none())
            .build()
            .unwrap();
        let bot = ReferenceChatbot::new(ChatbotConfig::default(), agent, None);
        let sessions = Arc::new(MemorySessionStore::default());
        (AppState::new(vec![bot], sessions.clone()), sessions)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn reset(app: Router, session_id: &str) -> Value {
        let response = app
            .oneshot(post_json(
                "/api/chatbots/paper/reset",
                &json!({ "session_id": session_id }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state(vec![]);
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_test_get() {
        let (state, _) = state(vec![]);
        let response = router(state)
            .oneshot(Request::get("/test_get").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "message": "Welcome to the API" }));
    }

    #[tokio::test]
    async fn test_reset_assigns_session_id() {
        let (state, sessions) = state(vec![]);
        let body = reset(router(state), "").await;

        assert_eq!(body["status_code"], 200);
        let id = body["result"].as_str().unwrap();
        assert!(!id.is_empty());
        assert!(body["message"].as_str().unwrap().starts_with("Hello!"));
        assert!(sessions.get(&SessionId::from_string(id)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reset_without_body() {
        let (state, sessions) = state(vec![]);
        let response = router(state)
            .oneshot(Request::post("/api/chatbots/paper/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_keeps_given_id_and_clears_history() {
        let (state, sessions) = state(vec![]);
        let app = router(state);
        let id = SessionId::from_string("s-1");

        reset(app.clone(), "s-1").await;
        sessions
            .update(&id, &mut |s| s.record_exchange("q", "a"))
            .unwrap();
        let body = reset(app, "s-1").await;

        assert_eq!(body["result"], "s-1");
        assert!(sessions.get(&id).unwrap().unwrap().history().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_agent_is_404() {
        let (state, _) = state(vec![]);
        let response = router(state)
            .oneshot(post_json("/api/chatbots/nope/reset", &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["code"], "UNKNOWN_AGENT");
    }

    #[tokio::test]
    async fn test_chat_unknown_session_is_404() {
        let (state, _) = state(vec![]);
        let response = router(state)
            .oneshot(post_json(
                "/api/chatbots/paper/chat",
                &json!({ "session_id": "missing", "question": "hi" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["code"], "SESSION_NOT_FOUND");
        assert!(body["error"].as_str().unwrap().contains("reset session first"));
    }

    #[tokio::test]
    async fn test_chat_streams_answer_and_records_it() {
        let (state, sessions) = state(vec![
            Reply::text("GENERAL ANSWER"),
            Reply::chunks(["Final Answer: ", "hello ", "there"]),
        ]);
        let app = router(state);
        reset(app.clone(), "s-1").await;

        let response = app
            .oneshot(post_json(
                "/api/chatbots/paper/chat",
                &json!({ "session_id": "s-1", "question": "hi" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "hello there");

        let session = sessions.get(&SessionId::from_string("s-1")).unwrap().unwrap();
        assert_eq!(
            session.history(),
            [Message::user("hi"), Message::assistant("hello there")]
        );
    }

    #[tokio::test]
    async fn test_chat_failure_before_first_chunk_is_404() {
        let (state, sessions) = state(vec![Reply::ProviderError("down".into())]);
        let app = router(state);
        reset(app.clone(), "s-1").await;

        let response = app
            .oneshot(post_json(
                "/api/chatbots/paper/chat",
                &json!({ "session_id": "s-1", "question": "hi" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["code"], "GENERATION_FAILED");

        let session = sessions.get(&SessionId::from_string("s-1")).unwrap().unwrap();
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_chat_failure_mid_stream_ends_body() {
        let (state, sessions) = state(vec![
            Reply::text("GENERAL ANSWER"),
            Reply::BrokenStream(vec!["Final Answer: ".into(), "partial".into()]),
        ]);
        let app = router(state);
        reset(app.clone(), "s-1").await;

        let response = app
            .oneshot(post_json(
                "/api/chatbots/paper/chat",
                &json!({ "session_id": "s-1", "question": "hi" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "partial");

        let session = sessions.get(&SessionId::from_string("s-1")).unwrap().unwrap();
        assert!(session.history().is_empty());
    }
}
