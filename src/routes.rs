use axum::{Json, Router, extract::{Path, State}, routing::{get, post}};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::AppError,
    models::{ChatRequest, ChatResponse, DeleteResponse, SessionStatusResponse, TemplateInfo, TemplatesResponse},
    orchestrator::Orchestrator,
    planner,
    session::SessionStore,
    template::TemplateKind,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/chat", post(chat))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "sessions": state.store.len() }))
}

pub async fn list_templates() -> Json<TemplatesResponse> {
    let templates = TemplateKind::ALL
        .into_iter()
        .map(|t| TemplateInfo {
            id: t.number(),
            name: t.name().to_string(),
            description: t.description().to_string(),
            preview_url: t.preview_url().to_string(),
            customizable_elements: t.fields().iter().map(|f| f.name.to_string()).collect(),
            required_elements: t.fields().iter().filter(|f| f.required).map(|f| f.name.to_string()).collect(),
        })
        .collect();
    Json(TemplatesResponse { templates })
}

pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Result<Json<ChatResponse>, AppError> {
    let prompt = body.user_prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("user_prompt must not be empty".into()));
    }
    let requested = match body.template_version {
        Some(n) => Some(TemplateKind::from_number(n)
            .ok_or_else(|| AppError::BadRequest(format!("template_version must be 1, 2 or 3, got {n}")))?),
        None => None,
    };

    let (handle, created) = state.store.get_or_create(body.session_id, requested.unwrap_or_default());
    // one turn at a time per session; held across the extractor and renderer calls
    let mut session = handle.lock().await;
    if created {
        tracing::info!("🆕 New session {}", session.id);
    }
    tracing::info!("💬 [{}] user: {}", session.id, prompt);

    let mut reply = state.orchestrator.handle_turn(&mut session, prompt, requested).await;
    if created {
        reply = format!("{}\n\n{}", planner::welcome(), reply);
    }
    tracing::info!("✅ [{}] {} -> {}", session.id, session.status(), reply.lines().last().unwrap_or_default());

    Ok(Json(ChatResponse {
        session_id: session.id.clone(),
        response: reply,
        status: session.status(),
        template_version: session.template.number(),
    }))
}

pub async fn get_session(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<SessionStatusResponse>, AppError> {
    let handle = state.store.get(&id).ok_or_else(|| AppError::SessionNotFound(id.clone()))?;
    let session = handle.lock().await;
    Ok(Json(SessionStatusResponse {
        session_id: session.id.clone(),
        status: session.status(),
        template_version: session.template.number(),
        has_template: session.template_url().is_some(),
        template_url: session.template_url().map(str::to_string),
        turns: session.history.len(),
        created_at: session.created_at,
        updated_at: session.updated_at(),
    }))
}

/// Idempotent: deleting an unknown session reports `deleted: false` instead of an error.
pub async fn delete_session(Path(id): Path<String>, State(state): State<AppState>) -> Json<DeleteResponse> {
    let deleted = state.store.remove(&id);
    tracing::info!("🗑️ Delete session {} (existed: {})", id, deleted);
    Json(DeleteResponse { session_id: id, deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extractor::PatternExtractor, render::TemplatedClient, session::Status};
    use axum::{body::{to_bytes, Body}, http::{Request, StatusCode}};
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, time::Duration};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let renderer = TemplatedClient::new(None, "http://unused".into(), HashMap::new(), Duration::from_secs(1));
        let orchestrator = Orchestrator::new(
            Arc::new(PatternExtractor),
            Arc::new(renderer),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        AppState { store: Arc::default(), orchestrator: Arc::new(orchestrator) }
    }

    fn test_app() -> Router {
        app(test_state())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn chat_as(app: &Router, session_id: Option<&str>, prompt: &str) -> ChatResponse {
        let (status, body) = send(app, "POST", "/chat", Some(json!({"session_id": session_id, "user_prompt": prompt}))).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn full_conversation_over_http() {
        let app = test_app();
        let first = chat_as(&app, None, "poster for luxury apartment, image https://x/a.jpg, price $2,500,000").await;
        assert_eq!(first.status, Status::CollectingInfo);
        assert!(first.response.starts_with("👋 Welcome!"));
        assert!(first.response.ends_with("Could you give me the headline and the accent color?"));

        let id = first.session_id.as_str();
        let second = chat_as(&app, Some(id), "headline LUXURY, gold color").await;
        assert_eq!(second.status, Status::ReadyToGenerate);
        assert!(!second.response.starts_with("👋"));

        let third = chat_as(&app, Some(id), "generate it").await;
        assert_eq!(third.status, Status::TemplateGenerated);

        let (status, body) = send(&app, "GET", &format!("/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let status_body: SessionStatusResponse = serde_json::from_value(body).unwrap();
        assert!(status_body.has_template);
        assert_eq!(status_body.template_url.as_deref(), Some(crate::render::MOCK_POSTER_URL));
    }

    #[tokio::test]
    async fn status_is_idempotent() {
        let app = test_app();
        let chat = chat_as(&app, Some("fixed-id"), "price $100").await;
        assert_eq!(chat.session_id, "fixed-id");

        let first = send(&app, "GET", "/sessions/fixed-id", None).await;
        let second = send(&app, "GET", "/sessions/fixed-id", None).await;
        assert_eq!(first, second);
        assert_eq!(first.1["has_template"], false);
    }

    #[tokio::test]
    async fn delete_then_status_is_not_found() {
        let app = test_app();
        let chat = chat_as(&app, None, "hello").await;
        let uri = format!("/sessions/{}", chat.session_id);

        let (status, body) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);

        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let (status, body) = send(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], false);
    }

    #[tokio::test]
    async fn rejects_bad_requests() {
        let app = test_app();
        let (status, _) = send(&app, "POST", "/chat", Some(json!({"user_prompt": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", "/chat", Some(json!({"user_prompt": "hi", "template_version": 9}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("template_version"));
    }

    #[tokio::test]
    async fn template_version_selects_template() {
        let app = test_app();
        let chat = chat_as(&app, None, "image https://x/a.jpg").await;
        let (_, body) = send(&app, "POST", "/chat", Some(json!({
            "session_id": chat.session_id, "user_prompt": "headline HOUSE, blue color", "template_version": 2
        }))).await;
        assert_eq!(body["template_version"], 2);
        assert_eq!(body["status"], "READY_TO_GENERATE");
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_both_land() {
        let state = test_state();
        let app = app(state.clone());
        let (a, b) = tokio::join!(
            chat_as(&app, Some("shared"), "image https://x/a.jpg"),
            chat_as(&app, Some("shared"), "price $2,500,000"),
        );
        assert_eq!(a.session_id, b.session_id);
        // exactly one of the two created the session
        assert!(a.response.starts_with("👋") != b.response.starts_with("👋"));

        let handle = state.store.get("shared").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.history.len(), 4);
        assert_eq!(session.parameters.get("image_url"), Some("https://x/a.jpg"));
        assert_eq!(session.parameters.get("property_price"), Some("$2,500,000"));
        assert_eq!(state.store.len(), 1);

        let (_, body) = send(&app, "GET", "/sessions/shared", None).await;
        assert_eq!(body["turns"], 4);
    }

    #[tokio::test]
    async fn health_counts_sessions() {
        let app = test_app();
        chat_as(&app, None, "hello").await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "sessions": 1}));
    }

    #[tokio::test]
    async fn lists_templates() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/templates", None).await;
        assert_eq!(status, StatusCode::OK);
        let templates = body["templates"].as_array().unwrap();
        assert_eq!(templates.len(), 3);
        assert_eq!(templates[0]["required_elements"], json!(["image_url", "property_price", "headline", "accent_color"]));
    }
}
