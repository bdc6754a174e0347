//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/papers/generate", post(http::http_generate_paper))
        .route("/api/v1/papers/:id", get(http::http_get_paper))
        .route("/api/v1/grade", post(http::http_grade))
        .route("/api/v1/sessions", post(http::http_start_session))
        .route(
            "/api/v1/sessions/:id",
            get(http::http_get_session).delete(http::http_abandon_session),
        )
        .route("/api/v1/sessions/:id/answers", put(http::http_set_answer))
        .route("/api/v1/sessions/:id/navigate", post(http::http_navigate))
        .route("/api/v1/sessions/:id/submit", post(http::http_submit))
        .route("/api/v1/sessions/:id/grade", post(http::http_grade_session))
        .route("/api/v1/sessions/:id/report", get(http::http_session_report))
        .route("/api/v1/hosted", post(http::http_host_exam))
        .route("/api/v1/hosted/join", post(http::http_join_hosted))
        .route("/api/v1/hosted/:code", get(http::http_get_hosted))
        .route("/api/v1/progress/attempt", post(http::http_record_attempt))
        .route("/api/v1/progress/:user_id", get(http::http_progress))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::AgentConfig;

    fn app() -> Router {
        build_router(Arc::new(AppState::with_parts(AgentConfig::default(), None)))
    }

    async fn call(req: Request<Body>) -> (StatusCode, Value) {
        let res = app().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_model_service() {
        let (status, body) = call(Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "modelService": false }));
    }

    #[tokio::test]
    async fn mismatched_grade_arrays_are_bad_requests() {
        let q = json!({ "id": "q1", "prompt": "2+2?", "type": "short", "marks": 2 });
        let (status, body) = call(post_json("/api/v1/grade", json!({ "questions": [q], "answers": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let uri = format!("/api/v1/sessions/{}", uuid::Uuid::new_v4());
        let (status, _) = call(Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generation_without_inputs_is_rejected() {
        let (status, _) = call(post_json("/api/v1/papers/generate", json!({ "targetCount": 5 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reported_attempts_show_up_in_progress() {
        let app = app();
        let body = json!({ "userId": "u9", "questionId": "q1", "timeSpentSeconds": 30, "correct": true, "marksObtained": 4 });
        let res = app.clone().oneshot(post_json("/api/v1/progress/attempt", body)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let bad = json!({ "userId": "", "questionId": "q1" });
        let res = app.clone().oneshot(post_json("/api/v1/progress/attempt", bad)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .oneshot(Request::get("/api/v1/progress/u9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let summary: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(summary["totalAttempts"], 1);
        assert_eq!(summary["perQuestion"][0]["questionId"], "q1");
        assert_eq!(summary["perQuestion"][0]["avgTimeSeconds"], 30.0);
    }

    #[tokio::test]
    async fn starting_a_session_for_a_missing_paper_is_not_found() {
        let (status, _) = call(post_json("/api/v1/sessions", json!({ "paperId": "nope" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
