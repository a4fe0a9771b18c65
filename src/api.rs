//! REST surface over the engine.
//!
//! Every non-health route requires the configured key in `X-API-Key`.
//! Errors map to the envelope `{"error": "<code>", "detail": "<message>"}`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};

use crate::engine::Engine;
use crate::error::Error;
use crate::models::{
    ErrorEnvelope, HealthResponse, ProxyRequest, SessionCookiesResponse, SessionCreateResponse,
    SessionDeleteResponse,
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope {
            error: self.code().to_string(),
            detail: self.to_string(),
        };
        (status, Json(envelope)).into_response()
    }
}

/// Build the service router around a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let protected = Router::new()
        .route("/proxy/request", post(proxy_request))
        .route("/proxy/session/create", post(create_session))
        .route("/proxy/session/{id}", delete(delete_session))
        .route("/proxy/session/{id}/cookies", get(session_cookies))
        .route_layer(middleware::from_fn_with_state(
            engine.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(protected)
        .with_state(engine)
}

async fn require_api_key(
    State(engine): State<Arc<Engine>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    if provided == Some(engine.config().api_key.as_str()) {
        return next.run(request).await;
    }
    let envelope = ErrorEnvelope {
        error: "unauthorized".to_string(),
        detail: "invalid or missing API key".to_string(),
    };
    (StatusCode::UNAUTHORIZED, Json(envelope)).into_response()
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "camo proxy service",
        "health": "/health",
    }))
}

async fn health(State(engine): State<Arc<Engine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        active_sessions: engine.active_sessions(),
        max_sessions: engine.config().max_sessions,
    })
}

async fn proxy_request(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<ProxyRequest>,
) -> Result<Response, Error> {
    let response = engine.execute(request).await?;
    Ok(Json(response).into_response())
}

async fn create_session(State(engine): State<Arc<Engine>>) -> Result<Response, Error> {
    let session_id = engine.create_session()?;
    Ok(Json(SessionCreateResponse {
        session_id,
        message: "Session created successfully".to_string(),
    })
    .into_response())
}

async fn delete_session(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    engine.delete_session(&id)?;
    Ok(Json(SessionDeleteResponse {
        session_id: id,
        message: "Session deleted successfully".to_string(),
    })
    .into_response())
}

async fn session_cookies(
    State(engine): State<Arc<Engine>>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let cookies: HashMap<String, String> = engine.session_cookies(&id).await?;
    Ok(Json(SessionCookiesResponse {
        session_id: id,
        cookies,
    })
    .into_response())
}
