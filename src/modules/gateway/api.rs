use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::modules::ideas::{IdeaRecord, IngestReport, Post};
use super::AppState;

/// Errors surfaced by the REST routes.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Upstream(anyhow::Error),
}

fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json_error("bad_request", msg)).into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"ideas\"")],
                json_error("unauthorized", "valid credentials required"),
            )
                .into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json_error("not_found", msg)).into_response(),
            ApiError::Upstream(e) => {
                error!("❌ Upstream failure: {:#}", e);
                (StatusCode::BAD_GATEWAY, json_error("upstream", format!("{:#}", e))).into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Upstream(e)
    }
}

/// Rejects requests without valid Basic credentials when auth is enabled.
pub async fn require_basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(auth) = &state.auth {
        let header = request.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
        if !auth.verify_header(header) {
            warn!(path = %request.uri().path(), "🔒 Rejected request without valid credentials");
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

/// PUT /api/v1/posts/:post_id
pub async fn upsert_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(post): Json<Post>,
) -> Result<Json<IngestReport>, ApiError> {
    if post.post_id != post_id {
        return Err(ApiError::BadRequest(format!(
            "path id {} does not match body post_id {}",
            post_id, post.post_id
        )));
    }
    let report = state.ingestor.upsert(&post).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub language: Option<String>,
}

/// GET /api/v1/posts/:post_id?language=xx
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<IdeaRecord>, ApiError> {
    let language = query.language.unwrap_or_else(|| state.default_language.to_string());
    match state.ingestor.lookup(post_id, &language).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NotFound(format!("no idea {} for language '{}'", post_id, language))),
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "index": state.backend,
        "active_sessions": state.sessions.active(),
        "oldest_session_secs": state.sessions.oldest_age_secs(),
    }))
}
