//! API Handlers
//!
//! - `POST /generate` streams pipeline events as SSE
//! - `POST /scan` returns a scan report
//! - `GET /templates` lists the template catalog
//! - `GET /health` liveness

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderName, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Json, Response,
    },
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};

use super::AppState;
use crate::pipeline::GenerateRequest;
use crate::scanner::ScanReport;
use crate::skills::load_templates;

pub const MAX_DESCRIPTION_CHARS: usize = 5_000;
pub const MAX_SCAN_CHARS: usize = 50_000;

/// API error with a `{"detail": ...}` body
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Rate limit exceeded. Try again later.")]
    RateLimited,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub description: String,
    #[serde(default)]
    pub template_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<serde_json::Value>,
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(ApiError::Validation(format!(
            "{} must be between 1 and {} characters (got {})",
            field, max, len
        )));
    }
    Ok(())
}

/// Stream a generation run as SSE
pub async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    check_length("description", &body.description, MAX_DESCRIPTION_CHARS)?;

    let request = GenerateRequest {
        description: body.description,
        template_id: body.template_id,
    };
    let events = state
        .orchestrator
        .start(request)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
        .into_response())
}

/// Scan a SKILL.md body
pub async fn scan(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ScanBody>, JsonRejection>,
) -> Result<Json<ScanReport>, ApiError> {
    let Json(body) = body?;
    check_length("content", &body.content, MAX_SCAN_CHARS)?;

    let report = state.orchestrator.scanner().scan(&body.content);
    info!(
        "Scan request: score={}, risk={:?}, issues={}",
        report.score,
        report.risk_level,
        report.issues.len()
    );
    Ok(Json(report))
}

/// List templates
pub async fn templates(State(state): State<Arc<AppState>>) -> Result<Json<TemplatesResponse>, ApiError> {
    let templates = load_templates(&state.config.templates_dir).await.map_err(|e| {
        error!("Template listing failed: {:#}", e);
        ApiError::Internal(format!("Failed to load templates: {}", e))
    })?;
    Ok(Json(TemplatesResponse { templates }))
}

/// Liveness check
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_length_bounds() {
        assert!(check_length("description", "x", 5).is_ok());
        assert!(check_length("description", "xxxxx", 5).is_ok());
        assert!(check_length("description", "", 5).is_err());
        assert!(check_length("description", "xxxxxx", 5).is_err());
        // counted in characters, not bytes
        assert!(check_length("description", "ééééé", 5).is_ok());
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Rate limit exceeded. Try again later.");
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
