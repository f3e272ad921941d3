//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; rejected requests are logged with their error kind.

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::State,
  http::{header, StatusCode},
  response::IntoResponse,
  Json,
};
use tracing::{instrument, warn};

use crate::error::StoryError;
use crate::logic::generate_chapter;
use crate::protocol::{GenerateChapterRequest, GenerateChapterResponse, HealthOut};
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

/// CORS preflight for the generation endpoint.
pub async fn http_preflight() -> impl IntoResponse {
  (
    StatusCode::NO_CONTENT,
    [
      (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
      (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
      (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"),
    ],
  )
}

// Body is taken as raw bytes so that unreadable JSON still answers `{"error": ...}`.
#[instrument(level = "info", skip(state, body), fields(body_len = body.len()))]
pub async fn http_post_generate_chapter(
  State(state): State<Arc<AppState>>,
  body: Bytes,
) -> Result<Json<GenerateChapterResponse>, StoryError> {
  let req: GenerateChapterRequest = serde_json::from_slice(&body).map_err(|e| {
    warn!(target: "chapter", error = %e, "Unreadable request body");
    StoryError::Validation(format!("Invalid request body: {e}"))
  })?;

  match generate_chapter(&state, req).await {
    Ok(out) => Ok(Json(out)),
    Err(e) => {
      warn!(target: "chapter", kind = e.kind(), error = %e, "Chapter request rejected");
      Err(e)
    }
  }
}
