//! Error taxonomy of the generation endpoint and its HTTP rendering.
//!
//! Every variant renders as `{"error": "...", "details": ...}` with the mapped
//! status code. Malformed model output is not an error here; it is recovered
//! in `logic::ModelReply::parse`.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::Value;

use crate::protocol::ErrorOut;

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
  /// Caller sent an incomplete mission or an unreadable body.
  #[error("{0}")]
  Validation(String),

  /// Deployment is missing something it needs (e.g. the model credential).
  #[error("{0}")]
  Configuration(String),

  /// The teacher's chapter plan is complete.
  #[error("Max number of chapters reached ({max}).")]
  LimitReached { max: u32 },

  /// The model call failed; `details` carries the upstream payload.
  #[error(transparent)]
  Upstream(#[from] UpstreamError),
}

impl StoryError {
  pub fn status(&self) -> StatusCode {
    match self {
      StoryError::Validation(_) | StoryError::LimitReached { .. } => StatusCode::BAD_REQUEST,
      StoryError::Configuration(_) | StoryError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Short machine-friendly label used in logs.
  pub fn kind(&self) -> &'static str {
    match self {
      StoryError::Validation(_) => "validation",
      StoryError::Configuration(_) => "configuration",
      StoryError::LimitReached { .. } => "limit_reached",
      StoryError::Upstream(_) => "upstream",
    }
  }
}

impl IntoResponse for StoryError {
  fn into_response(self) -> Response {
    let status = self.status();
    let error = self.to_string();
    let details = match self {
      StoryError::Upstream(e) => Some(e.details),
      _ => None,
    };
    (status, Json(ErrorOut { error, details })).into_response()
  }
}

/// Why no model client is available. Rendered as a configuration error.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModelSetupError {
  #[error("OPENAI_API_KEY is not configured")]
  MissingApiKey,

  #[error("OPENAI_API_KEY is set but the HTTP client could not be built: {0}")]
  Client(String),
}

impl From<ModelSetupError> for StoryError {
  fn from(e: ModelSetupError) -> Self {
    StoryError::Configuration(e.to_string())
  }
}

/// Failure talking to the external model.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
  pub message: String,
  pub details: Value,
}

impl UpstreamError {
  pub fn new(message: impl Into<String>, details: Value) -> Self {
    Self { message: message.into(), details }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn validation_renders_400_without_details() {
    let resp = StoryError::Validation("teacherMission.topic is missing".into()).into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await, json!({"error": "teacherMission.topic is missing"}));
  }

  #[test]
  fn setup_failures_become_configuration_errors() {
    let missing: StoryError = ModelSetupError::MissingApiKey.into();
    assert_eq!(missing.kind(), "configuration");
    assert_eq!(missing.to_string(), "OPENAI_API_KEY is not configured");

    let broken: StoryError = ModelSetupError::Client("builder error".into()).into();
    assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(broken.to_string().contains("builder error"));
    assert!(broken.to_string().contains("is set"));
  }

  #[tokio::test]
  async fn limit_reached_is_a_client_error() {
    let resp = StoryError::LimitReached { max: 3 }.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains('3'));
  }

  #[tokio::test]
  async fn upstream_renders_500_with_details() {
    let err: StoryError =
      UpstreamError::new("model API error", json!({"error": {"message": "quota"}})).into();
    assert_eq!(err.kind(), "upstream");
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "model API error");
    assert_eq!(body["details"]["error"]["message"], "quota");
  }
}
