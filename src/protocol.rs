//! Public HTTP request/response structs (serde ready).
//! Shared by the endpoint and by the client coordinator so both sides agree on the wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{TeacherMission, WorldState};
use crate::lenient;

/// Body of `POST /generate-chapter`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChapterRequest {
  #[serde(
    default,
    alias = "teacher_mission",
    deserialize_with = "lenient::opt_object",
    skip_serializing_if = "Option::is_none"
  )]
  pub teacher_mission: Option<TeacherMission>,
  #[serde(default, alias = "student_prompt", deserialize_with = "lenient::string")]
  pub student_prompt: String,
  #[serde(default, alias = "student_name", deserialize_with = "lenient::string")]
  pub student_name: String,
  #[serde(default, alias = "use_new_direction", deserialize_with = "lenient::boolean")]
  pub use_new_direction: bool,
  #[serde(default, deserialize_with = "lenient::or_default")]
  pub worldstate: WorldState,
}

/// Successful chapter payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChapterResponse {
  pub chapter_index: u32,
  pub chapter_text: String,
  pub reflection_questions: Vec<String>,
  pub worldstate: WorldState,
}

/// Body of every non-2xx response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorOut {
  pub error: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}
