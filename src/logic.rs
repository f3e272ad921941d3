//! Core chapter generation shared by the HTTP handlers.
//!
//! Flow per request:
//!   1) validate the mission, the model credential and the chapter limit
//!   2) derive word band, locked state and the effective student prompt
//!   3) one JSON-mode call to the model
//!   4) sanitize the reply (fallback on bad JSON, exactly 3 questions)
//!   5) upsert the chapter into the returned world state

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::{ChapterRecord, TeacherMission};
use crate::error::StoryError;
use crate::lenient;
use crate::locked::{LockedState, EMPTY_STATE_SUMMARY};
use crate::prompt::{build_chapter_prompt, effective_prompt, ChapterContext};
use crate::protocol::{GenerateChapterRequest, GenerateChapterResponse};
use crate::state::AppState;
use crate::util::{clean_one_line, fill_template, trunc_for_log};

pub const QUESTION_COUNT: usize = 3;

#[instrument(
  level = "info",
  skip(state, req),
  fields(
    request_id = %Uuid::new_v4(),
    incoming_index = req.worldstate.chapter_index,
    new_direction = req.use_new_direction,
  )
)]
pub async fn generate_chapter(
  state: &AppState,
  req: GenerateChapterRequest,
) -> Result<GenerateChapterResponse, StoryError> {
  let GenerateChapterRequest { teacher_mission, student_prompt, student_name, use_new_direction, worldstate } = req;

  let mission = teacher_mission
    .filter(TeacherMission::has_topic)
    .ok_or_else(|| StoryError::Validation("teacherMission.topic is missing".into()))?;

  let model = state.model()?;

  let chapter_index = worldstate.next_chapter_index();
  if let Some(max) = mission.chapter_limit() {
    if chapter_index > max {
      info!(target: "chapter", chapter_index, max, "Chapter limit reached");
      return Err(StoryError::LimitReached { max });
    }
  }

  let band = mission.word_band();
  let locked = LockedState::from_world(&worldstate);
  let effective = effective_prompt(chapter_index, &student_prompt, use_new_direction);
  let prompt = build_chapter_prompt(
    &state.prompts,
    &ChapterContext {
      chapter_index,
      mission: &mission,
      effective_prompt: effective,
      student_name: &student_name,
      world: &worldstate,
      locked: &locked,
      band,
    },
  );
  debug!(
    target: "chapter",
    chapter_index,
    grade = mission.grade(),
    min_words = band.min,
    max_words = band.max,
    locked_tags = locked.len(),
    prompt_forwarded = !effective.is_empty(),
    model = model.name(),
    "Prompt built"
  );

  let raw = model.complete_json(&prompt).await.map_err(|e| {
    error!(target: "chapter", chapter_index, error = %e, "Model call failed");
    StoryError::from(e)
  })?;

  let reply = ModelReply::parse(&raw);
  if reply.fallback {
    warn!(target: "chapter", chapter_index, preview = %trunc_for_log(&raw, 120), "Model reply was not a JSON object; using raw text as chapter");
  }
  let questions = normalize_questions(&reply.reflection_questions, &mission.topic, &state.prompts);

  let mut world = worldstate;
  let upsert = world.upsert_chapter(ChapterRecord {
    chapter_index,
    chapter_text: reply.chapter_text.clone(),
    reflection_questions: questions.clone(),
    short_summary: reply.summary_for_next.clone(),
  });
  world.chapter_index = chapter_index;
  world.summary_for_next = reply.summary_for_next;

  info!(
    target: "chapter",
    chapter_index,
    ?upsert,
    history_len = world.previous_chapters.len(),
    text_len = reply.chapter_text.len(),
    "Chapter generated"
  );

  Ok(GenerateChapterResponse {
    chapter_index,
    chapter_text: reply.chapter_text,
    reflection_questions: questions,
    worldstate: world,
  })
}

/// Sanitized view of the model's reply.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelReply {
  pub chapter_text: String,
  pub reflection_questions: Vec<String>,
  pub summary_for_next: String,
  /// True when the reply was not a JSON object and the raw text was used.
  pub fallback: bool,
}

#[derive(Deserialize)]
struct RawReply {
  #[serde(default, alias = "chapterText", deserialize_with = "lenient::string")]
  chapter_text: String,
  #[serde(default, alias = "reflectionQuestions", deserialize_with = "lenient::string_list")]
  reflection_questions: Vec<String>,
  #[serde(default, deserialize_with = "lenient::or_default")]
  worldstate: RawEcho,
  #[serde(default, alias = "summaryForNext", deserialize_with = "lenient::string")]
  summary_for_next: String,
}

#[derive(Default, Deserialize)]
struct RawEcho {
  #[serde(default, alias = "summaryForNext", deserialize_with = "lenient::string")]
  summary_for_next: String,
}

impl ModelReply {
  /// Never fails: anything that is not a JSON object becomes the fallback reply.
  pub fn parse(raw: &str) -> Self {
    let parsed = match serde_json::from_str::<Value>(raw.trim()) {
      Ok(v @ Value::Object(_)) => serde_json::from_value::<RawReply>(v).ok(),
      _ => None,
    };
    let Some(r) = parsed else {
      return Self::fallback(raw);
    };

    let summary = [r.worldstate.summary_for_next, r.summary_for_next]
      .into_iter()
      .find(|s| !s.trim().is_empty())
      .unwrap_or_else(|| EMPTY_STATE_SUMMARY.to_string());

    Self {
      chapter_text: r.chapter_text,
      reflection_questions: r.reflection_questions,
      summary_for_next: summary,
      fallback: false,
    }
  }

  fn fallback(raw: &str) -> Self {
    Self {
      chapter_text: raw.to_string(),
      reflection_questions: Vec::new(),
      summary_for_next: EMPTY_STATE_SUMMARY.to_string(),
      fallback: true,
    }
  }
}

/// Exactly three one-line questions. Extra ones are dropped; missing slots are
/// filled with the fallback for that position (fact, why, personal).
pub fn normalize_questions(raw: &[String], topic: &str, prompts: &Prompts) -> Vec<String> {
  let mut out: Vec<String> = raw
    .iter()
    .map(|q| clean_one_line(q))
    .filter(|q| !q.is_empty())
    .take(QUESTION_COUNT)
    .collect();

  let fallbacks = [
    &prompts.fallback_fact_question,
    &prompts.fallback_why_question,
    &prompts.fallback_personal_question,
  ];
  let topic = topic.trim();
  while out.len() < QUESTION_COUNT {
    out.push(fill_template(fallbacks[out.len()], &[("topic", topic)]));
  }
  out
}
