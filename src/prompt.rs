//! Builds the single instruction block sent to the model for one chapter.

use serde_json::json;

use crate::config::Prompts;
use crate::domain::{TeacherMission, WordBand, WorldState};
use crate::locked::LockedState;
use crate::model::ChapterPrompt;
use crate::util::fill_template;

/// Everything the prompt depends on for one turn.
#[derive(Debug)]
pub struct ChapterContext<'a> {
  pub chapter_index: u32,
  pub mission: &'a TeacherMission,
  /// Student input as actually forwarded this turn (may be empty).
  pub effective_prompt: &'a str,
  pub student_name: &'a str,
  pub world: &'a WorldState,
  pub locked: &'a LockedState,
  pub band: WordBand,
}

/// Student input forwarded to the model: always on chapter 1, later only when
/// the student asked for a new direction. Otherwise the story just continues.
pub fn effective_prompt(chapter_index: u32, student_prompt: &str, use_new_direction: bool) -> &str {
  if chapter_index <= 1 || use_new_direction {
    student_prompt
  } else {
    ""
  }
}

pub fn build_chapter_prompt(prompts: &Prompts, ctx: &ChapterContext<'_>) -> ChapterPrompt {
  let mission = ctx.mission;
  let interaction_rule = if mission.requires_interaction { &prompts.interaction_on } else { &prompts.interaction_off };
  let enrichment_rule = if mission.allow_enrichment { &prompts.enrichment_on } else { &prompts.enrichment_off };
  let student_name = ctx.student_name.trim();
  let reader_rule = if student_name.is_empty() {
    prompts.reader_anonymous.clone()
  } else {
    fill_template(&prompts.reader_named, &[("student_name", student_name)])
  };

  let chapter_index = ctx.chapter_index.to_string();
  let min_words = ctx.band.min.to_string();
  let max_words = ctx.band.max.to_string();
  let system = fill_template(
    &prompts.chapter_system,
    &[
      ("chapter_index", chapter_index.as_str()),
      ("min_words", min_words.as_str()),
      ("max_words", max_words.as_str()),
      ("interaction_rule", interaction_rule.as_str()),
      ("enrichment_rule", enrichment_rule.as_str()),
      ("reader_rule", reader_rule.as_str()),
    ],
  );

  let mut brief = json!({
    "chapterIndex": ctx.chapter_index,
    "teacherMission": mission,
    "studentPrompt": ctx.effective_prompt,
    "continuation": ctx.chapter_index > 1 && ctx.effective_prompt.trim().is_empty(),
    "targetWords": ctx.band,
    "worldstate": ctx.world,
    "lockedState": ctx.locked,
  });
  if !student_name.is_empty() {
    brief["studentName"] = json!(student_name);
  }

  ChapterPrompt { system, user: brief.to_string() }
}
