//! Loading story configuration (prompt texts + model settings) from TOML.
//!
//! Every field is optional; anything missing keeps its built-in default.
//!
//! ```toml
//! [model]
//! model = "gpt-4.1"
//! temperature = 0.7
//! max_tokens = 1200
//!
//! [prompts]
//! fallback_personal_question = "What would you do next?"
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct StoryConfig {
  pub prompts: Prompts,
  pub model: ModelSettings,
}

/// Settings for the outbound chat-completions call.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
}

impl Default for ModelSettings {
  fn default() -> Self {
    Self { model: "gpt-4.1".into(), temperature: 0.7, max_tokens: 1200 }
  }
}

/// Policy texts used to build the chapter instruction block.
///
/// `chapter_system` placeholders: `{chapter_index}`, `{min_words}`, `{max_words}`,
/// `{interaction_rule}`, `{enrichment_rule}`, `{reader_rule}`.
/// Fallback question placeholders: `{topic}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub chapter_system: String,
  pub interaction_on: String,
  pub interaction_off: String,
  pub enrichment_on: String,
  pub enrichment_off: String,
  pub reader_named: String,
  pub reader_anonymous: String,
  pub fallback_fact_question: String,
  pub fallback_why_question: String,
  pub fallback_personal_question: String,
}

const CHAPTER_SYSTEM: &str = r#"
You are StoryEngine, a storyteller for school classes.

GOAL:
Write an educational but lively story chapter: warm, flowing, dialogue driven, short paragraphs.

HARD RULES:
1) The teacher's facts are LAW. Never change or contradict them.
2) Weave the student's idea in playfully without breaking the facts.
3) No inappropriate content (sex, swearing, glorified violence).
4) No meta commentary ("as an AI...").
5) {enrichment_rule}

STYLE:
- Write in the second person ("you").
- Dialogue and action before explanations.
- NO moralizing inside the story text.
- {interaction_rule}
- {reader_rule}

CONTINUITY:
- You receive the worldstate with earlier chapters and a summary. Do not contradict what already happened.
- If "studentPrompt" is empty, continue the story forward from the summary. Do not restart it.
- If "studentPrompt" is set on a later chapter, steer the story in that new direction from where it stands.

LENGTH:
Aim for {min_words}-{max_words} words in "chapter_text". Never exceed the maximum.

LOCKED STATE:
You receive "lockedState". If something is lost, broken, inactive or weakened:
- Do not use it as if it works.
- Change its status only if the story shows it being found, repaired or recovered.

OUTPUT: ONLY CLEAN JSON, exactly like this:
{
  "chapter_text": "...",
  "reflection_questions": ["...", "...", "..."],
  "worldstate": {
    "chapterIndex": {chapter_index},
    "summary_for_next": "2-4 sentences. Last line: STATE: {...}"
  }
}

REFLECTION QUESTIONS: EXACTLY 3
1) Fact (what?)
2) Understanding (why?)
3) Personal (what would you have done?)

SUMMARY_FOR_NEXT:
Write 2-4 sentences.
The last line must start exactly with: STATE: { ... }
If there are no statuses: STATE: {}
"#;

impl Default for Prompts {
  fn default() -> Self {
    Self {
      chapter_system: CHAPTER_SYSTEM.trim().into(),
      interaction_on: "Interactive: at most ONE gentle question to the reader inside the story. No long lists of choices.".into(),
      interaction_off: "Not interactive: no questions or choices for the reader inside the story text.".into(),
      enrichment_on: "You may add a few short extra facts that fit the topic, as long as they never contradict the teacher's facts.".into(),
      enrichment_off: "Do not add facts beyond the teacher's facts and learning goals.".into(),
      reader_named: "The reader is called {student_name}; use the name now and then.".into(),
      reader_anonymous: "Do not invent a name for the reader.".into(),
      fallback_fact_question: "What was the most important fact in this chapter about {topic}?".into(),
      fallback_why_question: "Why did what happened matter for understanding {topic}?".into(),
      fallback_personal_question: "What would you have done now, and why?".into(),
    }
  }
}

/// Read and parse a TOML config file.
pub fn load_story_config(path: &Path) -> Result<StoryConfig, String> {
  let s = std::fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
  toml::from_str::<StoryConfig>(&s).map_err(|e| format!("parse {}: {e}", path.display()))
}

/// Attempt to load `StoryConfig` from STORY_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_story_config_from_env() -> Option<StoryConfig> {
  let path = std::env::var("STORY_CONFIG_PATH").ok()?;
  match load_story_config(Path::new(&path)) {
    Ok(cfg) => {
      info!(target: "storyengine", %path, "Loaded story config (TOML)");
      Some(cfg)
    }
    Err(e) => {
      error!(target: "storyengine", %path, error = %e, "Failed to load story config; using defaults");
      None
    }
  }
}
