//! Domain models: the teacher's mission, the round-tripped world state and
//! the per-chapter records kept in its history.
//!
//! All types decode leniently (see `lenient`) and accept both the camelCase
//! field names and the older snake_case ones. They always encode camelCase.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::lenient;
use crate::locked::strip_state_line;

pub const MIN_GRADE: i64 = 2;
pub const MAX_GRADE: i64 = 9;
pub const DEFAULT_GRADE: i64 = 4;

/// Target length of one chapter. Unknown labels fall back to `Short`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterLength {
  #[default]
  Short,
  Normal,
  Long,
}

impl ChapterLength {
  pub fn from_label(label: &str) -> Self {
    match label.trim().to_lowercase().as_str() {
      "normal" | "medium" => ChapterLength::Normal,
      "long" | "lång" | "lang" => ChapterLength::Long,
      _ => ChapterLength::Short,
    }
  }

  fn column(self) -> usize {
    match self {
      ChapterLength::Short => 0,
      ChapterLength::Normal => 1,
      ChapterLength::Long => 2,
    }
  }
}

impl<'de> Deserialize<'de> for ChapterLength {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    Ok(match Value::deserialize(d)? {
      Value::String(s) => ChapterLength::from_label(&s),
      _ => ChapterLength::default(),
    })
  }
}

/// Inclusive word-count range the model is asked to hit for `chapterText`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WordBand {
  pub min: u32,
  pub max: u32,
}

/// Rows are grades 2..=9, columns short/normal/long.
const WORD_BANDS: [[(u32, u32); 3]; 8] = [
  [(70, 90), (90, 110), (110, 130)],
  [(90, 120), (120, 150), (150, 180)],
  [(120, 150), (160, 190), (200, 230)],
  [(150, 190), (200, 240), (250, 300)],
  [(170, 210), (220, 270), (280, 330)],
  [(190, 240), (250, 310), (320, 390)],
  [(210, 270), (280, 350), (360, 450)],
  [(220, 290), (300, 380), (390, 480)],
];

/// Look up the word band for a grade (clamped to 2..=9) and a chapter length.
pub fn word_band(grade: i64, length: ChapterLength) -> WordBand {
  let row = (grade.clamp(MIN_GRADE, MAX_GRADE) - MIN_GRADE) as usize;
  let (min, max) = WORD_BANDS[row][length.column()];
  WordBand { min, max }
}

/// Lesson configuration written by the teacher. Sent verbatim on every call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherMission {
  #[serde(default, deserialize_with = "lenient::string")]
  pub topic: String,
  #[serde(default, deserialize_with = "lenient::string_list")]
  pub facts: Vec<String>,
  #[serde(default, alias = "learning_goals", alias = "goals", deserialize_with = "lenient::string_list")]
  pub learning_goals: Vec<String>,
  #[serde(default, alias = "grade_level", deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
  pub grade_level: Option<i64>,
  #[serde(default, alias = "chapter_length")]
  pub chapter_length: ChapterLength,
  #[serde(default, alias = "requires_interaction", deserialize_with = "lenient::boolean")]
  pub requires_interaction: bool,
  #[serde(default, alias = "max_chapters", deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
  pub max_chapters: Option<i64>,
  #[serde(default, alias = "allow_enrichment", deserialize_with = "lenient::boolean")]
  pub allow_enrichment: bool,
  #[serde(default, alias = "chapter_plan", deserialize_with = "lenient::opt_object", skip_serializing_if = "Option::is_none")]
  pub chapter_plan: Option<ChapterPlan>,
  /// Fields without a typed counterpart (`style`, `grade`, ...). Kept so the
  /// mission reaches the model and the local store unchanged.
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Older nested plan block: `{"max_chapters": 4, "target_words_per_chapter": 260}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterPlan {
  #[serde(default, alias = "maxChapters", deserialize_with = "lenient::opt_int", skip_serializing_if = "Option::is_none")]
  pub max_chapters: Option<i64>,
  #[serde(
    default,
    alias = "targetWordsPerChapter",
    deserialize_with = "lenient::opt_int",
    skip_serializing_if = "Option::is_none"
  )]
  pub target_words_per_chapter: Option<i64>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl TeacherMission {
  pub fn has_topic(&self) -> bool {
    !self.topic.trim().is_empty()
  }

  /// Grade used for length lookups, clamped to the supported range.
  pub fn grade(&self) -> i64 {
    self.grade_level.unwrap_or(DEFAULT_GRADE).clamp(MIN_GRADE, MAX_GRADE)
  }

  pub fn word_band(&self) -> WordBand {
    word_band(self.grade(), self.chapter_length)
  }

  /// `None` means unlimited (absent, zero or negative). A top-level
  /// `maxChapters` wins over `chapter_plan.max_chapters`.
  pub fn chapter_limit(&self) -> Option<u32> {
    self
      .max_chapters
      .or_else(|| self.chapter_plan.as_ref().and_then(|p| p.max_chapters))
      .filter(|&n| n > 0)
      .map(|n| n.min(u32::MAX as i64) as u32)
  }
}

/// One generated chapter as stored in the history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRecord {
  #[serde(default, deserialize_with = "lenient::counter")]
  pub chapter_index: u32,
  #[serde(default, alias = "chapter_text", deserialize_with = "lenient::string")]
  pub chapter_text: String,
  #[serde(default, alias = "reflection_questions", deserialize_with = "lenient::string_list")]
  pub reflection_questions: Vec<String>,
  /// The chapter's `summaryForNext`, STATE line included.
  #[serde(default, alias = "short_summary", deserialize_with = "lenient::string")]
  pub short_summary: String,
}

impl ChapterRecord {
  /// Summary prose without the machine-readable STATE line.
  pub fn display_summary(&self) -> String {
    strip_state_line(&self.short_summary)
  }
}

/// Outcome of [`WorldState::upsert_chapter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
  Inserted,
  Replaced,
}

/// Continuity state. Lives on the client and round-trips through every call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
  #[serde(default, deserialize_with = "lenient::counter")]
  pub chapter_index: u32,
  #[serde(default, alias = "summary_for_next", deserialize_with = "lenient::string")]
  pub summary_for_next: String,
  #[serde(default, deserialize_with = "lenient::object_list")]
  pub previous_chapters: Vec<ChapterRecord>,
}

impl WorldState {
  /// The only counter the endpoint trusts: incoming index + 1.
  pub fn next_chapter_index(&self) -> u32 {
    self.chapter_index.saturating_add(1)
  }

  pub fn last_chapter(&self) -> Option<&ChapterRecord> {
    self.previous_chapters.last()
  }

  pub fn chapter(&self, index: u32) -> Option<&ChapterRecord> {
    self.previous_chapters.iter().find(|c| c.chapter_index == index)
  }

  /// Insert-or-replace by `chapterIndex`. Replacing keeps the original position,
  /// so a retried turn never duplicates history.
  pub fn upsert_chapter(&mut self, record: ChapterRecord) -> Upsert {
    match self
      .previous_chapters
      .iter_mut()
      .find(|c| c.chapter_index == record.chapter_index)
    {
      Some(slot) => {
        *slot = record;
        Upsert::Replaced
      }
      None => {
        self.previous_chapters.push(record);
        Upsert::Inserted
      }
    }
  }
}
