//! Locked status tags carried inside prose summaries.
//!
//! The model is told to end every `summaryForNext` with a line such as
//! `STATE: {"amulet":"lost"}`. On each request the tags are re-read from the
//! incoming summary and from the last chapter's summary, merged, and handed
//! back to the model as facts it may not contradict.
//!
//! Parsing never fails: any malformed input degrades to an empty map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::WorldState;

pub const STATE_PREFIX: &str = "STATE:";

/// Summary used whenever the model does not provide one.
pub const EMPTY_STATE_SUMMARY: &str = "STATE: {}";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockedState(BTreeMap<String, String>);

impl LockedState {
  /// Parse the first `STATE:` line of `text`. Only JSON objects are accepted.
  pub fn parse(text: &str) -> Self {
    let Some(line) = text.lines().map(str::trim).find(|l| l.starts_with(STATE_PREFIX)) else {
      return Self::default();
    };
    let json_part = line[STATE_PREFIX.len()..].trim();
    if json_part.is_empty() {
      return Self::default();
    }
    match serde_json::from_str::<Value>(json_part) {
      Ok(v) => Self::from_value(&v),
      Err(_) => Self::default(),
    }
  }

  /// Convert a JSON object into tags; any other JSON value is empty.
  /// Non-string values keep their JSON text (`true`, `3`, ...).
  pub fn from_value(v: &Value) -> Self {
    match v {
      Value::Object(map) => Self(
        map
          .iter()
          .map(|(k, v)| {
            let s = match v {
              Value::String(s) => s.clone(),
              other => other.to_string(),
            };
            (k.clone(), s)
          })
          .collect(),
      ),
      _ => Self::default(),
    }
  }

  /// Shallow merge. Keys in `overlay` win.
  pub fn merge(mut self, overlay: LockedState) -> Self {
    self.0.extend(overlay.0);
    self
  }

  /// Tags from `summaryForNext`, overlaid by those of the last chapter's summary.
  pub fn from_world(world: &WorldState) -> Self {
    let from_summary = Self::parse(&world.summary_for_next);
    let from_last = world
      .last_chapter()
      .map(|c| Self::parse(&c.short_summary))
      .unwrap_or_default();
    from_summary.merge(from_last)
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn into_map(self) -> BTreeMap<String, String> {
    self.0
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LockedState {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

pub fn parse_state(text: &str) -> LockedState {
  LockedState::parse(text)
}

pub fn merge_state(base: LockedState, overlay: LockedState) -> LockedState {
  base.merge(overlay)
}

/// `merge_state` over raw JSON values; non-objects count as empty.
pub fn merge_state_values(base: &Value, overlay: &Value) -> LockedState {
  LockedState::from_value(base).merge(LockedState::from_value(overlay))
}

/// Drop every `STATE:` line, keeping the prose for display.
pub fn strip_state_line(text: &str) -> String {
  text
    .lines()
    .filter(|l| !l.trim().starts_with(STATE_PREFIX))
    .collect::<Vec<_>>()
    .join("\n")
    .trim()
    .to_string()
}
