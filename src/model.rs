//! The text-generation seam. The endpoint only needs "send this instruction
//! block, get raw text back"; which vendor sits behind it is not its concern.

use async_trait::async_trait;

use crate::error::UpstreamError;

/// One fully built instruction block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterPrompt {
  /// Fixed policy text with the per-request rules filled in.
  pub system: String,
  /// JSON brief: mission, effective prompt, world state, locked state.
  pub user: String,
}

#[async_trait]
pub trait StoryModel: Send + Sync {
  /// Request a JSON-shaped completion and return the raw message content.
  async fn complete_json(&self, prompt: &ChapterPrompt) -> Result<String, UpstreamError>;

  /// Model name, for logs.
  fn name(&self) -> &str;
}
