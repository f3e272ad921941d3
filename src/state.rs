//! Application state: prompt texts and the model client, or the reason there is none.
//!
//! Read-only after start-up; every request is handled independently.
//! Without a usable model client the service still starts, but generation
//! answers with a configuration error naming the cause.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::config::{load_story_config_from_env, Prompts};
use crate::error::{ModelSetupError, StoryError};
use crate::model::StoryModel;
use crate::openai::OpenAI;

#[derive(Clone)]
pub struct AppState {
  pub model: Result<Arc<dyn StoryModel>, ModelSetupError>,
  pub prompts: Prompts,
}

impl AppState {
  /// Build state from env: load config, init OpenAI.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_story_config_from_env().unwrap_or_default();

    let model = match OpenAI::from_env(&cfg.model) {
      Ok(oa) => {
        info!(target: "storyengine", base_url = %oa.base_url, model = %oa.settings.model, "OpenAI enabled.");
        Ok(Arc::new(oa) as Arc<dyn StoryModel>)
      }
      Err(e @ ModelSetupError::MissingApiKey) => {
        warn!(target: "storyengine", "OpenAI disabled (no OPENAI_API_KEY). Chapter generation will fail until it is set.");
        Err(e)
      }
      Err(e) => {
        error!(target: "storyengine", error = %e, "OpenAI disabled: API key present but client setup failed.");
        Err(e)
      }
    };

    Self { model, prompts: cfg.prompts }
  }

  /// State with an explicit model, e.g. a scripted one in tests.
  /// `None` behaves like a missing API key.
  pub fn with_model(model: Option<Arc<dyn StoryModel>>, prompts: Prompts) -> Self {
    Self { model: model.ok_or(ModelSetupError::MissingApiKey), prompts }
  }

  /// State whose model could not be set up for the given reason.
  pub fn without_model(reason: ModelSetupError, prompts: Prompts) -> Self {
    Self { model: Err(reason), prompts }
  }

  /// The model client, or the configuration error explaining its absence.
  pub fn model(&self) -> Result<&Arc<dyn StoryModel>, StoryError> {
    self.model.as_ref().map_err(|e| StoryError::from(e.clone()))
  }
}
