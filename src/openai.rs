//! Minimal OpenAI client for chapter generation.
//!
//! We only call chat.completions and request a strict JSON object.
//! Calls are instrumented and log model name, latency and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::config::ModelSettings;
use crate::error::{ModelSetupError, UpstreamError};
use crate::model::{ChapterPrompt, StoryModel};
use crate::util::trunc_for_log;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub settings: ModelSettings,
}

impl OpenAI {
  /// Construct the client from OPENAI_API_KEY.
  /// OPENAI_MODEL overrides the configured model name.
  pub fn from_env(settings: &ModelSettings) -> Result<Self, ModelSetupError> {
    let api_key = std::env::var("OPENAI_API_KEY")
      .ok()
      .filter(|k| !k.trim().is_empty())
      .ok_or(ModelSetupError::MissingApiKey)?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let mut settings = settings.clone();
    if let Ok(model) = std::env::var("OPENAI_MODEL") {
      settings.model = model;
    }

    let mut builder = reqwest::Client::builder();
    if let Some(secs) = std::env::var("OPENAI_TIMEOUT_SECS").ok().and_then(|s| s.parse::<u64>().ok()) {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder.build().map_err(|e| ModelSetupError::Client(e.to_string()))?;

    Ok(Self { client, api_key, base_url, settings })
  }

  /// JSON-object chat completion; returns the raw message content.
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.settings.model, user_len = user.len()))]
  async fn chat_json_raw(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let req = ChatCompletionRequest {
      model: self.settings.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.settings.temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(self.settings.max_tokens),
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "storyengine-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await
      .map_err(|e| UpstreamError::new("model API request failed", Value::String(e.to_string())))?;

    let status = res.status();
    let body = res.text().await
      .map_err(|e| UpstreamError::new("model API response could not be read", Value::String(e.to_string())))?;
    let elapsed = start.elapsed();

    if !status.is_success() {
      let msg = extract_openai_error(&body).unwrap_or_else(|| trunc_for_log(&body, 200));
      error!(?elapsed, %status, error = %msg, "OpenAI returned an error");
      let details = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
      return Err(UpstreamError::new(format!("model API error (HTTP {})", status.as_u16()), details));
    }

    let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
      warn!(?elapsed, error = %e, preview = %trunc_for_log(&body, 200), "Unreadable OpenAI response");
      UpstreamError::new("model API response was not understood", Value::String(body.clone()))
    })?;
    if let Some(usage) = &parsed.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }

    let text = parsed.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .unwrap_or_default();
    if text.trim().is_empty() {
      let details = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
      return Err(UpstreamError::new("empty reply from model", details));
    }

    info!(?elapsed, reply_len = text.len(), "Model response received");
    Ok(text)
  }
}

#[async_trait]
impl StoryModel for OpenAI {
  async fn complete_json(&self, prompt: &ChapterPrompt) -> Result<String, UpstreamError> {
    self.chat_json_raw(&prompt.system, &prompt.user).await
  }

  fn name(&self) -> &str {
    &self.settings.model
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)] choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
