//! Shared fixtures: a scripted model and request helpers.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot()

use storyengine_backend::config::Prompts;
use storyengine_backend::error::UpstreamError;
use storyengine_backend::model::{ChapterPrompt, StoryModel};
use storyengine_backend::routes::build_router;
use storyengine_backend::state::AppState;

/// Returns queued replies first, then `default_reply`. Records every prompt.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
    default_reply: String,
    prompts: Mutex<Vec<ChapterPrompt>>,
}

impl ScriptedModel {
    pub fn always(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_once(err: UpstreamError) -> Arc<Self> {
        let model = Self::always(chapter_reply("unused", &["q"], "STATE: {}"));
        model.replies.lock().unwrap().push_back(Err(err));
        model
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> ChapterPrompt {
        self.prompts.lock().unwrap().last().cloned().expect("model was never called")
    }
}

#[async_trait]
impl StoryModel for ScriptedModel {
    async fn complete_json(&self, prompt: &ChapterPrompt) -> Result<String, UpstreamError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            return next;
        }
        Ok(self.default_reply.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A well-formed model reply in the shape the system prompt asks for.
pub fn chapter_reply(text: &str, questions: &[&str], summary: &str) -> String {
    json!({
        "chapter_text": text,
        "reflection_questions": questions,
        "worldstate": { "chapterIndex": 0, "summary_for_next": summary }
    })
    .to_string()
}

pub fn state_with(model: Option<Arc<ScriptedModel>>) -> Arc<AppState> {
    let model = model.map(|m| m as Arc<dyn StoryModel>);
    Arc::new(AppState::with_model(model, Prompts::default()))
}

pub fn app(model: Option<Arc<ScriptedModel>>) -> Router {
    build_router(state_with(model))
}

pub fn mission(topic: &str) -> Value {
    json!({
        "topic": topic,
        "facts": ["Bees make honey from nectar."],
        "learningGoals": ["Explain pollination"],
        "gradeLevel": 4,
        "chapterLength": "normal",
        "requiresInteraction": false,
        "maxChapters": 0,
        "allowEnrichment": false
    })
}

pub async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, headers, json)
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

pub async fn generate(app: Router, body: &Value) -> (StatusCode, Value) {
    let (status, _, json) = post_json(app, "/generate-chapter", body).await;
    (status, json)
}
