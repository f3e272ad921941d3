//! How the coordinator reaches the generation endpoint.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{instrument, warn};

use super::ClientError;
use crate::protocol::{ErrorOut, GenerateChapterRequest, GenerateChapterResponse};

#[async_trait]
pub trait ChapterTransport: Send + Sync {
    async fn generate(&self, req: &GenerateChapterRequest) -> Result<GenerateChapterResponse, ClientError>;
}

/// Posts to `{base_url}/generate-chapter`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        let endpoint = format!("{}/generate-chapter", base_url.trim_end_matches('/'));
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChapterTransport for HttpTransport {
    #[instrument(level = "info", skip(self, req), fields(endpoint = %self.endpoint, chapter_index = req.worldstate.chapter_index))]
    async fn generate(&self, req: &GenerateChapterRequest) -> Result<GenerateChapterResponse, ClientError> {
        let res = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(req)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| ClientError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorOut>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| "Unknown error".into());
            warn!(target: "storyengine", %status, error = %message, "Endpoint rejected chapter request");
            return Err(ClientError::Endpoint { status: status.as_u16(), message });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
