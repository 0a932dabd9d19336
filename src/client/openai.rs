//! OpenAI-compatible HTTP backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::request::{ChatRequest, ModerationVerdict};
use super::streaming::SseChunkParser;
use super::{ChunkStream, CompletionBackend, ModerationBackend};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODERATION_MODEL: &str = "text-moderation-stable";

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// Talks to `/chat/completions` and `/moderations` on an OpenAI-compatible
/// endpoint. The key is sent as a bearer token and never printed.
pub struct OpenAiAdapter {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    moderation_model: String,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.base_url)
            .field("moderation_model", &self.moderation_model)
            .finish_non_exhaustive()
    }
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("missing API credential".into()));
        }
        let http = reqwest::Client::builder().build().map_err(Error::Network)?;

        Ok(Self {
            http,
            api_key: SecretString::from(api_key),
            base_url: DEFAULT_BASE_URL.into(),
            moderation_model: DEFAULT_MODERATION_MODEL.into(),
        })
    }

    /// Reads `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let adapter = Self::new(key)?;
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => adapter.with_base_url(url),
            _ => adapter,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_moderation_model(mut self, model: impl Into<String>) -> Self {
        self.moderation_model = model.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await?;
        Self::check_response(response).await
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let (message, error_type) = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(body) => (body.error.message, body.error.error_type),
            Err(_) => (text, None),
        };
        Err(Error::Api {
            message,
            status: Some(status),
            error_type,
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let request = ChatRequest {
            stream: false,
            ..request
        };
        let response = self.post("/chat/completions", &request).await?;
        let bytes = response.bytes().await?;
        let body: CompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Parse(format!("malformed completion response: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Parse("completion response has no choices".into()))?;
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn complete_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        let request = request.streaming();
        let response = self.post("/chat/completions", &request).await?;
        Ok(Box::pin(SseChunkParser::new(response.bytes_stream())))
    }
}

#[async_trait]
impl ModerationBackend for OpenAiAdapter {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        let request = ModerationRequest {
            input: text,
            model: &self.moderation_model,
        };
        let response = self
            .post("/moderations", &request)
            .await
            .map_err(|e| Error::Moderation(e.to_string()))?;
        let body: ModerationResponse = response
            .json()
            .await
            .map_err(|e| Error::Moderation(e.to_string()))?;

        let result = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::Moderation("moderation response has no results".into()))?;
        Ok(ModerationVerdict {
            flagged: result.flagged,
            categories: result
                .categories
                .into_iter()
                .filter_map(|(name, hit)| hit.then_some(name))
                .collect(),
        })
    }
}
