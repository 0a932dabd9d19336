//! Remote completion and moderation capabilities.
//!
//! The session layer only talks to the [`CompletionBackend`] and
//! [`ModerationBackend`] traits. [`OpenAiAdapter`] implements both over HTTP;
//! tests substitute the scripted doubles from [`crate::testing`].

pub mod openai;
pub mod request;
pub mod resilience;
mod streaming;

pub use openai::{DEFAULT_BASE_URL, DEFAULT_MODERATION_MODEL, OpenAiAdapter};
pub use request::{ChatRequest, GenerationParams, ModerationStage, ModerationVerdict};
pub use resilience::{Backoff, RetryController, RetryPolicy};
pub use streaming::SseChunkParser;

use std::fmt::Debug;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::Result;

/// Incremental reply text. A terminal `Err` ends the stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait CompletionBackend: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Sends the request and waits for the whole reply.
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Opens a streamed reply. Errors returned here happen before any chunk
    /// was produced; failures after that arrive through the stream.
    async fn complete_stream(&self, request: ChatRequest) -> Result<ChunkStream>;
}

#[async_trait]
pub trait ModerationBackend: Send + Sync + Debug {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict>;
}
