//! # llm-session
//!
//! Conversational sessions in front of a remote chat-completion endpoint.
//!
//! A [`ChatSession`] keeps a bounded transcript, trims it so every request
//! fits the model's context window, retries transient failures with capped
//! exponential backoff, and bills consumed tokens per model family.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use llm_session::{ChatSession, OpenAiAdapter, TrimPolicy};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), llm_session::Error> {
//!     let mut session = ChatSession::builder()
//!         .model("gpt-4")
//!         .backend(Arc::new(OpenAiAdapter::from_env()?))
//!         .trim(TrimPolicy::by_tokens(2000))
//!         .build()?;
//!
//!     session.set_instruction("You are helpful")?;
//!     let reply = session.prompt("What is 2 + 2?").await?;
//!     println!("{reply} ({} tokens so far)", session.total_consumed_tokens());
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! # use llm_session::ChatSession;
//! use futures::StreamExt;
//!
//! # async fn run(mut session: ChatSession) -> Result<(), llm_session::Error> {
//! let mut stream = session.prompt_stream("Tell me a story")?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod chat;
pub mod client;
pub mod models;
pub mod prelude;
pub mod session;
pub mod testing;
pub mod tokens;

pub use chat::{
    ChatSession, ChatSessionBuilder, ExchangePhase, ModerationPolicy, ReplyStream, SessionConfig,
    SessionOverrides,
};
pub use client::{
    Backoff, ChatRequest, ChunkStream, CompletionBackend, GenerationParams, ModerationBackend,
    ModerationStage, ModerationVerdict, OpenAiAdapter, RetryController, RetryPolicy,
};
pub use models::{ModelFamily, ModelRegistry, ModelSpec, registry as model_registry};
pub use session::{Message, Role, SessionId, Transcript, TrimPolicy, TrimReport};
pub use tokens::{Cl100kTokenizer, ConsumptionCounter, TokenAccountant, TokenId, Tokenizer};

/// Error type for llm-session operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing configuration, including a missing credential.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model name is not in the registry.
    #[error("No such model: {model}")]
    ModelNotFound { model: String },

    /// The moderation backend flagged the input or the reply.
    #[error("Rejected by {stage} moderation")]
    ModerationRejected { stage: ModerationStage },

    /// The moderation backend itself failed.
    #[error("Moderation failed: {0}")]
    Moderation(String),

    /// API returned an error response.
    #[error("API error (HTTP {status}): {message}", status = status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into()))]
    Api {
        message: String,
        status: Option<u16>,
        error_type: Option<String>,
    },

    /// Network connectivity or request failed.
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// A backend failed to deliver a reply for a reason other than HTTP.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation exceeded timeout.
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(std::time::Duration),

    /// Instruction does not fit the model's instruction budget.
    #[error("Instruction too long: {tokens} tokens > {max} allowed")]
    InstructionTooLong { tokens: usize, max: usize },

    /// Streaming response failed after it started.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Tokenizer could not be initialized.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Failed to parse a response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown model, missing credential, invalid settings
    Configuration,
    /// Moderation rejected the exchange or could not run
    Moderation,
    /// Network, timeout or server-side failures that may succeed on retry
    Transient,
    /// Failure after a streamed reply started
    Stream,
    /// Client-side API errors, parsing and other unexpected states
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::ModelNotFound { .. }
            | Error::InstructionTooLong { .. }
            | Error::Tokenizer(_) => ErrorCategory::Configuration,

            Error::Api {
                status: Some(401 | 403),
                ..
            } => ErrorCategory::Configuration,

            Error::ModerationRejected { .. } | Error::Moderation(_) => ErrorCategory::Moderation,

            Error::Network(_) | Error::Transport(_) | Error::Timeout(_) => ErrorCategory::Transient,
            Error::Api {
                status: Some(408 | 429 | 500..=599),
                ..
            } => ErrorCategory::Transient,

            Error::Stream(_) => ErrorCategory::Stream,

            Error::Api { .. } | Error::Parse(_) | Error::Json(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_moderation_error(&self) -> bool {
        self.category() == ErrorCategory::Moderation
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
