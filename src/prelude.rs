//! Prelude module for convenient imports.
//!
//! ```rust
//! use llm_session::prelude::*;
//! ```

pub use crate::Error;
pub use crate::Result;

// Sessions
pub use crate::chat::{
    ChatSession, ChatSessionBuilder, ExchangePhase, ModerationPolicy, ReplyStream, SessionConfig,
    SessionOverrides,
};

// Transcript
pub use crate::session::{Message, Role, TrimPolicy};

// Backends
pub use crate::client::{
    CompletionBackend, GenerationParams, ModerationBackend, ModerationStage, OpenAiAdapter,
    RetryPolicy,
};

// Tokens
pub use crate::tokens::{Cl100kTokenizer, Tokenizer};
