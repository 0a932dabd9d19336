//! Prompt/reply exchanges over a managed transcript.
//!
//! An exchange moves through [`ExchangePhase`]s: optional input moderation,
//! the remote call under the retry policy, optional output moderation
//! (blocking only), then the commit that stores the reply and bills the
//! transcript. Any failure ends the exchange without a commit.

mod builder;
mod config;
mod exchange;
mod phase;
mod session;
mod stream;

pub use builder::ChatSessionBuilder;
pub use config::{
    DEFAULT_API_TIMEOUT, DEFAULT_FORWARD_TIMEOUT, DEFAULT_STREAM_BUFFER, ModerationPolicy,
    SessionConfig, SessionOverrides,
};
pub use phase::ExchangePhase;
pub use session::ChatSession;
pub use stream::ReplyStream;
