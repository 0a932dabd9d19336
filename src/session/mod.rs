//! Conversation transcript and retention policy.

mod ids;
mod message;
mod policy;
mod transcript;

pub use ids::SessionId;
pub use message::{Message, Role};
pub use policy::TrimPolicy;
pub use transcript::{CHARS_PER_TOKEN, Transcript, TrimReport};
