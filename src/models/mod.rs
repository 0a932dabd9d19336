//! Static registry of supported chat models and their context limits.

mod builtin;
mod family;
mod registry;
mod spec;

pub use builtin::BUILTIN_MODELS;
pub use family::{MessageOverhead, ModelFamily};
pub use registry::{ModelRegistry, registry};
pub use spec::{DEFAULT_COMPLETION_RESERVATION, INSTRUCTION_TOKEN_BUFFER, ModelSpec};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

