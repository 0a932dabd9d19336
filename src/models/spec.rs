use serde::Serialize;

use super::family::ModelFamily;

/// Tokens held back from the context window for request framing when sizing
/// the system instruction.
pub const INSTRUCTION_TOKEN_BUFFER: usize = 100;

/// Completion budget shared by every builtin model.
pub const DEFAULT_COMPLETION_RESERVATION: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub name: &'static str,
    pub context_length: usize,
    pub completion_reservation: usize,
    pub family: ModelFamily,
}

impl ModelSpec {
    pub const fn new(name: &'static str, context_length: usize, family: ModelFamily) -> Self {
        Self {
            name,
            context_length,
            completion_reservation: DEFAULT_COMPLETION_RESERVATION,
            family,
        }
    }

    pub const fn with_completion_reservation(mut self, tokens: usize) -> Self {
        self.completion_reservation = tokens;
        self
    }

    pub fn max_instruction_length(&self) -> usize {
        self.context_length.saturating_sub(INSTRUCTION_TOKEN_BUFFER)
    }
}
