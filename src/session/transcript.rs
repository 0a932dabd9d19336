//! Ordered conversation history with bounded retention.
//!
//! A transcript holds at most one system message, always at index 0, followed
//! by the conversation in the order it happened. Trimming only ever removes
//! the oldest non-system entries.

use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use super::policy::TrimPolicy;
use crate::models::ModelSpec;
use crate::tokens::Tokenizer;
use crate::{Error, Result};

/// Approximate Latin characters per token, used when shortening an
/// instruction that does not fit.
pub const CHARS_PER_TOKEN: usize = 3;

/// Messages removed by a single [`Transcript::trim`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub by_policy: usize,
    pub by_context: usize,
}

impl TrimReport {
    pub fn total(&self) -> usize {
        self.by_policy + self.by_context
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn instruction(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
    }

    /// Everything after the system message.
    pub fn conversation(&self) -> &[Message] {
        &self.messages[self.conversation_start()..]
    }

    fn conversation_start(&self) -> usize {
        usize::from(self.instruction().is_some())
    }

    /// Inserts the system message, or replaces it in place.
    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        let message = Message::system(instruction);
        match self.messages.first_mut() {
            Some(first) if first.is_system() => *first = message,
            _ => self.messages.insert(0, message),
        }
    }

    /// Sets the instruction only if it fits the model's instruction budget.
    pub fn set_instruction_checked(
        &mut self,
        instruction: impl Into<String>,
        spec: &ModelSpec,
        tokenizer: &dyn Tokenizer,
    ) -> Result<()> {
        let instruction = instruction.into();
        let tokens = tokenizer.count(&instruction);
        let max = spec.max_instruction_length();
        if tokens > max {
            return Err(Error::InstructionTooLong { tokens, max });
        }
        self.set_instruction(instruction);
        Ok(())
    }

    /// Sets the instruction, cutting its tail until it fits the model's
    /// instruction budget. Returns the token count of what was kept.
    pub fn set_instruction_truncated(
        &mut self,
        instruction: impl Into<String>,
        spec: &ModelSpec,
        tokenizer: &dyn Tokenizer,
    ) -> usize {
        let max = spec.max_instruction_length();
        let mut instruction = instruction.into();
        let mut tokens = tokenizer.count(&instruction);
        let original = tokens;

        while tokens > max {
            let excess_chars = ((tokens - max) * CHARS_PER_TOKEN).max(1);
            let keep = instruction.chars().count().saturating_sub(excess_chars);
            match instruction.char_indices().nth(keep) {
                Some((cut, _)) => instruction.truncate(cut),
                None => instruction.clear(),
            }
            tokens = tokenizer.count(&instruction);
        }

        if tokens < original {
            tracing::debug!(original, kept = tokens, max, "truncated instruction to fit model");
        }
        self.set_instruction(instruction);
        tokens
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    pub fn export(&self, include_system: bool) -> Vec<Message> {
        if include_system {
            self.messages.clone()
        } else {
            self.conversation().to_vec()
        }
    }

    /// Appends `history` and trims the result. A system message found in the
    /// imported history replaces the current instruction.
    pub fn import(
        &mut self,
        history: impl IntoIterator<Item = Message>,
        policy: &TrimPolicy,
        spec: &ModelSpec,
        tokenizer: &dyn Tokenizer,
    ) -> TrimReport {
        for message in history {
            match message.role {
                Role::System => self.set_instruction(message.content),
                Role::User | Role::Assistant => self.messages.push(message),
            }
        }
        self.trim(policy, spec, tokenizer)
    }

    /// Applies the retention policy, then forces the conversation under the
    /// model's context length regardless of the policy.
    pub fn trim(
        &mut self,
        policy: &TrimPolicy,
        spec: &ModelSpec,
        tokenizer: &dyn Tokenizer,
    ) -> TrimReport {
        let by_policy = if policy.limit_by_token {
            self.trim_to_token_limit(policy.token_limit, tokenizer)
        } else if policy.limit_by_message_count {
            self.trim_to_message_limit(policy.message_count_limit)
        } else {
            0
        };
        let by_context = self.trim_to_token_limit(spec.context_length, tokenizer);

        let report = TrimReport {
            by_policy,
            by_context,
        };
        if report.total() > 0 {
            tracing::debug!(
                by_policy,
                by_context,
                remaining = self.messages.len(),
                "trimmed transcript"
            );
        }
        report
    }

    /// Drops the oldest conversation messages until the serialized
    /// conversation fits `limit` tokens. A lone message that still exceeds the
    /// limit is dropped as well. Returns the number of removed messages.
    pub fn trim_to_token_limit(&mut self, limit: usize, tokenizer: &dyn Tokenizer) -> usize {
        let start = self.conversation_start();
        let mut removed = 0;

        while self.messages.len() > start {
            if self.conversation_tokens(tokenizer) <= limit {
                break;
            }
            self.messages.remove(start);
            removed += 1;
        }
        removed
    }

    /// Keeps the system message plus the `limit` most recent messages.
    pub fn trim_to_message_limit(&mut self, limit: usize) -> usize {
        let start = self.conversation_start();
        let surplus = (self.messages.len() - start).saturating_sub(limit);
        self.messages.drain(start..start + surplus);
        surplus
    }

    /// Token count of the canonical serialized form of the conversation,
    /// excluding the system message.
    pub fn conversation_tokens(&self, tokenizer: &dyn Tokenizer) -> usize {
        tokenizer.count(&canonical(self.conversation()))
    }
}

fn canonical(messages: &[Message]) -> String {
    serde_json::to_string(messages).unwrap_or_default()
}
