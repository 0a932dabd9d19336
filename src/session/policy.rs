//! Transcript retention policy.

use serde::{Deserialize, Serialize};

/// How much history a session keeps between exchanges.
///
/// When both limits are enabled only the token limit is applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimPolicy {
    pub limit_by_token: bool,
    pub token_limit: usize,
    pub limit_by_message_count: bool,
    pub message_count_limit: usize,
    pub memorize_assistant_replies: bool,
}

impl Default for TrimPolicy {
    fn default() -> Self {
        Self {
            limit_by_token: false,
            token_limit: 0,
            limit_by_message_count: false,
            message_count_limit: 0,
            memorize_assistant_replies: true,
        }
    }
}

impl TrimPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn by_tokens(limit: usize) -> Self {
        Self::default().with_token_limit(limit)
    }

    pub fn by_messages(limit: usize) -> Self {
        Self::default().with_message_limit(limit)
    }

    pub fn with_token_limit(mut self, limit: usize) -> Self {
        self.limit_by_token = true;
        self.token_limit = limit;
        self
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.limit_by_message_count = true;
        self.message_count_limit = limit;
        self
    }

    pub fn with_memorize_assistant_replies(mut self, memorize: bool) -> Self {
        self.memorize_assistant_replies = memorize;
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.limit_by_token || self.limit_by_message_count
    }
}
