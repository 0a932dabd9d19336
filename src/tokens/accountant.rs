//! Token accounting for completed exchanges.
//!
//! Each exchange re-bills the whole transcript following the published
//! chat-format recipe: every message pays a fixed framing cost plus the tokens
//! of its content, role and name, and every reply is primed with three more.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::tokenizer::Tokenizer;
use crate::models::ModelFamily;
use crate::session::Message;

/// Tokens spent priming the assistant reply (`<|start|>assistant<|message|>`).
pub const REPLY_PRIMING_TOKENS: usize = 3;

/// Running total of billed tokens. Updates are atomic read-modify-writes, so
/// any thread may read it while an exchange is in flight.
#[derive(Debug, Default)]
pub struct ConsumptionCounter {
    total: AtomicU64,
}

impl ConsumptionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub(crate) fn add(&self, tokens: u64) -> u64 {
        self.total.fetch_add(tokens, Ordering::AcqRel) + tokens
    }
}

#[derive(Debug, Clone)]
pub struct TokenAccountant {
    tokenizer: Arc<dyn Tokenizer>,
    counter: Arc<ConsumptionCounter>,
}

impl TokenAccountant {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            tokenizer,
            counter: Arc::new(ConsumptionCounter::new()),
        }
    }

    /// Token cost of `messages` for `family`, `None` when the family has no
    /// accounting recipe.
    pub fn cost(&self, messages: &[Message], family: ModelFamily) -> Option<usize> {
        let overhead = family.overhead()?;

        let mut tokens = 0;
        for message in messages {
            tokens += overhead.tokens_per_message;
            tokens += self.tokenizer.count(&message.content);
            tokens += self.tokenizer.count(message.role.as_str());
            if let Some(name) = message.name.as_deref().filter(|n| !n.is_empty()) {
                tokens += self.tokenizer.count(name);
                tokens += overhead.tokens_per_name;
            }
        }
        Some(tokens + REPLY_PRIMING_TOKENS)
    }

    /// Adds the cost of `messages` to the running total and returns the billed
    /// amount. Unknown families are skipped with a warning.
    pub fn bill(&self, messages: &[Message], family: ModelFamily) -> Option<usize> {
        let Some(tokens) = self.cost(messages, family) else {
            tracing::warn!(
                family = %family,
                "token accounting is not implemented for this model family, skipping billing"
            );
            return None;
        };

        let total = self.counter.add(tokens as u64);
        tracing::debug!(billed = tokens, total, "billed transcript tokens");
        Some(tokens)
    }

    pub fn total(&self) -> u64 {
        self.counter.total()
    }

    pub fn counter(&self) -> Arc<ConsumptionCounter> {
        Arc::clone(&self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WordTokenizer;

    fn accountant() -> TokenAccountant {
        TokenAccountant::new(Arc::new(WordTokenizer))
    }

    #[test]
    fn test_cost_system_and_user() {
        let tokenizer = WordTokenizer;
        let messages = vec![
            Message::system("be brief"),
            Message::user("what is rust"),
        ];

        let expected = 3
            + tokenizer.count("be brief")
            + tokenizer.count("system")
            + 3
            + tokenizer.count("what is rust")
            + tokenizer.count("user")
            + 3;
        assert_eq!(accountant().cost(&messages, ModelFamily::Gpt35), Some(expected));
        assert_eq!(expected, 3 + 2 + 1 + 3 + 3 + 1 + 3);
    }

    #[test]
    fn test_cost_counts_names() {
        let messages = vec![Message::user("hi").with_name("alice")];
        // 3 + "hi" + "user" + "alice" + 1 name overhead + 3 priming
        assert_eq!(accountant().cost(&messages, ModelFamily::Gpt4), Some(10));

        let unnamed = vec![Message::user("hi").with_name("")];
        assert_eq!(accountant().cost(&unnamed, ModelFamily::Gpt4), Some(8));
    }

    #[test]
    fn test_bill_accumulates() {
        let accountant = accountant();
        let messages = vec![Message::user("one two")];

        assert_eq!(accountant.bill(&messages, ModelFamily::Gpt35), Some(9));
        assert_eq!(accountant.bill(&messages, ModelFamily::Gpt35), Some(9));
        assert_eq!(accountant.total(), 18);
    }

    #[test]
    fn test_unknown_family_is_skipped() {
        let accountant = accountant();
        let messages = vec![Message::user("hello")];

        assert_eq!(accountant.bill(&messages, ModelFamily::Unknown), None);
        assert_eq!(accountant.total(), 0);
    }

    #[test]
    fn test_counter_is_shared_across_threads() {
        let accountant = accountant();
        let counter = accountant.counter();
        let messages = vec![Message::user("x")];

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        accountant.bill(&messages, ModelFamily::Gpt35);
                    }
                });
            }
        });

        // 3 + 1 + 1 + 3 per bill
        assert_eq!(counter.total(), 100 * 8);
    }

    #[test]
    fn test_empty_transcript_costs_priming_only() {
        assert_eq!(accountant().cost(&[], ModelFamily::Gpt35), Some(3));
    }
}
