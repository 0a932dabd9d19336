//! Tokenizer capability.

use std::fmt;

use tiktoken_rs::CoreBPE;

use crate::{Error, Result};

pub type TokenId = u32;

/// Turns text into model tokens.
///
/// Implementations must be shareable across sessions; the session owns an
/// `Arc<dyn Tokenizer>` rather than reaching for a process-wide singleton.
pub trait Tokenizer: Send + Sync + fmt::Debug {
    fn encode(&self, text: &str) -> Vec<TokenId>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// The `cl100k_base` byte-pair encoding used by the gpt-3.5 and gpt-4 families.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl fmt::Debug for Cl100kTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cl100kTokenizer").finish_non_exhaustive()
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.bpe
            .encode_with_special_tokens(text)
            .into_iter()
            .map(|token| token as TokenId)
            .collect()
    }
}
