mod accountant;
mod tokenizer;

pub use accountant::{ConsumptionCounter, REPLY_PRIMING_TOKENS, TokenAccountant};
pub use tokenizer::{Cl100kTokenizer, TokenId, Tokenizer};
