use serde::{Deserialize, Serialize};

/// Per-message framing cost used when billing a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageOverhead {
    pub tokens_per_message: usize,
    pub tokens_per_name: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Gpt35,
    Gpt4,
    Unknown,
}

impl ModelFamily {
    /// Overhead constants for the family, `None` when the family has no
    /// known accounting recipe.
    pub fn overhead(&self) -> Option<MessageOverhead> {
        match self {
            Self::Gpt35 | Self::Gpt4 => Some(MessageOverhead {
                tokens_per_message: 3,
                tokens_per_name: 1,
            }),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt35 => "gpt35",
            Self::Gpt4 => "gpt4",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_family_overhead() {
        let gpt35 = ModelFamily::Gpt35.overhead().unwrap();
        let gpt4 = ModelFamily::Gpt4.overhead().unwrap();

        assert_eq!(gpt35.tokens_per_message, 3);
        assert_eq!(gpt35.tokens_per_name, 1);
        assert_eq!(gpt35, gpt4);
    }

    #[test]
    fn test_unknown_family_has_no_overhead() {
        assert!(ModelFamily::Unknown.overhead().is_none());
    }
}
