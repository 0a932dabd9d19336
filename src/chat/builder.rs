//! ChatSession construction.

use std::sync::Arc;
use std::time::Duration;

use super::config::{ModerationPolicy, SessionConfig};
use super::session::ChatSession;
use crate::client::{CompletionBackend, GenerationParams, ModerationBackend, RetryPolicy};
use crate::models::ModelRegistry;
use crate::session::TrimPolicy;
use crate::tokens::{Cl100kTokenizer, Tokenizer};
use crate::{Error, Result};

#[derive(Default)]
pub struct ChatSessionBuilder {
    config: SessionConfig,
    models: Option<Arc<ModelRegistry>>,
    backend: Option<Arc<dyn CompletionBackend>>,
    moderator: Option<Arc<dyn ModerationBackend>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
}

impl ChatSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn moderator(mut self, moderator: Arc<dyn ModerationBackend>) -> Self {
        self.moderator = Some(moderator);
        self
    }

    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Resolves the model in `models` instead of the builtin registry.
    pub fn models(mut self, models: Arc<ModelRegistry>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn trim(mut self, policy: TrimPolicy) -> Self {
        self.config.trim = policy;
        self
    }

    pub fn moderation(mut self, policy: ModerationPolicy) -> Self {
        self.config.moderation = policy;
        self
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.config.params = params;
        self
    }

    pub fn build(self) -> Result<ChatSession> {
        let backend = self
            .backend
            .ok_or_else(|| Error::Config("a completion backend is required".into()))?;
        let tokenizer: Arc<dyn Tokenizer> = match self.tokenizer {
            Some(tokenizer) => tokenizer,
            None => Arc::new(Cl100kTokenizer::new()?),
        };
        ChatSession::assemble(self.config, self.models, backend, self.moderator, tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelFamily, ModelSpec};
    use crate::testing::{ScriptedBackend, ScriptedModerator, WordTokenizer};

    fn scripted() -> ChatSessionBuilder {
        ChatSessionBuilder::new()
            .backend(Arc::new(ScriptedBackend::new()))
            .tokenizer(Arc::new(WordTokenizer))
    }

    #[test]
    fn test_missing_backend_is_config_error() {
        let err = ChatSessionBuilder::new()
            .tokenizer(Arc::new(WordTokenizer))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let err = scripted().model("gpt-5-imaginary").build().unwrap_err();
        assert!(matches!(err, Error::ModelNotFound { ref model } if model == "gpt-5-imaginary"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_moderation_requires_backend() {
        let err = scripted()
            .moderation(ModerationPolicy::input_only())
            .build()
            .unwrap_err();
        assert!(err.is_configuration_error());

        let session = scripted()
            .moderation(ModerationPolicy::input_only())
            .moderator(Arc::new(ScriptedModerator::allow_all()))
            .build();
        assert!(session.is_ok());
    }

    #[test]
    fn test_builder_settings_reach_config() {
        let session = scripted()
            .model("GPT-4")
            .retry(RetryPolicy::new(2, Duration::from_millis(10)))
            .trim(TrimPolicy::by_messages(4))
            .build()
            .unwrap();

        assert_eq!(session.config().model, "GPT-4");
        assert_eq!(session.config().retry.max_retries, 2);
        assert_eq!(session.config().trim.message_count_limit, 4);
        assert_eq!(session.model_spec().unwrap().name, "gpt-4");
    }

    #[test]
    fn test_custom_registry_backs_the_session() {
        let mut models = ModelRegistry::new();
        models.register(ModelSpec::new("local-7b", 4096, ModelFamily::Unknown));
        let models = Arc::new(models);

        let session = scripted()
            .models(Arc::clone(&models))
            .model("Local-7B")
            .build()
            .unwrap();
        assert_eq!(session.model_spec().unwrap().context_length, 4096);

        let err = scripted().models(models).model("gpt-4").build().unwrap_err();
        assert!(matches!(err, Error::ModelNotFound { .. }));
    }

    #[test]
    fn test_default_tokenizer() {
        let session = ChatSessionBuilder::new()
            .backend(Arc::new(ScriptedBackend::new()))
            .build();
        assert!(session.is_ok());
    }
}
