//! The conversational session.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::builder::ChatSessionBuilder;
use super::config::{SessionConfig, SessionOverrides};
use super::exchange::{Exchange, lock};
use super::phase::{ExchangePhase, PhaseCell};
use super::stream::ReplyStream;
use crate::client::{CompletionBackend, ModerationBackend, RetryController};
use crate::models::{ModelRegistry, ModelSpec, registry};
use crate::session::{Message, SessionId, Transcript, TrimReport};
use crate::tokens::{ConsumptionCounter, TokenAccountant, Tokenizer};
use crate::{Error, Result};

/// A conversation with a remote chat model.
///
/// The session owns its transcript and consumption counter. Exchanges take
/// `&mut self`, so one session serves one caller at a time; use
/// [`ChatSession::clone_session`] to give each concurrent caller its own.
pub struct ChatSession {
    id: SessionId,
    config: SessionConfig,
    models: Option<Arc<ModelRegistry>>,
    backend: Arc<dyn CompletionBackend>,
    moderator: Option<Arc<dyn ModerationBackend>>,
    tokenizer: Arc<dyn Tokenizer>,
    transcript: Arc<Mutex<Transcript>>,
    accountant: TokenAccountant,
    retry: RetryController,
    phase: Arc<PhaseCell>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("model", &self.config.model)
            .field("backend", &self.backend.name())
            .field("phase", &self.phase.get())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    pub fn builder() -> ChatSessionBuilder {
        ChatSessionBuilder::new()
    }

    pub(crate) fn assemble(
        config: SessionConfig,
        models: Option<Arc<ModelRegistry>>,
        backend: Arc<dyn CompletionBackend>,
        moderator: Option<Arc<dyn ModerationBackend>>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        config.validate()?;
        models.as_deref().unwrap_or_else(|| registry()).lookup(&config.model)?;
        if config.moderation.is_enabled() && moderator.is_none() {
            return Err(Error::Config(
                "moderation is enabled but no moderation backend was supplied".into(),
            ));
        }

        let id = SessionId::new();
        tracing::debug!(session = %id, model = %config.model, backend = backend.name(), "created chat session");

        Ok(Self {
            id,
            retry: RetryController::new(config.retry),
            accountant: TokenAccountant::new(Arc::clone(&tokenizer)),
            config,
            models,
            backend,
            moderator,
            tokenizer,
            transcript: Arc::new(Mutex::new(Transcript::new())),
            phase: Arc::new(PhaseCell::default()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase.get()
    }

    /// The registry this session resolves its model in: the one given to
    /// the builder, or the builtin table.
    pub fn models(&self) -> &ModelRegistry {
        self.models.as_deref().unwrap_or_else(|| registry())
    }

    pub fn model_spec(&self) -> Result<ModelSpec> {
        self.models().lookup(&self.config.model).copied()
    }

    /// Sets the system instruction, failing with
    /// [`Error::InstructionTooLong`] if it exceeds the model's budget.
    pub fn set_instruction(&mut self, instruction: impl Into<String>) -> Result<()> {
        let spec = self.model_spec()?;
        lock(&self.transcript).set_instruction_checked(instruction, &spec, self.tokenizer.as_ref())
    }

    /// Sets the system instruction, cutting it down until it fits the
    /// model's budget. Returns the token count of the stored instruction.
    pub fn set_instruction_with_truncation(&mut self, instruction: impl Into<String>) -> Result<usize> {
        let spec = self.model_spec()?;
        Ok(lock(&self.transcript).set_instruction_truncated(
            instruction,
            &spec,
            self.tokenizer.as_ref(),
        ))
    }

    pub fn instruction(&self) -> Option<String> {
        lock(&self.transcript).instruction().map(str::to_owned)
    }

    /// Appends previously exported history, then trims it to the policy.
    pub fn import_history(&mut self, history: impl IntoIterator<Item = Message>) -> Result<TrimReport> {
        let spec = self.model_spec()?;
        Ok(lock(&self.transcript).import(history, &self.config.trim, &spec, self.tokenizer.as_ref()))
    }

    pub fn export_history(&self, include_system: bool) -> Vec<Message> {
        lock(&self.transcript).export(include_system)
    }

    pub fn total_consumed_tokens(&self) -> u64 {
        self.accountant.total()
    }

    /// Handle to the running token total, readable from any thread.
    pub fn consumption_counter(&self) -> Arc<ConsumptionCounter> {
        self.accountant.counter()
    }

    /// Sends `text` and waits for the full reply.
    ///
    /// A flagged input never reaches the transcript. A flagged reply is not
    /// committed, but the user message stays.
    pub async fn prompt(&mut self, text: impl Into<String>) -> Result<String> {
        let exchange = self.exchange()?;
        exchange.prompt(text.into()).await
    }

    /// Starts a streamed exchange and returns its chunks.
    ///
    /// Configuration errors are returned here; everything after that,
    /// including moderation rejections, arrives through the stream. Output
    /// moderation does not apply to streamed replies.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the exchange runs on
    /// a spawned task.
    pub fn prompt_stream(&mut self, text: impl Into<String>) -> Result<ReplyStream> {
        let exchange = self.exchange()?;
        let (tx, rx) = mpsc::channel(self.config.stream_buffer);
        tokio::spawn(exchange.stream(text.into(), tx));
        Ok(ReplyStream::new(self.id, rx))
    }

    /// A fresh session sharing this one's backends, tokenizer and settings,
    /// with an empty transcript and a zero counter.
    pub fn clone_session(&self) -> ChatSession {
        ChatSession {
            id: SessionId::new(),
            config: self.config.clone(),
            models: self.models.clone(),
            backend: Arc::clone(&self.backend),
            moderator: self.moderator.clone(),
            tokenizer: Arc::clone(&self.tokenizer),
            transcript: Arc::new(Mutex::new(Transcript::new())),
            accountant: TokenAccountant::new(Arc::clone(&self.tokenizer)),
            retry: RetryController::new(self.config.retry),
            phase: Arc::new(PhaseCell::default()),
        }
    }

    /// Like [`ChatSession::clone_session`], with some settings replaced.
    pub fn clone_with_overrides(&self, overrides: SessionOverrides) -> Result<ChatSession> {
        ChatSession::assemble(
            overrides.apply(self.config.clone()),
            self.models.clone(),
            Arc::clone(&self.backend),
            self.moderator.clone(),
            Arc::clone(&self.tokenizer),
        )
    }

    fn exchange(&self) -> Result<Exchange> {
        let spec = self.model_spec()?;
        self.phase.set(ExchangePhase::Idle);
        Ok(Exchange {
            session: self.id,
            spec,
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
            moderator: self.moderator.clone(),
            tokenizer: Arc::clone(&self.tokenizer),
            transcript: Arc::clone(&self.transcript),
            accountant: self.accountant.clone(),
            retry: self.retry.clone(),
            phase: Arc::clone(&self.phase),
        })
    }
}
