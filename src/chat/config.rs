//! Session configuration.

use std::time::Duration;

use crate::client::{GenerationParams, ModerationStage, RetryPolicy};
use crate::models::DEFAULT_MODEL;
use crate::session::TrimPolicy;
use crate::{Error, Result};

pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_STREAM_BUFFER: usize = 32;
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Which sides of an exchange go through the moderation backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModerationPolicy {
    pub input: bool,
    pub output: bool,
}

impl ModerationPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn input_only() -> Self {
        Self {
            input: true,
            output: false,
        }
    }

    pub fn both() -> Self {
        Self {
            input: true,
            output: true,
        }
    }

    pub fn applies_to(&self, stage: ModerationStage) -> bool {
        match stage {
            ModerationStage::Input => self.input,
            ModerationStage::Output => self.output,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.input || self.output
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    /// Bound on a single remote attempt. For streams it also bounds reading
    /// the whole reply.
    pub api_timeout: Duration,
    pub retry: RetryPolicy,
    pub trim: TrimPolicy,
    pub moderation: ModerationPolicy,
    pub params: GenerationParams,
    /// Capacity of the channel between the stream task and its consumer.
    pub stream_buffer: usize,
    /// How long a chunk forward may wait on a full channel before it is
    /// dropped. Dropped chunks are still committed.
    pub forward_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_timeout: DEFAULT_API_TIMEOUT,
            retry: RetryPolicy::default(),
            trim: TrimPolicy::default(),
            moderation: ModerationPolicy::default(),
            params: GenerationParams::default(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_trim(mut self, trim: TrimPolicy) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_moderation(mut self, moderation: ModerationPolicy) -> Self {
        self.moderation = moderation;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity;
        self
    }

    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".into()));
        }
        if self.api_timeout.is_zero() {
            return Err(Error::Config("api_timeout must be greater than zero".into()));
        }
        if self.stream_buffer == 0 {
            return Err(Error::Config("stream_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

/// Partial configuration applied on top of an existing session's settings.
/// Only the fields that are `Some` replace the source value.
#[derive(Debug, Clone, Default)]
pub struct SessionOverrides {
    pub model: Option<String>,
    pub api_timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    pub trim: Option<TrimPolicy>,
    pub moderation: Option<ModerationPolicy>,
    pub params: Option<GenerationParams>,
    pub stream_buffer: Option<usize>,
    pub forward_timeout: Option<Duration>,
}

impl SessionOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_trim(mut self, trim: TrimPolicy) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn with_moderation(mut self, moderation: ModerationPolicy) -> Self {
        self.moderation = Some(moderation);
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = Some(capacity);
        self
    }

    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = Some(timeout);
        self
    }

    pub fn apply(self, base: SessionConfig) -> SessionConfig {
        SessionConfig {
            model: self.model.unwrap_or(base.model),
            api_timeout: self.api_timeout.unwrap_or(base.api_timeout),
            retry: self.retry.unwrap_or(base.retry),
            trim: self.trim.unwrap_or(base.trim),
            moderation: self.moderation.unwrap_or(base.moderation),
            params: self.params.unwrap_or(base.params),
            stream_buffer: self.stream_buffer.unwrap_or(base.stream_buffer),
            forward_timeout: self.forward_timeout.unwrap_or(base.forward_timeout),
        }
    }
}
