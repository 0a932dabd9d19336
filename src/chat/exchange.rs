//! One prompt/reply exchange, shared by the blocking and streaming paths.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

use super::config::SessionConfig;
use super::phase::{ExchangePhase, PhaseCell};
use crate::client::{ChatRequest, CompletionBackend, ModerationBackend, ModerationStage, RetryController};
use crate::models::ModelSpec;
use crate::session::{SessionId, Transcript};
use crate::tokens::{TokenAccountant, Tokenizer};
use crate::{Error, Result};

pub(crate) fn lock(transcript: &Mutex<Transcript>) -> MutexGuard<'_, Transcript> {
    transcript.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything an exchange needs, owned so it can move into a stream task.
pub(crate) struct Exchange {
    pub(crate) session: SessionId,
    pub(crate) spec: ModelSpec,
    pub(crate) config: SessionConfig,
    pub(crate) backend: Arc<dyn CompletionBackend>,
    pub(crate) moderator: Option<Arc<dyn ModerationBackend>>,
    pub(crate) tokenizer: Arc<dyn Tokenizer>,
    pub(crate) transcript: Arc<Mutex<Transcript>>,
    pub(crate) accountant: TokenAccountant,
    pub(crate) retry: RetryController,
    pub(crate) phase: Arc<PhaseCell>,
}

impl Exchange {
    pub(crate) async fn prompt(&self, text: String) -> Result<String> {
        let result = self.run_prompt(text).await;
        if result.is_err() {
            self.phase.set(ExchangePhase::Failed);
        }
        result
    }

    async fn run_prompt(&self, text: String) -> Result<String> {
        self.moderate(&text, ModerationStage::Input).await?;
        let request = self.stage_user_message(text);

        let reply = self
            .call(&request, |backend, request| async move { backend.complete(request).await })
            .await?;

        self.moderate(&reply, ModerationStage::Output).await?;
        self.commit(&reply);
        Ok(reply)
    }

    /// Drives a streamed exchange to completion, forwarding chunks to `tx`.
    /// The commit happens before `tx` is dropped, so a consumer that sees the
    /// end of the stream also sees the updated transcript.
    pub(crate) async fn stream(self, text: String, tx: mpsc::Sender<Result<String>>) {
        if let Err(e) = self.run_stream(text, &tx).await {
            self.phase.set(ExchangePhase::Failed);
            tracing::warn!(session = %self.session, error = %e, "streamed exchange failed");
            let _ = tx.send(Err(e)).await;
        }
    }

    async fn run_stream(&self, text: String, tx: &mpsc::Sender<Result<String>>) -> Result<()> {
        self.moderate(&text, ModerationStage::Input).await?;
        let request = self.stage_user_message(text).streaming();

        let mut chunks = self
            .call(&request, |backend, request| async move {
                backend.complete_stream(request).await
            })
            .await?;

        let timeout = self.config.api_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        let mut reply = String::new();
        let mut dropped = 0usize;
        let mut consumer_gone = false;

        loop {
            let next = tokio::time::timeout_at(deadline, chunks.next())
                .await
                .map_err(|_| Error::Timeout(timeout))?;
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            reply.push_str(&chunk);
            if consumer_gone {
                continue;
            }
            match tx.send_timeout(Ok(chunk), self.config.forward_timeout).await {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => {
                    dropped += 1;
                    tracing::warn!(
                        session = %self.session,
                        dropped,
                        "consumer is not keeping up, dropped a chunk forward"
                    );
                }
                Err(SendTimeoutError::Closed(_)) => {
                    consumer_gone = true;
                    tracing::debug!(session = %self.session, "consumer went away, draining stream");
                }
            }
        }

        self.commit(&reply);
        Ok(())
    }

    async fn moderate(&self, text: &str, stage: ModerationStage) -> Result<()> {
        if !self.config.moderation.applies_to(stage) {
            return Ok(());
        }
        let moderator = self.moderator.as_ref().ok_or_else(|| {
            Error::Config(format!("{stage} moderation is enabled without a moderation backend"))
        })?;

        self.phase.set(match stage {
            ModerationStage::Input => ExchangePhase::ModeratingInput,
            ModerationStage::Output => ExchangePhase::ModeratingOutput,
        });
        let verdict = moderator.moderate(text).await?;
        if verdict.flagged {
            tracing::info!(
                session = %self.session,
                stage = %stage,
                categories = ?verdict.categories,
                "moderation flagged the exchange"
            );
            return Err(Error::ModerationRejected { stage });
        }
        Ok(())
    }

    /// Appends the user message, trims, and snapshots the request.
    fn stage_user_message(&self, text: String) -> ChatRequest {
        let mut transcript = lock(&self.transcript);
        transcript.push_user(text);
        transcript.trim(&self.config.trim, &self.spec, self.tokenizer.as_ref());

        ChatRequest::new(self.spec.name, transcript.export(true)).with_params(self.config.params.clone())
    }

    /// Runs one remote call under the retry policy, bounding every attempt
    /// by the API timeout.
    async fn call<T, F, Fut>(&self, request: &ChatRequest, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn CompletionBackend>, ChatRequest) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.config.api_timeout;
        let attempts = AtomicU32::new(0);
        let max_attempts = self.retry.policy().max_attempts();

        self.retry
            .execute_when(
                || {
                    let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    self.phase.set(if attempt == 1 {
                        ExchangePhase::Sending
                    } else {
                        ExchangePhase::Retrying
                    });
                    let pending = call(Arc::clone(&self.backend), request.clone());

                    async move {
                        let result = tokio::time::timeout(timeout, pending)
                            .await
                            .unwrap_or(Err(Error::Timeout(timeout)));
                        if let Err(e) = &result {
                            tracing::warn!(
                                session = %self.session,
                                backend = self.backend.name(),
                                attempt,
                                max_attempts,
                                retryable = e.is_retryable(),
                                error = %e,
                                "completion attempt failed"
                            );
                        }
                        result
                    }
                },
                Error::is_retryable,
            )
            .await
    }

    /// Stores a non-empty reply and bills the resulting transcript.
    fn commit(&self, reply: &str) {
        self.phase.set(ExchangePhase::Committed);
        if reply.is_empty() {
            tracing::debug!(session = %self.session, "empty reply, nothing to commit");
            return;
        }

        let mut transcript = lock(&self.transcript);
        if self.config.trim.memorize_assistant_replies {
            transcript.push_assistant(reply);
        }
        let billed = self.accountant.bill(transcript.messages(), self.spec.family);
        tracing::debug!(
            session = %self.session,
            billed = ?billed,
            total = self.accountant.total(),
            "committed reply"
        );
    }
}
