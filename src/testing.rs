//! Deterministic stand-ins for the tokenizer, completion and moderation
//! capabilities, so sessions can be driven without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::client::{ChatRequest, ChunkStream, CompletionBackend, ModerationBackend, ModerationVerdict};
use crate::tokens::{TokenId, Tokenizer};
use crate::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts every maximal run of alphanumeric characters as one token.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl WordTokenizer {
    fn words(text: &str) -> impl Iterator<Item = &str> {
        text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
    }
}

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        Self::words(text)
            .map(|w| w.chars().fold(0u32, |acc, c| acc.wrapping_mul(31).wrapping_add(c as u32)))
            .collect()
    }

    fn count(&self, text: &str) -> usize {
        Self::words(text).count()
    }
}

/// One element of a scripted stream.
#[derive(Debug)]
pub enum ScriptedChunk {
    Text(String),
    Fail(Error),
    /// The stream stays pending from here on; later chunks are never sent.
    Stall,
}

#[derive(Debug)]
enum Step {
    Reply(String),
    Fail(Error),
    Stream(Vec<ScriptedChunk>),
    Hang,
}

/// Completion backend that replays queued steps in order, one per call.
///
/// A call made after the script runs out fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, step: Step) -> &Self {
        lock(&self.steps).push_back(step);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) -> &Self {
        self.push(Step::Reply(text.into()))
    }

    pub fn push_failure(&self, error: Error) -> &Self {
        self.push(Step::Fail(error))
    }

    pub fn push_stream(&self, chunks: impl IntoIterator<Item = ScriptedChunk>) -> &Self {
        self.push(Step::Stream(chunks.into_iter().collect()))
    }

    /// Queues a call that never completes, for timeout tests.
    pub fn push_hang(&self) -> &Self {
        self.push(Step::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        lock(&self.requests).last().cloned()
    }

    fn next_step(&self, request: ChatRequest) -> Step {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request);
        lock(&self.steps)
            .pop_front()
            .unwrap_or_else(|| Step::Fail(Error::Transport("scripted backend exhausted".into())))
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        match self.next_step(request) {
            Step::Reply(text) => Ok(text),
            Step::Fail(error) => Err(error),
            Step::Stream(chunks) => {
                let mut reply = String::new();
                for chunk in chunks {
                    match chunk {
                        ScriptedChunk::Text(text) => reply.push_str(&text),
                        ScriptedChunk::Fail(error) => return Err(error),
                        ScriptedChunk::Stall => std::future::pending::<()>().await,
                    }
                }
                Ok(reply)
            }
            Step::Hang => std::future::pending().await,
        }
    }

    async fn complete_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        let chunks = match self.next_step(request) {
            Step::Reply(text) => vec![ScriptedChunk::Text(text)],
            Step::Stream(chunks) => chunks,
            Step::Fail(error) => return Err(error),
            Step::Hang => std::future::pending().await,
        };
        let mut items = Vec::new();
        let mut stalls = false;
        for chunk in chunks {
            match chunk {
                ScriptedChunk::Text(text) => items.push(Ok(text)),
                ScriptedChunk::Fail(error) => items.push(Err(error)),
                ScriptedChunk::Stall => {
                    stalls = true;
                    break;
                }
            }
        }
        if stalls {
            Ok(Box::pin(stream::iter(items).chain(stream::pending())))
        } else {
            Ok(Box::pin(stream::iter(items)))
        }
    }
}

/// Moderation backend that flags any text containing one of its terms, or
/// fails every call when built with [`ScriptedModerator::failing`].
#[derive(Debug, Default)]
pub struct ScriptedModerator {
    terms: Vec<String>,
    fail: bool,
    seen: Mutex<Vec<String>>,
}

impl ScriptedModerator {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn flagging(terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every text submitted so far, in order.
    pub fn seen(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl ModerationBackend for ScriptedModerator {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        lock(&self.seen).push(text.to_string());
        if self.fail {
            return Err(Error::Moderation("moderation service unavailable".into()));
        }

        let hits: Vec<&String> = self.terms.iter().filter(|t| text.contains(t.as_str())).collect();
        Ok(if hits.is_empty() {
            ModerationVerdict::clean()
        } else {
            ModerationVerdict::flagged(hits)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;
    use futures::StreamExt;

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4", vec![Message::user("hi")])
    }

    #[test]
    fn test_word_tokenizer_counts_alphanumeric_runs() {
        assert_eq!(WordTokenizer.count("hello, world!"), 2);
        assert_eq!(WordTokenizer.count("{\"role\":\"user\"}"), 2);
        assert_eq!(WordTokenizer.count(""), 0);
        assert_eq!(WordTokenizer.encode("a b c").len(), 3);
    }

    #[tokio::test]
    async fn test_backend_replays_in_order() {
        let backend = ScriptedBackend::new();
        backend
            .push_failure(Error::Transport("down".into()))
            .push_reply("ok");

        assert!(backend.complete(request()).await.is_err());
        assert_eq!(backend.complete(request()).await.unwrap(), "ok");
        assert!(backend.complete(request()).await.is_err());
        assert_eq!(backend.calls(), 3);
        assert_eq!(backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_backend_streams_scripted_chunks() {
        let backend = ScriptedBackend::new();
        backend.push_stream([
            ScriptedChunk::Text("Hel".into()),
            ScriptedChunk::Fail(Error::Stream("reset".into())),
        ]);

        let items: Vec<_> = backend.complete_stream(request()).await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Hel");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_moderator_flags_terms() {
        let moderator = ScriptedModerator::flagging(["forbidden"]);
        assert!(moderator.moderate("a forbidden word").await.unwrap().flagged);
        assert!(!moderator.moderate("harmless").await.unwrap().flagged);
        assert_eq!(moderator.seen().len(), 2);

        assert!(ScriptedModerator::failing().moderate("x").await.is_err());
    }
}
