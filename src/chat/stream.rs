//! Consumer side of a streamed reply.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::Result;
use crate::session::SessionId;

/// Chunks of a streamed reply as they arrive.
///
/// The stream ends after the final chunk, or after a single `Err` when the
/// exchange failed. By the time it ends, the session transcript already
/// holds the committed reply. Dropping it early does not cancel the
/// exchange: the reply is still read to the end and committed.
#[derive(Debug)]
pub struct ReplyStream {
    session: SessionId,
    rx: mpsc::Receiver<Result<String>>,
}

impl ReplyStream {
    pub(crate) fn new(session: SessionId, rx: mpsc::Receiver<Result<String>>) -> Self {
        Self { session, rx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Concatenates every forwarded chunk, stopping at the first error.
    ///
    /// Chunks dropped under backpressure are missing from the result but not
    /// from the transcript.
    pub async fn into_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

impl Stream for ReplyStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
