//! Server-sent-event parsing for streamed chat completions.

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::{Error, Result};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChunkEvent {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

enum Block {
    Text(String),
    Done,
    Skip,
}

pin_project! {
    /// Turns a raw SSE byte stream into the text deltas of the first choice.
    ///
    /// Events are separated by a blank line. The stream ends at `data: [DONE]`
    /// or when the body closes, whichever comes first.
    pub struct SseChunkParser<S> {
        #[pin]
        inner: S,
        buffer: Vec<u8>,
        pos: usize,
        done: bool,
    }
}

impl<S> SseChunkParser<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>>,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(4096),
            pos: 0,
            done: false,
        }
    }

    #[inline]
    fn find_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
        let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
        let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    fn data_payload(event_block: &str) -> Option<&str> {
        event_block.lines().find_map(|line| {
            line.trim()
                .strip_prefix("data:")
                .map(str::trim)
                .filter(|data| !data.is_empty())
        })
    }

    fn parse_block(event_block: &str) -> Result<Block> {
        let trimmed = event_block.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') {
            return Ok(Block::Skip);
        }
        let Some(data) = Self::data_payload(trimmed) else {
            return Ok(Block::Skip);
        };
        if data == DONE_MARKER {
            return Ok(Block::Done);
        }
        if let Ok(event) = serde_json::from_str::<ErrorEvent>(data) {
            return Err(Error::Stream(event.error.message));
        }

        let event: ChunkEvent = serde_json::from_str(data)
            .map_err(|e| Error::Stream(format!("malformed chunk: {e}")))?;
        let text = event
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty());
        Ok(text.map_or(Block::Skip, Block::Text))
    }
}

impl<S> Stream for SseChunkParser<S>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>>,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            if let Some((rel_pos, delimiter_len)) = Self::find_delimiter(&this.buffer[*this.pos..]) {
                let start_pos = *this.pos;
                let end_pos = start_pos + rel_pos;
                let parsed = match std::str::from_utf8(&this.buffer[start_pos..end_pos]) {
                    Ok(block) => Self::parse_block(block),
                    Err(e) => Err(Error::Stream(format!("invalid UTF-8 in event: {e}"))),
                };
                *this.pos = end_pos + delimiter_len;

                if this.buffer.len() > 8192 && *this.pos > this.buffer.len() / 2 {
                    this.buffer.drain(..*this.pos);
                    *this.pos = 0;
                }

                match parsed {
                    Ok(Block::Text(text)) => return Poll::Ready(Some(Ok(text))),
                    Ok(Block::Done) => {
                        *this.done = true;
                        return Poll::Ready(None);
                    }
                    Ok(Block::Skip) => continue,
                    Err(e) => {
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if *this.pos > 0 && this.buffer.len() + bytes.len() > 16384 {
                        this.buffer.drain(..*this.pos);
                        *this.pos = 0;
                    }
                    this.buffer.extend_from_slice(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(Error::Stream(e.to_string()))));
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    let remaining = &this.buffer[*this.pos..];
                    if remaining.is_empty() {
                        return Poll::Ready(None);
                    }
                    let Ok(block) = std::str::from_utf8(remaining) else {
                        return Poll::Ready(None);
                    };
                    return match Self::parse_block(block) {
                        Ok(Block::Text(text)) => Poll::Ready(Some(Ok(text))),
                        Ok(Block::Done | Block::Skip) => Poll::Ready(None),
                        Err(e) => Poll::Ready(Some(Err(e))),
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, stream};

    fn delta(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n")
    }

    async fn collect(parts: Vec<String>) -> Vec<Result<String>> {
        let body = stream::iter(parts.into_iter().map(|p| Ok::<_, reqwest::Error>(Bytes::from(p))));
        SseChunkParser::new(body).collect().await
    }

    #[tokio::test]
    async fn test_yields_deltas_until_done() {
        let items = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n".into(),
            delta("Hel"),
            delta("lo"),
            "data: [DONE]\n\n".into(),
            delta("ignored"),
        ])
        .await;

        let texts: Vec<_> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_event_split_across_reads() {
        let event = delta("split");
        let (a, b) = event.split_at(10);
        let items = collect(vec![a.into(), b.into()]).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "split");
    }

    #[tokio::test]
    async fn test_comments_and_crlf_are_handled() {
        let items = collect(vec![
            ": keep-alive\n\n".into(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n".into(),
        ])
        .await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "a");
    }

    #[tokio::test]
    async fn test_error_payload_ends_stream() {
        let items = collect(vec![
            delta("Hel"),
            "data: {\"error\":{\"message\":\"overloaded\",\"type\":\"server_error\"}}\n\n".into(),
            delta("never"),
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Err(Error::Stream(m)) if m == "overloaded"));
    }

    #[tokio::test]
    async fn test_trailing_event_without_delimiter() {
        let items = collect(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}".into()]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "tail");
    }
}
