//! Server-Sent Events decoding over a byte stream.

use crate::Error;
use futures_util::{Stream, StreamExt};
use memchr::memchr;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Largest pending event we are willing to buffer, decoded fields and raw bytes combined.
const MAX_BUFFER_BYTES: usize = 1_000_000;

/// A Server-Sent Events (SSE) event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if present.
    pub event_type: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    pub id: Option<String>,
    /// Reconnection delay in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// The event type, defaulting to `message` as the SSE format prescribes.
    pub fn event_type_or_default(&self) -> &str {
        self.event_type
            .as_deref()
            .unwrap_or(crate::sink::DEFAULT_EVENT_TYPE)
    }
}

/// Fields collected for the event currently being read.
#[derive(Default)]
struct PendingEvent {
    event_type: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<u64>,
    /// Bytes held by the text fields above.
    size: usize,
}

impl PendingEvent {
    fn is_empty(&self) -> bool {
        self.event_type.is_none() && self.data.is_empty() && self.id.is_none() && self.retry.is_none()
    }

    /// Dispatch the pending fields. Blocks without data produce no event.
    fn take(&mut self) -> Option<SseEvent> {
        let pending = std::mem::take(self);
        if pending.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event_type: pending.event_type,
            data: pending.data.join("\n"),
            id: pending.id,
            retry: pending.retry,
        })
    }

    fn apply(&mut self, line: &str) {
        // Comment line.
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.size += value.len();
                self.event_type = Some(value.to_string());
            }
            "data" => {
                self.size += value.len() + 1;
                self.data.push(value.to_string());
            }
            "id" => {
                self.size += value.len();
                self.id = Some(value.to_string());
            }
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.retry = Some(retry);
                }
            }
            _ => {}
        }
    }
}

fn decode_line(raw: &[u8]) -> Result<&str, Error> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    std::str::from_utf8(raw)
        .map_err(|e| Error::streaming(format!("Invalid UTF-8 in SSE event: {e}")))
}

/// Incremental line-oriented SSE decoder.
///
/// Bytes may be fed in arbitrary chunks; multi-byte characters and lines split
/// across chunks are reassembled before decoding. Completed events queue up
/// until taken with [`SseDecoder::next_event`].
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: PendingEvent,
    ready: VecDeque<SseEvent>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes.
    ///
    /// Events completed before an undecodable line stay queued.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.buffer.extend_from_slice(chunk);

        let mut start = 0;
        let mut result = Ok(());
        while let Some(offset) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + offset;
            let line = decode_line(&self.buffer[start..end]);
            start = end + 1;
            match line {
                Ok("") => self.ready.extend(self.pending.take()),
                Ok(line) => self.pending.apply(line),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.buffer.drain(..start);
        result?;

        if self.buffer.len() + self.pending.size > MAX_BUFFER_BYTES {
            self.buffer.clear();
            self.pending = PendingEvent::default();
            return Err(Error::streaming("SSE buffer exceeded maximum size"));
        }
        Ok(())
    }

    /// Flush whatever remains once the byte stream has ended.
    ///
    /// A final event not followed by a blank line is still delivered.
    pub fn finish(&mut self) -> Result<(), Error> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            let line = decode_line(&rest)?;
            if !line.is_empty() {
                self.pending.apply(line);
            }
        }
        if !self.pending.is_empty() {
            self.ready.extend(self.pending.take());
        }
        Ok(())
    }

    pub fn next_event(&mut self) -> Option<SseEvent> {
        self.ready.pop_front()
    }
}

/// A stream adapter yielding [`SseEvent`]s from a byte stream.
///
/// The first decoding or transport error is yielded after every event that
/// preceded it, and ends the stream.
pub struct SseStream<S> {
    inner: S,
    decoder: SseDecoder,
    error: Option<Error>,
    finished: bool,
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            decoder: SseDecoder::new(),
            error: None,
            finished: false,
        }
    }
}

impl<S, B, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<Error>,
{
    type Item = Result<SseEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.decoder.next_event() {
                return Poll::Ready(Some(Ok(event)));
            }
            if let Some(error) = self.error.take() {
                return Poll::Ready(Some(Err(error)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            let outcome = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => self.decoder.push(chunk.as_ref()),
                Some(Err(e)) => Err(e.into()),
                None => {
                    self.finished = true;
                    self.decoder.finish()
                }
            };
            if let Err(e) = outcome {
                self.error = Some(e);
                self.finished = true;
            }
        }
    }
}

/// Extension trait to add SSE parsing to byte streams.
pub trait SseStreamExt: Stream {
    fn sse_events(self) -> SseStream<Self>
    where
        Self: Sized,
    {
        SseStream::new(self)
    }
}

impl<S: Stream> SseStreamExt for S {}
