//! The consumer side of a dispatch: event sinks and the event vocabulary.

use crate::Error;
use tokio::sync::mpsc;

/// Marker attached to the single data event of a non-streaming completion.
pub const DATA_MARKER: &str = "[DATA]";

/// Marker attached to the terminal event of a non-streaming completion.
pub const DONE_MARKER: &str = "[DONE]";

/// Marker used for streamed events that carry no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Snapshot of the raw response a failure was observed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResponse {
    pub status: u16,
    /// The response body, when it could be read.
    pub body: Option<String>,
}

/// Receives the lifecycle events of a dispatch.
///
/// Events of a single dispatch are delivered in order and never concurrently,
/// but they may arrive on a different thread than the one that called dispatch.
pub trait EventSink: Send + Sync {
    /// A chunk of answer data.
    fn on_data(&self, marker: &str, payload: &str);

    /// The answer is complete. Only sent on the non-streaming path.
    fn on_done(&self, marker: &str);

    /// The dispatch failed. No further events follow.
    fn on_failure(&self, error: Error, response: Option<FailedResponse>);

    /// The event stream was established. Streaming path only.
    fn on_open(&self) {}

    /// The transport closed the event stream cleanly. Streaming path only.
    fn on_closed(&self) {}
}

/// An owned copy of one sink callback.
#[derive(Debug)]
pub enum SinkEvent {
    Open,
    Data { marker: String, payload: String },
    Done { marker: String },
    Failure {
        error: Error,
        response: Option<FailedResponse>,
    },
    Closed,
}

/// Re-emits every callback as a [`SinkEvent`] on an unbounded channel.
///
/// The receiver yields `None` once every clone of the sink has been dropped,
/// which happens when the dispatch that owns it has finished.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SinkEvent) {
        // Receiver gone means the caller stopped listening.
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_data(&self, marker: &str, payload: &str) {
        self.send(SinkEvent::Data {
            marker: marker.to_string(),
            payload: payload.to_string(),
        });
    }

    fn on_done(&self, marker: &str) {
        self.send(SinkEvent::Done {
            marker: marker.to_string(),
        });
    }

    fn on_failure(&self, error: Error, response: Option<FailedResponse>) {
        self.send(SinkEvent::Failure { error, response });
    }

    fn on_open(&self) {
        self.send(SinkEvent::Open);
    }

    fn on_closed(&self) {
        self.send(SinkEvent::Closed);
    }
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn on_data(&self, marker: &str, payload: &str) {
        tracing::info!(marker, payload, "completion data");
    }

    fn on_done(&self, marker: &str) {
        tracing::info!(marker, "completion done");
    }

    fn on_failure(&self, error: Error, response: Option<FailedResponse>) {
        match response {
            Some(response) => tracing::error!(
                error = %error,
                status = response.status,
                body = response.body.as_deref().unwrap_or_default(),
                "completion failed"
            ),
            None => tracing::error!(error = %error, "completion failed"),
        }
    }

    fn on_open(&self) {
        tracing::info!("completion stream opened");
    }

    fn on_closed(&self) {
        tracing::info!("completion stream closed");
    }
}
