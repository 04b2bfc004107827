//! A client for remote completion services that answers natural-language questions.
//!
//! The service may reply either as a server-sent event stream or as a single JSON body.
//! [`CompletionDispatcher`] hides the difference: callers hand it a question and an
//! [`EventSink`], and receive the answer as data, done and failure events.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod sink;
pub mod sse_stream;

// Re-export core types for easy usage
pub use config::{EndpointConfig, Timeouts};
pub use dispatcher::CompletionDispatcher;
pub use error::Error;
pub use request::{CompletionReply, CompletionRequest, CompletionRequestBuilder};
pub use sink::{
    ChannelSink, EventSink, FailedResponse, LoggingSink, SinkEvent, DATA_MARKER,
    DEFAULT_EVENT_TYPE, DONE_MARKER,
};
pub use sse_stream::SseEvent;
