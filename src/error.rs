use thiserror::Error;

/// Errors that can occur when dispatching a completion.
///
/// `InvalidArgument` and `Config` are returned to the caller synchronously.
/// Every other variant is only ever observed through [`crate::EventSink::on_failure`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    /// Whether this failure was discovered during or after network I/O.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Error::InvalidArgument(_) | Error::Config(_))
    }
}
