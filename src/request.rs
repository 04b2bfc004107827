//! Wire payloads exchanged with the completion endpoint.

use crate::Error;
use serde::{Deserialize, Serialize};

/// Outbound request body, posted as `application/json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub question: String,
    /// Informational only. The transport is chosen by [`crate::EndpointConfig`].
    pub streaming: bool,
    pub history: Vec<String>,
}

impl CompletionRequest {
    /// Set the wire-level streaming flag from the caller's context.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// Builds [`CompletionRequest`]s from caller input.
pub struct CompletionRequestBuilder;

impl CompletionRequestBuilder {
    /// Build a request for `question` with the given prior turns.
    ///
    /// The streaming flag starts out `false`; callers that need it set use
    /// [`CompletionRequest::with_streaming`].
    pub fn build<I, S>(question: &str, history: I) -> Result<CompletionRequest, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if question.trim().is_empty() {
            return Err(Error::invalid_argument("question must not be blank"));
        }

        Ok(CompletionRequest {
            question: question.to_string(),
            streaming: false,
            history: history.into_iter().map(Into::into).collect(),
        })
    }
}

/// Inbound body of a non-streaming completion. Fields other than `response` are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionReply {
    pub response: Option<serde_json::Value>,
}

impl CompletionReply {
    /// Parse a reply body, which must be a JSON object.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        match serde_json::from_str::<serde_json::Value>(body)? {
            serde_json::Value::Object(mut fields) => Ok(Self {
                response: fields.remove("response"),
            }),
            other => Err(Error::MalformedResponse(serde::de::Error::custom(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )))),
        }
    }

    /// The answer text. Missing, `null` and container values yield an empty answer;
    /// other scalars are rendered as JSON text.
    pub fn answer(&self) -> String {
        match &self.response {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(scalar @ (serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => {
                scalar.to_string()
            }
            _ => String::new(),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
