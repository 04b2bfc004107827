//! Sends completion requests and normalizes the answer into sink events.

use crate::request::{CompletionReply, CompletionRequest, CompletionRequestBuilder};
use crate::sink::{EventSink, FailedResponse, DATA_MARKER, DONE_MARKER};
use crate::sse_stream::SseStreamExt;
use crate::{EndpointConfig, Error};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

const EVENT_STREAM: &str = "text/event-stream";

/// A failure together with the response it was observed on, if any.
struct DispatchFailure {
    error: Error,
    response: Option<FailedResponse>,
}

impl From<Error> for DispatchFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            response: None,
        }
    }
}

impl DispatchFailure {
    fn deliver(self, sink: &dyn EventSink) {
        warn!(error = %self.error, status = ?self.response.as_ref().map(|r| r.status), "dispatch failed");
        sink.on_failure(self.error, self.response);
    }
}

/// Dispatches questions to a completion endpoint.
///
/// Both transports report through the same [`EventSink`] vocabulary:
///
/// - streaming: `on_open`, then one `on_data` per server event, then `on_closed`
/// - non-streaming: `on_data("[DATA]", answer)` followed by `on_done("[DONE]")`
///
/// Either path reports a failure with a single `on_failure` and nothing after it.
#[derive(Clone)]
pub struct CompletionDispatcher {
    config: EndpointConfig,
    client: Client,
    runtime: Handle,
}

impl CompletionDispatcher {
    /// Create a dispatcher bound to the current tokio runtime.
    pub fn new(config: EndpointConfig) -> Result<Self, Error> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("No tokio runtime available: {e}")))?;
        Self::with_runtime(config, runtime)
    }

    /// Create a dispatcher whose transport work runs on `runtime`.
    pub fn with_runtime(config: EndpointConfig, runtime: Handle) -> Result<Self, Error> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(config.timeouts.connect)
            .read_timeout(config.timeouts.read)
            .user_agent(format!("completion-dispatch/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Ask `question` with no prior turns.
    ///
    /// Returns once the request is registered; the answer arrives on `sink`.
    /// A blank question is rejected before any network I/O.
    pub fn dispatch(&self, question: &str, sink: Arc<dyn EventSink>) -> Result<(), Error> {
        self.dispatch_with_history(question, Vec::<String>::new(), sink)
    }

    /// Ask `question` with the given prior turns.
    pub fn dispatch_with_history<I, S>(
        &self,
        question: &str,
        history: I,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // The wire flag is always false; the transport comes from the endpoint config.
        let request = CompletionRequestBuilder::build(question, history)?.with_streaming(false);

        let dispatch_id = Uuid::new_v4();
        let mode = if self.config.streaming_preferred {
            "streaming"
        } else {
            "non-streaming"
        };
        let span = tracing::info_span!(
            "dispatch",
            %dispatch_id,
            url = %self.config.url,
            mode
        );
        span.in_scope(|| {
            info!(
                question_len = request.question.len(),
                history = request.history.len(),
                "dispatching completion"
            );
            debug!(question = %request.question, "completion question");
        });

        let client = self.client.clone();
        let url = self.config.url.clone();
        let deadline = self.config.timeouts.write;

        if self.config.streaming_preferred {
            self.runtime.spawn(
                stream_completion(client, url, deadline, request, sink).instrument(span),
            );
        } else {
            self.runtime.spawn(
                complete_once(client, url, deadline, request, sink).instrument(span),
            );
        }

        Ok(())
    }
}

/// POST the request, bounding the time until the response head arrives.
async fn send(
    client: &Client,
    url: &str,
    deadline: Duration,
    request: &CompletionRequest,
    accept: Option<&str>,
) -> Result<Response, Error> {
    let mut builder = client.post(url).json(request);
    if let Some(accept) = accept {
        builder = builder.header(ACCEPT, accept);
    }

    let response = tokio::time::timeout(deadline, builder.send())
        .await
        .map_err(|_| Error::Timeout(deadline))??;
    debug!(status = %response.status(), "received response head");
    Ok(response)
}

/// Capture the status and body of a response that will be reported as a failure.
async fn snapshot(response: Response) -> FailedResponse {
    let status = response.status().as_u16();
    let body = response.text().await.ok();
    FailedResponse { status, body }
}

async fn reject_status(response: Response) -> DispatchFailure {
    let snapshot = snapshot(response).await;
    DispatchFailure {
        error: Error::Status {
            status: snapshot.status,
            body: snapshot.body.clone().unwrap_or_default(),
        },
        response: Some(snapshot),
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with(EVENT_STREAM))
        .unwrap_or(false)
}

async fn open_stream(
    client: &Client,
    url: &str,
    deadline: Duration,
    request: &CompletionRequest,
) -> Result<Response, DispatchFailure> {
    let response = send(client, url, deadline, request, Some(EVENT_STREAM)).await?;

    if !response.status().is_success() {
        return Err(reject_status(response).await);
    }

    if !is_event_stream(&response) {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("<none>")
            .to_string();
        return Err(DispatchFailure {
            error: Error::streaming(format!(
                "Expected {EVENT_STREAM} response, got content type {content_type}"
            )),
            response: Some(snapshot(response).await),
        });
    }

    Ok(response)
}

/// Streaming path: forward every server event verbatim until the transport closes.
async fn stream_completion(
    client: Client,
    url: String,
    deadline: Duration,
    request: CompletionRequest,
    sink: Arc<dyn EventSink>,
) {
    let response = match open_stream(&client, &url, deadline, &request).await {
        Ok(response) => response,
        Err(failure) => {
            failure.deliver(sink.as_ref());
            return;
        }
    };
    // The request is no longer needed once the stream is registered.
    drop(request);

    info!("event stream opened");
    sink.on_open();

    let mut events = response.bytes_stream().sse_events();
    let mut forwarded = 0usize;
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                debug!(event_type = ?event.event_type, id = ?event.id, "server event");
                sink.on_data(event.event_type_or_default(), &event.data);
                forwarded += 1;
            }
            Err(error) => {
                DispatchFailure::from(error).deliver(sink.as_ref());
                return;
            }
        }
    }

    info!(events = forwarded, "event stream closed");
    sink.on_closed();
}

async fn fetch_answer(
    client: &Client,
    url: &str,
    deadline: Duration,
    request: &CompletionRequest,
) -> Result<String, DispatchFailure> {
    let response = send(client, url, deadline, request, None).await?;

    if !response.status().is_success() {
        return Err(reject_status(response).await);
    }

    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| DispatchFailure {
        error: e.into(),
        response: Some(FailedResponse { status, body: None }),
    })?;

    let reply = CompletionReply::from_json(&body).map_err(|error| DispatchFailure {
        error,
        response: Some(FailedResponse {
            status,
            body: Some(body.clone()),
        }),
    })?;

    Ok(reply.answer())
}

/// Non-streaming path: one request, then exactly data + done, or a single failure.
async fn complete_once(
    client: Client,
    url: String,
    deadline: Duration,
    request: CompletionRequest,
    sink: Arc<dyn EventSink>,
) {
    match fetch_answer(&client, &url, deadline, &request).await {
        Ok(answer) => {
            info!(answer_len = answer.len(), "completion received");
            sink.on_data(DATA_MARKER, &answer);
            sink.on_done(DONE_MARKER);
        }
        Err(failure) => failure.deliver(sink.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{ChannelSink, SinkEvent};

    #[test]
    fn test_new_requires_runtime() {
        let config = EndpointConfig::new("http://localhost:7861/chat/", false);
        let result = CompletionDispatcher::new(config);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_blank_url_rejected() {
        let result = CompletionDispatcher::new(EndpointConfig::new("", true));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_blank_question_rejected_on_both_paths() {
        for streaming in [true, false] {
            let dispatcher =
                CompletionDispatcher::new(EndpointConfig::new("http://127.0.0.1:1/chat", streaming))
                    .unwrap();
            let (sink, mut rx) = ChannelSink::new();

            let result = dispatcher.dispatch("  ", Arc::new(sink));
            assert!(matches!(result, Err(Error::InvalidArgument(_))));

            // Nothing was spawned, so the only sender is already gone.
            assert!(rx.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_dispatcher_shares_config() {
        let config = EndpointConfig::new("http://localhost:7861/chat/", true);
        let dispatcher = CompletionDispatcher::new(config.clone()).unwrap();
        let copy = dispatcher.clone();
        assert_eq!(copy.config(), &config);
    }

    #[tokio::test]
    async fn test_failure_delivery_carries_response() {
        let (sink, mut rx) = ChannelSink::new();
        DispatchFailure {
            error: Error::Status {
                status: 500,
                body: "boom".to_string(),
            },
            response: Some(FailedResponse {
                status: 500,
                body: Some("boom".to_string()),
            }),
        }
        .deliver(&sink);
        drop(sink);

        match rx.recv().await {
            Some(SinkEvent::Failure { error, response }) => {
                assert!(matches!(error, Error::Status { status: 500, .. }));
                assert_eq!(response.unwrap().body.as_deref(), Some("boom"));
            }
            other => panic!("Expected failure, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
