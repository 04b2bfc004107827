use completion_dispatch::{
    CompletionReply, CompletionRequestBuilder, EndpointConfig, Error, LoggingSink, SseEvent,
    Timeouts, DATA_MARKER, DONE_MARKER,
};
use completion_dispatch::EventSink;

#[test]
fn test_request_building() {
    let request = CompletionRequestBuilder::build(
        "list all tables",
        vec!["show me the schema".to_string()],
    )
    .unwrap();

    assert_eq!(request.question, "list all tables");
    assert_eq!(request.history.len(), 1);
    assert!(!request.streaming);

    // The caller may set the flag; nothing else changes.
    let flagged = request.clone().with_streaming(true);
    assert!(flagged.streaming);
    assert_eq!(flagged.question, request.question);
    assert_eq!(flagged.history, request.history);
}

#[test]
fn test_wire_payload_shape() {
    let request = CompletionRequestBuilder::build("list all tables", Vec::<String>::new()).unwrap();
    let text = serde_json::to_string(&request).unwrap();
    assert_eq!(
        text,
        r#"{"question":"list all tables","streaming":false,"history":[]}"#
    );
}

#[test]
fn test_reply_ignores_other_fields() {
    let reply = CompletionReply::from_json(
        r#"{"response": "SELECT * FROM users;", "history": [["q", "a"]], "source_documents": []}"#,
    )
    .unwrap();
    assert_eq!(reply.answer(), "SELECT * FROM users;");
}

#[test]
fn test_endpoint_config_is_independent_of_wire_flag() {
    let streaming = EndpointConfig::new("http://localhost:7861/chat/", true);
    let request = CompletionRequestBuilder::build("q", Vec::<String>::new()).unwrap();
    assert!(streaming.streaming_preferred);
    assert!(!request.streaming);

    let custom = streaming.clone().with_timeouts(Timeouts {
        connect: std::time::Duration::from_secs(1),
        ..Timeouts::default()
    });
    assert_ne!(custom, streaming);
    assert_eq!(custom.url, streaming.url);
}

#[test]
fn test_marker_constants() {
    assert_eq!(DATA_MARKER, "[DATA]");
    assert_eq!(DONE_MARKER, "[DONE]");
    assert_eq!(SseEvent::new("x").event_type_or_default(), "message");
}

#[test]
fn test_logging_sink_accepts_every_event() {
    let sink = LoggingSink;
    sink.on_open();
    sink.on_data(DATA_MARKER, "SHOW TABLES;");
    sink.on_done(DONE_MARKER);
    sink.on_failure(Error::streaming("connection reset"), None);
    sink.on_closed();
}

#[test]
fn test_error_creation() {
    let error = Error::invalid_argument("question must not be blank");
    assert!(error.to_string().contains("Invalid argument"));
    assert!(!error.is_transport());

    let config_error = Error::config("COMPLETION_API_URL missing");
    assert!(config_error.to_string().contains("Invalid configuration"));
}
