//! Ask a completion endpoint a question and print the answer as it arrives.
//!
//! Configure the endpoint through the environment (a `.env` file is honoured):
//!
//! ```bash
//! export COMPLETION_API_URL=http://localhost:7861/chat/
//! export COMPLETION_STREAMING=false
//! cargo run --example console_chat -- "list all tables"
//! ```

use completion_dispatch::{ChannelSink, CompletionDispatcher, EndpointConfig, Error, SinkEvent};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "list all tables".to_string());

    let config = EndpointConfig::from_env()?;
    println!(
        "Asking {} ({})",
        config.url,
        if config.streaming_preferred { "streaming" } else { "non-streaming" }
    );

    let dispatcher = CompletionDispatcher::new(config)?;
    let (sink, mut events) = ChannelSink::new();
    dispatcher.dispatch(&question, Arc::new(sink))?;

    while let Some(event) = events.recv().await {
        match event {
            SinkEvent::Open => println!("--- stream opened ---"),
            SinkEvent::Data { marker, payload } => println!("{marker} {payload}"),
            SinkEvent::Done { marker } => println!("--- {marker} ---"),
            SinkEvent::Closed => println!("--- stream closed ---"),
            SinkEvent::Failure { error, response } => {
                eprintln!("Request failed: {error}");
                if let Some(response) = response {
                    eprintln!("Status {}: {}", response.status, response.body.unwrap_or_default());
                }
            }
        }
    }

    Ok(())
}
