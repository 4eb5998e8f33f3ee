//! # openai-stream - OpenAI-compatible API client
//!
//! A small async client for OpenAI-style HTTP APIs, built around a robust
//! reader for streamed (`text/event-stream`) responses.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Non-streaming requests with a single JSON decode
//! - Streaming requests whose events are reassembled across arbitrary
//!   network chunk boundaries, decoded exactly once and in order
//! - Callback-style ([`StreamSink`]) and pull-style ([`EventStream`])
//!   consumption of the same streaming session
//! - Cooperative cancellation through [`SessionControl`]
//!
//! ## Architecture
//!
//! Bytes flow through three stages:
//!
//! 1. **Reassembly** ([`sse::EventReassembler`]): chunks are split on the
//!    `data:` boundary; a fragment cut off by the chunk boundary is held
//!    back and completed by the next chunk.
//! 2. **Decoding** ([`decode`]): each payload is decoded as the result type,
//!    then as an API error envelope.
//! 3. **Session** ([`session::StreamSession`]): a state machine that forwards
//!    results to the sink and emits exactly one completion signal.
//!
//! ## Example
//! ```no_run
//! use futures::StreamExt;
//! use openai_stream::client::StreamingClient;
//! use openai_stream::model::{ChatMessage, ChatQuery};
//! use openai_stream::options::Configuration;
//! use openai_stream::providers::OpenAiClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenAiClient::new(Configuration::new("your-api-key"))?;
//!
//!     let query = ChatQuery::new("gpt-4o", vec![ChatMessage::user("Hello!")]);
//!     let mut stream = client.chats_event_stream(query)?;
//!
//!     while let Some(chunk) = stream.next().await {
//!         for choice in chunk?.choices {
//!             print!("{}", choice.delta.content.unwrap_or_default());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod decode;
pub mod http;
pub mod model;
pub mod options;
pub mod providers;
pub mod session;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::{Client, ClientError, StreamingClient};
pub use model::{ApiError, ChatQuery, ChatStreamResult};
pub use options::Configuration;
pub use session::{SessionControl, SessionState, StreamSink};
pub use stream::{CallbackSink, EventStream};
