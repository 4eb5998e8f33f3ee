//! Streaming chat example, consuming the same request both ways.
//!
//! Run with:
//! ```bash
//! export OPENAI_API_KEY="your-api-key"
//! cargo run --example chat_streaming
//! ```

use futures::StreamExt;
use openai_stream::client::StreamingClient;
use openai_stream::model::{ChatMessage, ChatQuery, ChatStreamResult};
use openai_stream::providers::OpenAiClient;
use openai_stream::CallbackSink;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = OpenAiClient::from_env()?;

    let query = ChatQuery::new(
        "gpt-4o-mini",
        vec![ChatMessage::user("Write a haiku about Rust programming.")],
    )
    .with_max_tokens(100);

    // Pull style
    println!("Streaming response...\n");
    let mut stream = client.chats_event_stream(query.clone())?;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                for choice in chunk.choices {
                    print!("{}", choice.delta.content.unwrap_or_default());
                }
            }
            Err(e) => {
                eprintln!("\nError: {}", e);
                break;
            }
        }
    }
    println!("\n");

    // Callback style
    let (done_tx, done_rx) = oneshot::channel();
    let sink = CallbackSink::new(
        |chunk: ChatStreamResult| {
            for choice in chunk.choices {
                print!("{}", choice.delta.content.unwrap_or_default());
            }
        },
        move |error| {
            let _ = done_tx.send(error);
        },
    );
    let _control = client.chats_stream(query, sink)?;

    match done_rx.await? {
        None => println!("\n\nStream complete"),
        Some(e) => eprintln!("\n\nStream failed: {}", e),
    }

    Ok(())
}
