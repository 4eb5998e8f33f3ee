//! Core client traits and error types.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::http::JsonRequest;
use crate::model::{
    ApiError, ChatQuery, ChatResult, ChatStreamResult, CompletionsQuery, CompletionsResult,
    EmbeddingsQuery, EmbeddingsResult, ModelResult, ModelsResult, ModerationsQuery,
    ModerationsResult, Streamable,
};
use crate::options::{paths, Configuration};
use crate::session::{SessionControl, StreamSink};
use crate::stream::{ChannelSink, EventStream};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Opaque failure reported by a chunk source other than reqwest.
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Received content that is not valid UTF-8")]
    UnknownContent,

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Empty response body")]
    EmptyData,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the error originates from the content of the stream rather
    /// than from the transport carrying it.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            ClientError::Parse(_) | ClientError::UnknownContent | ClientError::Api(_)
        )
    }
}

/// Request/response operations of an OpenAI-compatible API.
///
/// Implementors supply the transport in [`Client::perform_request`]; every
/// endpoint method is provided on top of it.
///
/// # Example
/// ```rust,ignore
/// let client = OpenAiClient::new(Configuration::new("sk-..."))?;
/// let models = client.models().await?;
/// ```
#[async_trait]
pub trait Client: Send + Sync {
    /// Configuration used to build URLs and headers.
    fn configuration(&self) -> &Configuration;

    /// Send a request and decode the whole response body as `T`.
    ///
    /// A body that is not a `T` but is an error envelope becomes
    /// [`ClientError::Api`].
    async fn perform_request<T>(&self, request: JsonRequest) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Send + 'static;

    async fn chats(&self, query: ChatQuery) -> Result<ChatResult, ClientError> {
        let url = self.configuration().build_url(paths::CHATS)?;
        self.perform_request(JsonRequest::post(url, &query)?).await
    }

    async fn completions(&self, query: CompletionsQuery) -> Result<CompletionsResult, ClientError> {
        let url = self.configuration().build_url(paths::COMPLETIONS)?;
        self.perform_request(JsonRequest::post(url, &query)?).await
    }

    async fn embeddings(&self, query: EmbeddingsQuery) -> Result<EmbeddingsResult, ClientError> {
        let url = self.configuration().build_url(paths::EMBEDDINGS)?;
        self.perform_request(JsonRequest::post(url, &query)?).await
    }

    /// Classify inputs against the provider's content policy.
    async fn moderations(
        &self,
        query: ModerationsQuery,
    ) -> Result<ModerationsResult, ClientError> {
        let url = self.configuration().build_url(paths::MODERATIONS)?;
        self.perform_request(JsonRequest::post(url, &query)?).await
    }

    /// List the models available to the configured key.
    async fn models(&self) -> Result<ModelsResult, ClientError> {
        let url = self.configuration().build_url(paths::MODELS)?;
        self.perform_request(JsonRequest::get(url)).await
    }

    /// Retrieve a single model by identifier.
    async fn model(&self, id: &str) -> Result<ModelResult, ClientError> {
        let url = self
            .configuration()
            .build_url(&format!("{}/{}", paths::MODELS, id))?;
        self.perform_request(JsonRequest::get(url)).await
    }
}

/// Extension trait for streaming endpoints.
///
/// Every streaming call creates one session. Results can be consumed either
/// through a [`StreamSink`] (callback style) or as an [`EventStream`] (pull
/// style); both are backed by the same session machinery.
pub trait StreamingClient: Client {
    /// Start a streaming request whose events decode as `T`.
    ///
    /// Returns once the session is registered; the request itself runs in
    /// the background and reports to `sink`. Fails if the request cannot be
    /// built or no tokio runtime is running, in which case nothing is
    /// registered and `sink` is never called.
    fn perform_streaming_request<T, S>(
        &self,
        request: JsonRequest,
        sink: S,
    ) -> Result<SessionControl, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
        S: StreamSink<T> + 'static;

    /// Stream a chat completion into `sink`.
    fn chats_stream<S>(&self, query: ChatQuery, sink: S) -> Result<SessionControl, ClientError>
    where
        S: StreamSink<ChatStreamResult> + 'static,
    {
        let url = self.configuration().build_url(paths::CHATS)?;
        let request = JsonRequest::post(url, &query.make_streamable())?.streaming();
        self.perform_streaming_request(request, sink)
    }

    /// Stream a text completion into `sink`.
    fn completions_stream<S>(
        &self,
        query: CompletionsQuery,
        sink: S,
    ) -> Result<SessionControl, ClientError>
    where
        S: StreamSink<CompletionsResult> + 'static,
    {
        let url = self.configuration().build_url(paths::COMPLETIONS)?;
        let request = JsonRequest::post(url, &query.make_streamable())?.streaming();
        self.perform_streaming_request(request, sink)
    }

    /// Stream a chat completion as a [`futures::Stream`].
    ///
    /// Dropping the returned stream cancels the request.
    fn chats_event_stream(
        &self,
        query: ChatQuery,
    ) -> Result<EventStream<ChatStreamResult>, ClientError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let control = self.chats_stream(query, ChannelSink::new(sender))?;
        Ok(EventStream::new(receiver, control))
    }

    /// Stream a text completion as a [`futures::Stream`].
    fn completions_event_stream(
        &self,
        query: CompletionsQuery,
    ) -> Result<EventStream<CompletionsResult>, ClientError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let control = self.completions_stream(query, ChannelSink::new(sender))?;
        Ok(EventStream::new(receiver, control))
    }
}
