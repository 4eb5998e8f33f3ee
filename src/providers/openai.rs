//! OpenAI-compatible API client implementation.
//!
//! See: <https://platform.openai.com/docs/api-reference>

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::{Client, ClientError, StreamingClient};
use crate::decode::decode_response;
use crate::http::{build_http_client, JsonRequest};
use crate::model::ApiErrorResponse;
use crate::options::Configuration;
use crate::session::{SessionControl, SessionRegistry, SessionState, StreamSession, StreamSink};
use crate::sse::SSEResponseExt;
use crate::stream::{drive, runtime_handle};

/// Client for OpenAI and servers speaking the same protocol.
///
/// Streaming calls run on the tokio runtime. Dropping the client cancels
/// every stream it started that is still running.
pub struct OpenAiClient {
    configuration: Configuration,
    http_client: reqwest::Client,
    sessions: SessionRegistry,
}

impl OpenAiClient {
    pub fn new(configuration: Configuration) -> Result<Self, ClientError> {
        let http_client = build_http_client(&configuration)?;
        Ok(Self {
            configuration,
            http_client,
            sessions: SessionRegistry::new(),
        })
    }

    /// Create a client for the default host.
    pub fn with_token(token: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(Configuration::new(token))
    }

    /// Create a client from `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(Configuration::from_env()?)
    }

    /// Registry of the streams started by this client that are still running.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handle error responses.
    fn handle_error_response(status: reqwest::StatusCode, body: &str) -> ClientError {
        if let Ok(error_resp) = serde_json::from_str::<ApiErrorResponse>(body) {
            ClientError::Api(error_resp.error)
        } else {
            ClientError::ProviderError(format!("HTTP {}: {}", status, body))
        }
    }

    /// Send `request` and drive `session` over the response body.
    async fn run_stream<T, S>(mut session: StreamSession<T, S>, request: RequestBuilder)
    where
        T: DeserializeOwned,
        S: StreamSink<T>,
    {
        let control = session.control().clone();
        session.start();
        if session.state() != SessionState::Active {
            return;
        }

        let response = tokio::select! {
            biased;
            _ = control.cancelled() => {
                session.cancel();
                return;
            }
            response = request.send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                session.on_complete(Err(error.into()));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = control.cancelled() => {
                    session.cancel();
                    return;
                }
                body = response.text() => body,
            };
            match body {
                Ok(body) => session.fail(Self::handle_error_response(status, &body)),
                Err(error) => session.on_complete(Err(error.into())),
            }
            return;
        }

        debug!(session = %control.id(), %status, "stream response received");
        drive(session, response.chunks()).await;
    }
}

impl Drop for OpenAiClient {
    fn drop(&mut self) {
        self.sessions.cancel_all();
    }
}

#[async_trait]
impl Client for OpenAiClient {
    fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    async fn perform_request<T>(&self, request: JsonRequest) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        debug!(url = %request.url(), "sending request");
        let response = request
            .build(&self.http_client, &self.configuration)
            .send()
            .await?;
        let body = response.bytes().await?;
        decode_response(&body)
    }
}

impl StreamingClient for OpenAiClient {
    fn perform_streaming_request<T, S>(
        &self,
        request: JsonRequest,
        sink: S,
    ) -> Result<SessionControl, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
        S: StreamSink<T> + 'static,
    {
        let runtime = runtime_handle()?;
        let request = request.build(&self.http_client, &self.configuration);
        let control = self.sessions.register();
        debug!(session = %control.id(), "starting streaming request");

        let session = StreamSession::new(sink, control.clone());
        runtime.spawn(Self::run_stream(session, request));
        Ok(control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_error_response() {
        let error = OpenAiClient::handle_error_response(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error","code":"invalid_api_key"}}"#,
        );
        match error {
            ClientError::Api(error) => {
                assert_eq!(error.message, "Incorrect API key");
                assert_eq!(error.code.as_deref(), Some("invalid_api_key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let error =
            OpenAiClient::handle_error_response(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(
            error.to_string(),
            "Provider error: HTTP 502 Bad Gateway: upstream down"
        );
    }

    #[tokio::test]
    async fn test_cancelled_session_sends_nothing() {
        use crate::session::tests::{Event, RecordingSink};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client =
            OpenAiClient::new(Configuration::new("key").with_host(server.uri())).unwrap();
        let request = JsonRequest::get(client.configuration().build_url("/v1/models").unwrap())
            .streaming()
            .build(&client.http_client, &client.configuration);
        let control = client.sessions().register();
        control.cancel();

        let sink = RecordingSink::default();
        let session: StreamSession<Event, _> = StreamSession::new(sink.clone(), control);
        OpenAiClient::run_stream(session, request).await;

        let recorded = sink.snapshot();
        assert!(recorded.items.is_empty());
        assert_eq!(recorded.done, vec![None]);
        assert!(client.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_drop_cancels_live_sessions() {
        let client = OpenAiClient::with_token("key").unwrap();
        let control = client.sessions().register();
        drop(client);
        assert!(control.is_cancelled());
    }
}
