//! Request and response schemas for the OpenAI-compatible HTTP API.
//!
//! These are plain data types. The only behaviour lives in the lenient
//! decoding of [`ApiError`], which accepts the shapes different servers
//! actually send.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Queries that can be switched into streaming mode before they are sent.
pub trait Streamable {
    /// Return a copy of the query with `stream: true`.
    fn make_streamable(self) -> Self;
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatQuery {
    /// Model identifier (e.g., "gpt-4o")
    pub model: String,

    /// Conversation history
    pub messages: Vec<ChatMessage>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Top-p (nucleus) sampling parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// End-user identifier forwarded for abuse monitoring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatQuery {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set top-p sampling parameter.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Streamable for ChatQuery {
    fn make_streamable(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}

/// Body of `POST /v1/completions`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionsQuery {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl CompletionsQuery {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Streamable for CompletionsQuery {
    fn make_streamable(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Response of a non-streaming chat completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResult {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Incremental message content carried by a stream event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChatDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatStreamChoice {
    pub index: u32,
    #[serde(default)]
    pub delta: ChatDelta,
    pub finish_reason: Option<String>,
}

/// One event of a streamed chat completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatStreamResult {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    pub text: String,
    pub index: u32,
    pub finish_reason: Option<String>,
}

/// Response of a (legacy) text completion, streamed or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionsResult {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

fn default_model_object() -> String {
    "model".to_string()
}

fn default_owner() -> String {
    "-".to_string()
}

fn default_list_object() -> String {
    "list".to_string()
}

/// The model object matching a model identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResult {
    /// The model identifier, which can be referenced in the API endpoints
    pub id: String,

    /// Unix timestamp (in seconds) when the model was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,

    /// Always "model"
    #[serde(default = "default_model_object")]
    pub object: String,

    /// The organization that owns the model
    #[serde(default = "default_owner")]
    pub owned_by: String,
}

/// A list of model objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelsResult {
    pub data: Vec<ModelResult>,

    /// Always "list"
    #[serde(default = "default_list_object")]
    pub object: String,
}

/// Body of `POST /v1/embeddings`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbeddingsQuery {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl EmbeddingsQuery {
    pub fn new(model: impl Into<String>, input: Vec<String>) -> Self {
        Self {
            model: model.into(),
            input,
            ..Default::default()
        }
    }

    /// Ask for vectors truncated to `dimensions` (newer models only).
    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    #[serde(default = "default_embedding_object")]
    pub object: String,
    pub embedding: Vec<f64>,
    pub index: u32,
}

fn default_embedding_object() -> String {
    "embedding".to_string()
}

/// Response of `POST /v1/embeddings`, one vector per input in input order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingsResult {
    pub data: Vec<Embedding>,
    pub model: String,
    #[serde(default = "default_list_object")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Body of `POST /v1/moderations`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModerationsQuery {
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ModerationsQuery {
    pub fn new(input: Vec<String>) -> Self {
        Self { input, model: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Verdict for one moderated input.
///
/// Category names vary between model versions, so they are kept as maps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Moderation {
    pub flagged: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
}

/// Response of `POST /v1/moderations`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModerationsResult {
    pub id: String,
    pub model: String,
    pub results: Vec<Moderation>,
}

/// Structured error returned by the remote service.
///
/// Servers disagree on the shape: `message` may be a string or a list of
/// strings (joined with newlines here), and `code` may be a number or a
/// string (normalised to a string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(from = "RawApiError")]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// The `{"error": {...}}` envelope around an [`ApiError`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    Text(String),
    Lines(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorCode {
    Number(Number),
    Text(String),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
struct RawApiError {
    message: ErrorMessage,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    param: Option<String>,
    #[serde(default)]
    code: Option<ErrorCode>,
}

impl From<RawApiError> for ApiError {
    fn from(raw: RawApiError) -> Self {
        let message = match raw.message {
            ErrorMessage::Text(text) => text,
            ErrorMessage::Lines(lines) => lines.join("\n"),
        };
        let code = raw.code.and_then(|code| match code {
            ErrorCode::Number(number) => Some(number.to_string()),
            ErrorCode::Text(text) => Some(text),
            ErrorCode::Other(_) => None,
        });

        ApiError {
            message,
            error_type: raw.error_type,
            param: raw.param,
            code,
        }
    }
}
