//! Client configuration and endpoint URL construction.

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

const DEFAULT_HOST: &str = "api.openai.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoint paths, all rooted at `/v1`.
pub mod paths {
    pub const COMPLETIONS: &str = "/v1/completions";
    pub const CHATS: &str = "/v1/chat/completions";
    pub const MODELS: &str = "/v1/models";
    pub const EMBEDDINGS: &str = "/v1/embeddings";
    pub const MODERATIONS: &str = "/v1/moderations";
}

/// Connection and authentication settings shared by every request.
///
/// # Example
/// ```rust
/// use openai_stream::options::Configuration;
/// use std::time::Duration;
///
/// let configuration = Configuration::new("sk-...")
///     .with_host("https://openrouter.ai/api/v1")
///     .with_app_name("my-app")
///     .with_timeout(Duration::from_secs(30));
///
/// let url = configuration.build_url("/v1/models").unwrap();
/// assert_eq!(url.as_str(), "https://openrouter.ai/api/v1/models");
/// ```
#[derive(Debug, Clone)]
pub struct Configuration {
    /// API token sent as a bearer credential
    pub token: SecretString,

    /// Optional `OpenAI-Organization` header
    pub organization_identifier: Option<String>,

    /// Optional `X-Title` header (OpenRouter app classification)
    pub app_name: Option<String>,

    /// Optional `HTTP-Referer` header (OpenRouter site classification)
    pub site_url: Option<String>,

    /// API host, either a bare host (optionally with a path) or a full URL
    pub host: String,

    /// Request timeout for non-streaming requests; also the connect timeout
    pub timeout: Duration,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: HashMap<String, String>,
}

impl Configuration {
    /// Create a configuration for the default host with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            organization_identifier: None,
            app_name: None,
            site_url: None,
            host: DEFAULT_HOST.to_string(),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            extra_headers: HashMap::new(),
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_ORGANIZATION` and `OPENAI_HOST`.
    pub fn from_env() -> Result<Self, ClientError> {
        let token = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClientError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let mut configuration = Self::new(token);
        if let Ok(organization) = std::env::var("OPENAI_ORGANIZATION") {
            configuration.organization_identifier = Some(organization);
        }
        if let Ok(host) = std::env::var("OPENAI_HOST") {
            configuration.host = host;
        }
        Ok(configuration)
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization_identifier = Some(organization.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }

    /// Set the host. Use this for proxies and compatible servers.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    /// Build the absolute URL of an endpoint path such as `/v1/models`.
    ///
    /// A host given as a full URL keeps its scheme and port. Hosts that
    /// already end in `/v1` do not get a second `v1` segment.
    pub fn build_url(&self, path: &str) -> Result<Url, ClientError> {
        let invalid = || ClientError::InvalidUrl(format!("{}{}", self.host, path));

        match Url::parse(&self.host) {
            Ok(mut url) if url.has_host() => {
                let joined = join_path(url.path(), path);
                url.set_path(&joined);
                url.set_query(None);
                Ok(url)
            }
            _ => {
                let (host, host_path) = match self.host.split_once('/') {
                    Some((host, host_path)) => (host, host_path),
                    None => (self.host.as_str(), ""),
                };
                if host.is_empty() {
                    return Err(invalid());
                }
                Url::parse(&format!("https://{}{}", host, join_path(host_path, path)))
                    .map_err(|_| invalid())
            }
        }
    }
}

/// Append `path` to `host_path`, dropping a trailing `v1` from the host part
/// and collapsing empty segments.
fn join_path(host_path: &str, path: &str) -> String {
    let mut segments: Vec<&str> = host_path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.last() == Some(&"v1") {
        segments.pop();
    }
    segments.extend(path.split('/').filter(|s| !s.is_empty()));
    format!("/{}", segments.join("/"))
}
