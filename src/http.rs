//! HTTP client utilities for making requests to the API.
//!
//! This module provides reusable HTTP client construction and
//! request building logic shared by every endpoint.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::client::ClientError;
use crate::options::Configuration;

const ORGANIZATION_HEADER: &str = "OpenAI-Organization";
const APP_NAME_HEADER: &str = "X-Title";
const SITE_URL_HEADER: &str = "HTTP-Referer";

/// Build a configured HTTP client from the configuration.
///
/// This applies the connect timeout and proxy. The total request timeout is
/// set per request, see [`JsonRequest::build`].
pub fn build_http_client(configuration: &Configuration) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder().connect_timeout(configuration.timeout);

    if let Some(proxy_url) = &configuration.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Add extra headers to a request.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &HashMap<String, String>,
) -> RequestBuilder {
    for (key, value) in extra_headers {
        request = request.header(key, value);
    }
    request
}

/// A JSON request against one endpoint, not yet bound to a client.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    method: Method,
    url: Url,
    body: Option<Value>,
    streaming: bool,
}

impl JsonRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            streaming: false,
        }
    }

    /// Create a POST request with `body` serialized as JSON.
    pub fn post<B: Serialize>(url: Url, body: &B) -> Result<Self, ClientError> {
        Ok(Self {
            method: Method::POST,
            url,
            body: Some(serde_json::to_value(body)?),
            streaming: false,
        })
    }

    /// Mark the request as streaming. Streaming requests have no total
    /// timeout, only the client's connect timeout.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Bind the request to `client`, adding authentication and the
    /// configured optional headers.
    pub fn build(&self, client: &Client, configuration: &Configuration) -> RequestBuilder {
        let mut request = client
            .request(self.method.clone(), self.url.clone())
            .header(AUTHORIZATION, configuration.bearer())
            .header(CONTENT_TYPE, "application/json");

        if let Some(organization) = &configuration.organization_identifier {
            request = request.header(ORGANIZATION_HEADER, organization);
        }
        if let Some(app_name) = &configuration.app_name {
            request = request.header(APP_NAME_HEADER, app_name);
        }
        if let Some(site_url) = &configuration.site_url {
            request = request.header(SITE_URL_HEADER, site_url);
        }
        request = add_extra_headers(request, &configuration.extra_headers);

        if !self.streaming {
            request = request.timeout(configuration.timeout);
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::paths;
    use std::time::Duration;

    #[test]
    fn test_build_http_client() {
        let configuration = Configuration::new("test").with_timeout(Duration::from_secs(30));
        assert!(build_http_client(&configuration).is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let configuration = Configuration::new("test").with_proxy("http://proxy.example.com:8080");
        assert!(build_http_client(&configuration).is_ok());
    }

    #[test]
    fn test_request_headers() {
        let configuration = Configuration::new("sk-test")
            .with_organization("org-1")
            .with_app_name("demo")
            .with_site_url("https://demo.example.com")
            .with_header("X-Custom", "yes");
        let client = build_http_client(&configuration).unwrap();
        let url = configuration.build_url(paths::MODELS).unwrap();

        let request = JsonRequest::get(url)
            .build(&client, &configuration)
            .build()
            .unwrap();
        let headers = request.headers();

        assert_eq!(*request.method(), Method::GET);
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[ORGANIZATION_HEADER], "org-1");
        assert_eq!(headers[APP_NAME_HEADER], "demo");
        assert_eq!(headers[SITE_URL_HEADER], "https://demo.example.com");
        assert_eq!(headers["X-Custom"], "yes");
        assert_eq!(request.timeout(), Some(&Duration::from_secs(60)));
        assert!(request.body().is_none());
    }

    #[test]
    fn test_streaming_request_has_no_total_timeout() {
        let configuration = Configuration::new("sk-test");
        let client = build_http_client(&configuration).unwrap();
        let url = configuration.build_url(paths::CHATS).unwrap();

        let json_request = JsonRequest::post(url, &serde_json::json!({"stream": true}))
            .unwrap()
            .streaming();
        assert!(json_request.is_streaming());

        let request = json_request.build(&client, &configuration).build().unwrap();
        assert_eq!(*request.method(), Method::POST);
        assert_eq!(request.timeout(), None);
        assert!(request.body().is_some());
        assert!(!request.headers().contains_key(ORGANIZATION_HEADER));
    }
}
