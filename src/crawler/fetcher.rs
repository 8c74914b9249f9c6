//! HTTP fetcher implementation
//!
//! This module is the engine's boundary with the network:
//! - The `HttpClient` trait the executor fetches pages through
//! - `HttpResponse`, the success/failure split the executor routes on
//! - A reqwest-backed client built from the user agent and HTTP config
//! - Error classification of transport failures

use crate::config::{HttpConfig, UserAgentConfig};
use crate::SkraperError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Why a fetch did not produce a successful response
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered with a non-2xx status
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request timeout")]
    Timeout,

    /// Connection refused, DNS failure, TLS error
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response body could not be read
    #[error("failed to read body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Result of fetching one page
#[derive(Debug, Clone)]
pub enum HttpResponse {
    /// The server answered with a 2xx status
    Success {
        status: u16,
        body: String,
        headers: HashMap<String, String>,
    },

    /// Anything else; `status` is `None` when no response was received at all
    Failure {
        status: Option<u16>,
        body: String,
        headers: HashMap<String, String>,
        cause: TransportError,
    },
}

impl HttpResponse {
    /// Builds a successful response with no headers
    pub fn success(status: u16, body: impl Into<String>) -> Self {
        Self::Success {
            status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Builds a failed response for an HTTP error status
    pub fn failure(status: u16, body: impl Into<String>) -> Self {
        Self::Failure {
            status: Some(status),
            body: body.into(),
            headers: HashMap::new(),
            cause: TransportError::Status(status),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. } => Some(*status),
            Self::Failure { status, .. } => *status,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Success { body, .. } | Self::Failure { body, .. } => body,
        }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        match self {
            Self::Success { headers, .. } | Self::Failure { headers, .. } => headers,
        }
    }

    /// The transport failure, if this response is a failure
    pub fn cause(&self) -> Option<&TransportError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { cause, .. } => Some(cause),
        }
    }
}

/// Fetches pages for the executor
///
/// Implementations must never panic on network problems: every outcome is
/// expressed as an `HttpResponse`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request with the given query parameters
    async fn get_with_params(&self, url: &str, params: &[(String, String)]) -> HttpResponse;

    /// Sends a GET request
    async fn get(&self, url: &str) -> HttpResponse {
        self.get_with_params(url, &[]).await
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `http` - Timeouts for the transport
///
/// # Example
///
/// ```no_run
/// use skraper::config::{HttpConfig, UserAgentConfig};
/// use skraper::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "Skraper".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    http: &HttpConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(http.timeout_secs))
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `HttpClient` backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the underlying reqwest client from configuration
    pub fn from_config(
        user_agent: &UserAgentConfig,
        http: &HttpConfig,
    ) -> Result<Self, SkraperError> {
        Ok(Self::new(build_http_client(user_agent, http)?))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_with_params(&self, url: &str, params: &[(String, String)]) -> HttpResponse {
        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return HttpResponse::Failure {
                    status: e.status().map(|s| s.as_u16()),
                    body: String::new(),
                    headers: HashMap::new(),
                    cause: classify_error(&e),
                }
            }
        };

        let status = response.status();
        let headers = collect_headers(response.headers());

        match response.text().await {
            Ok(body) if status.is_success() => HttpResponse::Success {
                status: status.as_u16(),
                body,
                headers,
            },
            Ok(body) => HttpResponse::Failure {
                status: Some(status.as_u16()),
                body,
                headers,
                cause: TransportError::Status(status.as_u16()),
            },
            Err(e) => HttpResponse::Failure {
                status: Some(status.as_u16()),
                body: String::new(),
                headers,
                cause: TransportError::Body(e.to_string()),
            },
        }
    }
}

/// Classifies a reqwest error into a transport failure
fn classify_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if let Some(status) = e.status() {
        TransportError::Status(status.as_u16())
    } else {
        TransportError::Request(e.to_string())
    }
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
