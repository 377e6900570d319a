//! HTTP transport with outcome classification.
//!
//! This module provides the [`FetchClient`] used by ajax-driven components
//! and the [`QueryCache`](crate::query::QueryCache). A single call performs
//! one request and classifies the outcome into exactly one of failure or
//! success. The client never raises past its boundary, so callers branch
//! on a [`FetchResult`] without any exception handling.
//!
//! # Outcome contract
//!
//! - [`FetchError`] carries a human-readable message plus, where available,
//!   the numeric status. Connectivity and decode problems are converted into
//!   the [`FetchError::Network`] variant instead of propagating.
//! - [`FetchSuccess`] is negotiated from the response content type:
//!   structured data ([`Payload`]), a markup document ([`MarkupDocument`]),
//!   plain text (wrapped into a [`Payload`] message), or a default
//!   "no content" value.
//!
//! # Example
//!
//! ```rust,no_run
//! use ebb::client::{FetchClient, FetchParameters, Method};
//!
//! # async fn run() -> Result<(), ebb::client::FetchError> {
//! let client = FetchClient::new()?;
//! let success = client
//!     .send("https://example.com/api/items", Method::Get, FetchParameters::default())
//!     .await?;
//! if let Some(payload) = success.as_data() {
//!     println!("{:?}", payload.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod mock;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Characters of a plain-text error body carried into a failure message.
const ERROR_TEXT_LIMIT: usize = 100;

/// Message used when a server error carries no usable body.
const GENERIC_FAILURE: &str = "request failed";

/// Request timeout applied to every call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The allow-list of request methods.
///
/// Anything outside this list is a caller error: [`Method::from_str`]
/// rejects it before any request is constructed, which keeps the rejection
/// distinct from network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl Method {
    /// The canonical upper-case name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a request body is attached for this method.
    #[must_use]
    pub const fn allows_body(self) -> bool {
        !matches!(self, Self::Get)
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Put => reqwest::Method::PUT,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl FromStr for Method {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "PUT" => Ok(Self::Put),
            "POST" => Ok(Self::Post),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(FetchError::UnsupportedMethod(value.to_owned())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The method is outside the allow-list; no request was made.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The server answered with a non-success status.
    #[error("{message}")]
    Status {
        /// Human-readable message, extracted from the response body where
        /// possible.
        message: String,
        /// The numeric response status.
        status: u16,
    },

    /// Connectivity or decoding failed before a usable response existed.
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// The response status, when the server produced one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Structured-data success payload.
///
/// Wire names are camelCase (`redirectUrl`, `queryKey`), matching what
/// servers produce for ajax form endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Payload {
    /// Optional human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Optional address the consumer should navigate to next.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Optional follow-up query key the consumer should invalidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_key: Option<String>,
}

impl Payload {
    /// A payload carrying only a message.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// A markup document received from the server.
///
/// The markup is carried as text; fragment navigation is the consumer's
/// concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupDocument {
    html: String,
}

impl MarkupDocument {
    /// Wraps the given markup text.
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// The raw markup text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.html
    }

    /// `true` when the document contains no non-whitespace content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty()
    }
}

/// A successful transport outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSuccess {
    /// Parsed structured-data result.
    Data(Payload),
    /// Parsed-markup result.
    Document(MarkupDocument),
}

impl FetchSuccess {
    /// The structured payload, if this is a data outcome.
    #[must_use]
    pub const fn as_data(&self) -> Option<&Payload> {
        match self {
            Self::Data(payload) => Some(payload),
            Self::Document(_) => None,
        }
    }

    /// The markup document, if this is a document outcome.
    #[must_use]
    pub const fn as_document(&self) -> Option<&MarkupDocument> {
        match self {
            Self::Document(document) => Some(document),
            Self::Data(_) => None,
        }
    }

    /// The default success value for responses without a usable body.
    #[must_use]
    pub fn no_content() -> Self {
        Self::Data(Payload::from_message("request successful, no content"))
    }
}

/// Outcome of one transport call: exactly one of failure or success.
pub type FetchResult = Result<FetchSuccess, FetchError>;

/// Per-call request configuration.
#[derive(Debug, Clone, Default)]
pub struct FetchParameters {
    /// URL-encoded into a query string; omitted entirely when empty.
    pub query_parameters: Vec<(String, String)>,
    /// Merged over the client's default headers; per-call wins on conflict.
    pub headers: HeaderMap,
    /// Request body; ignored for GET.
    pub data: Option<String>,
}

/// The seam the [`QueryCache`](crate::query::QueryCache) fetches through.
///
/// A query key is the URL of the resource it caches; the cache resolves a
/// key by issuing a GET for it. Tests substitute a scripted implementation
/// (see [`mock::MockTransport`]).
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches the resource identified by `key`.
    async fn fetch(&self, key: &str) -> FetchResult;
}

/// HTTP client with instance-level default headers.
///
/// Constructed once at application start and shared by handle; there is no
/// process-wide instance.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: reqwest::Client,
    base_headers: HeaderMap,
}

impl FetchClient {
    /// Creates a client with no default headers.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_headers(HeaderMap::new())
    }

    /// Creates a client whose `base_headers` are attached to every request
    /// unless overridden per call.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn with_headers(base_headers: HeaderMap) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| FetchError::Network(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, base_headers })
    }

    /// Performs one request and classifies the outcome.
    ///
    /// Never panics and never returns a raw transport error: every failure
    /// mode funnels into [`FetchError`].
    pub async fn send(
        &self,
        url: &str,
        method: Method,
        parameters: FetchParameters,
    ) -> FetchResult {
        let mut request = self
            .http
            .request(method.as_reqwest(), url)
            .headers(self.build_headers(&parameters.headers));

        if !parameters.query_parameters.is_empty() {
            request = request.query(&parameters.query_parameters);
        }

        if method.allows_body() {
            if let Some(data) = parameters.data {
                request = request.body(data);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return Err(FetchError::Network(err.to_string())),
        };

        Self::classify(response).await
    }

    /// `GET url` with the given parameters.
    pub async fn get(&self, url: &str, parameters: FetchParameters) -> FetchResult {
        self.send(url, Method::Get, parameters).await
    }

    /// `PUT url` with the given parameters.
    pub async fn put(&self, url: &str, parameters: FetchParameters) -> FetchResult {
        self.send(url, Method::Put, parameters).await
    }

    /// `POST url` with the given parameters.
    pub async fn post(&self, url: &str, parameters: FetchParameters) -> FetchResult {
        self.send(url, Method::Post, parameters).await
    }

    /// `PATCH url` with the given parameters.
    pub async fn patch(&self, url: &str, parameters: FetchParameters) -> FetchResult {
        self.send(url, Method::Patch, parameters).await
    }

    /// `DELETE url` with the given parameters.
    pub async fn delete(&self, url: &str, parameters: FetchParameters) -> FetchResult {
        self.send(url, Method::Delete, parameters).await
    }

    fn build_headers(&self, overrides: &HeaderMap) -> HeaderMap {
        let mut merged = self.base_headers.clone();
        for (name, value) in overrides {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    async fn classify(response: reqwest::Response) -> FetchResult {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        if !status.is_success() {
            return Err(Self::failure_from(response, status, &content_type).await);
        }

        if content_type.contains("application/json") {
            return match response.json::<Payload>().await {
                Ok(payload) => Ok(FetchSuccess::Data(payload)),
                Err(err) => Err(FetchError::Network(err.to_string())),
            };
        }

        if content_type.contains("text/html") {
            return match response.text().await {
                Ok(html) => Ok(FetchSuccess::Document(MarkupDocument::new(html))),
                Err(err) => Err(FetchError::Network(err.to_string())),
            };
        }

        if content_type.contains("text/plain") {
            return match response.text().await {
                Ok(text) => Ok(FetchSuccess::Data(Payload::from_message(text))),
                Err(err) => Err(FetchError::Network(err.to_string())),
            };
        }

        Ok(FetchSuccess::no_content())
    }

    async fn failure_from(
        response: reqwest::Response,
        status: StatusCode,
        content_type: &str,
    ) -> FetchError {
        let status = status.as_u16();

        if content_type.contains("application/json") {
            return match response.json::<ErrorBody>().await {
                Ok(body) => FetchError::Status {
                    message: body
                        .message
                        .or(body.error)
                        .unwrap_or_else(|| GENERIC_FAILURE.to_owned()),
                    status,
                },
                Err(err) => FetchError::Status {
                    message: format!("failed to parse error response: {err}"),
                    status,
                },
            };
        }

        let text = response.text().await.unwrap_or_default();
        if text.trim().is_empty() {
            FetchError::Status {
                message: GENERIC_FAILURE.to_owned(),
                status,
            }
        } else {
            FetchError::Status {
                message: format!(
                    "server responded with an error: {}",
                    truncate(&text, ERROR_TEXT_LIMIT)
                ),
                status,
            }
        }
    }
}

#[async_trait]
impl Fetch for FetchClient {
    async fn fetch(&self, key: &str) -> FetchResult {
        self.get(key, FetchParameters::default()).await
    }
}

/// Error body shape produced by ajax endpoints; `message` wins over `error`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Truncates on a character boundary.
fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
