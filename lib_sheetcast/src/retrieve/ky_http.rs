//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with middleware for
//! exponential backoff retries and standardized JSON response handling.

use std::time::Duration;

use anyhow::anyhow;
use reqwest::{header::HeaderMap, Method};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use url::Url;

/// A standardized container for API responses.
///
/// Wraps the deserialized data along with the status of the HTTP transaction.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

/// A flexible asynchronous HTTP client.
///
/// Handles the base URL and automatic retries. Credentials travel per
/// request in the `headers` argument.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL that endpoint segments are appended to.
    base_url: Url,
}

/// Drops the request URL from a transport error. Query parameters such as
/// API keys must never reach the logs.
fn without_url(err: reqwest::Error) -> anyhow::Error {
    anyhow::Error::from(err.without_url())
}

/// Middleware (retry) errors wrap the reqwest error by value, so the URL is
/// cut out of the rendered message instead.
fn redact_urls(text: &str) -> String {
    const MARKER: &str = "for url (";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(MARKER) {
        out.push_str(&rest[..start]);
        out.push_str("for url ([redacted])");
        let after = &rest[start + MARKER.len()..];
        rest = match after.find(')') {
            Some(end) => &after[end + 1..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

impl ApiClient {
    /// Creates a new `ApiClient` with a retry policy of `max_retries`
    /// attempts and a per-request `timeout`.
    ///
    /// # Errors
    /// Fails if `base_url` is not an absolute URL that can carry a path, or
    /// if the underlying HTTP client can not be built.
    pub fn new(base_url: &str, max_retries: u32, timeout: Duration) -> anyhow::Result<Self> {
        let url = parse_base_url(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("SheetCast/1.0")
            .build()?;

        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    /// The base URL requests are built from.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    ///
    /// # Errors
    /// Fails only if the base URL can not carry a path, which `new` rules out.
    pub fn endpoint(&self, segments: &[&str]) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Performs an HTTP request and handles the response.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb (GET, POST, etc.).
    /// * `url` - Absolute URL, usually from `endpoint`.
    /// * `query` - Query parameters appended to the URL.
    /// * `headers` - Optional additional headers for this specific request.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if network execution or decoding of a
    /// successful body fails. Non-2xx statuses are not errors; they come back
    /// with `success == false` and the raw `error_body`. Errors never carry
    /// the request URL.
    pub async fn request<T>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        headers: Option<HeaderMap>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        let mut req = self.inner.request(method, url);

        if !query.is_empty() {
            req = req.query(query);
        }

        if let Some(h) = headers {
            req = req.headers(h);
        }

        let response: reqwest::Response = match req.send().await {
            Ok(response) => response,
            Err(reqwest_middleware::Error::Reqwest(e)) => return Err(without_url(e)),
            Err(reqwest_middleware::Error::Middleware(e)) => {
                return Err(anyhow!(redact_urls(&format!("{:#}", e))));
            }
        };
        let status = response.status();

        if status.is_success() {
            let data = response.json::<T>().await.map_err(without_url)?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
            })
        }
    }

    /// `GET` shorthand.
    ///
    /// # Errors
    /// Same as `request`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        headers: Option<HeaderMap>,
    ) -> anyhow::Result<ApiResponse<T>> {
        self.request::<T>(Method::GET, url, query, headers).await
    }
}

/// Parses `base_url` and checks that endpoint segments can be appended to it.
///
/// # Errors
/// Fails on relative URLs and on URLs without a hierarchical path.
pub fn parse_base_url(base_url: &str) -> anyhow::Result<Url> {
    let url = Url::parse(base_url)?;
    if url.cannot_be_a_base() {
        return Err(anyhow!("base URL {} cannot carry a path", base_url));
    }
    Ok(url)
}
