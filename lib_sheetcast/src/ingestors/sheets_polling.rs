//! # Google Sheets Row Source
//!
//! Fetches a cell range through the Sheets v4 `values.get` endpoint:
//!
//! `GET {api_base}spreadsheets/{spreadsheet_id}/values/{range}`
//!
//! ## Credentials
//!
//! - An API key travels as the `key` query parameter. A public sheet only
//!   needs the key.
//! - A bearer token comes either from a pre-issued OAuth access token or
//!   from a service-account key file. Service-account tokens are minted and
//!   refreshed through `gcp_auth`, so a private sheet keeps working past the
//!   lifetime of any single token.
//!
//! The endpoint returns `{"range": ..., "majorDimension": "ROWS", "values": [[...], ...]}`.
//! A missing `values` field means the range is empty. Cells normally arrive
//! as formatted strings; numbers and booleans are stringified so they go
//! through the same parsing rule as everything else.

use std::path::PathBuf;
use std::time::Duration;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::ingestors::rows::{FetchError, RawRow, RowSource};
use crate::retrieve::ky_http::{parse_base_url, ApiClient};

/// Default Sheets API root.
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4/";
/// Default range: first two columns of the first sheet.
pub const DEFAULT_RANGE: &str = "Sheet1!A:B";
/// Read-only scope requested for service-account tokens.
pub const SHEETS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

/// Where and how to read the sheet.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// API root, normally `DEFAULT_API_BASE`.
    pub api_base: String,
    /// Spreadsheet identifier from the sheet's URL.
    pub spreadsheet_id: String,
    /// A1-notation range, e.g. `Sheet1!A:B`.
    pub range: String,
    /// API key sent as the `key` query parameter.
    pub api_key: Option<String>,
    /// OAuth access token sent as a bearer header.
    pub access_token: Option<String>,
    /// Service-account key file (JSON) used to mint bearer tokens.
    pub credentials_path: Option<PathBuf>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries on transient failures.
    pub max_retries: u32,
}

impl SheetsConfig {
    /// Configuration for `spreadsheet_id` with every other field defaulted.
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            range: DEFAULT_RANGE.to_string(),
            api_key: None,
            access_token: None,
            credentials_path: None,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Checks everything that can be checked without touching the network
    /// or the filesystem.
    ///
    /// # Errors
    /// `FetchError::Config` for a blank spreadsheet id, an API base that is
    /// not an absolute URL, or both bearer credentials set at once.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(FetchError::Config("spreadsheet id is empty".to_string()));
        }
        parse_base_url(&self.api_base)
            .map_err(|e| FetchError::Config(format!("invalid API base {:?}: {:#}", self.api_base, e)))?;
        if self.access_token.is_some() && self.credentials_path.is_some() {
            return Err(FetchError::Config(
                "access token and service-account credentials are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of the bearer credential attached to each fetch.
enum BearerAuth {
    None,
    Static(String),
    ServiceAccount(CustomServiceAccount),
}

impl BearerAuth {
    fn from_config(config: &SheetsConfig) -> Result<Self, FetchError> {
        match (&config.credentials_path, &config.access_token) {
            (Some(path), _) => CustomServiceAccount::from_file(path)
                .map(BearerAuth::ServiceAccount)
                .map_err(|e| {
                    FetchError::Config(format!("failed to load service account {}: {}", path.display(), e))
                }),
            (None, Some(token)) => Ok(BearerAuth::Static(token.clone())),
            (None, None) => Ok(BearerAuth::None),
        }
    }

    /// Current bearer token. Service-account tokens are cached by
    /// `gcp_auth` and refreshed shortly before they expire.
    async fn token(&self) -> Result<Option<String>, FetchError> {
        match self {
            BearerAuth::None => Ok(None),
            BearerAuth::Static(token) => Ok(Some(token.clone())),
            BearerAuth::ServiceAccount(account) => account
                .token(&[SHEETS_READONLY_SCOPE])
                .await
                .map(|token| Some(token.as_str().to_string()))
                .map_err(|e| FetchError::Auth(e.to_string())),
        }
    }

    fn headers(token: Option<String>) -> Result<Option<HeaderMap>, FetchError> {
        let Some(token) = token else {
            return Ok(None);
        };
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| FetchError::Auth("bearer token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Some(headers))
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn into_rows(range: ValueRange) -> Vec<RawRow> {
    range
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

/// # Sheets Source
pub struct SheetsSource {
    client: ApiClient,
    auth: BearerAuth,
    spreadsheet_id: String,
    range: String,
    api_key: Option<String>,
}

impl SheetsSource {
    /// Builds the source, loading the service-account key file if one is
    /// configured.
    ///
    /// # Errors
    /// `FetchError::Config` when `SheetsConfig::validate` fails, the HTTP
    /// client can not be built, or the key file can not be loaded.
    pub fn new(config: SheetsConfig) -> Result<Self, FetchError> {
        config.validate()?;
        let auth = BearerAuth::from_config(&config)?;
        let client = ApiClient::new(&config.api_base, config.max_retries, config.timeout)
            .map_err(|e| FetchError::Config(format!("{:#}", e)))?;

        Ok(Self {
            client,
            auth,
            spreadsheet_id: config.spreadsheet_id,
            range: config.range,
            api_key: config.api_key,
        })
    }

    /// Replaces every occurrence of the API key in `text`.
    fn scrub(&self, text: String) -> String {
        match &self.api_key {
            Some(key) if !key.is_empty() => text.replace(key.as_str(), "[redacted]"),
            _ => text,
        }
    }
}

impl RowSource for SheetsSource {
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, FetchError> {
        let url = self
            .client
            .endpoint(&["spreadsheets", &self.spreadsheet_id, "values", &self.range])
            .map_err(|e| FetchError::Config(format!("{:#}", e)))?;

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(key) = &self.api_key {
            query.push(("key", key.as_str()));
        }

        let headers = BearerAuth::headers(self.auth.token().await?)?;

        let response = self
            .client
            .get_json::<ValueRange>(url, &query, headers)
            .await
            .map_err(|e| FetchError::Transport(self.scrub(format!("{:#}", e))))?;

        if !response.success {
            return Err(FetchError::Http {
                status: response.status,
                body: self.scrub(response.error_body.unwrap_or_default()),
            });
        }

        let range = response
            .data
            .ok_or_else(|| FetchError::Decode("empty response body".to_string()))?;
        let rows = into_rows(range);
        debug!(rows = rows.len(), "Fetched sheet rows");
        Ok(rows)
    }
}
