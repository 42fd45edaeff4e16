//! # Rows
//!
//! What a fetch returns and how it becomes a `Snapshot`.
//!
//! A row is accepted when it has at least two cells, its first cell is a
//! non-blank name, and its second cell is a finite number once the first
//! decimal comma has been turned into a point (`"2,75"` is `2.75`). Anything
//! else is dropped without error; the drop is visible at `trace` level only.

use std::future::Future;

use thiserror::Error;
use tracing::trace;

use crate::core::snapshot::Snapshot;

/// Cells of one source row, in column order.
pub type RawRow = Vec<String>;

/// Errors that abort a single fetch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The source answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Numeric status code.
        status: u16,
        /// Error body returned by the source, possibly empty.
        body: String,
    },

    /// The request could not be completed (DNS, TLS, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The source is not configured well enough to be queried.
    #[error("Source configuration error: {0}")]
    Config(String),

    /// No bearer token could be obtained for this fetch.
    #[error("Authorization error: {0}")]
    Auth(String),
}

/// # Row Source
///
/// The external fetch collaborator. A timeout policy, if any, belongs to the
/// implementation; the scheduler never cancels a fetch.
pub trait RowSource: Send + Sync {
    /// Fetches every row of the source.
    fn fetch_rows(&self) -> impl Future<Output = Result<Vec<RawRow>, FetchError>> + Send;
}

/// Parses one raw cell as a value.
///
/// Surrounding whitespace is ignored and the first `,` is read as the
/// decimal separator. Returns `None` for anything that is not a finite
/// number.
pub fn parse_value(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replacen(',', ".", 1);
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

/// Parses one row into `(name, value)`, or `None` if the row is rejected.
pub fn parse_row(cells: &[String]) -> Option<(String, f64)> {
    let [name, value, ..] = cells else {
        return None;
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = parse_value(value)?;
    Some((name.to_string(), value))
}

/// Builds a snapshot from fetched rows. On a repeated name the later row
/// wins.
pub fn snapshot_from_rows<I>(rows: I) -> Snapshot
where
    I: IntoIterator<Item = RawRow>,
{
    let mut snapshot = Snapshot::new();
    for row in rows {
        match parse_row(&row) {
            Some((name, value)) => {
                snapshot.insert(name, value);
            }
            None => trace!(cells = row.len(), "Row excluded from snapshot"),
        }
    }
    snapshot
}
