//! # Data Ingestors Module
//!
//! The "front door" for tabular data entering the engine.
//!
//! ## Contained Modules:
//! - **`rows`**: the `RowSource` seam the scheduler fetches through, plus the
//!   rule that turns raw rows into a `Snapshot`.
//! - **`sheets_polling`**: a `RowSource` over the Google Sheets v4 values API
//!   (feature `retrieve`).

/// Row source seam and row parsing.
pub mod rows;

/// Google Sheets row source.
#[cfg(feature = "retrieve")]
pub mod sheets_polling;

pub use rows::{FetchError, RawRow, RowSource};
#[cfg(feature = "retrieve")]
pub use sheets_polling::{SheetsConfig, SheetsSource};
