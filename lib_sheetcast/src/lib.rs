//! # lib_sheetcast
//!
//! Change-detection and broadcast fan-out engine for a polled tabular source.
//! A scheduler fetches rows, the rows become a `Snapshot`, the snapshot is
//! diffed against the cached one and the resulting `ChangeSet` is pushed to
//! every connected subscriber.
//!
//! The `core` and `ingestors` folders are always built. HTTP retrieval and
//! the logging setup sit behind the `retrieve` and `loggers` features.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Snapshot store, diff engine, subscriber registry, dispatcher, hub and scheduler.
pub mod core;
/// Row source seam, row parsing and concrete sources.
pub mod ingestors;

/// Generic HTTP client with retry middleware.
#[cfg(feature = "retrieve")]
pub mod retrieve;

/// Tracing subscriber setup with console and rolling file output.
#[cfg(feature = "loggers")]
pub mod loggers;

// --- Public API Re-exports ---
pub use crate::core::diff::{diff, Change, ChangeSet};
pub use crate::core::dispatcher::{DeliveryReport, Dispatcher, WireMessage};
pub use crate::core::hub::Hub;
pub use crate::core::registry::{Channel, ChannelError, MpscChannel, Subscriber, SubscriberId, SubscriberRegistry};
pub use crate::core::scheduler::{CycleOutcome, RefreshScheduler, SchedulerState};
pub use crate::core::snapshot::{Snapshot, SnapshotStore};
pub use crate::ingestors::rows::{parse_row, parse_value, snapshot_from_rows, FetchError, RawRow, RowSource};
