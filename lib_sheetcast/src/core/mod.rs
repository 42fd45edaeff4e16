//! # Core Engine Module
//!
//! The pieces that turn a stream of fetched snapshots into a stream of
//! minimal updates for every connected subscriber.
//!
//! ## Core Components:
//!
//! - **`snapshot`**: the cached item-name to value mapping and the store that
//!   swaps it atomically.
//! - **`diff`**: pure comparison of two snapshots into a `ChangeSet`.
//! - **`registry`**: the live set of subscriber channels.
//! - **`dispatcher`**: wire encoding and best-effort fan-out.
//! - **`hub`**: the single writer that ties store, registry and dispatcher
//!   together and linearizes connects against publishes.
//! - **`scheduler`**: the non-reentrant fetch, diff and broadcast cycle.

/// Cached snapshot and its atomic-replace store.
pub mod snapshot;
/// Pure snapshot comparison.
pub mod diff;
/// Live subscriber channels.
pub mod registry;
/// Wire encoding and fan-out.
pub mod dispatcher;
/// Single-writer coordinator for the snapshot and the subscribers.
pub mod hub;
/// Periodic refresh cycles.
pub mod scheduler;
