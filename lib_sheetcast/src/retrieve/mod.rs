//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by the HTTP-backed row sources.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: an `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with exponential-backoff retries on transient
//!   failures.

/// Generic HTTP API client with retry middleware.
pub mod ky_http;
