/// Console plus rolling JSON file logging built on `tracing`.
pub mod loggerlocal;

pub use loggerlocal::{prune_logs, setup_logging};
