//! tally-daemon: watch loop for the Tally receipt pipeline.
//!
//! This crate provides:
//! - A debounced, duplicate-suppressing inbox watcher
//! - Configuration loading for the `tallyd` binary
//! - The dispatch loop connecting arrivals to the extraction pipeline

pub mod config;
pub mod run;
pub mod watcher;

// Re-exports for convenience
pub use config::{default_config_path, load_config, Config};
pub use run::run_loop;
pub use watcher::{ReceiptWatcher, MIN_SETTLE_DELAY, RECEIPT_EXTENSIONS};
