//! CLI command handlers, one per file.

mod backoff;
mod config;
mod run;
mod signal;

pub use backoff::run_backoff;
pub use config::run_show_config;
pub use run::{run_transfers, RunOptions};
pub use signal::run_signal;
