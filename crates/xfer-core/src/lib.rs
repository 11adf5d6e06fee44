pub mod config;
pub mod logging;

pub mod control;
pub mod error;
pub mod monitor;
pub mod observe;
pub mod registry;
pub mod retry;
pub mod scheduler;
