//! Retry and backoff policy.
//!
//! Maps an attempt count and failure kind to either a backoff delay or a
//! terminal decision. Pure and deterministic so the scheduler engine and the
//! CLI `backoff` command share one source of truth.

mod policy;

pub use policy::{RetryDecision, RetryPolicy};
