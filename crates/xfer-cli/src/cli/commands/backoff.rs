//! `xfer backoff` – print the retry delay schedule from config.

use xfer_core::config::XferConfig;

pub fn run_backoff(cfg: &XferConfig) {
    let policy = cfg.retry_policy();
    println!(
        "max attempts: {} (base {:?}, cap {:?})",
        policy.max_attempts, policy.base_delay, policy.max_delay
    );
    for (i, delay) in policy.schedule().iter().enumerate() {
        println!("  after attempt {}: wait {:?}", i + 1, delay);
    }
    println!("  after attempt {}: give up", policy.max_attempts);
}
