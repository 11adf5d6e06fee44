//! `xfer config` – show where the config lives and what is in effect.

use anyhow::{Context, Result};
use xfer_core::config::{self, XferConfig};

pub fn run_show_config(cfg: &XferConfig) -> Result<()> {
    let path = config::config_path()?;
    println!("config: {}", path.display());
    if let Ok(log) = xfer_core::logging::log_file_path() {
        println!("log:    {}", log.display());
    }
    if let Ok(sock) = xfer_core::control::default_control_socket_path() {
        println!("socket: {}", sock.display());
    }

    // Print optional sections with their effective defaults filled in.
    let effective = XferConfig {
        retry: Some(cfg.retry.clone().unwrap_or_default()),
        retention: Some(cfg.retention()),
        ..cfg.clone()
    };
    let text = toml::to_string_pretty(&effective).context("serialize config")?;
    println!();
    print!("{text}");
    Ok(())
}
