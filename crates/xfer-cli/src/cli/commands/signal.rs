//! `xfer pause | resume | cancel | network | ...` – forward a command to the
//! control socket of a running `xfer run`.

use anyhow::Result;

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_signal(cmd: &ControlCommand) -> Result<()> {
    let path = xfer_core::control::default_control_socket_path()?;
    control_socket::send_command(&path, cmd).await?;
    tracing::debug!(command = %cmd, path = %path.display(), "control command sent");
    println!("Sent '{cmd}'");
    Ok(())
}
