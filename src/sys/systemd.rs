// src/sys/systemd.rs
//
// Restart command synthesis for the services a PHP release depends on.
// Unit and config names are validated identifiers; the commands themselves
// are executed on the host through the runtime.

use crate::error::Result;
use crate::sys::safety::{escape_argument, validate_identifier};

/// `sudo systemctl restart <unit>`
pub fn restart_unit_command(unit: &str) -> Result<String> {
    let unit = validate_identifier(unit)?;
    Ok(format!("sudo systemctl restart {}", escape_argument(unit)))
}

/// `supervisorctl -c <dir>/<config> restart all`
pub fn supervisor_restart_command(config_dir: &str, config: &str) -> Result<String> {
    let config = validate_identifier(config)?;
    let path = format!("{}/{}", config_dir.trim_end_matches('/'), config);
    Ok(format!("supervisorctl -c {} restart all", escape_argument(&path)))
}
