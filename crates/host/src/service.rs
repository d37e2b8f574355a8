//! Systemd service integration
//!
//! Minimal sd-notify support: the host reports readiness, status lines and shutdown when it
//! runs as a `Type=notify` unit.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use std::path::Path;
use tracing::{debug, info};

/// Notify systemd that the monitor is running
pub fn notify_ready() -> Result<()> {
    if notify("READY=1")? {
        info!("Notified systemd: service ready");
    }
    Ok(())
}

/// Notify systemd that the shutdown sequence started
pub fn notify_stopping() -> Result<()> {
    if notify("STOPPING=1")? {
        info!("Notified systemd: service stopping");
    }
    Ok(())
}

/// Send a free-form status line
pub fn notify_status(status: &str) -> Result<()> {
    notify(&format!("STATUS={}", status))?;
    Ok(())
}

/// Whether the process runs under systemd with a notify socket
pub fn is_systemd() -> bool {
    env::var_os("NOTIFY_SOCKET").is_some()
}

/// Send `state` to `$NOTIFY_SOCKET`, returns false when not under systemd
fn notify(state: &str) -> Result<bool> {
    let Some(socket_path) = env::var_os("NOTIFY_SOCKET") else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
        return Ok(false);
    };
    send_to_socket(Path::new(&socket_path), state)?;
    Ok(true)
}

fn send_to_socket(socket_path: &Path, state: &str) -> Result<()> {
    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(state.as_bytes(), socket_path)
        .with_context(|| format!("Failed to send '{}' to systemd", state))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_functions_without_socket() {
        // When NOTIFY_SOCKET is not set, functions should succeed but do nothing
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }

        assert!(!is_systemd());
        assert!(notify_ready().is_ok());
        assert!(notify_status("scanning").is_ok());
        assert!(notify_stopping().is_ok());
    }

    #[test]
    fn test_datagram_reaches_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let listener = UnixDatagram::bind(&path).unwrap();

        send_to_socket(&path, "STATUS=2 scanners").unwrap();

        let mut buf = [0u8; 64];
        let len = listener.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"STATUS=2 scanners");
    }

    #[test]
    fn test_missing_socket_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(send_to_socket(&dir.path().join("absent.sock"), "READY=1").is_err());
    }
}
