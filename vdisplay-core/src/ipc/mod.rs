//! IPC for daemon mode
//!
//! Unix socket carrying newline-delimited JSON between the running
//! `vdisplay serve` daemon and the CLI commands.

mod client;
mod protocol;
mod server;

pub use client::IpcClient;
pub use protocol::{IpcMessage, IpcResponse};
pub use server::{IpcServer, Request, Requests};

use std::path::PathBuf;

/// Get the IPC socket path
///
/// Uses XDG_RUNTIME_DIR if available, otherwise /tmp
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("vdisplay.sock")
    } else {
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/vdisplay-{}.sock", uid))
    }
}

/// Check if the daemon is running by checking if the socket exists and is responsive
pub async fn daemon_running() -> bool {
    let path = socket_path();
    if !path.exists() {
        return false;
    }

    match IpcClient::connect().await {
        Ok(mut client) => matches!(client.ping().await, Ok(true)),
        Err(_) => false,
    }
}
