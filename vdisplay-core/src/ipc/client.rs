//! IPC client for CLI commands
//!
//! Connects to the running daemon to send commands and receive responses.

use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::protocol::{IpcMessage, IpcResponse};
use super::socket_path;
use crate::display::DisplayStatus;
use crate::error::{DisplayError, Result};
use crate::types::OutputInfo;

/// Default connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// IPC client for communicating with the daemon
pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Connect to the daemon at the default socket path
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&socket_path(), CONNECT_TIMEOUT).await
    }

    /// Connect to a daemon at a specific socket path
    pub async fn connect_to(path: &Path, timeout: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(DisplayError::NotRunning);
        }

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| DisplayError::config("Connection timed out"))?
            .map_err(|e| DisplayError::config(format!("Failed to connect to daemon: {}", e)))?;

        debug!("Connected to daemon at {:?}", path);

        Ok(Self { stream })
    }

    /// Send a message and receive a response
    pub async fn send(&mut self, msg: IpcMessage) -> Result<IpcResponse> {
        let (reader, mut writer) = self.stream.split();

        tokio::time::timeout(IO_TIMEOUT, writer.write_all(&msg.to_bytes()))
            .await
            .map_err(|_| DisplayError::config("Write timed out"))?
            .map_err(|e| DisplayError::config(format!("Failed to send message: {}", e)))?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        tokio::time::timeout(IO_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| DisplayError::config("Read timed out"))?
            .map_err(|e| DisplayError::config(format!("Failed to read response: {}", e)))?;

        IpcResponse::from_bytes(line.trim().as_bytes())
            .map_err(|e| DisplayError::config(format!("Invalid response: {}", e)))
    }

    /// Send a command that answers with `Ok`
    async fn command(&mut self, msg: IpcMessage) -> Result<()> {
        match self.send(msg).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Ping the daemon to check if it's alive
    pub async fn ping(&mut self) -> Result<bool> {
        match self.send(IpcMessage::Ping).await {
            Ok(IpcResponse::Pong) => Ok(true),
            Ok(_) | Err(_) => Ok(false),
        }
    }

    /// Get the daemon status
    pub async fn status(&mut self) -> Result<DisplayStatus> {
        match self.send(IpcMessage::Status).await? {
            IpcResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// List virtual outputs
    pub async fn list(&mut self) -> Result<Vec<OutputInfo>> {
        match self.send(IpcMessage::List).await? {
            IpcResponse::Outputs { outputs } => Ok(outputs),
            other => Err(unexpected(other)),
        }
    }

    /// Create an output from a `"<name>:<w>:<h>[:<r>]"` payload
    pub async fn create(&mut self, payload: &str) -> Result<()> {
        self.command(IpcMessage::Create {
            payload: payload.to_string(),
        })
        .await
    }

    /// Delete an output
    pub async fn delete(&mut self, name: &str) -> Result<()> {
        self.command(IpcMessage::Delete {
            name: name.to_string(),
        })
        .await
    }

    /// Resize an output
    pub async fn resize(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        refresh: Option<u32>,
    ) -> Result<()> {
        self.command(IpcMessage::Resize {
            name: name.to_string(),
            width,
            height,
            refresh,
        })
        .await
    }

    /// Replace an output's mode list
    pub async fn set_modes(&mut self, name: &str, modes: &str) -> Result<()> {
        self.command(IpcMessage::SetModes {
            name: name.to_string(),
            modes: modes.to_string(),
        })
        .await
    }

    /// Set the AR mode flag
    pub async fn set_ar_mode(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.command(IpcMessage::SetArMode {
            name: name.to_string(),
            enabled,
        })
        .await
    }

    /// Read an output's framebuffer ID (counts as activity)
    pub async fn framebuffer(&mut self, name: &str) -> Result<u32> {
        match self
            .send(IpcMessage::Framebuffer {
                name: name.to_string(),
            })
            .await?
        {
            IpcResponse::Framebuffer { id } => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Request the daemon to stop
    pub async fn stop(&mut self) -> Result<()> {
        match self.send(IpcMessage::Stop).await? {
            IpcResponse::Stopping => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: IpcResponse) -> DisplayError {
    match response {
        IpcResponse::Error { message } => DisplayError::Daemon(message),
        other => DisplayError::Daemon(format!("Unexpected response: {:?}", other)),
    }
}
