//! IPC server for daemon mode
//!
//! Listens on a Unix socket. Each client is read on its own task, and every
//! parsed message is queued as a [`Request`] for the daemon's event loop,
//! which owns the [`VirtualDisplay`] and applies requests one at a time.
//! A slow or idle client only ever holds its own task.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::protocol::{IpcMessage, IpcResponse};
use super::socket_path;
use crate::display::VirtualDisplay;
use crate::error::{DisplayError, Result};
use crate::types::Mode;

/// A client that stays silent this long is dropped
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests waiting for the event loop before clients block on send
const QUEUE_DEPTH: usize = 64;

/// A client message waiting to be applied to the display
#[derive(Debug)]
pub struct Request {
    message: IpcMessage,
    reply: oneshot::Sender<IpcResponse>,
}

impl Request {
    /// Apply the message and answer the client
    ///
    /// Returns false if the daemon should stop.
    pub fn apply(self, display: &mut VirtualDisplay) -> bool {
        let (response, should_stop) = handle_message(display, self.message);
        if self.reply.send(response).is_err() {
            debug!("IPC client left before its reply");
        }
        !should_stop
    }
}

/// Receiving end of the request queue, drained by the daemon loop
pub type Requests = mpsc::Receiver<Request>;

/// IPC server that accepts client connections
pub struct IpcServer {
    /// Path to the Unix socket
    socket_path: PathBuf,
    /// Listener for incoming connections
    listener: UnixListener,
    /// Handed to every client task
    requests: mpsc::Sender<Request>,
}

impl IpcServer {
    /// Bind the default socket path
    pub fn bind() -> Result<(Self, Requests)> {
        Self::bind_to(socket_path())
    }

    /// Bind a specific socket path. Must be called inside a tokio runtime.
    ///
    /// Returns the server and the queue its clients feed.
    pub fn bind_to(path: impl Into<PathBuf>) -> Result<(Self, Requests)> {
        let socket_path = path.into();

        if socket_path.exists() {
            std::fs::remove_file(&socket_path).map_err(|e| {
                DisplayError::config(format!("Failed to remove old socket: {}", e))
            })?;
        }

        if let Some(parent) = socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DisplayError::config(format!("Failed to create socket directory: {}", e))
                })?;
            }
        }

        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            DisplayError::config(format!("Failed to bind socket at {:?}: {}", socket_path, e))
        })?;

        // Owner-only access
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&socket_path, permissions).map_err(|e| {
            DisplayError::config(format!("Failed to set socket permissions: {}", e))
        })?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

        info!("IPC server listening on {:?}", socket_path);
        Ok((
            Self {
                socket_path,
                listener,
                requests: tx,
            },
            rx,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }

    /// Wait for the next client
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        debug!("IPC client connected");
        Ok(stream)
    }

    /// Serve a client on its own task until it disconnects
    pub fn spawn_client(&self, stream: UnixStream) {
        tokio::spawn(serve_client(stream, self.requests.clone()));
    }

    /// Clean up the socket file
    pub fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            } else {
                debug!("Removed socket file {:?}", self.socket_path);
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Read one client's messages and relay them through the request queue
async fn serve_client(stream: UnixStream, requests: mpsc::Sender<Request>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(read) => read,
            Err(_) => {
                warn!("IPC client idle for {:?}, dropping it", READ_TIMEOUT);
                return;
            }
        };

        match read {
            Ok(0) => {
                debug!("IPC client disconnected");
                return;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let message = match IpcMessage::from_bytes(trimmed.as_bytes()) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Invalid IPC message: {}", e);
                        let response = IpcResponse::error(format!("Invalid message: {}", e));
                        if let Err(e) = writer.write_all(&response.to_bytes()).await {
                            error!("Failed to send IPC response: {}", e);
                            return;
                        }
                        continue;
                    }
                };

                // The loop exits as soon as it applies Stop, so answer first
                if message == IpcMessage::Stop {
                    if let Err(e) = writer.write_all(&IpcResponse::Stopping.to_bytes()).await {
                        error!("Failed to send IPC response: {}", e);
                    }
                    let (reply, _) = oneshot::channel();
                    if requests.send(Request { message, reply }).await.is_err() {
                        debug!("Daemon already stopping");
                    }
                    return;
                }

                let (reply, response) = oneshot::channel();
                if requests.send(Request { message, reply }).await.is_err() {
                    debug!("Daemon stopped, closing IPC client");
                    return;
                }
                let Ok(response) = response.await else {
                    debug!("Daemon stopped before replying");
                    return;
                };

                if let Err(e) = writer.write_all(&response.to_bytes()).await {
                    error!("Failed to send IPC response: {}", e);
                    return;
                }
            }
            Err(e) => {
                error!("Error reading from IPC client: {}", e);
                return;
            }
        }
    }
}

/// Apply one message. Returns (response, should_stop).
pub(crate) fn handle_message(display: &mut VirtualDisplay, msg: IpcMessage) -> (IpcResponse, bool) {
    let acknowledge = |result: Result<()>| match result {
        Ok(()) => IpcResponse::Ok,
        Err(e) => IpcResponse::error(e.to_string()),
    };

    let response = match msg {
        IpcMessage::Ping => IpcResponse::Pong,
        IpcMessage::Status => IpcResponse::Status(display.status()),
        IpcMessage::List => IpcResponse::Outputs {
            outputs: display.outputs(),
        },
        IpcMessage::Create { payload } => acknowledge(display.create_output(&payload)),
        IpcMessage::Delete { name } => acknowledge(display.delete_output(&name)),
        IpcMessage::Resize {
            name,
            width,
            height,
            refresh,
        } => {
            let result = display
                .registry()
                .get(&name)
                .map(|o| o.refresh())
                .ok_or_else(|| DisplayError::NotFound(name.clone()))
                .and_then(|current| {
                    let mode = Mode::new(width, height, refresh.unwrap_or(current));
                    display.resize_output(&name, mode).map(|_| ())
                });
            acknowledge(result)
        }
        IpcMessage::SetModes { name, modes } => {
            acknowledge(display.set_custom_modes(&name, &modes))
        }
        IpcMessage::SetArMode { name, enabled } => {
            acknowledge(display.set_ar_mode(&name, enabled))
        }
        IpcMessage::Framebuffer { name } => match display.read_framebuffer_id(&name) {
            Ok(id) => IpcResponse::Framebuffer { id },
            Err(e) => IpcResponse::error(e.to_string()),
        },
        IpcMessage::Stop => {
            info!("Received stop command via IPC");
            return (IpcResponse::Stopping, true);
        }
    };
    (response, false)
}
