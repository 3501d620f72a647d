//! IPC protocol definitions
//!
//! Defines the message types used for communication between the daemon and CLI.

use serde::{Deserialize, Serialize};

use crate::display::DisplayStatus;
use crate::types::OutputInfo;

/// Messages that can be sent to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    /// Check if daemon is alive
    Ping,
    /// Request daemon status
    Status,
    /// List virtual outputs
    List,
    /// `CREATE_VIRTUAL_OUTPUT` payload, `"<name>:<w>:<h>[:<r>]"`
    Create { payload: String },
    /// `DELETE_VIRTUAL_OUTPUT` payload
    Delete { name: String },
    /// Change an output's mode; refresh defaults to the current one
    Resize {
        name: String,
        width: u32,
        height: u32,
        refresh: Option<u32>,
    },
    /// Replace the mode list, `"<w>:<h>:<r>|..."`
    SetModes { name: String, modes: String },
    /// Set the AR mode flag
    SetArMode { name: String, enabled: bool },
    /// Read `FRAMEBUFFER_ID` (counts as activity)
    Framebuffer { name: String },
    /// Stop the daemon gracefully
    Stop,
}

/// Responses from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Simple acknowledgment
    Ok,
    /// Pong response to ping
    Pong,
    /// Error response
    Error { message: String },
    /// Status response
    Status(DisplayStatus),
    /// Output listing
    Outputs { outputs: Vec<OutputInfo> },
    /// Published framebuffer ID (0 if none)
    Framebuffer { id: u32 },
    /// Shutdown acknowledgment
    Stopping,
}

impl IpcMessage {
    /// Serialize message to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl IpcResponse {
    /// Serialize response to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize response from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        IpcResponse::Error {
            message: message.into(),
        }
    }
}
