//! Core types for vdisplay
//!
//! Value types shared by the registry, allocator, scanout engine and IPC layer.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

use crate::error::{DisplayError, Result};

/// Smallest accepted width/height
pub const MIN_DIMENSION: u32 = 64;
/// Largest accepted width/height
pub const MAX_DIMENSION: u32 = 16384;
/// Slowest accepted refresh rate in Hz
pub const MIN_REFRESH: u32 = 1;
/// Fastest accepted refresh rate in Hz
pub const MAX_REFRESH: u32 = 1000;
/// Refresh used when a create command omits it
pub const DEFAULT_REFRESH: u32 = 60;

/// A display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mode {
    /// Horizontal resolution in pixels
    pub width: u32,
    /// Vertical resolution in pixels
    pub height: u32,
    /// Refresh rate in Hz
    pub refresh: u32,
}

impl Mode {
    /// Create a mode without bounds checking
    pub const fn new(width: u32, height: u32, refresh: u32) -> Self {
        Self {
            width,
            height,
            refresh,
        }
    }

    /// Create a mode, rejecting out-of-range values
    pub fn validated(width: u32, height: u32, refresh: u32) -> Result<Self> {
        let mode = Self::new(width, height, refresh);
        mode.validate()?;
        Ok(mode)
    }

    /// Check dimensions and refresh against the accepted bounds
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [("width", self.width), ("height", self.height)] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                return Err(DisplayError::validation(format!(
                    "{} {} outside {}..={}",
                    label, value, MIN_DIMENSION, MAX_DIMENSION
                )));
            }
        }
        if !(MIN_REFRESH..=MAX_REFRESH).contains(&self.refresh) {
            return Err(DisplayError::validation(format!(
                "refresh {} outside {}..={}",
                self.refresh, MIN_REFRESH, MAX_REFRESH
            )));
        }
        Ok(())
    }

    /// Resolution as a tuple
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether two modes describe the same pixel dimensions
    pub fn same_size(&self, other: &Mode) -> bool {
        self.size() == other.size()
    }

    /// Mode name as advertised to clients, e.g. "1920x1080"
    pub fn name(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh)
    }
}

/// Opaque kernel framebuffer identifier, never zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FramebufferId(NonZeroU32);

impl FramebufferId {
    /// Wrap a raw ID, returning `None` for zero
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Get the raw ID
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl From<FramebufferId> for u32 {
    fn from(id: FramebufferId) -> Self {
        id.get()
    }
}

impl std::fmt::Display for FramebufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fb:{}", self.0)
    }
}

/// Which backend produced a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    /// GBM buffer with rendering + scanout usage, bound as a texture
    Gpu,
    /// Dumb buffer mapped into process memory
    Cpu,
}

impl std::fmt::Display for BufferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Activity state of a virtual output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Consumers are polling; composite normally
    #[default]
    Active,
    /// Nobody polled recently; compositing may be skipped
    Standby,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Standby => write!(f, "standby"),
        }
    }
}

/// Connection status reported for an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Connected,
    Disconnected,
    Unknown,
}

/// CRTC rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Rotation {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Snapshot of a virtual output for observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputInfo {
    /// Output name (e.g. "XR-0")
    pub name: String,
    /// Current width
    pub width: u32,
    /// Current height
    pub height: u32,
    /// Current refresh rate in Hz
    pub refresh: u32,
    /// Advertised modes, preferred first
    pub modes: Vec<Mode>,
    /// Published framebuffer ID (0 if never published)
    pub framebuffer_id: u32,
    /// Whether a live buffer backs the published ID
    pub has_buffer: bool,
    /// Backend of the live buffer
    pub buffer_kind: Option<BufferKind>,
    /// Activity state
    pub power: PowerState,
    /// AR mode flag
    pub ar_mode: bool,
    /// Seconds since the framebuffer ID was last read
    pub idle_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_bounds() {
        assert!(Mode::validated(64, 64, 1).is_ok());
        assert!(Mode::validated(16384, 16384, 1000).is_ok());
        assert!(Mode::validated(63, 1080, 60).is_err());
        assert!(Mode::validated(1920, 16385, 60).is_err());
        assert!(Mode::validated(1920, 1080, 0).is_err());
        assert!(Mode::validated(1920, 1080, 1001).is_err());
    }

    #[test]
    fn test_mode_display() {
        let mode = Mode::new(1920, 1080, 60);
        assert_eq!(mode.to_string(), "1920x1080@60");
        assert_eq!(mode.name(), "1920x1080");
    }

    #[test]
    fn test_framebuffer_id_rejects_zero() {
        assert!(FramebufferId::new(0).is_none());
        assert_eq!(FramebufferId::new(42).map(|id| id.get()), Some(42));
    }
}
