//! Output attributes exposed through the host's property mechanism

use serde::{Deserialize, Serialize};

/// Manager endpoint: write `"<name>:<w>:<h>[:<r>]"` to create an output
pub const CREATE_OUTPUT: &str = "CREATE_VIRTUAL_OUTPUT";
/// Manager endpoint: write `"<name>"` to delete an output
pub const DELETE_OUTPUT: &str = "DELETE_VIRTUAL_OUTPUT";
/// Marks outputs that must not be offered as desktop monitors
pub const NON_DESKTOP: &str = "non-desktop";

/// Value carried by a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Integer(i64),
    Bool(bool),
    Text(String),
}

impl PropertyValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            // Integer-typed flags (0/1) are common on the wire
            Self::Integer(v) => Some(*v != 0),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{:?}", v),
        }
    }
}

/// Per-output attributes of a virtual output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputProperty {
    /// Kernel framebuffer ID of the off-screen buffer (reading is a keep-alive)
    FramebufferId,
    /// Width in pixels (write to resize)
    Width,
    /// Height in pixels (write to resize)
    Height,
    /// Refresh rate in Hz (write to change)
    Refresh,
    /// `"<w>:<h>:<r>|..."` replacing the advertised mode list
    CustomModes,
    /// Always true on virtual outputs
    VirtualMarker,
    /// AR mode flag
    ArMode,
}

impl OutputProperty {
    /// Every per-output property, in registration order
    pub const ALL: [OutputProperty; 7] = [
        Self::FramebufferId,
        Self::Width,
        Self::Height,
        Self::Refresh,
        Self::CustomModes,
        Self::VirtualMarker,
        Self::ArMode,
    ];

    /// Wire name of the property
    pub fn name(&self) -> &'static str {
        match self {
            Self::FramebufferId => "FRAMEBUFFER_ID",
            Self::Width => "WIDTH",
            Self::Height => "HEIGHT",
            Self::Refresh => "REFRESH",
            Self::CustomModes => "CUSTOM_MODES",
            Self::VirtualMarker => "VIRTUAL_OUTPUT",
            Self::ArMode => "AR_MODE",
        }
    }

    /// Whether clients may write this property
    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::FramebufferId | Self::VirtualMarker)
    }
}

impl std::str::FromStr for OutputProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("Unknown property: {}", s))
    }
}

impl std::fmt::Display for OutputProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
