//! Error types for vdisplay

use thiserror::Error;

/// Result type alias using DisplayError
pub type Result<T> = std::result::Result<T, DisplayError>;

/// Main error type for vdisplay operations
#[derive(Debug, Error)]
pub enum DisplayError {
    /// Malformed command or out-of-range value
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Output name already registered
    #[error("Output already exists: {0}")]
    AlreadyExists(String),

    /// Output name not registered
    #[error("Output not found: {0}")]
    NotFound(String),

    /// Buffer allocation, kernel import or surface binding failed
    #[error("Allocation error: {0}")]
    Allocation(String),

    /// Failed to announce a change to protocol listeners
    #[error("Notification error: {0}")]
    Notification(String),

    /// Host object model refused an operation
    #[error("Host error: {0}")]
    Host(String),

    /// Kernel modesetting error
    #[error("DRM error: {0}")]
    Drm(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Request rejected by the daemon
    #[error("Daemon error: {0}")]
    Daemon(String),

    /// No daemon listening on the control socket
    #[error("vdisplay daemon is not running")]
    NotRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DisplayError>,
    },
}

/// Coarse classification used by callers deciding whether state was touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation
    Validation,
    /// Buffer, import or bind failure
    Allocation,
    /// Listener notification failure (best effort)
    Notification,
    /// Anything else
    Other,
}

impl DisplayError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an allocation error
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a host error
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    /// Create a DRM error
    pub fn drm(msg: impl Into<String>) -> Self {
        Self::Drm(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through context wrappers
    pub fn root(&self) -> &DisplayError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Validation(_) | Self::AlreadyExists(_) | Self::NotFound(_) => {
                ErrorKind::Validation
            }
            Self::Allocation(_) | Self::Drm(_) => ErrorKind::Allocation,
            Self::Notification(_) => ErrorKind::Notification,
            _ => ErrorKind::Other,
        }
    }

    /// Suggestion for the user, if one applies
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Validation(_) => Some(
                "Commands look like <name>:<width>:<height>[:<refresh>] with sizes in 64..=16384 and refresh in 1..=1000",
            ),
            Self::AlreadyExists(_) => Some("Delete the existing output first or pick another name"),
            Self::NotFound(_) => Some("Run 'vdisplay list' to see the registered outputs"),
            Self::Drm(_) => Some(
                "Check that the DRM device exists and that your user is in the 'video' group",
            ),
            Self::Config(_) => Some("Check ~/.config/vdisplay/config.toml for syntax errors"),
            Self::NotRunning => Some("Start it with 'vdisplay serve'"),
            _ => None,
        }
    }

    /// Whether the user can fix this without code changes
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Validation(_)
                | Self::AlreadyExists(_)
                | Self::NotFound(_)
                | Self::Drm(_)
                | Self::Config(_)
                | Self::NotRunning
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<toml::de::Error> for DisplayError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
