//! Configuration types for vdisplay
//!
//! [`DisplayConfig`] is the runtime configuration; [`ConfigFile`] is its
//! on-disk TOML form.

mod file;

pub use file::{
    ConfigFile, DeviceSettings, ManagerSettings, OutputSettings, PowerSettings, ResizeSettings,
    sample_config,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::command::validate_name;
use crate::error::{DisplayError, Result};
use crate::types::Mode;

/// Name of the manager endpoint unless configured otherwise
pub const DEFAULT_MANAGER_NAME: &str = "VIRTUAL-MANAGER";
/// Idle time after which an output enters standby
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
/// Period of the inactivity check
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What a resize does when the new buffer cannot be allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResizePolicy {
    /// Release the old buffer first; on failure keep the new mode, leave the
    /// old framebuffer ID published and run without a buffer
    #[default]
    Replace,
    /// Allocate first and swap; on failure keep the old buffer and mode
    Atomic,
}

impl std::fmt::Display for ResizePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Atomic => write!(f, "atomic"),
        }
    }
}

impl std::str::FromStr for ResizePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" | "legacy" => Ok(Self::Replace),
            "atomic" | "swap" => Ok(Self::Atomic),
            _ => Err(format!("Unknown resize policy: {}", s)),
        }
    }
}

/// An output to create at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupOutput {
    pub name: String,
    pub mode: Mode,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    /// DRM card node; `None` selects the in-memory backends
    pub device: Option<PathBuf>,
    /// Try GPU-optimized buffers before dumb buffers
    pub gpu_acceleration: bool,
    /// Idle time before standby
    pub idle_timeout: Duration,
    /// Period of the inactivity check
    pub tick_interval: Duration,
    /// Failed-resize behavior
    pub resize_policy: ResizePolicy,
    /// Manager endpoint name (reserved as an output name)
    pub manager_name: String,
    /// Outputs created at startup
    pub outputs: Vec<StartupOutput>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            device: None,
            gpu_acceleration: true,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            resize_policy: ResizePolicy::default(),
            manager_name: DEFAULT_MANAGER_NAME.to_string(),
            outputs: Vec::new(),
        }
    }
}

impl DisplayConfig {
    /// Use a DRM card instead of the in-memory backends
    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Enable or disable GPU-optimized buffers
    pub fn with_gpu_acceleration(mut self, enabled: bool) -> Self {
        self.gpu_acceleration = enabled;
        self
    }

    /// Set the standby threshold
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the inactivity check period
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the failed-resize behavior
    pub fn with_resize_policy(mut self, policy: ResizePolicy) -> Self {
        self.resize_policy = policy;
        self
    }

    /// Rename the manager endpoint
    pub fn with_manager_name(mut self, name: impl Into<String>) -> Self {
        self.manager_name = name.into();
        self
    }

    /// Add an output to create at startup
    pub fn with_output(mut self, name: impl Into<String>, mode: Mode) -> Self {
        self.outputs.push(StartupOutput {
            name: name.into(),
            mode,
        });
        self
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(DisplayError::config("idle timeout must be positive"));
        }
        if self.tick_interval.is_zero() {
            return Err(DisplayError::config("tick interval must be positive"));
        }
        validate_name(&self.manager_name)
            .map_err(|e| DisplayError::config(format!("manager name: {}", e)))?;

        let mut seen = HashSet::new();
        for output in &self.outputs {
            validate_name(&output.name)
                .and_then(|_| output.mode.validate())
                .map_err(|e| DisplayError::config(format!("output {}: {}", output.name, e)))?;
            if output.name == self.manager_name {
                return Err(DisplayError::config(format!(
                    "output {} uses the manager's name",
                    output.name
                )));
            }
            if !seen.insert(output.name.as_str()) {
                return Err(DisplayError::config(format!(
                    "output {} listed twice",
                    output.name
                )));
            }
        }
        Ok(())
    }

    /// Build from a parsed config file
    pub fn from_file(file: &ConfigFile) -> Result<Self> {
        let resize_policy = file
            .resize
            .policy
            .parse::<ResizePolicy>()
            .map_err(DisplayError::config)?;

        let device = match file.device.path.trim() {
            "" | "software" => None,
            path => Some(PathBuf::from(path)),
        };

        let config = Self {
            device,
            gpu_acceleration: file.device.gpu_acceleration,
            idle_timeout: Duration::from_secs(file.power.idle_timeout_secs),
            tick_interval: Duration::from_millis(file.power.tick_interval_ms),
            resize_policy,
            manager_name: file.manager.name.clone(),
            outputs: file
                .outputs
                .iter()
                .map(|o| StartupOutput {
                    name: o.name.clone(),
                    mode: Mode::new(o.width, o.height, o.refresh),
                })
                .collect(),
        };
        config.validate()?;
        Ok(config)
    }
}
