//! Configuration file loading
//!
//! Loads user configuration from `~/.config/vdisplay/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{DisplayError, Result};
use crate::types::DEFAULT_REFRESH;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Buffer backend settings
    #[serde(default)]
    pub device: DeviceSettings,

    /// Standby settings
    #[serde(default)]
    pub power: PowerSettings,

    /// Resize behavior
    #[serde(default)]
    pub resize: ResizeSettings,

    /// Manager endpoint settings
    #[serde(default)]
    pub manager: ManagerSettings,

    /// Outputs created at startup
    #[serde(default = "default_outputs")]
    pub outputs: Vec<OutputSettings>,
}

/// Buffer backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// DRM card node, or "software" for in-memory buffers
    #[serde(default = "default_device_path")]
    pub path: String,

    /// Try GPU-optimized buffers first
    #[serde(default = "default_true")]
    pub gpu_acceleration: bool,
}

/// Standby settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSettings {
    /// Seconds without a framebuffer read before standby
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Inactivity check period in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

/// Resize behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeSettings {
    /// "replace" or "atomic"
    #[serde(default = "default_resize_policy")]
    pub policy: String,
}

/// Manager endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Endpoint name, reserved as an output name
    #[serde(default = "default_manager_name")]
    pub name: String,
}

/// An output created at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_refresh")]
    pub refresh: u32,
}

fn default_device_path() -> String {
    "software".to_string()
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout() -> u64 {
    5
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_resize_policy() -> String {
    "replace".to_string()
}

fn default_manager_name() -> String {
    super::DEFAULT_MANAGER_NAME.to_string()
}

fn default_refresh() -> u32 {
    DEFAULT_REFRESH
}

fn default_outputs() -> Vec<OutputSettings> {
    vec![OutputSettings {
        name: "XR-0".to_string(),
        width: 1920,
        height: 1080,
        refresh: 60,
    }]
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            path: default_device_path(),
            gpu_acceleration: true,
        }
    }
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self {
            policy: default_resize_policy(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            name: default_manager_name(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("vdisplay").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("vdisplay")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/vdisplay/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default_with_outputs());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| DisplayError::config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| DisplayError::config(format!("Failed to parse config file: {}", e)))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default_with_outputs()
            }
        }
    }

    /// Defaults as they would be read from an empty file
    ///
    /// `Default` leaves `outputs` empty; an empty file gets the startup
    /// output `XR-0`.
    pub fn default_with_outputs() -> Self {
        Self {
            outputs: default_outputs(),
            ..Self::default()
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DisplayError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DisplayError::config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| DisplayError::config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Create a default config file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_path();
        if path.exists() {
            return Ok(false);
        }

        Self::default_with_outputs().save_to(path)?;
        Ok(true)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# vdisplay configuration

[device]
# DRM card node for buffers, or "software" for in-memory buffers
path = "software"

# Try GPU-optimized (GBM) buffers before CPU-mapped dumb buffers
gpu_acceleration = true

[power]
# Seconds without a FRAMEBUFFER_ID read before an output enters standby
idle_timeout_secs = 5

# How often the inactivity check runs, in milliseconds
tick_interval_ms = 1000

[resize]
# What a resize does when the new buffer cannot be allocated:
#   "replace" - release the old buffer first, keep the new mode, run without a buffer
#   "atomic"  - allocate first, keep the old buffer and mode on failure
policy = "replace"

[manager]
# Name of the control endpoint (cannot be used as an output name)
name = "VIRTUAL-MANAGER"

# Outputs created at startup
[[outputs]]
name = "XR-0"
width = 1920
height = 1080
refresh = 60
"#
    .to_string()
}
