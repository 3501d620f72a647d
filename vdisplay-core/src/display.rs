//! Driver facade
//!
//! [`VirtualDisplay`] ties the registry, the manager endpoint and the power
//! controller together and is the single entry point the host (or the
//! daemon) drives. Per-output calls are dispatched on [`OutputRef`].

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::allocator::FramebufferAllocator;
use crate::backend::Backends;
use crate::command::{format_mode_list, parse_mode_list};
use crate::config::{DisplayConfig, ResizePolicy};
use crate::error::{DisplayError, Result, ResultExt};
use crate::host::{DisplayHost, HeadlessHost, OutputHandle};
use crate::manager::ManagerEndpoint;
use crate::power::PowerController;
use crate::properties::{CREATE_OUTPUT, DELETE_OUTPUT, OutputProperty, PropertyValue};
use crate::registry::{OutputKey, Registry, ResizeOutcome};
use crate::types::{Connection, Mode, OutputInfo, Rotation};

/// Which kind of output a host call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRef {
    /// Output the host drives itself
    Regular(OutputHandle),
    /// Registered virtual output
    Virtual(OutputKey),
    /// The manager endpoint
    Manager,
}

/// Daemon status summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayStatus {
    /// Manager endpoint name
    pub manager: String,
    /// Number of virtual outputs
    pub outputs: usize,
    /// Buffer backends in use
    pub backend: String,
    /// Failed-resize behavior
    pub resize_policy: ResizePolicy,
    /// Standby threshold in seconds
    pub idle_timeout_secs: f64,
    /// Seconds since startup
    pub uptime_secs: u64,
}

/// The virtual display subsystem
pub struct VirtualDisplay {
    registry: Registry,
    manager: Option<ManagerEndpoint>,
    power: PowerController,
    started: Instant,
}

impl VirtualDisplay {
    /// Bring the subsystem up and create the configured startup outputs
    pub fn new(config: &DisplayConfig, backends: Backends, mut host: Box<dyn DisplayHost>) -> Result<Self> {
        config.validate()?;

        let manager = ManagerEndpoint::create(host.as_mut(), &config.manager_name)
            .context("Registering manager endpoint")?;
        let allocator = FramebufferAllocator::new(backends);
        info!(
            "Virtual display up ({}, resize policy {})",
            allocator.describe(),
            config.resize_policy
        );

        let mut display = Self {
            registry: Registry::new(host, allocator, config.resize_policy),
            manager: Some(manager),
            power: PowerController::new(config.idle_timeout),
            started: Instant::now(),
        };

        for output in &config.outputs {
            if let Err(e) = display.registry.create(&output.name, output.mode) {
                warn!("Startup output {} not created: {}", output.name, e);
            }
        }

        Ok(display)
    }

    /// In-process host with backends chosen by the configuration
    pub fn headless(config: &DisplayConfig) -> Result<Self> {
        let backends = match &config.device {
            Some(path) => Backends::open(path, config.gpu_acceleration)?,
            None => Backends::software(config.gpu_acceleration),
        };
        Self::new(config, backends, Box::new(HeadlessHost::new()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn power(&self) -> &PowerController {
        &self.power
    }

    /// Manager endpoint name
    pub fn manager_name(&self) -> Option<&str> {
        self.manager.as_ref().map(|m| m.name())
    }

    /// Classify a host output object
    pub fn resolve(&self, handle: OutputHandle) -> OutputRef {
        if self.manager.as_ref().is_some_and(|m| m.handle() == handle) {
            return OutputRef::Manager;
        }
        match self.registry.key_for_handle(handle) {
            Some(key) => OutputRef::Virtual(key),
            None => OutputRef::Regular(handle),
        }
    }

    /// Look up a virtual output or the manager endpoint by name
    pub fn output_ref(&self, name: &str) -> Option<OutputRef> {
        if self.manager_name() == Some(name) {
            return Some(OutputRef::Manager);
        }
        self.registry.key(name).map(OutputRef::Virtual)
    }

    fn virtual_ref(&self, name: &str) -> Result<OutputKey> {
        self.registry
            .key(name)
            .ok_or_else(|| DisplayError::NotFound(name.to_string()))
    }

    /// Connection status
    pub fn detect(&self, output: OutputRef) -> Connection {
        match output {
            OutputRef::Regular(handle) => self.registry.host().physical_connection(handle),
            OutputRef::Virtual(key) => match self.registry.by_key(key) {
                Some(_) => Connection::Connected,
                None => Connection::Disconnected,
            },
            OutputRef::Manager => self
                .manager
                .as_ref()
                .map_or(Connection::Disconnected, |m| m.detect()),
        }
    }

    /// Advertised modes
    pub fn modes(&self, output: OutputRef) -> Vec<Mode> {
        match output {
            OutputRef::Regular(handle) => self.registry.host().physical_modes(handle),
            OutputRef::Virtual(key) => self
                .registry
                .by_key(key)
                .map(|o| o.modes().to_vec())
                .unwrap_or_default(),
            OutputRef::Manager => Vec::new(),
        }
    }

    /// Property write from a client
    pub fn set_property(
        &mut self,
        output: OutputRef,
        property: &str,
        value: PropertyValue,
    ) -> Result<()> {
        match output {
            OutputRef::Regular(handle) => Err(DisplayError::Unsupported(format!(
                "{} on regular output {:?} belongs to the host",
                property, handle
            ))),
            OutputRef::Manager => match &self.manager {
                Some(manager) => manager.handle_write(&mut self.registry, property, &value),
                None => Err(DisplayError::Unsupported("manager endpoint is gone".to_string())),
            },
            OutputRef::Virtual(key) => self.set_virtual_property(key, property, value),
        }
    }

    fn set_virtual_property(
        &mut self,
        key: OutputKey,
        property: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let property = property
            .parse::<OutputProperty>()
            .map_err(DisplayError::validation)?;
        let output = self
            .registry
            .by_key(key)
            .ok_or_else(|| DisplayError::NotFound(format!("{:?}", key)))?;
        let name = output.name().to_string();
        let current = output.mode();

        if !property.is_writable() {
            return Err(DisplayError::validation(format!("{} is read-only", property)));
        }

        let integer = || -> Result<u32> {
            value
                .as_integer()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    DisplayError::validation(format!("{} takes a positive integer, got {}", property, value))
                })
        };

        match property {
            OutputProperty::Width => {
                let mode = Mode::new(integer()?, current.height, current.refresh);
                self.registry.resize(&name, mode).map(|_| ())
            }
            OutputProperty::Height => {
                let mode = Mode::new(current.width, integer()?, current.refresh);
                self.registry.resize(&name, mode).map(|_| ())
            }
            OutputProperty::Refresh => {
                let mode = Mode::new(current.width, current.height, integer()?);
                self.registry.resize(&name, mode).map(|_| ())
            }
            OutputProperty::CustomModes => {
                let payload = value.as_text().ok_or_else(|| {
                    DisplayError::validation(format!("{} takes a string", property))
                })?;
                let modes = parse_mode_list(payload)?;
                self.registry.set_modes(&name, modes)
            }
            OutputProperty::ArMode => {
                let enabled = value.as_bool().ok_or_else(|| {
                    DisplayError::validation(format!("{} takes a boolean", property))
                })?;
                self.registry.set_ar_mode(&name, enabled)
            }
            OutputProperty::FramebufferId | OutputProperty::VirtualMarker => {
                Err(DisplayError::validation(format!("{} is read-only", property)))
            }
        }
    }

    /// Property read from a client
    pub fn get_property(&mut self, output: OutputRef, property: &str) -> Result<PropertyValue> {
        self.get_property_at(output, property, Instant::now())
    }

    /// Property read at a given time; a `FRAMEBUFFER_ID` read is a keep-alive
    pub fn get_property_at(
        &mut self,
        output: OutputRef,
        property: &str,
        now: Instant,
    ) -> Result<PropertyValue> {
        match output {
            OutputRef::Regular(handle) => Err(DisplayError::Unsupported(format!(
                "{} on regular output {:?} belongs to the host",
                property, handle
            ))),
            OutputRef::Manager => match property {
                CREATE_OUTPUT | DELETE_OUTPUT => Ok(PropertyValue::Text(String::new())),
                crate::properties::NON_DESKTOP => Ok(PropertyValue::Bool(true)),
                other => Err(DisplayError::validation(format!(
                    "manager endpoint has no property {}",
                    other
                ))),
            },
            OutputRef::Virtual(key) => {
                let property = property
                    .parse::<OutputProperty>()
                    .map_err(DisplayError::validation)?;
                let power = self.power;
                let output = self
                    .registry
                    .by_key_mut(key)
                    .ok_or_else(|| DisplayError::NotFound(format!("{:?}", key)))?;
                if property == OutputProperty::FramebufferId {
                    power.record_access(output, now);
                }
                Ok(output.property(property))
            }
        }
    }

    /// `CREATE_VIRTUAL_OUTPUT` write
    pub fn create_output(&mut self, payload: &str) -> Result<()> {
        self.set_property(
            OutputRef::Manager,
            CREATE_OUTPUT,
            PropertyValue::Text(payload.to_string()),
        )
    }

    /// `DELETE_VIRTUAL_OUTPUT` write
    pub fn delete_output(&mut self, name: &str) -> Result<()> {
        self.set_property(
            OutputRef::Manager,
            DELETE_OUTPUT,
            PropertyValue::Text(name.to_string()),
        )
    }

    /// Resize an output to a new mode
    pub fn resize_output(&mut self, name: &str, mode: Mode) -> Result<ResizeOutcome> {
        self.registry.resize(name, mode)
    }

    /// `CUSTOM_MODES` write
    pub fn set_custom_modes(&mut self, name: &str, payload: &str) -> Result<()> {
        let key = self.virtual_ref(name)?;
        self.set_property(
            OutputRef::Virtual(key),
            OutputProperty::CustomModes.name(),
            PropertyValue::Text(payload.to_string()),
        )
    }

    /// `AR_MODE` write
    pub fn set_ar_mode(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.registry.set_ar_mode(name, enabled)
    }

    /// `FRAMEBUFFER_ID` read (keep-alive)
    pub fn read_framebuffer_id(&mut self, name: &str) -> Result<u32> {
        self.read_framebuffer_id_at(name, Instant::now())
    }

    pub fn read_framebuffer_id_at(&mut self, name: &str, now: Instant) -> Result<u32> {
        let key = self.virtual_ref(name)?;
        let value = self.get_property_at(
            OutputRef::Virtual(key),
            OutputProperty::FramebufferId.name(),
            now,
        )?;
        value
            .as_integer()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| DisplayError::host(format!("bad framebuffer value {}", value)))
    }

    /// Mode-set on an output's scanout engine
    pub fn crtc_set_mode(
        &mut self,
        name: &str,
        mode: Mode,
        rotation: Rotation,
        x: i32,
        y: i32,
    ) -> Result<()> {
        self.registry.crtc_set_mode(name, mode, rotation, x, y)
    }

    /// Run the inactivity check
    pub fn power_tick(&mut self) -> Vec<String> {
        self.power_tick_at(Instant::now())
    }

    pub fn power_tick_at(&mut self, now: Instant) -> Vec<String> {
        self.power.tick(&mut self.registry, now)
    }

    /// Snapshot of one output (not a keep-alive)
    pub fn lookup(&self, name: &str) -> Option<OutputInfo> {
        self.registry.get(name).map(|o| o.info(Instant::now()))
    }

    /// Snapshots of every output, sorted by name
    pub fn outputs(&self) -> Vec<OutputInfo> {
        self.registry.snapshot(Instant::now())
    }

    pub fn status(&self) -> DisplayStatus {
        DisplayStatus {
            manager: self.manager_name().unwrap_or_default().to_string(),
            outputs: self.registry.len(),
            backend: self.registry.allocator().describe(),
            resize_policy: self.registry.resize_policy(),
            idle_timeout_secs: self.power.idle_timeout().as_secs_f64(),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    /// Mode list in wire form
    pub fn custom_modes(&self, name: &str) -> Result<String> {
        self.registry
            .get(name)
            .map(|o| format_mode_list(o.modes()))
            .ok_or_else(|| DisplayError::NotFound(name.to_string()))
    }

    /// Destroy every output, then the manager endpoint
    pub fn shutdown(&mut self) {
        let Some(manager) = self.manager.take() else {
            return;
        };
        self.registry.teardown_all();
        manager.destroy(self.registry.host_mut());
        info!("Virtual display shut down");
    }
}

impl Drop for VirtualDisplay {
    fn drop(&mut self) {
        self.shutdown();
    }
}
