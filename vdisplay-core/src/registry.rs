//! Virtual output registry
//!
//! Owns every [`VirtualOutput`] in a stable-index arena plus a name index.
//! Creation goes through an [`OutputBuilder`] that holds each acquired
//! resource locally and hands the finished record over in one step;
//! dropping an unfinished builder releases everything in reverse order.

use std::collections::HashMap;
use std::time::Instant;

use slotmap::{SlotMap, new_key_type};
use tracing::{debug, info, warn};

use crate::allocator::{FramebufferAllocator, OffscreenBuffer};
use crate::command::{default_modes, format_mode_list, validate_name};
use crate::config::ResizePolicy;
use crate::crtc::VirtualCrtc;
use crate::error::{DisplayError, Result, ResultExt};
use crate::host::{CrtcHandle, DisplayHost, OutputHandle};
use crate::properties::{OutputProperty, PropertyValue};
use crate::types::{Connection, FramebufferId, Mode, OutputInfo, PowerState, Rotation};

new_key_type! {
    /// Stable key of a registered virtual output
    pub struct OutputKey;
}

/// A registered virtual output
#[derive(Debug)]
pub struct VirtualOutput {
    name: String,
    mode: Mode,
    modes: Vec<Mode>,
    crtc: VirtualCrtc,
    output_handle: OutputHandle,
    crtc_handle: CrtcHandle,
    buffer: Option<OffscreenBuffer>,
    published: Option<FramebufferId>,
    last_access: Instant,
    power: PowerState,
    ar_mode: bool,
}

impl VirtualOutput {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current mode (dimensions and refresh)
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn width(&self) -> u32 {
        self.mode.width
    }

    pub fn height(&self) -> u32 {
        self.mode.height
    }

    pub fn refresh(&self) -> u32 {
        self.mode.refresh
    }

    /// Advertised modes, preferred first
    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn crtc(&self) -> &VirtualCrtc {
        &self.crtc
    }

    pub fn crtc_mut(&mut self) -> &mut VirtualCrtc {
        &mut self.crtc
    }

    pub fn output_handle(&self) -> OutputHandle {
        self.output_handle
    }

    pub fn crtc_handle(&self) -> CrtcHandle {
        self.crtc_handle
    }

    /// Framebuffer ID as currently published
    ///
    /// Under [`ResizePolicy::Replace`] this can outlive its buffer after a
    /// failed resize; see [`VirtualOutput::is_stale`].
    pub fn framebuffer_id(&self) -> Option<FramebufferId> {
        self.published
    }

    /// Live off-screen buffer
    pub fn buffer(&self) -> Option<&OffscreenBuffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut OffscreenBuffer> {
        self.buffer.as_mut()
    }

    /// Published ID with no buffer behind it
    pub fn is_stale(&self) -> bool {
        self.buffer.is_none() && self.published.is_some()
    }

    pub fn last_access(&self) -> Instant {
        self.last_access
    }

    pub fn power(&self) -> PowerState {
        self.power
    }

    pub fn ar_mode(&self) -> bool {
        self.ar_mode
    }

    /// Whether compositing into this output is worthwhile right now
    pub fn wants_frames(&self) -> bool {
        self.power == PowerState::Active && self.crtc.is_enabled() && self.buffer.is_some()
    }

    pub(crate) fn mark_accessed(&mut self, now: Instant) {
        self.last_access = now;
    }

    pub(crate) fn set_power(&mut self, power: PowerState) {
        self.power = power;
    }

    /// Current value of a per-output property
    pub fn property(&self, property: OutputProperty) -> PropertyValue {
        match property {
            OutputProperty::FramebufferId => {
                PropertyValue::Integer(self.published.map_or(0, |id| i64::from(id.get())))
            }
            OutputProperty::Width => PropertyValue::Integer(i64::from(self.mode.width)),
            OutputProperty::Height => PropertyValue::Integer(i64::from(self.mode.height)),
            OutputProperty::Refresh => PropertyValue::Integer(i64::from(self.mode.refresh)),
            OutputProperty::CustomModes => PropertyValue::Text(format_mode_list(&self.modes)),
            OutputProperty::VirtualMarker => PropertyValue::Bool(true),
            OutputProperty::ArMode => PropertyValue::Bool(self.ar_mode),
        }
    }

    /// Serializable snapshot
    pub fn info(&self, now: Instant) -> OutputInfo {
        OutputInfo {
            name: self.name.clone(),
            width: self.mode.width,
            height: self.mode.height,
            refresh: self.mode.refresh,
            modes: self.modes.clone(),
            framebuffer_id: self.published.map_or(0, |id| id.get()),
            has_buffer: self.buffer.is_some(),
            buffer_kind: self.buffer.as_ref().map(|b| b.kind()),
            power: self.power,
            ar_mode: self.ar_mode,
            idle_seconds: now.saturating_duration_since(self.last_access).as_secs_f64(),
        }
    }
}

/// What a resize did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Requested mode equals the current one
    Unchanged,
    /// Same dimensions, new refresh; the framebuffer ID is unchanged
    RefreshOnly,
    /// New buffer allocated and its ID published
    Reallocated {
        previous: Option<FramebufferId>,
        current: FramebufferId,
    },
    /// Old buffer released, new allocation failed; `stale` is still published
    BufferLost { stale: Option<FramebufferId> },
}

/// Publish modes and every per-output property
fn publish_all(host: &mut dyn DisplayHost, output: &VirtualOutput) -> Result<()> {
    host.publish_modes(output.output_handle, &output.modes)?;
    for property in OutputProperty::ALL {
        host.publish_property(output.output_handle, property.name(), output.property(property))?;
    }
    Ok(())
}

/// Like [`publish_all`] for outputs already visible: failures are logged
fn republish(host: &mut dyn DisplayHost, output: &VirtualOutput) {
    if let Err(e) = publish_all(host, output) {
        warn!("Failed to republish properties of {}: {}", output.name, e);
    }
    notify(host, output.output_handle, &output.name);
}

fn notify(host: &mut dyn DisplayHost, handle: OutputHandle, name: &str) {
    if let Err(e) = host.notify(handle) {
        warn!("Change notification for {} failed: {}", name, e);
    }
}

/// Scoped construction of a virtual output
struct OutputBuilder<'a> {
    host: &'a mut dyn DisplayHost,
    allocator: &'a mut FramebufferAllocator,
    name: String,
    mode: Mode,
    output_handle: Option<OutputHandle>,
    crtc: Option<VirtualCrtc>,
    crtc_handle: Option<CrtcHandle>,
    buffer: Option<OffscreenBuffer>,
}

impl<'a> OutputBuilder<'a> {
    fn new(
        host: &'a mut dyn DisplayHost,
        allocator: &'a mut FramebufferAllocator,
        name: &str,
        mode: Mode,
    ) -> Self {
        Self {
            host,
            allocator,
            name: name.to_string(),
            mode,
            output_handle: None,
            crtc: None,
            crtc_handle: None,
            buffer: None,
        }
    }

    fn build(mut self, now: Instant) -> Result<VirtualOutput> {
        let output_handle = self.host.create_output(&self.name)?;
        self.output_handle = Some(output_handle);

        self.crtc = Some(VirtualCrtc::new());

        let crtc_handle = self.host.create_crtc()?;
        self.crtc_handle = Some(crtc_handle);

        let buffer = self.allocator.allocate(self.mode.width, self.mode.height)?;
        let framebuffer = buffer.framebuffer_id();
        self.buffer = Some(buffer);

        let mut output = VirtualOutput {
            name: self.name.clone(),
            mode: self.mode,
            modes: default_modes(self.mode),
            crtc: self.crtc.take().unwrap_or_default(),
            output_handle,
            crtc_handle,
            buffer: self.buffer.take(),
            published: Some(framebuffer),
            last_access: now,
            power: PowerState::Active,
            ar_mode: false,
        };

        // From here on the record owns the engine and the buffer; hand them
        // back to the builder if a later step fails.
        if let Err(e) = self.publish_and_link(&output) {
            self.crtc = Some(std::mem::take(&mut output.crtc));
            self.buffer = output.buffer.take();
            return Err(e);
        }

        output.crtc.set_mode(self.mode, Rotation::Normal, 0, 0);
        self.host.set_connection(output_handle, Connection::Connected);
        notify(&mut *self.host, output_handle, &self.name);

        self.output_handle = None;
        self.crtc_handle = None;
        Ok(output)
    }

    fn publish_and_link(&mut self, output: &VirtualOutput) -> Result<()> {
        publish_all(&mut *self.host, output)?;
        self.host.link(output.output_handle, output.crtc_handle)
    }
}

impl Drop for OutputBuilder<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            debug!("Rolling back buffer of {}", self.name);
            self.allocator.release(buffer);
        }
        if let Some(crtc) = self.crtc_handle.take() {
            self.host.destroy_crtc(crtc);
        }
        self.crtc = None;
        if let Some(output) = self.output_handle.take() {
            self.host.destroy_output(output);
        }
    }
}

/// Table of virtual outputs
pub struct Registry {
    host: Box<dyn DisplayHost>,
    allocator: FramebufferAllocator,
    outputs: SlotMap<OutputKey, VirtualOutput>,
    names: HashMap<String, OutputKey>,
    resize_policy: ResizePolicy,
}

impl Registry {
    pub fn new(
        host: Box<dyn DisplayHost>,
        allocator: FramebufferAllocator,
        resize_policy: ResizePolicy,
    ) -> Self {
        Self {
            host,
            allocator,
            outputs: SlotMap::with_key(),
            names: HashMap::new(),
            resize_policy,
        }
    }

    pub fn host(&self) -> &dyn DisplayHost {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn DisplayHost {
        self.host.as_mut()
    }

    pub fn allocator(&self) -> &FramebufferAllocator {
        &self.allocator
    }

    pub fn resize_policy(&self) -> ResizePolicy {
        self.resize_policy
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn key(&self, name: &str) -> Option<OutputKey> {
        self.names.get(name).copied()
    }

    /// Key of the output owning a host output object
    pub fn key_for_handle(&self, handle: OutputHandle) -> Option<OutputKey> {
        self.outputs
            .iter()
            .find(|(_, o)| o.output_handle == handle)
            .map(|(key, _)| key)
    }

    pub fn get(&self, name: &str) -> Option<&VirtualOutput> {
        self.key(name).and_then(|key| self.outputs.get(key))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VirtualOutput> {
        let key = self.key(name)?;
        self.outputs.get_mut(key)
    }

    pub fn by_key(&self, key: OutputKey) -> Option<&VirtualOutput> {
        self.outputs.get(key)
    }

    pub fn by_key_mut(&mut self, key: OutputKey) -> Option<&mut VirtualOutput> {
        self.outputs.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualOutput> {
        self.outputs.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VirtualOutput> {
        self.outputs.values_mut()
    }

    /// Snapshots of all outputs, sorted by name
    pub fn snapshot(&self, now: Instant) -> Vec<OutputInfo> {
        let mut infos: Vec<OutputInfo> = self.outputs.values().map(|o| o.info(now)).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    fn lookup_key(&self, name: &str) -> Result<OutputKey> {
        self.key(name)
            .ok_or_else(|| DisplayError::NotFound(name.to_string()))
    }

    /// Create and register a virtual output
    pub fn create(&mut self, name: &str, mode: Mode) -> Result<OutputKey> {
        self.create_at(name, mode, Instant::now())
    }

    pub fn create_at(&mut self, name: &str, mode: Mode, now: Instant) -> Result<OutputKey> {
        validate_name(name)?;
        mode.validate()?;
        if self.names.contains_key(name) {
            return Err(DisplayError::AlreadyExists(name.to_string()));
        }

        let output = OutputBuilder::new(self.host.as_mut(), &mut self.allocator, name, mode)
            .build(now)
            .context(format!("Creating virtual output {}", name))?;

        info!(
            "Created virtual output {} at {} ({})",
            name,
            mode,
            output.published.map_or_else(|| "no framebuffer".to_string(), |id| id.to_string())
        );
        let key = self.outputs.insert(output);
        self.names.insert(name.to_string(), key);
        Ok(key)
    }

    /// Disconnect, release and unregister an output
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let key = self.lookup_key(name)?;
        let Some(output) = self.outputs.get_mut(key) else {
            return Err(DisplayError::NotFound(name.to_string()));
        };

        self.host
            .set_connection(output.output_handle, Connection::Disconnected);
        notify(self.host.as_mut(), output.output_handle, &output.name);

        if let Some(buffer) = output.buffer.take() {
            self.allocator.release(buffer);
        }
        output.published = None;

        output.crtc.disable();
        self.host.destroy_crtc(output.crtc_handle);
        self.host.destroy_output(output.output_handle);

        self.outputs.remove(key);
        self.names.remove(name);
        info!("Deleted virtual output {}", name);
        Ok(())
    }

    /// Change the mode of an output, reallocating its buffer when the
    /// dimensions change or no buffer is present
    pub fn resize(&mut self, name: &str, mode: Mode) -> Result<ResizeOutcome> {
        mode.validate()?;
        let key = self.lookup_key(name)?;
        let policy = self.resize_policy;
        let Some(output) = self.outputs.get_mut(key) else {
            return Err(DisplayError::NotFound(name.to_string()));
        };

        let mut modes = output.modes.clone();
        if !modes.contains(&mode) {
            modes.insert(0, mode);
        }

        if output.buffer.is_some() && output.mode.same_size(&mode) {
            if output.mode == mode && output.modes == modes {
                return Ok(ResizeOutcome::Unchanged);
            }
            output.mode = mode;
            output.modes = modes;
            output.crtc_mode_follow(mode);
            republish(self.host.as_mut(), output);
            debug!("{} refresh now {} Hz", name, mode.refresh);
            return Ok(ResizeOutcome::RefreshOnly);
        }

        let previous = output.published;
        let outcome = match policy {
            ResizePolicy::Replace => {
                if let Some(old) = output.buffer.take() {
                    self.allocator.release(old);
                }
                output.mode = mode;
                output.modes = modes;
                match self.allocator.allocate(mode.width, mode.height) {
                    Ok(buffer) => {
                        let current = buffer.framebuffer_id();
                        output.buffer = Some(buffer);
                        output.published = Some(current);
                        ResizeOutcome::Reallocated { previous, current }
                    }
                    Err(e) => {
                        warn!(
                            "Resize of {} to {} lost its buffer, {} stays published: {}",
                            name,
                            mode,
                            previous.map_or_else(|| "nothing".to_string(), |id| id.to_string()),
                            e
                        );
                        ResizeOutcome::BufferLost { stale: previous }
                    }
                }
            }
            ResizePolicy::Atomic => {
                let buffer = self
                    .allocator
                    .allocate(mode.width, mode.height)
                    .context(format!("Resizing {} to {}", name, mode))?;
                let current = buffer.framebuffer_id();
                if let Some(old) = output.buffer.replace(buffer) {
                    self.allocator.release(old);
                }
                output.published = Some(current);
                output.mode = mode;
                output.modes = modes;
                ResizeOutcome::Reallocated { previous, current }
            }
        };

        output.crtc_mode_follow(mode);
        republish(self.host.as_mut(), output);
        if let ResizeOutcome::Reallocated { current, .. } = outcome {
            info!("Resized {} to {} ({})", name, mode, current);
        }
        Ok(outcome)
    }

    /// Replace the advertised mode list
    pub fn set_modes(&mut self, name: &str, modes: Vec<Mode>) -> Result<()> {
        if modes.is_empty() {
            return Err(DisplayError::validation("mode list is empty"));
        }
        for mode in &modes {
            mode.validate()?;
        }
        let key = self.lookup_key(name)?;
        let Some(output) = self.outputs.get_mut(key) else {
            return Err(DisplayError::NotFound(name.to_string()));
        };

        output.modes = modes;
        republish(self.host.as_mut(), output);
        info!("{} now advertises {} modes", name, output.modes.len());
        Ok(())
    }

    /// Store and publish the AR mode flag
    pub fn set_ar_mode(&mut self, name: &str, enabled: bool) -> Result<()> {
        let key = self.lookup_key(name)?;
        let Some(output) = self.outputs.get_mut(key) else {
            return Err(DisplayError::NotFound(name.to_string()));
        };

        output.ar_mode = enabled;
        if let Err(e) = self.host.publish_property(
            output.output_handle,
            OutputProperty::ArMode.name(),
            PropertyValue::Bool(enabled),
        ) {
            warn!("Failed to publish AR mode of {}: {}", name, e);
        }
        notify(self.host.as_mut(), output.output_handle, &output.name);
        info!("AR mode {} on {}", if enabled { "enabled" } else { "disabled" }, name);
        Ok(())
    }

    /// Mode-set on an output's scanout engine
    ///
    /// New dimensions trigger a resize first; the engine state is updated
    /// even if that resize fails.
    pub fn crtc_set_mode(
        &mut self,
        name: &str,
        mode: Mode,
        rotation: Rotation,
        x: i32,
        y: i32,
    ) -> Result<()> {
        mode.validate()?;
        let current = self
            .get(name)
            .map(|o| o.mode)
            .ok_or_else(|| DisplayError::NotFound(name.to_string()))?;

        if !current.same_size(&mode) {
            if let Err(e) = self.resize(name, mode) {
                warn!("Mode-set on {} could not resize the buffer: {}", name, e);
            }
        }

        if let Some(output) = self.get_mut(name) {
            output.crtc.set_mode(mode, rotation, x, y);
        }
        Ok(())
    }

    /// Delete every output (driver teardown)
    pub fn teardown_all(&mut self) {
        let names: Vec<String> = self.names.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.delete(&name) {
                warn!("Teardown of {} failed: {}", name, e);
            }
        }
    }
}

impl VirtualOutput {
    // Keep an enabled engine's stored mode in step with the output
    fn crtc_mode_follow(&mut self, mode: Mode) {
        if self.crtc.is_enabled() {
            let (x, y) = self.crtc.position();
            let rotation = self.crtc.rotation();
            self.crtc.set_mode(mode, rotation, x, y);
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if !self.outputs.is_empty() {
            self.teardown_all();
        }
    }
}
