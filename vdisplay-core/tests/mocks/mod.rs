//! Mock infrastructure for testing
//!
//! Backends and a host that share one [`Ledger`]: every live resource is
//! counted, every operation is logged in order, and any step can be made to
//! fail.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::rc::Rc;

use vdisplay_core::backend::{
    Backends, BufferUsage, GemBuffer, GpuDevice, KmsDevice, Mapping, TextureId, aligned_pitch,
};
use vdisplay_core::error::{DisplayError, Result};
use vdisplay_core::host::{CrtcHandle, DisplayHost, OutputHandle};
use vdisplay_core::properties::PropertyValue;
use vdisplay_core::types::{Connection, FramebufferId, Mode};
use vdisplay_core::{DisplayConfig, VirtualDisplay};

/// Steps that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fail {
    DumbCreate,
    AddFramebuffer,
    Map,
    GpuCreate,
    TextureImport,
    HostOutput,
    HostCrtc,
    PublishModes,
    PublishProperty,
    Link,
    Notify,
}

/// Shared record of live resources and operations
#[derive(Debug, Default)]
pub struct Ledger {
    next_id: u32,
    pub dumb_buffers: HashMap<u32, Box<[u8]>>,
    pub gpu_buffers: HashSet<u32>,
    pub framebuffers: HashSet<u32>,
    pub mappings: usize,
    pub textures: HashSet<u32>,
    pub outputs: HashMap<OutputHandle, String>,
    pub crtcs: HashSet<CrtcHandle>,
    pub properties: HashMap<(OutputHandle, String), PropertyValue>,
    pub connections: HashMap<OutputHandle, Connection>,
    pub notifications: usize,
    /// Operation log, in call order
    pub events: Vec<String>,
    failing: HashSet<Fail>,
}

impl Ledger {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&mut self, step: Fail) -> Result<()> {
        if self.failing.contains(&step) {
            self.events.push(format!("fail {:?}", step));
            return Err(DisplayError::allocation(format!("injected {:?} failure", step)));
        }
        Ok(())
    }

    /// No buffers, framebuffers, mappings or textures are alive
    pub fn no_buffer_resources(&self) -> bool {
        self.dumb_buffers.is_empty()
            && self.gpu_buffers.is_empty()
            && self.framebuffers.is_empty()
            && self.mappings == 0
            && self.textures.is_empty()
    }
}

/// Handle to a shared ledger; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct Mock {
    ledger: Rc<RefCell<Ledger>>,
}

impl Mock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, step: Fail) {
        self.ledger.borrow_mut().failing.insert(step);
    }

    pub fn heal(&self, step: Fail) {
        self.ledger.borrow_mut().failing.remove(&step);
    }

    pub fn ledger(&self) -> std::cell::Ref<'_, Ledger> {
        self.ledger.borrow()
    }

    pub fn events(&self) -> Vec<String> {
        self.ledger.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.ledger.borrow_mut().events.clear();
    }

    /// Position of the first event starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.ledger
            .borrow()
            .events
            .iter()
            .position(|e| e.starts_with(prefix))
    }

    pub fn property(&self, output: &str, name: &str) -> Option<PropertyValue> {
        let ledger = self.ledger.borrow();
        let handle = ledger
            .outputs
            .iter()
            .find(|(_, n)| n.as_str() == output)
            .map(|(h, _)| *h)?;
        ledger.properties.get(&(handle, name.to_string())).cloned()
    }

    /// Backends logging into this ledger
    pub fn backends(&self, gpu: bool) -> Backends {
        Backends {
            kms: Box::new(MockKms(self.clone())),
            gpu: gpu.then(|| Box::new(MockGpu(self.clone())) as Box<dyn GpuDevice>),
        }
    }

    /// Host logging into this ledger
    pub fn host(&self) -> Box<dyn DisplayHost> {
        Box::new(MockHost(self.clone()))
    }

    /// A display wired to this ledger
    pub fn display(&self, config: &DisplayConfig) -> VirtualDisplay {
        VirtualDisplay::new(config, self.backends(config.gpu_acceleration), self.host())
            .expect("display should start")
    }
}

pub struct MockKms(Mock);

impl KmsDevice for MockKms {
    fn name(&self) -> &str {
        "mock-kms"
    }

    fn create_dumb_buffer(&mut self, width: u32, height: u32) -> Result<GemBuffer> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::DumbCreate)?;
        let pitch = aligned_pitch(width)?;
        let handle = l.next();
        let size = u64::from(pitch) * u64::from(height);
        l.dumb_buffers
            .insert(handle, vec![0u8; size as usize].into_boxed_slice());
        l.events.push(format!("create_dumb {}", handle));
        Ok(GemBuffer {
            handle,
            width,
            height,
            pitch,
            size,
        })
    }

    fn destroy_dumb_buffer(&mut self, buffer: GemBuffer) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.dumb_buffers.remove(&buffer.handle);
        l.events.push(format!("destroy_dumb {}", buffer.handle));
        Ok(())
    }

    fn map_dumb_buffer(&mut self, buffer: &GemBuffer) -> Result<Mapping> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::Map)?;
        let memory = l
            .dumb_buffers
            .get_mut(&buffer.handle)
            .ok_or_else(|| DisplayError::allocation("unknown dumb buffer"))?;
        let len = memory.len();
        let ptr = NonNull::new(memory.as_mut_ptr()).expect("non-empty buffer");
        l.mappings += 1;
        l.events.push(format!("map {}", buffer.handle));
        // SAFETY: the boxed slice lives in the ledger until destroy_dumb_buffer,
        // which the allocator only calls after unmap.
        Ok(unsafe { Mapping::from_raw(ptr, len) })
    }

    fn unmap(&mut self, _mapping: Mapping) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.mappings -= 1;
        l.events.push("unmap".to_string());
        Ok(())
    }

    fn add_framebuffer(&mut self, buffer: &GemBuffer) -> Result<FramebufferId> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::AddFramebuffer)?;
        let id = l.next() + 1000;
        l.framebuffers.insert(id);
        l.events.push(format!("add_fb {} for {}", id, buffer.handle));
        Ok(FramebufferId::new(id).expect("non-zero"))
    }

    fn remove_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.framebuffers.remove(&framebuffer.get());
        l.events.push(format!("remove_fb {}", framebuffer.get()));
        Ok(())
    }
}

pub struct MockGpu(Mock);

impl GpuDevice for MockGpu {
    fn name(&self) -> &str {
        "mock-gpu"
    }

    fn create_buffer(&mut self, width: u32, height: u32, _usage: BufferUsage) -> Result<GemBuffer> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::GpuCreate)?;
        let pitch = aligned_pitch(width)?;
        let handle = l.next();
        l.gpu_buffers.insert(handle);
        l.events.push(format!("create_gpu {}", handle));
        Ok(GemBuffer {
            handle,
            width,
            height,
            pitch,
            size: u64::from(pitch) * u64::from(height),
        })
    }

    fn destroy_buffer(&mut self, buffer: GemBuffer) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.gpu_buffers.remove(&buffer.handle);
        l.events.push(format!("destroy_gpu {}", buffer.handle));
        Ok(())
    }

    fn import_texture(&mut self, buffer: &GemBuffer) -> Result<TextureId> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::TextureImport)?;
        let id = l.next();
        l.textures.insert(id);
        l.events.push(format!("import_texture {} for {}", id, buffer.handle));
        Ok(TextureId(id))
    }

    fn release_texture(&mut self, texture: TextureId) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.textures.remove(&texture.0);
        l.events.push(format!("release_texture {}", texture.0));
        Ok(())
    }
}

pub struct MockHost(Mock);

impl DisplayHost for MockHost {
    fn create_output(&mut self, name: &str) -> Result<OutputHandle> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::HostOutput)?;
        let handle = OutputHandle(l.next());
        l.outputs.insert(handle, name.to_string());
        l.events.push(format!("create_output {}", name));
        Ok(handle)
    }

    fn destroy_output(&mut self, output: OutputHandle) {
        let mut l = self.0.ledger.borrow_mut();
        let name = l.outputs.remove(&output).unwrap_or_default();
        l.properties.retain(|(h, _), _| *h != output);
        l.events.push(format!("destroy_output {}", name));
    }

    fn create_crtc(&mut self) -> Result<CrtcHandle> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::HostCrtc)?;
        let handle = CrtcHandle(l.next());
        l.crtcs.insert(handle);
        l.events.push("create_crtc".to_string());
        Ok(handle)
    }

    fn destroy_crtc(&mut self, crtc: CrtcHandle) {
        let mut l = self.0.ledger.borrow_mut();
        l.crtcs.remove(&crtc);
        l.events.push("destroy_crtc".to_string());
    }

    fn link(&mut self, _output: OutputHandle, _crtc: CrtcHandle) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::Link)?;
        l.events.push("link".to_string());
        Ok(())
    }

    fn publish_modes(&mut self, _output: OutputHandle, modes: &[Mode]) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::PublishModes)?;
        l.events.push(format!("publish_modes {}", modes.len()));
        Ok(())
    }

    fn publish_property(
        &mut self,
        output: OutputHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::PublishProperty)?;
        l.properties.insert((output, name.to_string()), value);
        Ok(())
    }

    fn set_connection(&mut self, output: OutputHandle, connection: Connection) {
        let mut l = self.0.ledger.borrow_mut();
        l.connections.insert(output, connection);
        l.events.push(format!("connection {:?}", connection));
    }

    fn notify(&mut self, _output: OutputHandle) -> Result<()> {
        let mut l = self.0.ledger.borrow_mut();
        l.check(Fail::Notify)?;
        l.notifications += 1;
        l.events.push("notify".to_string());
        Ok(())
    }

    fn physical_connection(&self, _output: OutputHandle) -> Connection {
        Connection::Unknown
    }

    fn physical_modes(&self, _output: OutputHandle) -> Vec<Mode> {
        Vec::new()
    }
}

/// Configuration with no startup outputs
pub fn bare_config(gpu: bool) -> DisplayConfig {
    DisplayConfig::default().with_gpu_acceleration(gpu)
}
