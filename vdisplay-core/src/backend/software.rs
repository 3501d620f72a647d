//! In-memory backends
//!
//! Emulate the kernel display subsystem and a GPU in process memory. Used by
//! the daemon when no DRM device is configured, and by tests.
//!
//! Framebuffer IDs are handed out monotonically and never recycled, so an ID
//! captured before a resize can never alias the buffer created by it.

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use tracing::trace;

use super::{BufferUsage, GemBuffer, GpuDevice, KmsDevice, Mapping, TextureId, aligned_pitch};
use crate::error::{DisplayError, Result};
use crate::types::FramebufferId;

/// Software kernel display subsystem backed by heap memory
#[derive(Debug)]
pub struct SoftwareKms {
    next_handle: u32,
    next_framebuffer: u32,
    /// Dumb buffer memory by GEM handle
    buffers: HashMap<u32, Box<[u8]>>,
    /// Registered framebuffers
    framebuffers: HashMap<u32, GemBuffer>,
    /// Live mappings: start address -> GEM handle
    mappings: HashMap<usize, u32>,
}

impl SoftwareKms {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            next_framebuffer: 1,
            buffers: HashMap::new(),
            framebuffers: HashMap::new(),
            mappings: HashMap::new(),
        }
    }

    /// Number of dumb buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of framebuffers currently registered
    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of mappings currently outstanding
    pub fn live_mappings(&self) -> usize {
        self.mappings.len()
    }

    /// Whether a framebuffer ID is currently registered
    pub fn has_framebuffer(&self, framebuffer: FramebufferId) -> bool {
        self.framebuffers.contains_key(&framebuffer.get())
    }
}

impl Default for SoftwareKms {
    fn default() -> Self {
        Self::new()
    }
}

impl KmsDevice for SoftwareKms {
    fn name(&self) -> &str {
        "software-kms"
    }

    fn create_dumb_buffer(&mut self, width: u32, height: u32) -> Result<GemBuffer> {
        let pitch = aligned_pitch(width)?;
        let size = u64::from(pitch) * u64::from(height);
        let len = usize::try_from(size)
            .map_err(|_| DisplayError::allocation(format!("{}x{} too large", width, height)))?;

        let handle = self.next_handle;
        self.next_handle += 1;
        self.buffers
            .insert(handle, vec![0u8; len].into_boxed_slice());

        trace!("software dumb buffer {} ({}x{}, pitch {})", handle, width, height, pitch);
        Ok(GemBuffer {
            handle,
            width,
            height,
            pitch,
            size,
        })
    }

    fn destroy_dumb_buffer(&mut self, buffer: GemBuffer) -> Result<()> {
        if self.mappings.values().any(|&h| h == buffer.handle) {
            return Err(DisplayError::allocation(format!(
                "dumb buffer {} is still mapped",
                buffer.handle
            )));
        }
        self.buffers
            .remove(&buffer.handle)
            .map(|_| ())
            .ok_or_else(|| DisplayError::allocation(format!("unknown dumb buffer {}", buffer.handle)))
    }

    fn map_dumb_buffer(&mut self, buffer: &GemBuffer) -> Result<Mapping> {
        let memory = self
            .buffers
            .get_mut(&buffer.handle)
            .ok_or_else(|| DisplayError::allocation(format!("unknown dumb buffer {}", buffer.handle)))?;

        let ptr = NonNull::new(memory.as_mut_ptr())
            .ok_or_else(|| DisplayError::allocation("empty dumb buffer"))?;
        let addr = ptr.as_ptr() as usize;
        if self.mappings.contains_key(&addr) {
            return Err(DisplayError::allocation(format!(
                "dumb buffer {} is already mapped",
                buffer.handle
            )));
        }
        self.mappings.insert(addr, buffer.handle);

        // SAFETY: the boxed slice stays allocated (and never moves) until
        // destroy_dumb_buffer, which refuses to run while the mapping exists.
        Ok(unsafe { Mapping::from_raw(ptr, memory.len()) })
    }

    fn unmap(&mut self, mapping: Mapping) -> Result<()> {
        self.mappings
            .remove(&(mapping.as_ptr() as usize))
            .map(|_| ())
            .ok_or_else(|| DisplayError::allocation("unmapping an unknown range"))
    }

    fn add_framebuffer(&mut self, buffer: &GemBuffer) -> Result<FramebufferId> {
        if buffer.handle == 0 || buffer.width == 0 || buffer.height == 0 {
            return Err(DisplayError::drm("invalid buffer for framebuffer import"));
        }
        let min_pitch = buffer.width.checked_mul(super::BYTES_PER_PIXEL);
        if min_pitch.is_none_or(|min| buffer.pitch < min) {
            return Err(DisplayError::drm(format!(
                "pitch {} too small for width {}",
                buffer.pitch, buffer.width
            )));
        }

        let raw = self.next_framebuffer;
        self.next_framebuffer += 1;
        let id = FramebufferId::new(raw)
            .ok_or_else(|| DisplayError::drm("framebuffer ID space exhausted"))?;
        self.framebuffers.insert(raw, *buffer);
        Ok(id)
    }

    fn remove_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<()> {
        self.framebuffers
            .remove(&framebuffer.get())
            .map(|_| ())
            .ok_or_else(|| DisplayError::drm(format!("unknown framebuffer {}", framebuffer)))
    }
}

/// Software GPU: tracks buffer descriptors and texture bindings
#[derive(Debug)]
pub struct SoftwareGpu {
    next_handle: u32,
    next_texture: u32,
    buffers: HashMap<u32, GemBuffer>,
    textures: HashMap<TextureId, u32>,
    /// Handles whose texture import is refused
    reject_import: HashSet<u32>,
    reject_all_imports: bool,
}

impl SoftwareGpu {
    pub fn new() -> Self {
        Self {
            // Separate handle range from SoftwareKms keeps logs readable
            next_handle: 0x1000,
            next_texture: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            reject_import: HashSet::new(),
            reject_all_imports: false,
        }
    }

    /// A GPU whose texture import path always fails
    pub fn without_texture_import() -> Self {
        Self {
            reject_all_imports: true,
            ..Self::new()
        }
    }

    /// Number of GPU buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of texture bindings currently held
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Refuse texture import for one buffer handle
    pub fn reject_import_for(&mut self, handle: u32) {
        self.reject_import.insert(handle);
    }
}

impl Default for SoftwareGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for SoftwareGpu {
    fn name(&self) -> &str {
        "software-gpu"
    }

    fn create_buffer(&mut self, width: u32, height: u32, usage: BufferUsage) -> Result<GemBuffer> {
        if !usage.rendering {
            return Err(DisplayError::Unsupported(
                "software GPU only allocates render targets".to_string(),
            ));
        }
        let pitch = aligned_pitch(width)?;
        let buffer = GemBuffer {
            handle: self.next_handle,
            width,
            height,
            pitch,
            size: u64::from(pitch) * u64::from(height),
        };
        self.next_handle += 1;
        self.buffers.insert(buffer.handle, buffer);
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: GemBuffer) -> Result<()> {
        if self.textures.values().any(|&h| h == buffer.handle) {
            return Err(DisplayError::allocation(format!(
                "GPU buffer {} still bound to a texture",
                buffer.handle
            )));
        }
        self.buffers
            .remove(&buffer.handle)
            .map(|_| ())
            .ok_or_else(|| DisplayError::allocation(format!("unknown GPU buffer {}", buffer.handle)))
    }

    fn import_texture(&mut self, buffer: &GemBuffer) -> Result<TextureId> {
        if !self.buffers.contains_key(&buffer.handle) {
            return Err(DisplayError::allocation(format!(
                "unknown GPU buffer {}",
                buffer.handle
            )));
        }
        if self.reject_all_imports || self.reject_import.contains(&buffer.handle) {
            return Err(DisplayError::allocation(format!(
                "texture import refused for buffer {}",
                buffer.handle
            )));
        }
        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(texture, buffer.handle);
        Ok(texture)
    }

    fn release_texture(&mut self, texture: TextureId) -> Result<()> {
        self.textures
            .remove(&texture)
            .map(|_| ())
            .ok_or_else(|| DisplayError::allocation(format!("unknown texture {:?}", texture)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dumb_buffer_lifecycle() {
        let mut kms = SoftwareKms::new();
        let bo = kms.create_dumb_buffer(640, 480).unwrap();
        assert_eq!(bo.pitch, 2560);

        let mut map = kms.map_dumb_buffer(&bo).unwrap();
        assert_eq!(map.len() as u64, bo.size);
        map.as_mut_slice()[0] = 0xff;

        // Destroy is refused while mapped
        assert!(kms.destroy_dumb_buffer(bo).is_err());
        kms.unmap(map).unwrap();
        kms.destroy_dumb_buffer(bo).unwrap();
        assert_eq!(kms.live_buffers(), 0);
    }

    #[test]
    fn test_framebuffer_ids_not_recycled() {
        let mut kms = SoftwareKms::new();
        let bo = kms.create_dumb_buffer(64, 64).unwrap();
        let first = kms.add_framebuffer(&bo).unwrap();
        kms.remove_framebuffer(first).unwrap();
        let second = kms.add_framebuffer(&bo).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_gpu_import_rejection() {
        let mut gpu = SoftwareGpu::without_texture_import();
        let bo = gpu.create_buffer(128, 128, BufferUsage::RENDER_SCANOUT).unwrap();
        assert!(gpu.import_texture(&bo).is_err());
        gpu.destroy_buffer(bo).unwrap();
        assert_eq!(gpu.live_buffers(), 0);
    }
}
