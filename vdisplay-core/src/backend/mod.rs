//! Buffer backends
//!
//! Two narrow seams stand between the allocator and the outside world:
//! - [`KmsDevice`]: the kernel display subsystem (dumb buffers, framebuffers)
//! - [`GpuDevice`]: GPU-optimized buffers and the texture import path
//!
//! [`software`] implements both in process memory for headless operation and
//! tests; [`card`] talks to a real `/dev/dri/card*` node.

pub mod card;
pub mod software;

use std::path::Path;
use std::ptr::NonNull;
use tracing::warn;

use crate::error::{DisplayError, Result};
use crate::types::FramebufferId;

pub use card::{DrmKms, GbmGpu};
pub use software::{SoftwareGpu, SoftwareKms};

/// All buffers are XRGB8888
pub const BYTES_PER_PIXEL: u32 = 4;
/// Bits per pixel passed to the kernel
pub const BITS_PER_PIXEL: u32 = 32;
/// Color depth passed to the kernel
pub const COLOR_DEPTH: u32 = 24;

/// Kernel-side buffer object descriptor (GEM handle plus layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemBuffer {
    /// GEM handle, valid on the device that created it
    pub handle: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per scanline (may exceed width * 4)
    pub pitch: u32,
    /// Total size in bytes
    pub size: u64,
}

/// Usage flags for GPU allocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage {
    pub rendering: bool,
    pub scanout: bool,
}

impl BufferUsage {
    /// Render target that can also be scanned out
    pub const RENDER_SCANOUT: Self = Self {
        rendering: true,
        scanout: true,
    };
}

/// GPU texture bound to a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// CPU mapping of a dumb buffer
///
/// Owns the mapped range until handed back to [`KmsDevice::unmap`].
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

impl Mapping {
    /// Wrap a mapped range.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes, and nothing
    /// else may access the range until the mapping is passed to `unmap`.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Start of the mapped range
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Length of the mapped range in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mapped pixels
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: from_raw guarantees the range is valid and exclusively ours.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Mapped pixels, writable
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: from_raw guarantees the range is valid and exclusively ours;
        // &mut self prevents aliasing through this handle.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Kernel display subsystem
pub trait KmsDevice {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Allocate a CPU-accessible dumb buffer
    fn create_dumb_buffer(&mut self, width: u32, height: u32) -> Result<GemBuffer>;

    /// Free a dumb buffer
    fn destroy_dumb_buffer(&mut self, buffer: GemBuffer) -> Result<()>;

    /// Map a dumb buffer into process memory
    fn map_dumb_buffer(&mut self, buffer: &GemBuffer) -> Result<Mapping>;

    /// Release a mapping obtained from `map_dumb_buffer`
    fn unmap(&mut self, mapping: Mapping) -> Result<()>;

    /// Register a buffer as a framebuffer
    fn add_framebuffer(&mut self, buffer: &GemBuffer) -> Result<FramebufferId>;

    /// Remove a framebuffer registration
    fn remove_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<()>;
}

/// GPU buffer allocation and texture import path
pub trait GpuDevice {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Allocate a GPU-optimized buffer
    fn create_buffer(&mut self, width: u32, height: u32, usage: BufferUsage)
    -> Result<GemBuffer>;

    /// Free a GPU-optimized buffer
    fn destroy_buffer(&mut self, buffer: GemBuffer) -> Result<()>;

    /// Bind a buffer as a renderable texture
    fn import_texture(&mut self, buffer: &GemBuffer) -> Result<TextureId>;

    /// Drop a texture binding
    fn release_texture(&mut self, texture: TextureId) -> Result<()>;
}

/// Kernel and optional GPU backend pair
pub struct Backends {
    pub kms: Box<dyn KmsDevice>,
    pub gpu: Option<Box<dyn GpuDevice>>,
}

impl Backends {
    /// In-memory backends, optionally with a software GPU
    pub fn software(gpu_acceleration: bool) -> Self {
        Self {
            kms: Box::new(SoftwareKms::new()),
            gpu: gpu_acceleration.then(|| Box::new(SoftwareGpu::new()) as Box<dyn GpuDevice>),
        }
    }

    /// Backends on a DRM card; GBM is only attempted when acceleration is requested
    pub fn open(device: &Path, gpu_acceleration: bool) -> Result<Self> {
        let kms = DrmKms::open(device)?;
        let gpu = if gpu_acceleration {
            match kms.card().try_clone().and_then(GbmGpu::new) {
                Ok(gbm) => Some(Box::new(gbm) as Box<dyn GpuDevice>),
                Err(e) => {
                    warn!("GPU acceleration unavailable, using dumb buffers only: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            kms: Box::new(kms),
            gpu,
        })
    }
}

/// Minimum pitch for a width, aligned to 64 bytes
pub fn aligned_pitch(width: u32) -> Result<u32> {
    width
        .checked_mul(BYTES_PER_PIXEL)
        .and_then(|bytes| bytes.checked_add(63))
        .map(|bytes| bytes & !63)
        .ok_or_else(|| DisplayError::allocation(format!("width {} overflows the pitch", width)))
}
