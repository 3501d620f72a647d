//! DRM/KMS backend for a real `/dev/dri/card*` node
//!
//! Dumb buffers and framebuffers go through the `drm` crate; mappings use the
//! MAP_DUMB ioctl plus `mmap`, so a mapping can outlive any borrow of the
//! buffer it came from. GPU-optimized buffers come from GBM on a duplicate of
//! the same file descriptor, which keeps GEM handles valid across both.
//!
//! Binding a GBM buffer as a texture exports it as a dma-buf. The descriptor
//! is what a compositor hands to `EGL_EXT_image_dma_buf_import`, so it stays
//! open until the texture is released.
//!
//! # Requirements
//!
//! - Read/write access to the card node (usually the `video` group)
//! - A driver that supports dumb buffers (every KMS driver does)

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::num::NonZeroU32;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use drm::buffer::{Buffer as DrmBuffer, DrmFourcc};
use drm::control::{Device as ControlDevice, dumbbuffer::DumbBuffer, framebuffer};
use tracing::{debug, info};

use super::{
    BITS_PER_PIXEL, BufferUsage, COLOR_DEPTH, GemBuffer, GpuDevice, KmsDevice, Mapping, TextureId,
};
use crate::error::{DisplayError, Result};
use crate::types::FramebufferId;

/// Open DRM card node
#[derive(Debug)]
pub struct Card(File);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

impl Card {
    /// Open a card node read/write
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(Self)
            .map_err(|e| DisplayError::drm(format!("Failed to open {:?}: {}", path, e)))
    }

    /// Duplicate the descriptor (shares GEM handle namespace)
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self(self.0.try_clone()?))
    }
}

/// Describes a [`GemBuffer`] to the `drm` crate for framebuffer import
struct KernelBuffer(GemBuffer);

impl DrmBuffer for KernelBuffer {
    fn size(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }

    fn format(&self) -> DrmFourcc {
        DrmFourcc::Xrgb8888
    }

    fn pitch(&self) -> u32 {
        self.0.pitch
    }

    fn handle(&self) -> drm::buffer::Handle {
        // add_framebuffer rejects zero handles before wrapping
        drm::buffer::Handle::from(NonZeroU32::new(self.0.handle).unwrap_or(NonZeroU32::MIN))
    }
}

/// Kernel display subsystem on a DRM card
pub struct DrmKms {
    card: Card,
    path: PathBuf,
    dumb: HashMap<u32, DumbBuffer>,
}

impl DrmKms {
    /// Open the card at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let card = Card::open(&path)?;
        info!("Opened DRM device {:?}", path);
        Ok(Self {
            card,
            path,
            dumb: HashMap::new(),
        })
    }

    /// The underlying card, for sharing with [`GbmGpu`]
    pub fn card(&self) -> &Card {
        &self.card
    }
}

impl KmsDevice for DrmKms {
    fn name(&self) -> &str {
        self.path.to_str().unwrap_or("drm")
    }

    fn create_dumb_buffer(&mut self, width: u32, height: u32) -> Result<GemBuffer> {
        let db = self
            .card
            .create_dumb_buffer((width, height), DrmFourcc::Xrgb8888, BITS_PER_PIXEL)
            .map_err(|e| DisplayError::allocation(format!("CREATE_DUMB failed: {}", e)))?;

        let pitch = db.pitch();
        let buffer = GemBuffer {
            handle: u32::from(db.handle()),
            width,
            height,
            pitch,
            size: u64::from(pitch) * u64::from(height),
        };
        self.dumb.insert(buffer.handle, db);
        debug!("Dumb buffer {} ({}x{}, pitch {})", buffer.handle, width, height, pitch);
        Ok(buffer)
    }

    fn destroy_dumb_buffer(&mut self, buffer: GemBuffer) -> Result<()> {
        let db = self.dumb.remove(&buffer.handle).ok_or_else(|| {
            DisplayError::allocation(format!("unknown dumb buffer {}", buffer.handle))
        })?;
        self.card
            .destroy_dumb_buffer(db)
            .map_err(|e| DisplayError::drm(format!("DESTROY_DUMB failed: {}", e)))
    }

    fn map_dumb_buffer(&mut self, buffer: &GemBuffer) -> Result<Mapping> {
        if !self.dumb.contains_key(&buffer.handle) {
            return Err(DisplayError::allocation(format!(
                "unknown dumb buffer {}",
                buffer.handle
            )));
        }
        let len = usize::try_from(buffer.size)
            .map_err(|_| DisplayError::allocation("dumb buffer too large to map"))?;

        let map = drm_ffi::mode::dumbbuffer::map(self.card.as_fd(), buffer.handle, 0, 0)
            .map_err(|e| DisplayError::allocation(format!("MAP_DUMB failed: {}", e)))?;
        let offset = libc::off_t::try_from(map.offset)
            .map_err(|_| DisplayError::allocation("MAP_DUMB offset out of range"))?;

        // SAFETY: mapping a kernel-provided offset of our own descriptor; the
        // result is checked against MAP_FAILED before use.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.card.as_fd().as_raw_fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(DisplayError::allocation(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| DisplayError::allocation("mmap returned null"))?;

        // SAFETY: the range was just mapped read/write for `len` bytes and is
        // only released through unmap().
        Ok(unsafe { Mapping::from_raw(ptr, len) })
    }

    fn unmap(&mut self, mapping: Mapping) -> Result<()> {
        // SAFETY: the mapping was created by mmap in map_dumb_buffer with this
        // exact length and is consumed here.
        let rc = unsafe { libc::munmap(mapping.as_ptr().cast(), mapping.len()) };
        if rc != 0 {
            return Err(DisplayError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn add_framebuffer(&mut self, buffer: &GemBuffer) -> Result<FramebufferId> {
        if buffer.handle == 0 {
            return Err(DisplayError::drm("cannot import GEM handle 0"));
        }
        let handle = self
            .card
            .add_framebuffer(&KernelBuffer(*buffer), COLOR_DEPTH, BITS_PER_PIXEL)
            .map_err(|e| DisplayError::drm(format!("ADDFB failed: {}", e)))?;
        FramebufferId::new(u32::from(handle))
            .ok_or_else(|| DisplayError::drm("kernel returned framebuffer 0"))
    }

    fn remove_framebuffer(&mut self, framebuffer: FramebufferId) -> Result<()> {
        let handle: framebuffer::Handle = drm::control::from_u32(framebuffer.get())
            .ok_or_else(|| DisplayError::drm("framebuffer 0"))?;
        self.card
            .destroy_framebuffer(handle)
            .map_err(|e| DisplayError::drm(format!("RMFB {} failed: {}", framebuffer, e)))
    }
}

/// GBM allocator sharing the card's GEM handle namespace
pub struct GbmGpu {
    device: gbm::Device<Card>,
    buffers: HashMap<u32, gbm::BufferObject<()>>,
    next_texture: u32,
    /// Exported dma-bufs by texture
    textures: HashMap<TextureId, OwnedFd>,
}

impl GbmGpu {
    /// Create a GBM device on a duplicate of the card descriptor
    pub fn new(card: Card) -> Result<Self> {
        let device = gbm::Device::new(card)
            .map_err(|e| DisplayError::drm(format!("Failed to create GBM device: {}", e)))?;
        info!("GBM device created");
        Ok(Self {
            device,
            buffers: HashMap::new(),
            next_texture: 1,
            textures: HashMap::new(),
        })
    }

    /// The dma-buf behind a texture, for handing to a compositor
    pub fn dmabuf(&self, texture: TextureId) -> Option<BorrowedFd<'_>> {
        self.textures.get(&texture).map(|fd| fd.as_fd())
    }
}

impl GpuDevice for GbmGpu {
    fn name(&self) -> &str {
        "gbm"
    }

    fn create_buffer(&mut self, width: u32, height: u32, usage: BufferUsage) -> Result<GemBuffer> {
        let mut flags = gbm::BufferObjectFlags::empty();
        if usage.rendering {
            flags |= gbm::BufferObjectFlags::RENDERING;
        }
        if usage.scanout {
            flags |= gbm::BufferObjectFlags::SCANOUT;
        }

        let bo = self
            .device
            .create_buffer_object::<()>(width, height, gbm::Format::Xrgb8888, flags)
            .map_err(|e| DisplayError::allocation(format!("GBM allocation failed: {}", e)))?;

        let pitch = DrmBuffer::pitch(&bo);
        let buffer = GemBuffer {
            handle: u32::from(DrmBuffer::handle(&bo)),
            width,
            height,
            pitch,
            size: u64::from(pitch) * u64::from(height),
        };
        self.buffers.insert(buffer.handle, bo);
        debug!("GBM buffer {} ({}x{}, pitch {})", buffer.handle, width, height, pitch);
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: GemBuffer) -> Result<()> {
        // Dropping the BufferObject frees it
        self.buffers
            .remove(&buffer.handle)
            .map(drop)
            .ok_or_else(|| DisplayError::allocation(format!("unknown GBM buffer {}", buffer.handle)))
    }

    fn import_texture(&mut self, buffer: &GemBuffer) -> Result<TextureId> {
        let bo = self.buffers.get(&buffer.handle).ok_or_else(|| {
            DisplayError::allocation(format!("unknown GBM buffer {}", buffer.handle))
        })?;
        let fd = bo.fd().map_err(|e| {
            DisplayError::allocation(format!(
                "Failed to export GBM buffer {} as dma-buf: {}",
                buffer.handle, e
            ))
        })?;

        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        debug!("GBM buffer {} exported as texture {}", buffer.handle, texture.0);
        self.textures.insert(texture, fd);
        Ok(texture)
    }

    fn release_texture(&mut self, texture: TextureId) -> Result<()> {
        // Closing the descriptor drops our reference to the dma-buf
        self.textures
            .remove(&texture)
            .map(drop)
            .ok_or_else(|| DisplayError::allocation(format!("unknown texture {}", texture.0)))
    }
}
