//! Off-screen framebuffer allocator
//!
//! Produces buffers that the compositing pipeline can render into and that
//! are registered with the kernel, so their framebuffer ID can be exported
//! for zero-copy capture.
//!
//! Allocation walks an ordered list of strategies:
//! 1. **GPU**: GBM buffer with rendering + scanout usage, bound as a texture
//! 2. **CPU**: dumb buffer, mapped into process memory
//!
//! Each strategy runs inside a [`Transaction`] that records every acquired
//! resource and releases them in reverse order unless the strategy commits.
//! A GPU allocation or texture-import failure falls through to the CPU
//! strategy; a kernel import failure aborts the whole allocation.

use tracing::{debug, info, warn};

use crate::backend::{Backends, BufferUsage, GemBuffer, Mapping, TextureId};
use crate::error::{DisplayError, Result};
use crate::types::{BufferKind, FramebufferId, MAX_DIMENSION};

/// Compositable surface bound to a buffer
#[derive(Debug)]
pub enum Surface {
    /// Surface pixels live in a CPU mapping of the buffer
    Mapped(Mapping),
    /// Buffer is bound as a GPU texture
    Texture(TextureId),
}

impl Surface {
    /// Writable pixels, for CPU-mapped surfaces
    pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::Mapped(mapping) => Some(mapping.as_mut_slice()),
            Self::Texture(_) => None,
        }
    }

    /// Texture binding, for GPU surfaces
    pub fn texture(&self) -> Option<TextureId> {
        match self {
            Self::Texture(texture) => Some(*texture),
            Self::Mapped(_) => None,
        }
    }
}

/// A fully formed off-screen buffer: memory + framebuffer + surface
///
/// Must be handed back to [`FramebufferAllocator::release`].
#[derive(Debug)]
#[must_use = "off-screen buffers must be released through the allocator"]
pub struct OffscreenBuffer {
    kind: BufferKind,
    memory: GemBuffer,
    framebuffer: FramebufferId,
    surface: Surface,
}

impl OffscreenBuffer {
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Kernel framebuffer ID
    pub fn framebuffer_id(&self) -> FramebufferId {
        self.framebuffer
    }

    pub fn width(&self) -> u32 {
        self.memory.width
    }

    pub fn height(&self) -> u32 {
        self.memory.height
    }

    pub fn pitch(&self) -> u32 {
        self.memory.pitch
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}

/// Allocation strategies, in preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Gpu,
    Cpu,
}

/// How a strategy failed
enum StrategyError {
    /// Try the next strategy
    Fallback(DisplayError),
    /// Abort the allocation
    Fatal(DisplayError),
}

/// Resource to release if a transaction is not committed
#[derive(Debug)]
enum Undo {
    DumbBuffer(GemBuffer),
    GpuBuffer(GemBuffer),
    Framebuffer(FramebufferId),
}

/// Scoped acquisition: everything recorded here is released on drop unless
/// `commit` is called
struct Transaction<'a> {
    backends: &'a mut Backends,
    undo: Vec<Undo>,
}

impl<'a> Transaction<'a> {
    fn new(backends: &'a mut Backends) -> Self {
        Self {
            backends,
            undo: Vec::new(),
        }
    }

    fn create_gpu_buffer(&mut self, width: u32, height: u32) -> Result<GemBuffer> {
        let gpu = self
            .backends
            .gpu
            .as_mut()
            .ok_or_else(|| DisplayError::Unsupported("no GPU device".to_string()))?;
        let buffer = gpu.create_buffer(width, height, BufferUsage::RENDER_SCANOUT)?;
        self.undo.push(Undo::GpuBuffer(buffer));
        Ok(buffer)
    }

    fn create_dumb_buffer(&mut self, width: u32, height: u32) -> Result<GemBuffer> {
        let buffer = self.backends.kms.create_dumb_buffer(width, height)?;
        self.undo.push(Undo::DumbBuffer(buffer));
        Ok(buffer)
    }

    fn add_framebuffer(&mut self, buffer: &GemBuffer) -> Result<FramebufferId> {
        let framebuffer = self.backends.kms.add_framebuffer(buffer)?;
        self.undo.push(Undo::Framebuffer(framebuffer));
        Ok(framebuffer)
    }

    // Binding steps are last in every strategy, so they need no undo entry.

    fn map(&mut self, buffer: &GemBuffer) -> Result<Mapping> {
        self.backends.kms.map_dumb_buffer(buffer)
    }

    fn import_texture(&mut self, buffer: &GemBuffer) -> Result<TextureId> {
        let gpu = self
            .backends
            .gpu
            .as_mut()
            .ok_or_else(|| DisplayError::Unsupported("no GPU device".to_string()))?;
        gpu.import_texture(buffer)
    }

    fn commit(mut self) {
        self.undo.clear();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        while let Some(undo) = self.undo.pop() {
            debug!("Rolling back {:?}", undo);
            let result = match undo {
                Undo::Framebuffer(fb) => self.backends.kms.remove_framebuffer(fb),
                Undo::DumbBuffer(buffer) => self.backends.kms.destroy_dumb_buffer(buffer),
                Undo::GpuBuffer(buffer) => match self.backends.gpu.as_mut() {
                    Some(gpu) => gpu.destroy_buffer(buffer),
                    None => Ok(()),
                },
            };
            if let Err(e) = result {
                warn!("Rollback step failed: {}", e);
            }
        }
    }
}

/// Allocates and releases off-screen buffers
pub struct FramebufferAllocator {
    backends: Backends,
}

impl FramebufferAllocator {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// Whether GPU-optimized allocation will be attempted
    pub fn gpu_available(&self) -> bool {
        self.backends.gpu.is_some()
    }

    /// Backend names for status output, e.g. "software-kms+software-gpu"
    pub fn describe(&self) -> String {
        match &self.backends.gpu {
            Some(gpu) => format!("{}+{}", self.backends.kms.name(), gpu.name()),
            None => self.backends.kms.name().to_string(),
        }
    }

    fn strategies(&self) -> Vec<Strategy> {
        let mut strategies = Vec::with_capacity(2);
        if self.gpu_available() {
            strategies.push(Strategy::Gpu);
        }
        strategies.push(Strategy::Cpu);
        strategies
    }

    /// Allocate, import and bind a buffer of the given size
    pub fn allocate(&mut self, width: u32, height: u32) -> Result<OffscreenBuffer> {
        if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
            return Err(DisplayError::allocation(format!(
                "cannot allocate a {}x{} buffer (limit {})",
                width, height, MAX_DIMENSION
            )));
        }

        let mut last_error = None;

        for strategy in self.strategies() {
            let attempt = match strategy {
                Strategy::Gpu => self.allocate_gpu(width, height),
                Strategy::Cpu => self.allocate_cpu(width, height),
            };
            match attempt {
                Ok(buffer) => {
                    info!(
                        "Allocated {} buffer {}x{} (pitch {}) as {}",
                        buffer.kind,
                        width,
                        height,
                        buffer.pitch(),
                        buffer.framebuffer
                    );
                    return Ok(buffer);
                }
                Err(StrategyError::Fallback(e)) => {
                    warn!(
                        "{:?} allocation of {}x{} failed, trying next strategy: {}",
                        strategy, width, height, e
                    );
                    last_error = Some(e);
                }
                Err(StrategyError::Fatal(e)) => {
                    return Err(DisplayError::allocation(format!(
                        "{}x{} buffer: {}",
                        width, height, e
                    )));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DisplayError::allocation("no allocation strategy")))
    }

    fn allocate_gpu(
        &mut self,
        width: u32,
        height: u32,
    ) -> std::result::Result<OffscreenBuffer, StrategyError> {
        let mut tx = Transaction::new(&mut self.backends);
        let memory = tx
            .create_gpu_buffer(width, height)
            .map_err(StrategyError::Fallback)?;
        let framebuffer = tx.add_framebuffer(&memory).map_err(StrategyError::Fatal)?;
        let texture = tx.import_texture(&memory).map_err(StrategyError::Fallback)?;
        tx.commit();

        Ok(OffscreenBuffer {
            kind: BufferKind::Gpu,
            memory,
            framebuffer,
            surface: Surface::Texture(texture),
        })
    }

    fn allocate_cpu(
        &mut self,
        width: u32,
        height: u32,
    ) -> std::result::Result<OffscreenBuffer, StrategyError> {
        let mut tx = Transaction::new(&mut self.backends);
        let memory = tx
            .create_dumb_buffer(width, height)
            .map_err(StrategyError::Fatal)?;
        let framebuffer = tx.add_framebuffer(&memory).map_err(StrategyError::Fatal)?;
        let mapping = tx.map(&memory).map_err(StrategyError::Fatal)?;
        tx.commit();

        Ok(OffscreenBuffer {
            kind: BufferKind::Cpu,
            memory,
            framebuffer,
            surface: Surface::Mapped(mapping),
        })
    }

    /// Tear a buffer down: surface binding, framebuffer, mapping, memory.
    ///
    /// Every step runs even if an earlier one fails; failures are logged.
    pub fn release(&mut self, buffer: OffscreenBuffer) {
        let OffscreenBuffer {
            kind,
            memory,
            framebuffer,
            surface,
        } = buffer;

        let mapping = match surface {
            Surface::Texture(texture) => {
                if let Some(gpu) = self.backends.gpu.as_mut() {
                    if let Err(e) = gpu.release_texture(texture) {
                        warn!("Failed to release texture {:?}: {}", texture, e);
                    }
                }
                None
            }
            Surface::Mapped(mapping) => Some(mapping),
        };

        if let Err(e) = self.backends.kms.remove_framebuffer(framebuffer) {
            warn!("Failed to remove framebuffer {}: {}", framebuffer, e);
        }

        if let Some(mapping) = mapping {
            if let Err(e) = self.backends.kms.unmap(mapping) {
                warn!("Failed to unmap buffer {}: {}", memory.handle, e);
            }
        }

        let freed = match kind {
            BufferKind::Cpu => self.backends.kms.destroy_dumb_buffer(memory),
            BufferKind::Gpu => match self.backends.gpu.as_mut() {
                Some(gpu) => gpu.destroy_buffer(memory),
                None => Err(DisplayError::allocation("GPU buffer without GPU device")),
            },
        };
        if let Err(e) = freed {
            warn!("Failed to free buffer {}: {}", memory.handle, e);
        }

        debug!("Released {} buffer {}", kind, framebuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_allocation_is_mapped() {
        let mut allocator = FramebufferAllocator::new(Backends::software(false));
        let mut buffer = allocator.allocate(640, 480).unwrap();

        assert_eq!(buffer.kind(), BufferKind::Cpu);
        assert_eq!((buffer.width(), buffer.height()), (640, 480));
        let pixels = buffer.surface_mut().pixels_mut().unwrap();
        assert_eq!(pixels.len(), 640 * 4 * 480);
        pixels[0] = 0x7f;

        allocator.release(buffer);
    }

    #[test]
    fn test_gpu_allocation_binds_texture() {
        let mut allocator = FramebufferAllocator::new(Backends::software(true));
        let buffer = allocator.allocate(1920, 1080).unwrap();

        assert_eq!(buffer.kind(), BufferKind::Gpu);
        assert!(buffer.surface().texture().is_some());
        allocator.release(buffer);
    }

    #[test]
    fn test_framebuffer_ids_differ_across_allocations() {
        let mut allocator = FramebufferAllocator::new(Backends::software(false));
        let a = allocator.allocate(64, 64).unwrap();
        let b = allocator.allocate(64, 64).unwrap();
        assert_ne!(a.framebuffer_id(), b.framebuffer_id());
        allocator.release(a);
        allocator.release(b);
    }

    #[test]
    fn test_describe_names_backends() {
        let allocator = FramebufferAllocator::new(Backends::software(true));
        assert_eq!(allocator.describe(), "software-kms+software-gpu");
    }
}
