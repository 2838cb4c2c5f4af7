//! Cursor swapchain
//!
//! A small ring of plane buffers per monitor. The pointer core renders the next
//! cursor image into the buffer after the one currently on screen, so a plane
//! update never writes into the buffer being scanned out.

use smithay::utils::{Buffer, Size};
use thiserror::Error;
use tracing::{debug, trace};

use crate::arena::{Arena, Handle};
use crate::backend::{CursorFormat, CursorPlane, PlaneError};

/// Number of buffers in a cursor swapchain.
pub const CURSOR_SWAPCHAIN_LENGTH: usize = 2;

pub type BufferHandle = Handle<CursorBuffer>;

/// A plane buffer. `data` is the mapped memory for dumb buffers and the
/// offscreen render target for GPU buffers.
#[derive(Clone, PartialEq)]
pub struct CursorBuffer {
    /// Backend identifier of the underlying scanout buffer.
    pub id: u64,
    pub size: Size<i32, Buffer>,
    pub format: CursorFormat,
    pub stride: usize,
    pub cpu_mapped: bool,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for CursorBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("format", &self.format)
            .field("cpu_mapped", &self.cpu_mapped)
            .finish()
    }
}

impl CursorBuffer {
    /// Zero-filled (fully transparent) buffer.
    pub fn new(id: u64, size: Size<i32, Buffer>, format: CursorFormat, cpu_mapped: bool) -> Self {
        let stride = size.w.max(0) as usize * format.bytes_per_pixel();
        Self {
            id,
            size,
            format,
            stride,
            cpu_mapped,
            data: vec![0; stride * size.h.max(0) as usize],
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Raw bytes of one pixel, in the buffer's format.
    pub fn pixel(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        if x < 0 || y < 0 || x >= self.size.w || y >= self.size.h {
            return None;
        }
        let offset = y as usize * self.stride + x as usize * 4;
        let bytes = self.data.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainOptions {
    pub size: Size<i32, Buffer>,
    pub format: CursorFormat,
    pub length: usize,
    pub cpu_mapped: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum SwapchainError {
    #[error("cursor swapchain is not configured")]
    NotConfigured,
    #[error("invalid cursor swapchain size {0:?}")]
    InvalidSize(Size<i32, Buffer>),
    #[error(transparent)]
    Allocation(#[from] PlaneError),
}

#[derive(Debug, Default)]
pub struct CursorSwapchain {
    options: Option<SwapchainOptions>,
    buffers: Arena<CursorBuffer>,
    ring: Vec<BufferHandle>,
    next: usize,
    last_acquired: Option<usize>,
}

impl CursorSwapchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> Option<&SwapchainOptions> {
        self.options.as_ref()
    }

    pub fn needs_reconfigure(&self, options: &SwapchainOptions) -> bool {
        self.options.as_ref() != Some(options)
    }

    /// Replace every buffer with ones matching `options`.
    ///
    /// On failure the swapchain is left empty; old handles are stale either way.
    pub fn reconfigure(
        &mut self,
        options: SwapchainOptions,
        plane: &mut dyn CursorPlane,
    ) -> Result<(), SwapchainError> {
        self.release();

        if options.size.w <= 0 || options.size.h <= 0 || options.length == 0 {
            return Err(SwapchainError::InvalidSize(options.size));
        }

        let mut ring = Vec::with_capacity(options.length);
        for _ in 0..options.length {
            match plane.allocate(options.size, options.format, options.cpu_mapped) {
                Ok(buffer) => ring.push(self.buffers.insert(buffer)),
                Err(err) => {
                    for handle in ring {
                        self.buffers.remove(handle);
                    }
                    debug!(?options, "cursor swapchain allocation failed: {err}");
                    return Err(err.into());
                }
            }
        }

        trace!(?options, "cursor swapchain reconfigured");
        self.ring = ring;
        self.options = Some(options);
        Ok(())
    }

    /// Drop all buffers.
    pub fn release(&mut self) {
        for handle in self.ring.drain(..) {
            self.buffers.remove(handle);
        }
        self.options = None;
        self.next = 0;
        self.last_acquired = None;
    }

    /// Take the next buffer in the ring.
    pub fn acquire(&mut self) -> Result<BufferHandle, SwapchainError> {
        if self.ring.is_empty() {
            return Err(SwapchainError::NotConfigured);
        }
        let index = self.next % self.ring.len();
        self.last_acquired = Some(index);
        self.next = (index + 1) % self.ring.len();
        Ok(self.ring[index])
    }

    /// Give back the last acquired buffer so the next `acquire` returns it again.
    ///
    /// Used when the cursor is re-rendered before the previous render was shown.
    pub fn rollback(&mut self) {
        if let Some(index) = self.last_acquired.take() {
            self.next = index;
        }
    }

    pub fn get(&self, handle: BufferHandle) -> Option<&CursorBuffer> {
        self.buffers.get(handle)
    }

    pub fn get_mut(&mut self, handle: BufferHandle) -> Option<&mut CursorBuffer> {
        self.buffers.get_mut(handle)
    }

    pub fn is_configured(&self) -> bool {
        self.options.is_some()
    }
}
