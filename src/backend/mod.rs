//! Cursor plane backends
//!
//! A monitor that can show a cursor without compositing exposes a [`CursorPlane`].
//! The pointer core only ever talks to the plane through this trait:
//!
//! - **Capability**: [`CursorPlane::plane_size`] reports whether a plane exists and
//!   how large a buffer it accepts.
//! - **Position**: [`CursorPlane::move_cursor`] takes monitor-local physical pixels,
//!   already corrected for scale and output transform.
//! - **Image**: [`CursorPlane::set_cursor`] shows a buffer (or hides the cursor with
//!   `None`). Buffers come from [`CursorPlane::allocate`] through the monitor's cursor
//!   swapchain.
//!
//! # Design Invariants
//!
//! 1. **Failure is local**: any error from a plane only affects the monitor owning it.
//!    The pointer core turns it into a software fallback for that monitor.
//!
//! 2. **Hide is infallible**: `set_cursor(None, ..)` must always succeed, so a monitor
//!    can be cleared before teardown regardless of the plane's state.
//!
//! Backends:
//!
//! - **Headless backend** (`headless`): virtual planes for testing, with scriptable
//!   failures and inspectable state.

pub mod headless;

pub use headless::{HeadlessPlane, PlaneProbe};

use std::fmt;

use smithay::utils::{Buffer, Physical, Point, Size};
use thiserror::Error;

use crate::swapchain::CursorBuffer;

/// Pixel layouts understood by cursor planes, named after their DRM fourcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorFormat {
    /// Byte order B, G, R, A in memory (little-endian `0xAARRGGBB`).
    #[default]
    Argb8888,
    /// Byte order R, G, B, A in memory.
    Abgr8888,
}

impl CursorFormat {
    pub fn bytes_per_pixel(self) -> usize {
        4
    }

    /// Whether this format stores red and blue swapped relative to `other`.
    pub fn swaps_red_blue(self, other: CursorFormat) -> bool {
        self != other
    }
}

impl fmt::Display for CursorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorFormat::Argb8888 => f.write_str("AR24"),
            CursorFormat::Abgr8888 => f.write_str("AB24"),
        }
    }
}

/// Buffer size constraints of a cursor plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSize {
    /// The output has no usable cursor plane.
    Unsupported,
    /// Any buffer size is accepted; buffers are sized to the cursor image.
    Unlimited,
    /// Buffers must be exactly this size; larger images cannot be shown.
    Max(Size<i32, Buffer>),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaneError {
    #[error("output has no cursor plane")]
    NoCapability,
    #[error("cursor plane rejected the buffer: {0}")]
    Rejected(String),
    #[error("cursor buffer allocation failed: {0}")]
    Allocation(String),
}

/// Hardware cursor plane of one monitor.
pub trait CursorPlane: fmt::Debug {
    fn plane_size(&self) -> PlaneSize;

    /// Formats the plane can scan out, preferred first.
    fn formats(&self) -> &[CursorFormat];

    /// Move the plane. `skip_frame` asks the backend not to schedule a frame for it.
    fn move_cursor(&mut self, position: Point<i32, Physical>, skip_frame: bool);

    /// Show `buffer` with the given hotspot, or hide the cursor with `None`.
    fn set_cursor(
        &mut self,
        buffer: Option<&CursorBuffer>,
        hotspot: Point<i32, Buffer>,
    ) -> Result<(), PlaneError>;

    /// Allocate a scanout-capable buffer. `cpu_mapped` requests a dumb buffer the
    /// pointer core may write pixels into directly.
    fn allocate(
        &mut self,
        size: Size<i32, Buffer>,
        format: CursorFormat,
        cpu_mapped: bool,
    ) -> Result<CursorBuffer, PlaneError>;
}
