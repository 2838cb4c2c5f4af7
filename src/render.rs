//! Cursor rendering and damage
//!
//! Two ways to put cursor pixels on a monitor:
//!
//! - **Plane buffers**: the cursor image is drawn into a swapchain buffer that the
//!   cursor plane scans out. Buffers live in the monitor's untransformed mode space,
//!   so the image is scaled to device pixels and rotated by the inverse output
//!   transform. [`blit_cursor`] does this on the CPU for dumb buffers; a
//!   [`CursorRenderer`] may do it on the GPU.
//! - **Software cursors**: the renderer composites the cursor into the regular frame,
//!   which needs damage. [`DamageTracker`] collects per-monitor damage and frame
//!   requests for the render loop.
//!
//! # Design Invariants
//!
//! 1. **Plane buffers are fully rewritten**: every blit clears the buffer first, so
//!    padding around a smaller image is always transparent.
//!
//! 2. **Damage is per monitor**: callers clip boxes to the monitor they damage.

use std::collections::HashMap;

use smithay::utils::{Buffer, Logical, Physical, Point, Rectangle, Size, Transform};
use thiserror::Error;
use tracing::trace;

use crate::backend::CursorFormat;
use crate::cursor::CursorView;
use crate::monitor::MonitorHandle;
use crate::swapchain::CursorBuffer;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("cursor image is empty")]
    EmptyImage,
    #[error("cursor buffer {buffer:?} cannot hold a {needed:?} image")]
    BufferTooSmall {
        buffer: Size<i32, Buffer>,
        needed: Size<i32, Buffer>,
    },
    #[error("renderer cannot draw into cursor buffers: {0}")]
    Unsupported(String),
}

/// Draws cursor images for the pointer core.
pub trait CursorRenderer {
    /// Render `cursor` into a plane buffer for a monitor with the given scale and
    /// transform.
    fn render_cursor_to_buffer(
        &mut self,
        cursor: &CursorView<'_>,
        buffer: &mut CursorBuffer,
        monitor_scale: f64,
        transform: Transform,
    ) -> Result<(), RenderError>;

    /// Composite a software cursor into the frame of `monitor`. `dest` is the cursor
    /// box and `damage` the part of it that needs drawing, both in global logical
    /// coordinates.
    fn draw_software_cursor(
        &mut self,
        monitor: MonitorHandle,
        cursor: &CursorView<'_>,
        dest: Rectangle<f64, Logical>,
        damage: Rectangle<f64, Logical>,
    );
}

/// Renderer without a GPU: plane buffers are filled with [`blit_cursor`] and software
/// cursors are left to the frame compositor.
#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    software_draws: usize,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn software_draws(&self) -> usize {
        self.software_draws
    }
}

impl CursorRenderer for SoftwareRenderer {
    fn render_cursor_to_buffer(
        &mut self,
        cursor: &CursorView<'_>,
        buffer: &mut CursorBuffer,
        monitor_scale: f64,
        transform: Transform,
    ) -> Result<(), RenderError> {
        blit_cursor(cursor, buffer, monitor_scale, transform).map(|_| ())
    }

    fn draw_software_cursor(
        &mut self,
        monitor: MonitorHandle,
        _cursor: &CursorView<'_>,
        dest: Rectangle<f64, Logical>,
        damage: Rectangle<f64, Logical>,
    ) {
        trace!(?monitor, ?dest, ?damage, "drawing software cursor");
        self.software_draws += 1;
    }
}

/// Size of the cursor image in device pixels on a monitor with `monitor_scale`,
/// before the output transform.
pub fn cursor_physical_size(cursor: &CursorView<'_>, monitor_scale: f64) -> Size<i32, Physical> {
    let logical = cursor.logical_size();
    (
        ((logical.w * monitor_scale).round() as i32).max(1),
        ((logical.h * monitor_scale).round() as i32).max(1),
    )
        .into()
}

/// Size the image occupies in a plane buffer (mode space).
pub fn cursor_buffer_size(
    cursor: &CursorView<'_>,
    monitor_scale: f64,
    transform: Transform,
) -> Size<i32, Buffer> {
    let size = transform
        .invert()
        .transform_size(cursor_physical_size(cursor, monitor_scale));
    (size.w, size.h).into()
}

/// Hotspot of the image inside a plane buffer.
pub fn cursor_buffer_hotspot(
    cursor: &CursorView<'_>,
    monitor_scale: f64,
    transform: Transform,
) -> Point<i32, Buffer> {
    let size = cursor_physical_size(cursor, monitor_scale).to_f64();
    let hotspot: Point<f64, Physical> =
        (cursor.hotspot.x * monitor_scale, cursor.hotspot.y * monitor_scale).into();
    let hotspot = transform.invert().transform_point_in(hotspot, &size);
    (hotspot.x.round() as i32, hotspot.y.round() as i32).into()
}

/// Copy `cursor` into a CPU-mapped plane buffer: scale to device pixels, rotate into
/// mode space, convert the pixel format, and pad the rest of the buffer with
/// transparency. Images larger than the buffer are cropped.
///
/// Returns the size the image covers in the buffer.
pub fn blit_cursor(
    cursor: &CursorView<'_>,
    buffer: &mut CursorBuffer,
    monitor_scale: f64,
    transform: Transform,
) -> Result<Size<i32, Buffer>, RenderError> {
    if cursor.size.w <= 0 || cursor.size.h <= 0 || cursor.pixels.is_empty() {
        return Err(RenderError::EmptyImage);
    }
    if buffer.data.len() < buffer.stride * buffer.size.h.max(0) as usize {
        return Err(RenderError::BufferTooSmall {
            buffer: buffer.size,
            needed: cursor_buffer_size(cursor, monitor_scale, transform),
        });
    }

    let physical = cursor_physical_size(cursor, monitor_scale);
    let image = cursor_buffer_size(cursor, monitor_scale, transform);
    let mode_size: Size<f64, Physical> = (image.w as f64, image.h as f64).into();
    let swap = CursorFormat::Argb8888.swaps_red_blue(buffer.format);

    buffer.clear();
    let width = image.w.min(buffer.size.w);
    let height = image.h.min(buffer.size.h);
    for y in 0..height {
        for x in 0..width {
            // Pixel center in mode space, mapped back into the upright image
            let center: Point<f64, Physical> = (x as f64 + 0.5, y as f64 + 0.5).into();
            let upright = transform.transform_point_in(center, &mode_size);
            let src_x = (upright.x * cursor.size.w as f64 / physical.w as f64).floor() as i32;
            let src_y = (upright.y * cursor.size.h as f64 / physical.h as f64).floor() as i32;

            let mut pixel = cursor.pixel(src_x, src_y);
            if swap {
                pixel.swap(0, 2);
            }
            let offset = y as usize * buffer.stride + x as usize * 4;
            buffer.data[offset..offset + 4].copy_from_slice(&pixel);
        }
    }

    Ok(image)
}

/// Pending damage of one monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorDamage {
    pub boxes: Vec<Rectangle<f64, Logical>>,
    /// The whole monitor needs repainting.
    pub full: bool,
    pub frame_requested: bool,
}

/// Per-monitor damage and frame requests, drained by the render loop.
#[derive(Debug, Default)]
pub struct DamageTracker {
    monitors: HashMap<MonitorHandle, MonitorDamage>,
}

impl DamageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Damage a box on a monitor. `schedule_frame` is false when the damage may wait
    /// for the next frame the monitor renders anyway.
    pub fn damage_box(
        &mut self,
        monitor: MonitorHandle,
        rect: Rectangle<f64, Logical>,
        schedule_frame: bool,
    ) {
        if rect.is_empty() {
            return;
        }
        let damage = self.monitors.entry(monitor).or_default();
        damage.boxes.push(rect);
        damage.frame_requested |= schedule_frame;
    }

    pub fn damage_monitor(&mut self, monitor: MonitorHandle) {
        let damage = self.monitors.entry(monitor).or_default();
        damage.full = true;
        damage.frame_requested = true;
    }

    /// Ask for a frame without adding damage.
    pub fn schedule_frame(&mut self, monitor: MonitorHandle) {
        self.monitors.entry(monitor).or_default().frame_requested = true;
    }

    pub fn get(&self, monitor: MonitorHandle) -> Option<&MonitorDamage> {
        self.monitors.get(&monitor)
    }

    pub fn is_damaged(&self, monitor: MonitorHandle) -> bool {
        self.monitors
            .get(&monitor)
            .is_some_and(|d| d.full || !d.boxes.is_empty())
    }

    pub fn frame_requested(&self, monitor: MonitorHandle) -> bool {
        self.monitors.get(&monitor).is_some_and(|d| d.frame_requested)
    }

    /// Drain the damage of one monitor.
    pub fn take(&mut self, monitor: MonitorHandle) -> MonitorDamage {
        self.monitors.remove(&monitor).unwrap_or_default()
    }

    pub fn remove_monitor(&mut self, monitor: MonitorHandle) {
        self.monitors.remove(&monitor);
    }

    pub fn clear(&mut self) {
        self.monitors.clear();
    }
}
