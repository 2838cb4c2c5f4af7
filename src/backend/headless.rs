//! Headless cursor plane for testing
//!
//! This module provides a virtual cursor plane that doesn't require DRM access,
//! allowing the pointer core to run in CI environments and integration tests.
//!
//! # Design Invariants
//!
//! 1. **No hardware access**: buffers are plain memory, "scanout" just records
//!    which buffer the plane would display.
//!
//! 2. **Scriptable failures**: a [`PlaneProbe`] shares the plane's state, so tests can
//!    make allocation or buffer submission fail at any point and observe what the
//!    plane currently shows.

use std::cell::RefCell;
use std::rc::Rc;

use smithay::utils::{Buffer, Physical, Point, Size};
use tracing::trace;

use super::{CursorFormat, CursorPlane, PlaneError, PlaneSize};
use crate::swapchain::CursorBuffer;

/// What the plane is currently scanning out.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownCursor {
    pub buffer_id: u64,
    pub hotspot: Point<i32, Buffer>,
    pub size: Size<i32, Buffer>,
    pub format: CursorFormat,
    /// Copy of the buffer contents at submission time.
    pub pixels: Vec<u8>,
}

#[derive(Debug, Default)]
struct PlaneState {
    position: Option<Point<i32, Physical>>,
    shown: Option<ShownCursor>,
    fail_set_cursor: bool,
    fail_allocations: bool,
    set_calls: usize,
    move_calls: usize,
    allocations: usize,
    next_buffer_id: u64,
}

/// Virtual cursor plane.
#[derive(Debug)]
pub struct HeadlessPlane {
    size: PlaneSize,
    formats: Vec<CursorFormat>,
    state: Rc<RefCell<PlaneState>>,
}

/// Test-side view of a [`HeadlessPlane`].
#[derive(Debug, Clone)]
pub struct PlaneProbe {
    state: Rc<RefCell<PlaneState>>,
}

impl HeadlessPlane {
    /// Create a plane and the probe observing it.
    pub fn new(size: PlaneSize) -> (Self, PlaneProbe) {
        let state = Rc::new(RefCell::new(PlaneState {
            next_buffer_id: 1,
            ..Default::default()
        }));
        let plane = Self {
            size,
            formats: vec![CursorFormat::Argb8888],
            state: state.clone(),
        };
        (plane, PlaneProbe { state })
    }

    pub fn with_formats(mut self, formats: Vec<CursorFormat>) -> Self {
        self.formats = formats;
        self
    }
}

impl CursorPlane for HeadlessPlane {
    fn plane_size(&self) -> PlaneSize {
        self.size
    }

    fn formats(&self) -> &[CursorFormat] {
        &self.formats
    }

    fn move_cursor(&mut self, position: Point<i32, Physical>, _skip_frame: bool) {
        let mut state = self.state.borrow_mut();
        state.position = Some(position);
        state.move_calls += 1;
    }

    fn set_cursor(
        &mut self,
        buffer: Option<&CursorBuffer>,
        hotspot: Point<i32, Buffer>,
    ) -> Result<(), PlaneError> {
        let mut state = self.state.borrow_mut();
        state.set_calls += 1;

        let Some(buffer) = buffer else {
            state.shown = None;
            return Ok(());
        };

        if state.fail_set_cursor {
            trace!(buffer = buffer.id, "headless plane rejecting cursor buffer");
            return Err(PlaneError::Rejected("scripted failure".into()));
        }

        state.shown = Some(ShownCursor {
            buffer_id: buffer.id,
            hotspot,
            size: buffer.size,
            format: buffer.format,
            pixels: buffer.data.clone(),
        });
        Ok(())
    }

    fn allocate(
        &mut self,
        size: Size<i32, Buffer>,
        format: CursorFormat,
        cpu_mapped: bool,
    ) -> Result<CursorBuffer, PlaneError> {
        let mut state = self.state.borrow_mut();
        if state.fail_allocations {
            return Err(PlaneError::Allocation("scripted failure".into()));
        }
        if !self.formats.contains(&format) {
            return Err(PlaneError::Allocation(format!("unsupported format {format}")));
        }

        let id = state.next_buffer_id;
        state.next_buffer_id += 1;
        state.allocations += 1;
        Ok(CursorBuffer::new(id, size, format, cpu_mapped))
    }
}

impl PlaneProbe {
    pub fn fail_set_cursor(&self, fail: bool) {
        self.state.borrow_mut().fail_set_cursor = fail;
    }

    pub fn fail_allocations(&self, fail: bool) {
        self.state.borrow_mut().fail_allocations = fail;
    }

    /// Last position the plane was moved to.
    pub fn position(&self) -> Option<Point<i32, Physical>> {
        self.state.borrow().position
    }

    pub fn shown(&self) -> Option<ShownCursor> {
        self.state.borrow().shown.clone()
    }

    pub fn is_visible(&self) -> bool {
        self.state.borrow().shown.is_some()
    }

    pub fn set_calls(&self) -> usize {
        self.state.borrow().set_calls
    }

    pub fn move_calls(&self) -> usize {
        self.state.borrow().move_calls
    }

    pub fn allocations(&self) -> usize {
        self.state.borrow().allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_plane_shows_and_hides() {
        let (mut plane, probe) = HeadlessPlane::new(PlaneSize::Max((64, 64).into()));
        let buffer = plane
            .allocate((64, 64).into(), CursorFormat::Argb8888, true)
            .unwrap();

        plane.set_cursor(Some(&buffer), (3, 4).into()).unwrap();
        let shown = probe.shown().unwrap();
        assert_eq!(shown.buffer_id, buffer.id);
        assert_eq!(shown.hotspot, Point::from((3, 4)));

        plane.set_cursor(None, Point::default()).unwrap();
        assert!(!probe.is_visible());
        assert_eq!(probe.set_calls(), 2);
    }

    #[test]
    fn test_headless_plane_scripted_failures() {
        let (mut plane, probe) = HeadlessPlane::new(PlaneSize::Unlimited);
        let buffer = plane
            .allocate((8, 8).into(), CursorFormat::Argb8888, false)
            .unwrap();

        probe.fail_set_cursor(true);
        assert!(plane.set_cursor(Some(&buffer), Point::default()).is_err());
        // Hiding never fails
        assert!(plane.set_cursor(None, Point::default()).is_ok());

        probe.fail_allocations(true);
        assert!(plane
            .allocate((8, 8).into(), CursorFormat::Argb8888, false)
            .is_err());
        assert!(plane
            .allocate((8, 8).into(), CursorFormat::Abgr8888, false)
            .is_err());
    }
}
