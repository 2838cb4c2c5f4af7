//! Monitors as seen by the pointer core
//!
//! A [`Monitor`] carries the geometry the pointer needs (logical position, mode,
//! scale, transform), the workspace bookkeeping focus resolution reads, and the
//! optional hardware [`CursorPlane`]. Mode-setting itself happens elsewhere; the
//! compositor updates these fields and then notifies the pointer core.

use smithay::utils::{Logical, Physical, Point, Rectangle, Size, Transform};

use crate::arena::{Arena, Handle};
use crate::backend::CursorPlane;
use crate::frame_clock::FrameClock;
use crate::scene::WorkspaceHandle;
use crate::utils::logical_size;

pub type MonitorHandle = Handle<Monitor>;

/// Distance kept from the far edges of a box so clamped points stay inside it.
pub const EDGE_EPSILON: f64 = 1e-6;

#[derive(Debug)]
pub struct Monitor {
    pub name: String,
    /// Top-left corner in the global logical space.
    pub position: Point<i32, Logical>,
    /// Current mode size, before transform.
    pub mode: Size<i32, Physical>,
    pub refresh_mhz: i32,
    pub scale: f64,
    pub transform: Transform,
    pub enabled: bool,
    pub dpms_on: bool,
    pub mirror_of: Option<MonitorHandle>,
    /// Variable refresh rate currently active.
    pub adaptive_sync: bool,
    pub active_workspace: Option<WorkspaceHandle>,
    /// Special (scratchpad) workspace opened on top of the active one.
    pub special_workspace: Option<WorkspaceHandle>,
    pub frame_clock: FrameClock,
    plane: Option<Box<dyn CursorPlane>>,
}

impl Monitor {
    pub fn new(name: impl Into<String>, mode: impl Into<Size<i32, Physical>>) -> Self {
        Self {
            name: name.into(),
            position: Point::default(),
            mode: mode.into(),
            refresh_mhz: 60_000,
            scale: 1.0,
            transform: Transform::Normal,
            enabled: true,
            dpms_on: true,
            mirror_of: None,
            adaptive_sync: false,
            active_workspace: None,
            special_workspace: None,
            frame_clock: FrameClock::from_refresh_mhz(60_000),
            plane: None,
        }
    }

    pub fn with_position(mut self, position: impl Into<Point<i32, Logical>>) -> Self {
        self.position = position.into();
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_refresh(mut self, refresh_mhz: i32) -> Self {
        self.refresh_mhz = refresh_mhz;
        self.frame_clock = FrameClock::from_refresh_mhz(refresh_mhz);
        self
    }

    pub fn with_plane(mut self, plane: impl CursorPlane + 'static) -> Self {
        self.plane = Some(Box::new(plane));
        self
    }

    pub fn set_plane(&mut self, plane: Option<Box<dyn CursorPlane>>) {
        self.plane = plane;
    }

    pub fn plane(&self) -> Option<&dyn CursorPlane> {
        self.plane.as_deref()
    }

    pub fn plane_mut(&mut self) -> Option<&mut (dyn CursorPlane + 'static)> {
        self.plane.as_deref_mut()
    }

    pub fn has_plane(&self) -> bool {
        self.plane.is_some()
    }

    pub fn is_mirror(&self) -> bool {
        self.mirror_of.is_some()
    }

    /// Whether the monitor is part of the reachable layout.
    pub fn in_layout(&self) -> bool {
        self.enabled && !self.is_mirror()
    }

    pub fn logical_size(&self) -> Size<f64, Logical> {
        logical_size(self.mode, self.scale, self.transform)
    }

    /// Monitor rectangle in global logical coordinates.
    pub fn logical_box(&self) -> Rectangle<f64, Logical> {
        Rectangle::new(self.position.to_f64(), self.logical_size())
    }

    /// Mode size after applying the output transform.
    pub fn transformed_size(&self) -> Size<i32, Physical> {
        self.transform.transform_size(self.mode)
    }
}

/// Nearest point to `point` inside `rect`, staying [`EDGE_EPSILON`] away from the
/// exclusive far edges.
pub fn closest_point_in(
    rect: Rectangle<f64, Logical>,
    point: Point<f64, Logical>,
) -> Point<f64, Logical> {
    if rect.contains(point) {
        return point;
    }
    let max_x = (rect.loc.x + rect.size.w - EDGE_EPSILON).max(rect.loc.x);
    let max_y = (rect.loc.y + rect.size.h - EDGE_EPSILON).max(rect.loc.y);
    (point.x.clamp(rect.loc.x, max_x), point.y.clamp(rect.loc.y, max_y)).into()
}

/// Snapshot of the boxes of every enabled, non-mirrored monitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorLayout {
    boxes: Vec<(MonitorHandle, Rectangle<f64, Logical>)>,
}

impl MonitorLayout {
    pub fn from_monitors(monitors: &Arena<Monitor>) -> Self {
        let boxes = monitors
            .iter()
            .filter(|(_, monitor)| monitor.in_layout())
            .map(|(handle, monitor)| (handle, monitor.logical_box()))
            .filter(|(_, rect)| !rect.is_empty())
            .collect();
        Self { boxes }
    }

    pub fn boxes(&self) -> impl Iterator<Item = Rectangle<f64, Logical>> + '_ {
        self.boxes.iter().map(|(_, rect)| *rect)
    }

    pub fn monitors(&self) -> impl Iterator<Item = MonitorHandle> + '_ {
        self.boxes.iter().map(|(handle, _)| *handle)
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn contains(&self, point: Point<f64, Logical>) -> bool {
        self.boxes.iter().any(|(_, rect)| rect.contains(point))
    }

    pub fn monitor_at(&self, point: Point<f64, Logical>) -> Option<MonitorHandle> {
        self.boxes
            .iter()
            .find(|(_, rect)| rect.contains(point))
            .map(|(handle, _)| *handle)
    }

    pub fn box_of(&self, monitor: MonitorHandle) -> Option<Rectangle<f64, Logical>> {
        self.boxes
            .iter()
            .find(|(handle, _)| *handle == monitor)
            .map(|(_, rect)| *rect)
    }

    /// Smallest rectangle covering every monitor.
    pub fn bounding_box(&self) -> Option<Rectangle<f64, Logical>> {
        self.boxes().reduce(|acc, rect| acc.merge(rect))
    }

    /// Nearest point on any monitor, `None` for an empty layout.
    pub fn nearest_point(&self, point: Point<f64, Logical>) -> Option<Point<f64, Logical>> {
        let mut best: Option<(f64, Point<f64, Logical>)> = None;
        for rect in self.boxes() {
            let candidate = closest_point_in(rect, point);
            let dx = candidate.x - point.x;
            let dy = candidate.y - point.y;
            let distance_sq = dx * dx + dy * dy;
            if best.map_or(true, |(best_sq, _)| distance_sq < best_sq) {
                best = Some((distance_sq, candidate));
            }
        }
        best.map(|(_, point)| point)
    }
}
