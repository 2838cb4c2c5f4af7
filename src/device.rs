//! Input devices
//!
//! The device layer registers every physical device with its class and its output
//! binding. Absolute devices (tablets, touchscreens, absolute pointers) report
//! positions in `[0, 1] x [0, 1]`; [`DeviceManager::map_absolute`] turns those into
//! global logical coordinates using the device's binding:
//!
//! 1. an explicit logical `region`, else
//! 2. the box of the monitor named by `bound_output`, else
//! 3. the bounding box of the whole layout.
//!
//! A tablet `active_area` first narrows the part of the device surface in use.

use std::collections::HashMap;

use smithay::utils::{Logical, Point, Rectangle};
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::event::{DeviceId, Normalized};
use crate::monitor::{Monitor, MonitorLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceClass {
    #[default]
    Mouse,
    Touch,
    Tablet,
}

/// Normalized sub-rectangle of a device surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveArea {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl ActiveArea {
    fn remap_x(&self, x: f64) -> f64 {
        remap(x, self.x, self.w)
    }

    fn remap_y(&self, y: f64) -> f64 {
        remap(y, self.y, self.h)
    }
}

fn remap(value: f64, origin: f64, extent: f64) -> f64 {
    if extent <= 0.0 {
        return value;
    }
    (value - origin) / extent
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputDevice {
    pub id: DeviceId,
    pub name: String,
    pub class: DeviceClass,
    /// Name of the monitor absolute input is mapped to.
    pub bound_output: Option<String>,
    pub active_area: Option<ActiveArea>,
    /// Logical region absolute input is mapped to. Wins over `bound_output`.
    pub region: Option<Rectangle<f64, Logical>>,
}

impl InputDevice {
    pub fn new(id: DeviceId, name: impl Into<String>, class: DeviceClass) -> Self {
        Self {
            id,
            name: name.into(),
            class,
            bound_output: None,
            active_area: None,
            region: None,
        }
    }

    pub fn bound_to(mut self, output: impl Into<String>) -> Self {
        self.bound_output = Some(output.into());
        self
    }

    pub fn with_region(mut self, region: Rectangle<f64, Logical>) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_active_area(mut self, area: ActiveArea) -> Self {
        self.active_area = Some(area);
        self
    }
}

#[derive(Debug, Default)]
pub struct DeviceManager {
    devices: HashMap<DeviceId, InputDevice>,
    last_class: DeviceClass,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, device: InputDevice) {
        debug!(id = device.id, name = %device.name, class = ?device.class, "input device added");
        self.devices.insert(device.id, device);
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<InputDevice> {
        let device = self.devices.remove(&id)?;
        debug!(id, name = %device.name, "input device removed");
        Some(device)
    }

    pub fn get(&self, id: DeviceId) -> Option<&InputDevice> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut InputDevice> {
        self.devices.get_mut(&id)
    }

    /// Class of a device; unknown devices count as mice.
    pub fn class_of(&self, id: DeviceId) -> DeviceClass {
        self.devices.get(&id).map(|d| d.class).unwrap_or_default()
    }

    /// Remember which kind of device produced the latest input.
    pub fn note_input(&mut self, class: DeviceClass) {
        if self.last_class != class {
            trace!(?class, "last input device class changed");
        }
        self.last_class = class;
    }

    pub fn last_class(&self) -> DeviceClass {
        self.last_class
    }

    /// Rectangle absolute input from `device` maps to, `None` with an empty layout.
    pub fn target_rect(
        &self,
        device: DeviceId,
        monitors: &Arena<Monitor>,
        layout: &MonitorLayout,
    ) -> Option<Rectangle<f64, Logical>> {
        let device = self.devices.get(&device);
        if let Some(region) = device.and_then(|d| d.region) {
            return Some(region);
        }
        if let Some(output) = device.and_then(|d| d.bound_output.as_deref()) {
            let bound = layout.monitors().find_map(|handle| {
                let monitor = monitors.get(handle)?;
                (monitor.name == output).then(|| monitor.logical_box())
            });
            if bound.is_some() {
                return bound;
            }
            trace!(output, "bound output is not in the layout, using the whole layout");
        }
        layout.bounding_box()
    }

    /// Map a normalized device position to global logical coordinates.
    ///
    /// Components are clamped to `[0, 1]`; a NaN component keeps the matching axis of
    /// `current`. Returns `None` if there is nowhere to map to.
    pub fn map_absolute(
        &self,
        device: DeviceId,
        position: Normalized,
        current: Point<f64, Logical>,
        monitors: &Arena<Monitor>,
        layout: &MonitorLayout,
    ) -> Option<Point<f64, Logical>> {
        let rect = self.target_rect(device, monitors, layout)?;
        let area = self.devices.get(&device).and_then(|d| d.active_area);

        let x = if position.x.is_nan() {
            current.x
        } else {
            let x = area.map_or(position.x, |a| a.remap_x(position.x));
            rect.loc.x + x.clamp(0.0, 1.0) * rect.size.w
        };
        let y = if position.y.is_nan() {
            current.y
        } else {
            let y = area.map_or(position.y, |a| a.remap_y(position.y));
            rect.loc.y + y.clamp(0.0, 1.0) * rect.size.h
        };
        Some((x, y).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (Arena<Monitor>, MonitorLayout) {
        let mut monitors = Arena::new();
        monitors.insert(Monitor::new("DP-1", (1920, 1080)));
        monitors.insert(Monitor::new("DP-2", (1280, 1024)).with_position((1920, 0)));
        let layout = MonitorLayout::from_monitors(&monitors);
        (monitors, layout)
    }

    #[test]
    fn test_target_rect_priority() {
        let (monitors, layout) = layout();
        let mut devices = DeviceManager::new();
        devices.add(InputDevice::new(1, "mouse", DeviceClass::Mouse));
        devices.add(InputDevice::new(2, "tablet", DeviceClass::Tablet).bound_to("DP-2"));
        devices.add(
            InputDevice::new(3, "pen", DeviceClass::Tablet)
                .bound_to("DP-2")
                .with_region(Rectangle::new((10.0, 10.0).into(), (100.0, 100.0).into())),
        );
        devices.add(InputDevice::new(4, "touch", DeviceClass::Touch).bound_to("HDMI-9"));

        let whole = Rectangle::new((0.0, 0.0).into(), (3200.0, 1080.0).into());
        assert_eq!(devices.target_rect(1, &monitors, &layout), Some(whole));
        assert_eq!(
            devices.target_rect(2, &monitors, &layout),
            Some(Rectangle::new((1920.0, 0.0).into(), (1280.0, 1024.0).into()))
        );
        assert_eq!(
            devices.target_rect(3, &monitors, &layout),
            Some(Rectangle::new((10.0, 10.0).into(), (100.0, 100.0).into()))
        );
        assert_eq!(devices.target_rect(4, &monitors, &layout), Some(whole));
        assert_eq!(
            devices.target_rect(1, &monitors, &MonitorLayout::default()),
            None
        );
    }

    #[test]
    fn test_map_absolute_clamps_and_keeps_nan_axis() {
        let (monitors, layout) = layout();
        let devices = DeviceManager::new();
        let current = Point::from((5.0, 6.0));

        let p = devices
            .map_absolute(9, Normalized::new(1.5, 0.5), current, &monitors, &layout)
            .unwrap();
        assert_eq!(p, Point::from((3200.0, 540.0)));

        let p = devices
            .map_absolute(9, Normalized::new(f64::NAN, 0.0), current, &monitors, &layout)
            .unwrap();
        assert_eq!(p, Point::from((5.0, 0.0)));
    }

    #[test]
    fn test_active_area_remaps() {
        let (monitors, layout) = layout();
        let mut devices = DeviceManager::new();
        devices.add(
            InputDevice::new(2, "tablet", DeviceClass::Tablet)
                .with_region(Rectangle::new((0.0, 0.0).into(), (100.0, 100.0).into()))
                .with_active_area(ActiveArea {
                    x: 0.5,
                    y: 0.0,
                    w: 0.5,
                    h: 1.0,
                }),
        );

        let p = devices
            .map_absolute(2, Normalized::new(0.75, 0.25), Point::default(), &monitors, &layout)
            .unwrap();
        assert_eq!(p, Point::from((50.0, 25.0)));

        // Outside the active area clamps to its edge
        let p = devices
            .map_absolute(2, Normalized::new(0.25, 0.25), Point::default(), &monitors, &layout)
            .unwrap();
        assert_eq!(p.x, 0.0);
    }
}
