//! Event types flowing into and out of the pointer core.
//!
//! Inbound: [`InputEvent`], the normalized events produced by the device layer.
//! Outbound: [`PresentationEvent`] and [`FocusEvent`], delivered through a [`Signal`]
//! owned by the emitting component. Subscribers hold a [`Subscription`]; dropping it
//! detaches the listener.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use cursor_icon::CursorIcon;
use smithay::utils::{Logical, Point};

use crate::monitor::MonitorHandle;
use crate::scene::SurfaceHandle;

/// Identifier the device layer assigns to a physical device.
pub type DeviceId = u32;

/// A coordinate in the `[0, 1] x [0, 1]` space of an absolute device.
///
/// Components may be NaN for devices that only report one axis per event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub x: f64,
    pub y: f64,
}

impl Normalized {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Normalized {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource {
    Wheel,
    Finger,
    Continuous,
    WheelTilt,
}

/// Normalized input from the device layer. `time_msec` is a monotonic timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerMotion {
        device: DeviceId,
        time_msec: u32,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
    },
    PointerMotionAbsolute {
        device: DeviceId,
        time_msec: u32,
        position: Normalized,
    },
    PointerButton {
        device: DeviceId,
        time_msec: u32,
        button: u32,
        state: ButtonState,
    },
    PointerAxis {
        device: DeviceId,
        time_msec: u32,
        axis: Axis,
        value: f64,
        discrete: i32,
        source: AxisSource,
    },
    TabletToolAxis {
        device: DeviceId,
        time_msec: u32,
        position: Normalized,
    },
    TabletToolTip {
        device: DeviceId,
        time_msec: u32,
        state: ButtonState,
    },
    TouchDown {
        device: DeviceId,
        time_msec: u32,
        slot: i32,
        position: Normalized,
    },
    TouchMotion {
        device: DeviceId,
        time_msec: u32,
        slot: i32,
        position: Normalized,
    },
    TouchUp {
        device: DeviceId,
        time_msec: u32,
        slot: i32,
    },
}

impl InputEvent {
    pub fn device(&self) -> DeviceId {
        match self {
            InputEvent::PointerMotion { device, .. }
            | InputEvent::PointerMotionAbsolute { device, .. }
            | InputEvent::PointerButton { device, .. }
            | InputEvent::PointerAxis { device, .. }
            | InputEvent::TabletToolAxis { device, .. }
            | InputEvent::TabletToolTip { device, .. }
            | InputEvent::TouchDown { device, .. }
            | InputEvent::TouchMotion { device, .. }
            | InputEvent::TouchUp { device, .. } => *device,
        }
    }

    pub fn time_msec(&self) -> u32 {
        match self {
            InputEvent::PointerMotion { time_msec, .. }
            | InputEvent::PointerMotionAbsolute { time_msec, .. }
            | InputEvent::PointerButton { time_msec, .. }
            | InputEvent::PointerAxis { time_msec, .. }
            | InputEvent::TabletToolAxis { time_msec, .. }
            | InputEvent::TabletToolTip { time_msec, .. }
            | InputEvent::TouchDown { time_msec, .. }
            | InputEvent::TouchMotion { time_msec, .. }
            | InputEvent::TouchUp { time_msec, .. } => *time_msec,
        }
    }
}

/// Emitted by the pointer presentation engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    /// The cursor bounding box started overlapping the monitor.
    MonitorEntered(MonitorHandle),
    /// The cursor bounding box stopped overlapping the monitor.
    MonitorLeft(MonitorHandle),
    /// The monitor fell back to software cursors.
    HardwareCursorFailed { monitor: MonitorHandle, reason: String },
    /// A monitor that had fallen back displays the cursor on its plane again.
    HardwareCursorRestored(MonitorHandle),
    SoftwareLockChanged { monitor: MonitorHandle, locks: u32 },
    CursorImageChanged,
}

/// Emitted by the focus resolution engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FocusEvent {
    PointerFocusChanged(Option<SurfaceHandle>),
    KeyboardFocusChanged(Option<SurfaceHandle>),
    ActiveMonitorChanged(MonitorHandle),
    CursorIconChanged(CursorIcon),
}

type Listener<E> = dyn Fn(&E);

/// Observer list owned by the emitting component.
pub struct Signal<E> {
    listeners: RefCell<Vec<Weak<Listener<E>>>>,
}

impl<E> Default for Signal<E> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E> std::fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<E: 'static> Signal<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays attached for as long as the returned
    /// [`Subscription`] is alive.
    #[must_use = "dropping the subscription detaches the listener"]
    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> Subscription {
        let listener: Rc<Listener<E>> = Rc::new(listener);
        self.listeners.borrow_mut().push(Rc::downgrade(&listener));
        Subscription {
            _listener: Box::new(listener),
        }
    }

    /// Deliver an event to every live listener, in subscription order.
    pub fn emit(&self, event: &E) {
        // Upgrade first so listeners may subscribe or unsubscribe while running.
        let live: Vec<Rc<Listener<E>>> = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Keeps a [`Signal`] listener attached. Detaches on drop.
pub struct Subscription {
    _listener: Box<dyn Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}
