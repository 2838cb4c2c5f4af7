//! Seat: pointer and keyboard focus on the wire
//!
//! [`SeatManager`] is the protocol sink of the pointer core. Focus decisions arrive
//! through the [`ProtocolSink`] trait and leave as a queue of [`WireEvent`]s, one
//! per protocol event and pointer resource, ready for marshaling by the display.
//!
//! # Design Invariants
//!
//! 1. **Idempotent focus**: setting the focus to the surface that already has it
//!    sends nothing.
//!
//! 2. **No stuck buttons**: before a surface loses pointer focus, every button it saw
//!    pressed gets a synthesized release.
//!
//! 3. **One frame per batch**: a focus change (releases, leave, enter) is closed by a
//!    single frame event.
//!
//! 4. **Bounded serial history**: each client remembers the last
//!    [`SERIAL_HISTORY_CAPACITY`] serials it was sent; requests quoting older serials
//!    are rejected.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use smithay::utils::{Logical, Point, Serial};
use thiserror::Error;
use tracing::{debug, trace};

use crate::event::{Axis, AxisSource, ButtonState};
use crate::monitor::MonitorHandle;
use crate::scene::{ClientId, Scene, SurfaceHandle};

/// Serials remembered per client.
pub const SERIAL_HISTORY_CAPACITY: usize = 32;

/// A bound `wl_pointer` object.
pub type ResourceId = u32;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeatError {
    #[error("client {client} does not have pointer focus")]
    NotFocused { client: ClientId },
    #[error("serial {serial} is not a recent serial of client {client}")]
    StaleSerial { client: ClientId, serial: u32 },
    #[error("cursor surface no longer exists")]
    DeadSurface,
}

/// Most recent serials sent to one client, oldest evicted first.
#[derive(Debug, Clone)]
pub struct SerialHistory {
    serials: VecDeque<Serial>,
    capacity: usize,
}

impl Default for SerialHistory {
    fn default() -> Self {
        Self::with_capacity(SERIAL_HISTORY_CAPACITY)
    }
}

impl SerialHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            serials: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, serial: Serial) {
        if self.serials.len() == self.capacity {
            self.serials.pop_front();
        }
        self.serials.push_back(serial);
    }

    pub fn contains(&self, serial: Serial) -> bool {
        self.serials.contains(&serial)
    }

    pub fn len(&self) -> usize {
        self.serials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serials.is_empty()
    }
}

/// A protocol event addressed to one pointer resource or client.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    PointerEnter {
        resource: ResourceId,
        surface: SurfaceHandle,
        serial: Serial,
        local: Point<f64, Logical>,
    },
    PointerLeave {
        resource: ResourceId,
        surface: SurfaceHandle,
        serial: Serial,
    },
    PointerMotion {
        resource: ResourceId,
        time_msec: u32,
        local: Point<f64, Logical>,
    },
    PointerButton {
        resource: ResourceId,
        serial: Serial,
        time_msec: u32,
        button: u32,
        state: ButtonState,
    },
    PointerAxis {
        resource: ResourceId,
        time_msec: u32,
        axis: Axis,
        value: f64,
        discrete: i32,
        source: AxisSource,
    },
    PointerFrame {
        resource: ResourceId,
    },
    RelativeMotion {
        client: ClientId,
        time_msec: u32,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
    },
    KeyboardEnter {
        client: ClientId,
        surface: SurfaceHandle,
        serial: Serial,
    },
    KeyboardLeave {
        client: ClientId,
        surface: SurfaceHandle,
        serial: Serial,
    },
    SurfaceEnter {
        client: ClientId,
        surface: SurfaceHandle,
        monitor: MonitorHandle,
    },
    SurfaceLeave {
        client: ClientId,
        surface: SurfaceHandle,
        monitor: MonitorHandle,
    },
    FrameDone {
        client: ClientId,
        surface: SurfaceHandle,
        time_msec: u32,
    },
    DndEnter {
        client: ClientId,
        surface: SurfaceHandle,
        serial: Serial,
        local: Point<f64, Logical>,
    },
    DndMotion {
        client: ClientId,
        time_msec: u32,
        local: Point<f64, Logical>,
    },
    DndLeave {
        client: ClientId,
    },
    DndDrop {
        client: ClientId,
    },
}

impl fmt::Display for WireEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let point = |p: &Point<f64, Logical>| format!("({:.1}, {:.1})", p.x, p.y);
        match self {
            WireEvent::PointerEnter { resource, surface, serial, local } => write!(
                f,
                "wl_pointer@{resource}.enter {surface:?} serial={} {}",
                u32::from(*serial),
                point(local)
            ),
            WireEvent::PointerLeave { resource, surface, serial } => write!(
                f,
                "wl_pointer@{resource}.leave {surface:?} serial={}",
                u32::from(*serial)
            ),
            WireEvent::PointerMotion { resource, time_msec, local } => {
                write!(f, "wl_pointer@{resource}.motion t={time_msec} {}", point(local))
            }
            WireEvent::PointerButton { resource, serial, time_msec, button, state } => write!(
                f,
                "wl_pointer@{resource}.button serial={} t={time_msec} {button:#x} {state:?}",
                u32::from(*serial)
            ),
            WireEvent::PointerAxis { resource, time_msec, axis, value, discrete, source } => write!(
                f,
                "wl_pointer@{resource}.axis t={time_msec} {axis:?} {value:.1} discrete={discrete} {source:?}"
            ),
            WireEvent::PointerFrame { resource } => write!(f, "wl_pointer@{resource}.frame"),
            WireEvent::RelativeMotion { client, time_msec, delta, delta_unaccel } => write!(
                f,
                "relative_pointer[{client}].motion t={time_msec} {} unaccel={}",
                point(delta),
                point(delta_unaccel)
            ),
            WireEvent::KeyboardEnter { client, surface, serial } => write!(
                f,
                "wl_keyboard[{client}].enter {surface:?} serial={}",
                u32::from(*serial)
            ),
            WireEvent::KeyboardLeave { client, surface, serial } => write!(
                f,
                "wl_keyboard[{client}].leave {surface:?} serial={}",
                u32::from(*serial)
            ),
            WireEvent::SurfaceEnter { client, surface, monitor } => {
                write!(f, "wl_surface[{client}].enter {surface:?} output={monitor:?}")
            }
            WireEvent::SurfaceLeave { client, surface, monitor } => {
                write!(f, "wl_surface[{client}].leave {surface:?} output={monitor:?}")
            }
            WireEvent::FrameDone { client, surface, time_msec } => {
                write!(f, "wl_callback[{client}].done {surface:?} t={time_msec}")
            }
            WireEvent::DndEnter { client, surface, serial, local } => write!(
                f,
                "wl_data_device[{client}].enter {surface:?} serial={} {}",
                u32::from(*serial),
                point(local)
            ),
            WireEvent::DndMotion { client, time_msec, local } => {
                write!(f, "wl_data_device[{client}].motion t={time_msec} {}", point(local))
            }
            WireEvent::DndLeave { client } => write!(f, "wl_data_device[{client}].leave"),
            WireEvent::DndDrop { client } => write!(f, "wl_data_device[{client}].drop"),
        }
    }
}

/// What focus resolution needs from the seat.
pub trait ProtocolSink {
    fn pointer_focus(&self) -> Option<SurfaceHandle>;

    /// Move pointer focus. Setting the current focus again is a no-op, and so is
    /// focusing a surface that no longer exists.
    fn set_pointer_focus(
        &mut self,
        scene: &Scene,
        surface: Option<SurfaceHandle>,
        local: Point<f64, Logical>,
    );

    fn send_pointer_motion(&mut self, time_msec: u32, local: Point<f64, Logical>);

    fn send_relative_motion(
        &mut self,
        time_msec: u32,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
    );

    /// Returns the serial of the button event, `None` when nothing has focus.
    fn send_pointer_button(
        &mut self,
        time_msec: u32,
        button: u32,
        state: ButtonState,
    ) -> Option<Serial>;

    fn send_pointer_axis(
        &mut self,
        time_msec: u32,
        axis: Axis,
        value: f64,
        discrete: i32,
        source: AxisSource,
    );

    fn send_pointer_frame(&mut self);

    fn keyboard_focus(&self) -> Option<SurfaceHandle>;

    fn set_keyboard_focus(&mut self, scene: &Scene, surface: Option<SurfaceHandle>);

    fn surface_enter(&mut self, scene: &Scene, surface: SurfaceHandle, monitor: MonitorHandle);

    fn surface_leave(&mut self, scene: &Scene, surface: SurfaceHandle, monitor: MonitorHandle);

    fn send_frame_done(&mut self, scene: &Scene, surface: SurfaceHandle, time_msec: u32);

    /// Forget a destroyed surface without sending events for it.
    fn surface_destroyed(&mut self, surface: SurfaceHandle);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Focus {
    surface: SurfaceHandle,
    client: ClientId,
}

#[derive(Debug, Clone, Default)]
struct DragState {
    focus: Option<Focus>,
}

/// The compositor seat.
#[derive(Debug, Default)]
pub struct SeatManager {
    pointer_resources: Vec<(ResourceId, ClientId)>,
    next_resource: ResourceId,
    pointer_focus: Option<Focus>,
    keyboard_focus: Option<Focus>,
    /// Buttons the focused client has seen pressed.
    pressed: Vec<u32>,
    /// Timestamp of the latest pointer event, used for synthesized releases.
    last_time_msec: u32,
    serials: HashMap<ClientId, SerialHistory>,
    next_serial: u32,
    drag: Option<DragState>,
    events: Vec<WireEvent>,
}

impl SeatManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_serial(&mut self, client: ClientId) -> Serial {
        self.next_serial = self.next_serial.wrapping_add(1).max(1);
        let serial = Serial::from(self.next_serial);
        self.serials.entry(client).or_default().push(serial);
        serial
    }

    fn resources_of(&self, client: ClientId) -> Vec<ResourceId> {
        self.pointer_resources
            .iter()
            .filter(|(_, c)| *c == client)
            .map(|(r, _)| *r)
            .collect()
    }

    /// Bind a new `wl_pointer` for a client. If the client already has pointer focus
    /// the new resource is entered right away.
    pub fn bind_pointer(&mut self, client: ClientId) -> ResourceId {
        self.next_resource += 1;
        let resource = self.next_resource;
        self.pointer_resources.push((resource, client));

        if let Some(focus) = self.pointer_focus.filter(|f| f.client == client) {
            let serial = self.next_serial(client);
            self.events.push(WireEvent::PointerEnter {
                resource,
                surface: focus.surface,
                serial,
                local: Point::default(),
            });
            self.events.push(WireEvent::PointerFrame { resource });
        }
        resource
    }

    pub fn release_pointer(&mut self, resource: ResourceId) {
        self.pointer_resources.retain(|(r, _)| *r != resource);
    }

    /// Drop everything belonging to a disconnected client.
    pub fn client_disconnected(&mut self, client: ClientId) {
        self.pointer_resources.retain(|(_, c)| *c != client);
        self.serials.remove(&client);
        if self.pointer_focus.is_some_and(|f| f.client == client) {
            self.pointer_focus = None;
            self.pressed.clear();
        }
        if self.keyboard_focus.is_some_and(|f| f.client == client) {
            self.keyboard_focus = None;
        }
        if let Some(drag) = &mut self.drag {
            if drag.focus.is_some_and(|f| f.client == client) {
                drag.focus = None;
            }
        }
    }

    pub fn serial_history(&self, client: ClientId) -> Option<&SerialHistory> {
        self.serials.get(&client)
    }

    /// Check a `wl_pointer.set_cursor` (or cursor-shape) request.
    pub fn validate_set_cursor(&self, client: ClientId, serial: Serial) -> Result<(), SeatError> {
        if !self.pointer_focus.is_some_and(|f| f.client == client) {
            return Err(SeatError::NotFocused { client });
        }
        if !self.serials.get(&client).is_some_and(|h| h.contains(serial)) {
            return Err(SeatError::StaleSerial {
                client,
                serial: u32::from(serial),
            });
        }
        Ok(())
    }

    pub fn pressed_buttons(&self) -> &[u32] {
        &self.pressed
    }

    // Drag and drop

    /// Start routing pointer focus to data devices instead of pointers.
    pub fn start_drag(&mut self, scene: &Scene, local: Point<f64, Logical>) {
        if self.drag.is_some() {
            return;
        }
        debug!("drag started");
        self.drag = Some(DragState::default());
        let focus = self.pointer_focus.map(|f| f.surface);
        self.set_drag_focus(scene, focus, local);
    }

    /// End the drag, dropping onto the current drag target if `drop` is set.
    pub fn end_drag(&mut self, drop: bool) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        if let Some(focus) = drag.focus {
            if drop {
                self.events.push(WireEvent::DndDrop {
                    client: focus.client,
                });
            }
            self.events.push(WireEvent::DndLeave {
                client: focus.client,
            });
        }
        debug!(drop, "drag ended");
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    fn set_drag_focus(
        &mut self,
        scene: &Scene,
        surface: Option<SurfaceHandle>,
        local: Point<f64, Logical>,
    ) {
        let new_focus = surface.and_then(|surface| {
            scene
                .client_of(surface)
                .map(|client| Focus { surface, client })
        });
        let Some(drag) = &mut self.drag else {
            return;
        };
        if drag.focus.map(|f| f.surface) == new_focus.map(|f| f.surface) {
            return;
        }
        let old = std::mem::replace(&mut drag.focus, new_focus);
        if let Some(old) = old {
            self.events.push(WireEvent::DndLeave { client: old.client });
        }
        if let Some(new) = new_focus {
            let serial = self.next_serial(new.client);
            self.events.push(WireEvent::DndEnter {
                client: new.client,
                surface: new.surface,
                serial,
                local,
            });
        }
    }

    // Event queue

    pub fn events(&self) -> &[WireEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<WireEvent> {
        std::mem::take(&mut self.events)
    }
}

impl ProtocolSink for SeatManager {
    fn pointer_focus(&self) -> Option<SurfaceHandle> {
        self.pointer_focus.map(|f| f.surface)
    }

    fn set_pointer_focus(
        &mut self,
        scene: &Scene,
        surface: Option<SurfaceHandle>,
        local: Point<f64, Logical>,
    ) {
        if self.drag.is_some() {
            self.set_drag_focus(scene, surface, local);
            return;
        }
        if self.pointer_focus.map(|f| f.surface) == surface {
            return;
        }
        let new_focus = match surface {
            Some(surface) => match scene.client_of(surface) {
                Some(client) => Some(Focus { surface, client }),
                None => {
                    trace!(?surface, "ignoring pointer focus on a dead surface");
                    return;
                }
            },
            None => None,
        };

        let mut framed = Vec::new();
        if let Some(old) = self.pointer_focus.take() {
            let resources = self.resources_of(old.client);
            let pressed = std::mem::take(&mut self.pressed);
            for button in pressed {
                let serial = self.next_serial(old.client);
                for resource in &resources {
                    self.events.push(WireEvent::PointerButton {
                        resource: *resource,
                        serial,
                        time_msec: self.last_time_msec,
                        button,
                        state: ButtonState::Released,
                    });
                }
            }
            let serial = self.next_serial(old.client);
            for resource in &resources {
                self.events.push(WireEvent::PointerLeave {
                    resource: *resource,
                    surface: old.surface,
                    serial,
                });
            }
            framed.extend(resources);
        }

        if let Some(new) = new_focus {
            let resources = self.resources_of(new.client);
            let serial = self.next_serial(new.client);
            for resource in &resources {
                self.events.push(WireEvent::PointerEnter {
                    resource: *resource,
                    surface: new.surface,
                    serial,
                    local,
                });
            }
            for resource in resources {
                if !framed.contains(&resource) {
                    framed.push(resource);
                }
            }
        }

        for resource in framed {
            self.events.push(WireEvent::PointerFrame { resource });
        }

        debug!(surface = ?new_focus.map(|f| f.surface), "pointer focus changed");
        self.pointer_focus = new_focus;
    }

    fn send_pointer_motion(&mut self, time_msec: u32, local: Point<f64, Logical>) {
        self.last_time_msec = time_msec;
        if let Some(drag) = &self.drag {
            if let Some(focus) = drag.focus {
                self.events.push(WireEvent::DndMotion {
                    client: focus.client,
                    time_msec,
                    local,
                });
            }
            return;
        }
        let Some(focus) = self.pointer_focus else {
            return;
        };
        for resource in self.resources_of(focus.client) {
            self.events.push(WireEvent::PointerMotion {
                resource,
                time_msec,
                local,
            });
        }
    }

    fn send_relative_motion(
        &mut self,
        time_msec: u32,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
    ) {
        self.last_time_msec = time_msec;
        let Some(focus) = self.pointer_focus else {
            return;
        };
        if self.drag.is_some() || self.resources_of(focus.client).is_empty() {
            return;
        }
        self.events.push(WireEvent::RelativeMotion {
            client: focus.client,
            time_msec,
            delta,
            delta_unaccel,
        });
    }

    fn send_pointer_button(
        &mut self,
        time_msec: u32,
        button: u32,
        state: ButtonState,
    ) -> Option<Serial> {
        self.last_time_msec = time_msec;
        if self.drag.is_some() {
            return None;
        }
        let focus = self.pointer_focus?;
        match state {
            ButtonState::Pressed => {
                if !self.pressed.contains(&button) {
                    self.pressed.push(button);
                }
            }
            ButtonState::Released => {
                // A release the client never saw pressed is not forwarded
                if !self.pressed.contains(&button) {
                    return None;
                }
                self.pressed.retain(|b| *b != button);
            }
        }
        let serial = self.next_serial(focus.client);
        for resource in self.resources_of(focus.client) {
            self.events.push(WireEvent::PointerButton {
                resource,
                serial,
                time_msec,
                button,
                state,
            });
        }
        Some(serial)
    }

    fn send_pointer_axis(
        &mut self,
        time_msec: u32,
        axis: Axis,
        value: f64,
        discrete: i32,
        source: AxisSource,
    ) {
        self.last_time_msec = time_msec;
        if self.drag.is_some() {
            return;
        }
        let Some(focus) = self.pointer_focus else {
            return;
        };
        for resource in self.resources_of(focus.client) {
            self.events.push(WireEvent::PointerAxis {
                resource,
                time_msec,
                axis,
                value,
                discrete,
                source,
            });
        }
    }

    fn send_pointer_frame(&mut self) {
        if self.drag.is_some() {
            return;
        }
        let Some(focus) = self.pointer_focus else {
            return;
        };
        for resource in self.resources_of(focus.client) {
            self.events.push(WireEvent::PointerFrame { resource });
        }
    }

    fn keyboard_focus(&self) -> Option<SurfaceHandle> {
        self.keyboard_focus.map(|f| f.surface)
    }

    fn set_keyboard_focus(&mut self, scene: &Scene, surface: Option<SurfaceHandle>) {
        if self.keyboard_focus.map(|f| f.surface) == surface {
            return;
        }
        let new_focus = match surface {
            Some(surface) => match scene.client_of(surface) {
                Some(client) => Some(Focus { surface, client }),
                None => return,
            },
            None => None,
        };

        if let Some(old) = self.keyboard_focus.take() {
            let serial = self.next_serial(old.client);
            self.events.push(WireEvent::KeyboardLeave {
                client: old.client,
                surface: old.surface,
                serial,
            });
        }
        if let Some(new) = new_focus {
            let serial = self.next_serial(new.client);
            self.events.push(WireEvent::KeyboardEnter {
                client: new.client,
                surface: new.surface,
                serial,
            });
        }
        debug!(surface = ?surface, "keyboard focus changed");
        self.keyboard_focus = new_focus;
    }

    fn surface_enter(&mut self, scene: &Scene, surface: SurfaceHandle, monitor: MonitorHandle) {
        if let Some(client) = scene.client_of(surface) {
            self.events.push(WireEvent::SurfaceEnter {
                client,
                surface,
                monitor,
            });
        }
    }

    fn surface_leave(&mut self, scene: &Scene, surface: SurfaceHandle, monitor: MonitorHandle) {
        if let Some(client) = scene.client_of(surface) {
            self.events.push(WireEvent::SurfaceLeave {
                client,
                surface,
                monitor,
            });
        }
    }

    fn send_frame_done(&mut self, scene: &Scene, surface: SurfaceHandle, time_msec: u32) {
        if let Some(client) = scene.client_of(surface) {
            self.events.push(WireEvent::FrameDone {
                client,
                surface,
                time_msec,
            });
        }
    }

    fn surface_destroyed(&mut self, surface: SurfaceHandle) {
        if self.pointer_focus.is_some_and(|f| f.surface == surface) {
            self.pointer_focus = None;
            self.pressed.clear();
        }
        if self.keyboard_focus.is_some_and(|f| f.surface == surface) {
            self.keyboard_focus = None;
        }
        if let Some(drag) = &mut self.drag {
            if drag.focus.is_some_and(|f| f.surface == surface) {
                drag.focus = None;
            }
        }
    }
}
