//! Test fixture for integration testing
//!
//! The Fixture provides a complete pointer core environment for testing: monitors
//! with optional headless cursor planes, a scene with one workspace per monitor, and
//! clients with a bound `wl_pointer`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Once;

use smithay::utils::{Logical, Point, Rectangle, Transform};
use tracing::info;

use crate::backend::{HeadlessPlane, PlaneProbe, PlaneSize};
use crate::config::Config;
use crate::cursor::CursorView;
use crate::device::{DeviceClass, InputDevice};
use crate::event::{
    Axis, AxisSource, ButtonState, DeviceId, FocusEvent, InputEvent, Normalized,
    PresentationEvent, Signal, Subscription,
};
use crate::monitor::{Monitor, MonitorHandle};
use crate::render::{blit_cursor, CursorRenderer, RenderError};
use crate::scene::{
    ClientId, Layer, LayerHandle, SurfaceBuffer, SurfaceHandle, WindowHandle, WorkspaceHandle,
};
use crate::seat::{ProtocolSink, WireEvent};
use crate::swapchain::CursorBuffer;
use crate::State;

/// Relative pointer device every fixture starts with.
pub const MOUSE: DeviceId = 1;
/// Absolute pointer device every fixture starts with.
pub const TABLET: DeviceId = 2;
/// Touchscreen every fixture starts with.
pub const TOUCHSCREEN: DeviceId = 3;

/// Milliseconds the fixture clock advances per input event.
const TICK_MSEC: u32 = 8;

/// Route `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_logging() {
    static INIT_LOG: Once = Once::new();
    INIT_LOG.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pointer_core=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// One software cursor draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftwareDraw {
    pub monitor: MonitorHandle,
    pub dest: Rectangle<f64, Logical>,
    pub damage: Rectangle<f64, Logical>,
}

/// Renderer that fills plane buffers on the CPU and records software draws.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    draws: Rc<RefCell<Vec<SoftwareDraw>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draws(&self) -> Vec<SoftwareDraw> {
        self.draws.borrow().clone()
    }

    pub fn take_draws(&self) -> Vec<SoftwareDraw> {
        std::mem::take(&mut *self.draws.borrow_mut())
    }
}

impl CursorRenderer for RecordingRenderer {
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
        self.draws.borrow_mut().push(SoftwareDraw {
            monitor,
            dest,
            damage,
        });
    }
}

/// Events collected from a [`Signal`] while the recorder is alive.
pub struct Recorder<E> {
    events: Rc<RefCell<Vec<E>>>,
    _subscription: Subscription,
}

impl<E: Clone + 'static> Recorder<E> {
    pub fn attach(signal: &Signal<E>) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let subscription = signal.subscribe(move |event: &E| sink.borrow_mut().push(event.clone()));
        Self {
            events,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<E> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<E> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

/// Test fixture for integration testing
///
/// Provides a complete pointer core environment with:
/// - Monitors laid out left to right, each with its own workspace
/// - A mouse, a tablet and a touchscreen
/// - A clock that advances with every input event
/// - A renderer that records software cursor draws
pub struct Fixture {
    state: State,
    renderer: RecordingRenderer,
    workspaces: HashMap<MonitorHandle, WorkspaceHandle>,
    next_client: ClientId,
    time_msec: u32,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    /// Create a new test fixture with the default configuration.
    ///
    /// The fixture starts with no monitors - use `add_monitor` to create them.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        init_logging();

        let mut state = State::new(config);
        let renderer = RecordingRenderer::new();
        state.renderer = Box::new(renderer.clone());
        state
            .devices
            .add(InputDevice::new(MOUSE, "Virtual Mouse", DeviceClass::Mouse));
        state
            .devices
            .add(InputDevice::new(TABLET, "Virtual Tablet", DeviceClass::Tablet));
        state.devices.add(InputDevice::new(
            TOUCHSCREEN,
            "Virtual Touchscreen",
            DeviceClass::Touch,
        ));

        info!("Test fixture initialized");

        Self {
            state,
            renderer,
            workspaces: HashMap::new(),
            next_client: 0,
            time_msec: 1000,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn renderer(&self) -> &RecordingRenderer {
        &self.renderer
    }

    // Monitors

    /// Add a monitor without a cursor plane to the right of the existing ones.
    pub fn add_monitor(&mut self, name: &str, width: i32, height: i32) -> MonitorHandle {
        self.insert_monitor(Monitor::new(name, (width, height)))
    }

    /// Add a monitor whose cursor plane can be observed through the returned probe.
    pub fn add_monitor_with_plane(
        &mut self,
        name: &str,
        width: i32,
        height: i32,
        size: PlaneSize,
    ) -> (MonitorHandle, PlaneProbe) {
        let (plane, probe) = HeadlessPlane::new(size);
        let handle = self.insert_monitor(Monitor::new(name, (width, height)).with_plane(plane));
        (handle, probe)
    }

    fn insert_monitor(&mut self, mut monitor: Monitor) -> MonitorHandle {
        let right_edge = self
            .state
            .monitors
            .iter()
            .map(|(_, m)| {
                let area = m.logical_box();
                (area.loc.x + area.size.w).ceil() as i32
            })
            .max()
            .unwrap_or(0);
        monitor.position = Point::from((right_edge, 0));
        let name = monitor.name.clone();

        let handle = self.state.add_monitor(monitor);
        let workspace = self.state.scene.add_workspace(name, Some(handle), false);
        self.workspaces.insert(handle, workspace);
        self.state
            .update_monitor(handle, |m| m.active_workspace = Some(workspace));
        handle
    }

    pub fn remove_monitor(&mut self, monitor: MonitorHandle) {
        self.workspaces.remove(&monitor);
        self.state.remove_monitor(monitor);
    }

    /// The workspace created with `monitor`.
    pub fn workspace(&self, monitor: MonitorHandle) -> Option<WorkspaceHandle> {
        self.workspaces.get(&monitor).copied()
    }

    pub fn monitor_count(&self) -> usize {
        self.state.monitors.len()
    }

    // Clients and surfaces

    /// A new client with a bound `wl_pointer`.
    pub fn add_client(&mut self) -> ClientId {
        self.next_client += 1;
        self.state.seat.bind_pointer(self.next_client);
        self.next_client
    }

    /// Map a window on the workspace of `monitor` and refocus.
    ///
    /// `None` when `monitor` is not a fixture monitor.
    pub fn map_window(
        &mut self,
        client: ClientId,
        monitor: MonitorHandle,
        loc: (i32, i32),
        size: (i32, i32),
    ) -> Option<(WindowHandle, SurfaceHandle)> {
        let workspace = self.workspace(monitor)?;
        let surface = self.state.scene.create_surface(client, size);
        let window = self.state.scene.map_window(surface, workspace, loc)?;
        self.state.refocus_pointer(false);
        Some((window, surface))
    }

    /// Add a layer surface on `monitor` and refocus.
    pub fn add_layer(
        &mut self,
        client: ClientId,
        monitor: MonitorHandle,
        layer: Layer,
        loc: (i32, i32),
        size: (i32, i32),
    ) -> Option<(LayerHandle, SurfaceHandle)> {
        let surface = self.state.scene.create_surface(client, size);
        let handle = self.state.scene.add_layer(surface, layer, monitor, loc)?;
        self.state.refocus_pointer(false);
        Some((handle, surface))
    }

    /// A surface with committed contents, usable as a client cursor.
    pub fn cursor_surface(&mut self, client: ClientId, size: (i32, i32)) -> SurfaceHandle {
        let surface = self.state.scene.create_surface(client, size);
        if let Some(s) = self.state.scene.surface_mut(surface) {
            s.buffer = Some(SurfaceBuffer {
                pixels: vec![0xff; (size.0 * size.1 * 4) as usize],
                size: size.into(),
                scale: 1.0,
            });
        }
        surface
    }

    pub fn destroy_surface(&mut self, surface: SurfaceHandle) {
        self.state.destroy_surface(surface);
    }

    // Input

    fn tick(&mut self) -> u32 {
        self.time_msec += TICK_MSEC;
        self.time_msec
    }

    pub fn time_msec(&self) -> u32 {
        self.time_msec
    }

    pub fn send(&mut self, event: InputEvent) {
        self.state.process_input_event(event);
    }

    /// Relative motion from the mouse.
    pub fn motion(&mut self, dx: f64, dy: f64) {
        let time_msec = self.tick();
        self.send(InputEvent::PointerMotion {
            device: MOUSE,
            time_msec,
            delta: (dx, dy).into(),
            delta_unaccel: (dx, dy).into(),
        });
    }

    /// Relative motion that lands on `(x, y)` if nothing clamps it.
    pub fn move_to(&mut self, x: f64, y: f64) {
        let current = self.position();
        self.motion(x - current.x, y - current.y);
    }

    /// Compositor-initiated warp.
    pub fn warp(&mut self, x: f64, y: f64) -> bool {
        self.state.warp_pointer((x, y).into())
    }

    pub fn absolute(&mut self, x: f64, y: f64) {
        let time_msec = self.tick();
        self.send(InputEvent::PointerMotionAbsolute {
            device: TABLET,
            time_msec,
            position: Normalized::new(x, y),
        });
    }

    pub fn button(&mut self, button: u32, pressed: bool) {
        let time_msec = self.tick();
        let state = if pressed {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        };
        self.send(InputEvent::PointerButton {
            device: MOUSE,
            time_msec,
            button,
            state,
        });
    }

    /// Press and release a button.
    pub fn click(&mut self, button: u32) {
        self.button(button, true);
        self.button(button, false);
    }

    pub fn scroll(&mut self, value: f64) {
        let time_msec = self.tick();
        self.send(InputEvent::PointerAxis {
            device: MOUSE,
            time_msec,
            axis: Axis::Vertical,
            value,
            discrete: value.signum() as i32,
            source: AxisSource::Wheel,
        });
    }

    pub fn touch_down(&mut self, x: f64, y: f64) {
        let time_msec = self.tick();
        self.send(InputEvent::TouchDown {
            device: TOUCHSCREEN,
            time_msec,
            slot: 0,
            position: Normalized::new(x, y),
        });
    }

    pub fn touch_up(&mut self) {
        let time_msec = self.tick();
        self.send(InputEvent::TouchUp {
            device: TOUCHSCREEN,
            time_msec,
            slot: 0,
        });
    }

    // Observation

    pub fn position(&self) -> Point<f64, Logical> {
        self.state.pointer.position()
    }

    pub fn pointer_focus(&self) -> Option<SurfaceHandle> {
        self.state.seat.pointer_focus()
    }

    pub fn keyboard_focus(&self) -> Option<SurfaceHandle> {
        self.state.seat.keyboard_focus()
    }

    pub fn take_wire_events(&mut self) -> Vec<WireEvent> {
        self.state.seat.take_events()
    }

    /// Drain the wire events as one line each.
    pub fn wire_trace(&mut self) -> String {
        self.take_wire_events()
            .iter()
            .map(|event| event.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn record_presentation(&self) -> Recorder<PresentationEvent> {
        Recorder::attach(self.state.pointer.events())
    }

    pub fn record_focus(&self) -> Recorder<FocusEvent> {
        Recorder::attach(self.state.input.events())
    }

    /// Render every monitor once, as the frame loop would.
    pub fn render_all(&mut self) {
        for handle in self.state.monitors.handles() {
            self.state.render_monitor(handle);
        }
    }
}
