//! Pointer core
//!
//! Pointer presentation and focus resolution for a Wayland compositor.
//!
//! [`State`] is the compositor context: it owns the monitors, the scene, the seat and
//! the two engines, and routes device input, monitor lifecycle and render-loop hooks
//! to them. Everything runs on the compositor's event loop; nothing here blocks or
//! spawns threads.
pub mod arena;
pub mod backend;
pub mod config;
pub mod constraint;
pub mod cursor;
pub mod device;
pub mod event;
pub mod focus;
pub mod frame_clock;
mod input;
pub mod monitor;
pub mod pointer;
pub mod render;
pub mod scene;
pub mod seat;
pub mod swapchain;
pub mod testing;
pub mod tracy;
pub mod utils;

pub use config::Config;
pub use event::{FocusEvent, InputEvent, PresentationEvent};
pub use monitor::{Monitor, MonitorHandle};

use std::time::Duration;

use cursor_icon::CursorIcon;
use smithay::utils::{Logical, Point, Serial};
use tracing::{debug, info, trace, warn};

use crate::arena::Arena;
use crate::config::{ConfigError, ConfigValue};
use crate::constraint::{Constraints, PointerConstraint};
use crate::cursor::{CursorShapeProvider, FallbackCursors};
use crate::device::{DeviceClass, DeviceManager};
use crate::focus::InputManager;
use crate::pointer::{PointerContext, PointerManager};
use crate::render::{CursorRenderer, DamageTracker, MonitorDamage, SoftwareRenderer};
use crate::scene::{ClientId, Scene, SurfaceHandle};
use crate::seat::{ProtocolSink, SeatError, SeatManager};

/// Cursor a client asked for with `set_cursor`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClientCursor {
    client: ClientId,
    surface: Option<SurfaceHandle>,
    hotspot: Point<i32, Logical>,
}

/// The compositor context.
pub struct State {
    pub config: Config,
    pub monitors: Arena<Monitor>,
    pub scene: Scene,
    pub pointer: PointerManager,
    pub input: InputManager,
    pub seat: SeatManager,
    pub devices: DeviceManager,
    pub constraints: Constraints,
    pub damage: DamageTracker,
    pub renderer: Box<dyn CursorRenderer>,
    pub cursors: Box<dyn CursorShapeProvider>,
    /// Monotonic time of the latest input or presentation.
    pub now: Duration,
    client_cursor: Option<ClientCursor>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("monitors", &self.monitors.len())
            .field("pointer", &self.pointer.position())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl State {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            monitors: Arena::new(),
            scene: Scene::new(),
            pointer: PointerManager::new(),
            input: InputManager::new(),
            seat: SeatManager::new(),
            devices: DeviceManager::new(),
            constraints: Constraints::new(),
            damage: DamageTracker::new(),
            renderer: Box::new(SoftwareRenderer::new()),
            cursors: Box::new(FallbackCursors::new()),
            now: Duration::ZERO,
            client_cursor: None,
        }
    }

    /// Split the state into the pointer engine and the context it operates on.
    pub fn pointer_parts(&mut self) -> (&mut PointerManager, PointerContext<'_>) {
        let State {
            config,
            monitors,
            scene,
            pointer,
            seat,
            damage,
            renderer,
            now,
            ..
        } = self;
        let ctx = PointerContext {
            config,
            monitors,
            scene,
            seat,
            damage,
            renderer: &mut **renderer,
            now: *now,
        };
        (pointer, ctx)
    }

    fn advance_clock(&mut self, time: Duration) {
        if time > self.now {
            self.now = time;
        }
    }

    // Monitors

    pub fn add_monitor(&mut self, monitor: Monitor) -> MonitorHandle {
        info!(name = %monitor.name, mode = ?monitor.mode, scale = monitor.scale, "monitor added");
        let handle = self.monitors.insert(monitor);
        self.layout_changed();
        if self.input.active_monitor().is_none() {
            self.input.set_active_monitor(handle);
        }
        handle
    }

    pub fn remove_monitor(&mut self, handle: MonitorHandle) -> Option<Monitor> {
        {
            let (pointer, mut ctx) = self.pointer_parts();
            pointer.monitor_removed(&mut ctx, handle);
        }
        let monitor = self.monitors.remove(handle)?;
        info!(name = %monitor.name, "monitor removed");
        self.input.monitor_removed(handle);
        self.damage.remove_monitor(handle);
        self.layout_changed();
        if self.input.active_monitor().is_none() {
            if let Some(next) = self.pointer.layout().monitors().next() {
                self.input.set_active_monitor(next);
            }
        }
        Some(monitor)
    }

    /// Change a monitor's geometry, mode, power state or plane.
    pub fn update_monitor(&mut self, handle: MonitorHandle, update: impl FnOnce(&mut Monitor)) {
        let Some(monitor) = self.monitors.get_mut(handle) else {
            return;
        };
        update(monitor);
        debug!(name = %monitor.name, "monitor updated");
        self.layout_changed();
    }

    fn layout_changed(&mut self) {
        {
            let (pointer, mut ctx) = self.pointer_parts();
            pointer.layout_changed(&mut ctx);
        }
        // Bitmap cursors follow the largest scale
        if let Some(icon) = self.input.cursor_icon() {
            self.apply_cursor_icon(icon);
        }
        self.refocus_pointer(false);
    }

    /// A monitor's frame reached the screen.
    pub fn frame_presented(&mut self, handle: MonitorHandle, time: Duration) {
        self.advance_clock(time);
        if let Some(monitor) = self.monitors.get_mut(handle) {
            monitor.frame_clock.presented(time);
        }
        self.pointer.frame_presented(handle);
    }

    /// Drain a monitor's damage and draw its software cursor if it has one.
    pub fn render_monitor(&mut self, handle: MonitorHandle) -> MonitorDamage {
        tracy_span!("State::render_monitor");

        let damage = self.damage.take(handle);
        if !damage.full && damage.boxes.is_empty() {
            return damage;
        }
        let region = if damage.full {
            None
        } else {
            damage.boxes.iter().copied().reduce(|a, b| a.merge(b))
        };
        let (pointer, mut ctx) = self.pointer_parts();
        pointer.render_software_cursors_for(&mut ctx, handle, region, None);
        tracy_frame_mark!();
        damage
    }

    // Surfaces

    /// Destroy a surface and everything built on it.
    pub fn destroy_surface(&mut self, surface: SurfaceHandle) {
        {
            let (pointer, mut ctx) = self.pointer_parts();
            pointer.surface_destroyed(&mut ctx, surface);
        }
        if self
            .client_cursor
            .is_some_and(|c| c.surface == Some(surface))
        {
            self.client_cursor = None;
        }
        self.constraints.remove(surface);
        self.input.surface_destroyed(surface);
        self.seat.surface_destroyed(surface);
        self.scene.destroy_surface(surface);
        trace!(?surface, "surface destroyed");

        if self.pointer.image().is_none() && self.input.cursor_icon().is_none() {
            self.apply_cursor_icon(self.input.idle_icon());
        }
        self.refocus_pointer(true);
    }

    /// Drop a client and every surface it owns.
    pub fn client_disconnected(&mut self, client: ClientId) {
        info!(client, "client disconnected");
        self.seat.client_disconnected(client);
        for surface in self.scene.surfaces_of(client) {
            // Sub-surfaces may already be gone with their parent
            if self.scene.surface_alive(surface) {
                self.destroy_surface(surface);
            }
        }
        self.refocus_pointer(true);
    }

    /// A cursor surface committed new contents.
    pub fn cursor_surface_committed(&mut self, surface: SurfaceHandle) {
        let (pointer, mut ctx) = self.pointer_parts();
        pointer.cursor_surface_committed(&mut ctx, surface);
    }

    // Cursor image

    /// `wl_pointer.set_cursor`. Only the client with pointer focus may set the cursor,
    /// with the serial of an event it received.
    pub fn handle_set_cursor_request(
        &mut self,
        client: ClientId,
        serial: Serial,
        surface: Option<SurfaceHandle>,
        hotspot: Point<i32, Logical>,
    ) -> Result<(), SeatError> {
        self.seat.validate_set_cursor(client, serial)?;
        if let Some(surface) = surface {
            if self.scene.client_of(surface) != Some(client) {
                return Err(SeatError::DeadSurface);
            }
        }
        self.client_cursor = Some(ClientCursor {
            client,
            surface,
            hotspot,
        });
        if self.input.kill_mode() || self.input.border_icon().is_some() {
            trace!(client, "client cursor deferred by a compositor cursor");
            return Ok(());
        }
        self.show_client_cursor();
        Ok(())
    }

    /// Cursor-shape request: a named icon instead of a surface.
    pub fn handle_set_cursor_shape(
        &mut self,
        client: ClientId,
        serial: Serial,
        icon: CursorIcon,
    ) -> Result<(), SeatError> {
        self.seat.validate_set_cursor(client, serial)?;
        self.client_cursor = None;
        if self.input.kill_mode() || self.input.border_icon().is_some() {
            return Ok(());
        }
        self.apply_cursor_icon(icon);
        Ok(())
    }

    fn show_client_cursor(&mut self) {
        let Some(cursor) = self.client_cursor else {
            return;
        };
        self.input.set_cursor_icon(None);
        let (pointer, mut ctx) = self.pointer_parts();
        pointer.set_cursor_surface(&mut ctx, cursor.surface, cursor.hotspot);
    }

    /// Show a named cursor from the shape provider.
    pub fn apply_cursor_icon(&mut self, icon: CursorIcon) {
        let scale = self
            .monitors
            .iter()
            .map(|(_, m)| m.scale)
            .fold(1.0_f64, f64::max);
        let Some(bitmap) = self.cursors.shape(icon, scale) else {
            debug!(icon = icon.name(), "no cursor image for icon");
            return;
        };
        let changed = self.input.cursor_icon() != Some(icon);
        self.input.set_cursor_icon(Some(icon));
        {
            let (pointer, mut ctx) = self.pointer_parts();
            pointer.set_cursor_buffer(&mut ctx, bitmap);
        }
        if changed {
            self.input.emit(FocusEvent::CursorIconChanged(icon));
        }
    }

    /// Kill mode shows a crosshair until disabled.
    pub fn set_kill_mode(&mut self, enabled: bool) {
        if self.input.kill_mode() == enabled {
            return;
        }
        debug!(enabled, "kill mode");
        self.input.set_kill_mode(enabled);
        self.refresh_cursor_icon(self.seat.pointer_focus().is_some());
    }

    /// Pick the cursor the current state calls for: kill mode, a border icon, the
    /// client's own cursor, or the idle icon.
    fn refresh_cursor_icon(&mut self, focused: bool) {
        if self.input.kill_mode() {
            self.apply_cursor_icon(CursorIcon::Crosshair);
        } else if let Some(icon) = self.input.border_icon() {
            self.apply_cursor_icon(icon);
        } else if focused && self.client_cursor.is_some() {
            self.show_client_cursor();
        } else if !focused || self.input.cursor_icon().is_some() {
            self.apply_cursor_icon(self.input.idle_icon());
        }
    }

    // Pointer

    /// Compositor-initiated pointer warp, e.g. to center the cursor on a new window.
    /// Suppressed by `cursor.no_warps` and right after touch input.
    pub fn warp_pointer(&mut self, pos: Point<f64, Logical>) -> bool {
        if self.config.cursor.no_warps {
            trace!("warp suppressed by configuration");
            return false;
        }
        if self.devices.last_class() == DeviceClass::Touch {
            trace!("warp suppressed after touch input");
            return false;
        }
        {
            let (pointer, mut ctx) = self.pointer_parts();
            pointer.warp_to(&mut ctx, pos);
        }
        self.refocus_pointer(false);
        true
    }

    pub fn add_constraint(&mut self, constraint: PointerConstraint) -> bool {
        if !self.constraints.add(constraint) {
            return false;
        }
        self.constraints
            .update_focus(&self.scene, self.seat.pointer_focus());
        true
    }

    /// Drop a surface's constraint. Releasing an active lock applies its cursor hint.
    pub fn remove_constraint(&mut self, surface: SurfaceHandle) {
        let Some(constraint) = self.constraints.remove(surface) else {
            return;
        };
        debug!(?surface, kind = ?constraint.kind, "pointer constraint removed");

        let hint = constraint
            .is_active()
            .then(|| constraint.unlock_hint(&self.scene))
            .flatten();
        if let Some(hint) = hint {
            if self.config.cursor.no_warps {
                trace!(?hint, "lock hint ignored, warps disabled");
                return;
            }
            {
                let (pointer, mut ctx) = self.pointer_parts();
                pointer.warp_to(&mut ctx, hint);
            }
            self.refocus_pointer(false);
        }
    }

    /// Restrict pointer focus to `surfaces` until [`Self::clear_focus_grab`].
    pub fn set_focus_grab(&mut self, surfaces: Vec<SurfaceHandle>) {
        self.input.set_grab(surfaces);
        self.refocus_pointer(true);
    }

    pub fn clear_focus_grab(&mut self) {
        self.input.clear_grab();
        self.refocus_pointer(true);
    }

    /// Route pointer focus to data devices until every button is released.
    pub fn start_drag(&mut self) {
        let local = self
            .input
            .last_candidate()
            .map(|c| c.local)
            .unwrap_or_default();
        self.seat.start_drag(&self.scene, local);
    }

    /// Change a configuration value at runtime.
    pub fn set_config(&mut self, key: &str, value: ConfigValue) -> Result<(), ConfigError> {
        if let Err(err) = self.config.set(key, value) {
            warn!(key, "rejected configuration change: {err}");
            return Err(err);
        }
        debug!(key, ?value, "configuration changed");
        self.layout_changed();
        let (pointer, mut ctx) = self.pointer_parts();
        pointer.update_cursor_backend(&mut ctx);
        pointer.damage_if_software(&mut ctx);
        Ok(())
    }
}
