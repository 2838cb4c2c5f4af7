//! Pointer presentation
//!
//! [`PointerManager`] owns the global pointer position and the cursor image, and
//! decides per monitor whether the cursor is shown on the hardware cursor plane or
//! composited in software.
//!
//! # Design Invariants
//!
//! 1. **Single clamp**: every position change (`warp_to`, `move_by`,
//!    `warp_absolute`) goes through [`closest_valid`], so the pointer never leaves the
//!    reachable layout.
//!
//! 2. **Entered tracks the cursor box**: a monitor's `entered` flag is true exactly
//!    when the cursor box (position minus hotspot, sized by the image) overlaps the
//!    monitor. Enter and leave notifications for a monitor strictly alternate.
//!
//! 3. **Hardware only when allowed**: a monitor holds a hardware front buffer only
//!    while the cursor is on it, its plane has not failed, and nothing holds a
//!    software lock on it.
//!
//! 4. **Silent fallback**: plane, swapchain and render failures mark the monitor as
//!    `hardware_failed` and switch it to software. They are logged and emitted on the
//!    presentation signal, never returned to clients.
//!
//! 5. **Whole image changes**: installing a new cursor image detaches the old one
//!    (damage, front buffers dropped) before the backend decision for the new one,
//!    all before the call returns.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use smithay::utils::{Buffer, Logical, Physical, Point, Rectangle, Size};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::arena::Arena;
use crate::backend::{CursorPlane, PlaneError, PlaneSize};
use crate::config::Config;
use crate::cursor::{CursorBitmap, CursorImage, CursorView};
use crate::device::DeviceManager;
use crate::event::{DeviceId, Normalized, PresentationEvent, Signal};
use crate::monitor::{Monitor, MonitorHandle, MonitorLayout};
use crate::render::{
    blit_cursor, cursor_buffer_hotspot, cursor_buffer_size, CursorRenderer, DamageTracker,
    RenderError,
};
use crate::scene::{FullscreenMode, Scene, SurfaceHandle};
use crate::seat::ProtocolSink;
use crate::swapchain::{
    BufferHandle, CursorSwapchain, SwapchainError, SwapchainOptions, CURSOR_SWAPCHAIN_LENGTH,
};
use crate::{tracy_plot, tracy_span};

/// Correction passes [`closest_valid`] makes before giving up on padding.
pub const MAX_NUDGE_PASSES: usize = 4;

/// Extra margin around the cursor box when damaging software cursors.
const DAMAGE_MARGIN: f64 = 4.0;

/// Why a monitor could not show the cursor on its plane.
#[derive(Debug, Error)]
pub enum HardwareCursorError {
    #[error("cursor image {needed:?} exceeds the plane maximum {max:?}")]
    TooLarge {
        needed: Size<i32, Buffer>,
        max: Size<i32, Buffer>,
    },
    #[error("cursor plane offers no pixel format")]
    NoFormat,
    #[error(transparent)]
    Plane(#[from] PlaneError),
    #[error(transparent)]
    Swapchain(#[from] SwapchainError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Per-monitor cursor state.
#[derive(Debug, Default)]
pub struct MonitorPointerState {
    /// Holders of a software-cursor lock on this monitor.
    pub software_locks: u32,
    /// The last hardware attempt failed; the monitor uses software until one succeeds.
    pub hardware_failed: bool,
    /// The cursor box overlaps this monitor.
    pub entered: bool,
    /// Buffer currently scanned out by the plane.
    pub hardware_buffer: Option<BufferHandle>,
    /// Last cursor box damaged on this monitor.
    pub damage_box: Option<Rectangle<f64, Logical>>,
    swapchain: CursorSwapchain,
    /// A buffer was rendered but its frame has not been presented yet.
    pending_render: bool,
    /// The plane may be showing something and needs an explicit hide.
    plane_armed: bool,
}

impl MonitorPointerState {
    pub fn swapchain(&self) -> &CursorSwapchain {
        &self.swapchain
    }
}

/// Everything the pointer core borrows from the compositor for one operation.
pub struct PointerContext<'a> {
    pub config: &'a Config,
    pub monitors: &'a mut Arena<Monitor>,
    pub scene: &'a Scene,
    pub seat: &'a mut dyn ProtocolSink,
    pub damage: &'a mut DamageTracker,
    pub renderer: &'a mut dyn CursorRenderer,
    /// Current monotonic time.
    pub now: Duration,
}

/// Clamp `pos` to the nearest point the pointer can reach.
///
/// A point is accepted unchanged when the square of side `2 * padding` centered on it
/// lies within the monitors. Otherwise the nearest point on any monitor is taken and
/// nudged inward until the padded square fits; if it never does, that nearest point
/// is returned as is. An empty layout yields the origin.
pub fn closest_valid(
    layout: &MonitorLayout,
    pos: Point<f64, Logical>,
    padding: f64,
) -> Point<f64, Logical> {
    if layout.is_empty() {
        return Point::default();
    }
    if probe_inside(layout, pos, padding) {
        return pos;
    }
    let Some(leader) = layout.nearest_point(pos) else {
        return Point::default();
    };

    let mut candidate = leader;
    for _ in 0..MAX_NUDGE_PASSES {
        if probe_inside(layout, candidate, padding) {
            return candidate;
        }
        // Per axis, the largest correction any outside corner needs
        let mut shift = Point::<f64, Logical>::default();
        for corner in probe_corners(candidate, padding) {
            if layout.contains(corner) {
                continue;
            }
            if let Some(nearest) = layout.nearest_point(corner) {
                let delta = nearest - corner;
                if delta.x.abs() > shift.x.abs() {
                    shift.x = delta.x;
                }
                if delta.y.abs() > shift.y.abs() {
                    shift.y = delta.y;
                }
            }
        }
        if shift == Point::default() {
            break;
        }
        candidate += shift;
    }

    if probe_inside(layout, candidate, padding) {
        candidate
    } else {
        leader
    }
}

fn probe_corners(center: Point<f64, Logical>, padding: f64) -> [Point<f64, Logical>; 4] {
    [
        (center.x - padding, center.y - padding).into(),
        (center.x + padding, center.y - padding).into(),
        (center.x - padding, center.y + padding).into(),
        (center.x + padding, center.y + padding).into(),
    ]
}

fn probe_inside(layout: &MonitorLayout, center: Point<f64, Logical>, padding: f64) -> bool {
    probe_corners(center, padding)
        .iter()
        .all(|corner| layout.contains(*corner))
}

fn is_software(state: &MonitorPointerState, config: &Config) -> bool {
    state.software_locks > 0
        || state.hardware_failed
        || config.cursor.no_hardware_cursors
        || config.zoomed()
}

/// Whether cursor motion on `monitor` should avoid scheduling frames, to keep a
/// fullscreen VRR client in control of the refresh rate.
///
/// Once the monitor has gone longer than `1 / min_refresh_rate` without presenting,
/// the skipped cursor damage is flushed with a full repaint instead.
pub fn should_skip_frame_on_mouse_event(
    handle: MonitorHandle,
    monitor: &Monitor,
    scene: &Scene,
    config: &Config,
    damage: &mut DamageTracker,
    now: Duration,
) -> bool {
    if !config.cursor.no_break_fullscreen_vrr || !monitor.adaptive_sync {
        return false;
    }
    let exclusive_fullscreen = monitor
        .active_workspace
        .and_then(|ws| scene.workspace(ws))
        .and_then(|ws| ws.fullscreen)
        .is_some_and(|(_, mode)| mode == FullscreenMode::Exclusive);
    if !exclusive_fullscreen {
        return false;
    }

    let min_refresh = config.cursor.min_refresh_rate;
    if min_refresh > 0 {
        let limit = Duration::from_secs_f64(1.0 / min_refresh as f64);
        let stale = monitor
            .frame_clock
            .since_last_presentation(now)
            .map_or(true, |elapsed| elapsed > limit);
        if stale {
            damage.damage_monitor(handle);
            return false;
        }
    }
    true
}

/// The pointer presentation engine.
#[derive(Debug, Default)]
pub struct PointerManager {
    position: Point<f64, Logical>,
    image: CursorImage,
    /// Hidden after touch input; the image is kept for when the pointer comes back.
    hidden: bool,
    states: HashMap<MonitorHandle, MonitorPointerState>,
    layout: MonitorLayout,
    /// Relative motion accumulated since the last dispatch.
    pending_relative: (Point<f64, Logical>, Point<f64, Logical>),
    events: Signal<PresentationEvent>,
}

impl PointerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Point<f64, Logical> {
        self.position
    }

    pub fn image(&self) -> &CursorImage {
        &self.image
    }

    pub fn layout(&self) -> &MonitorLayout {
        &self.layout
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn events(&self) -> &Signal<PresentationEvent> {
        &self.events
    }

    pub fn state(&self, monitor: MonitorHandle) -> Option<&MonitorPointerState> {
        self.states.get(&monitor)
    }

    fn state_for(&mut self, monitor: MonitorHandle) -> &mut MonitorPointerState {
        self.states.entry(monitor).or_default()
    }

    /// What is drawn right now, `None` when nothing is visible.
    pub fn view<'a>(&'a self, scene: &'a Scene) -> Option<CursorView<'a>> {
        if self.hidden {
            return None;
        }
        self.image.view(scene)
    }

    /// Cursor box in global logical coordinates. Without a visible image it is a
    /// 1x1 box at the pointer position.
    pub fn cursor_box(&self, scene: &Scene) -> Rectangle<f64, Logical> {
        match self.view(scene) {
            Some(view) => Rectangle::new(self.position - view.hotspot, view.logical_size()),
            None => Rectangle::new(self.position, (1.0, 1.0).into()),
        }
    }

    /// Cursor box clipped to one monitor.
    pub fn cursor_box_for(
        &self,
        scene: &Scene,
        monitor: &Monitor,
    ) -> Option<Rectangle<f64, Logical>> {
        self.cursor_box(scene).intersection(monitor.logical_box())
    }

    // Position

    /// Accumulate relative motion for the next dispatch.
    pub fn accumulate_relative(
        &mut self,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
    ) {
        self.pending_relative.0 += delta;
        self.pending_relative.1 += delta_unaccel;
    }

    /// Take the accumulated relative motion.
    pub fn take_relative(&mut self) -> (Point<f64, Logical>, Point<f64, Logical>) {
        std::mem::take(&mut self.pending_relative)
    }

    pub fn closest_valid(&self, config: &Config, pos: Point<f64, Logical>) -> Point<f64, Logical> {
        closest_valid(&self.layout, pos, config.hotspot_padding())
    }

    /// Move the pointer to `pos`, clamped to the layout.
    pub fn warp_to(&mut self, ctx: &mut PointerContext<'_>, pos: Point<f64, Logical>) {
        tracy_span!("PointerManager::warp_to");

        if self.layout.is_empty() || pos.x.is_nan() || pos.y.is_nan() {
            trace!(?pos, "ignoring warp");
            return;
        }

        let pos = self.closest_valid(ctx.config, pos);
        if pos == self.position {
            return;
        }

        self.damage_if_software(ctx);
        self.position = pos;
        self.recheck_entered_monitors(ctx);
        if !self.hidden {
            self.on_cursor_moved(ctx);
        }
        self.damage_if_software(ctx);
    }

    pub fn move_by(&mut self, ctx: &mut PointerContext<'_>, delta: Point<f64, Logical>) {
        let target = self.position + delta;
        self.warp_to(ctx, target);
    }

    /// Warp to a normalized position of an absolute device. NaN components keep the
    /// current value of that axis.
    pub fn warp_absolute(
        &mut self,
        ctx: &mut PointerContext<'_>,
        devices: &DeviceManager,
        device: DeviceId,
        position: Normalized,
    ) {
        if position.x.is_nan() && position.y.is_nan() {
            return;
        }
        let Some(target) =
            devices.map_absolute(device, position, self.position, ctx.monitors, &self.layout)
        else {
            return;
        };
        self.warp_to(ctx, target);
    }

    // Cursor image

    /// Show a fixed bitmap.
    pub fn set_cursor_buffer(&mut self, ctx: &mut PointerContext<'_>, bitmap: Rc<CursorBitmap>) {
        if matches!(&self.image, CursorImage::Bitmap(current) if Rc::ptr_eq(current, &bitmap)) {
            return;
        }
        self.install(ctx, CursorImage::Bitmap(bitmap));
    }

    /// Show a client surface with the cursor role.
    pub fn set_cursor_surface(
        &mut self,
        ctx: &mut PointerContext<'_>,
        surface: Option<SurfaceHandle>,
        hotspot: Point<i32, Logical>,
    ) {
        let image = match surface {
            Some(surface) if ctx.scene.surface_alive(surface) => {
                CursorImage::Surface { surface, hotspot }
            }
            Some(surface) => {
                debug!(?surface, "ignoring dead cursor surface");
                return;
            }
            None => CursorImage::None,
        };
        if image == self.image {
            return;
        }
        self.install(ctx, image);
    }

    fn install(&mut self, ctx: &mut PointerContext<'_>, image: CursorImage) {
        self.reset_cursor_image(ctx, false);
        self.image = image;
        if let Some(surface) = self.image.surface() {
            for (handle, state) in &self.states {
                if state.entered {
                    ctx.seat.surface_enter(ctx.scene, surface, *handle);
                }
            }
        }
        self.events.emit(&PresentationEvent::CursorImageChanged);
        self.recheck_entered_monitors(ctx);
        self.update_cursor_backend(ctx);
        self.damage_if_software(ctx);
    }

    /// Drop the current image. With `apply`, every plane is hidden right away instead
    /// of waiting for the next backend update.
    pub fn reset_cursor_image(&mut self, ctx: &mut PointerContext<'_>, apply: bool) {
        self.damage_if_software(ctx);

        // Surface enter/leave belongs to the image being replaced
        if let Some(surface) = self.image.surface() {
            for (handle, state) in &self.states {
                if state.entered {
                    ctx.seat.surface_leave(ctx.scene, surface, *handle);
                }
            }
        }
        self.image = CursorImage::None;

        let handles: Vec<_> = self.states.keys().copied().collect();
        for handle in handles {
            let Some(state) = self.states.get_mut(&handle) else {
                continue;
            };
            state.hardware_buffer = None;
            if apply {
                if let Some(monitor) = ctx.monitors.get_mut(handle) {
                    hide_hardware_cursor(monitor, state);
                }
            }
        }
    }

    /// Hide or show the cursor without forgetting its image.
    pub fn set_hidden(&mut self, ctx: &mut PointerContext<'_>, hidden: bool) {
        if self.hidden == hidden {
            return;
        }
        self.damage_if_software(ctx);
        self.hidden = hidden;
        debug!(hidden, "cursor visibility changed");
        self.recheck_entered_monitors(ctx);
        self.update_cursor_backend(ctx);
        self.damage_if_software(ctx);
    }

    /// A cursor surface committed new contents.
    pub fn cursor_surface_committed(&mut self, ctx: &mut PointerContext<'_>, surface: SurfaceHandle) {
        if self.image.surface() != Some(surface) {
            return;
        }
        self.damage_if_software(ctx);
        self.recheck_entered_monitors(ctx);
        self.update_cursor_backend(ctx);
        self.damage_if_software(ctx);
    }

    /// A surface is being destroyed; detach it if it is the cursor.
    pub fn surface_destroyed(&mut self, ctx: &mut PointerContext<'_>, surface: SurfaceHandle) {
        if self.image.surface() == Some(surface) {
            debug!(?surface, "cursor surface destroyed");
            self.reset_cursor_image(ctx, true);
            self.events.emit(&PresentationEvent::CursorImageChanged);
        }
    }

    // Software locks

    pub fn lock_software_for(&mut self, ctx: &mut PointerContext<'_>, monitor: MonitorHandle) {
        if !ctx.monitors.contains(monitor) {
            return;
        }
        let state = self.state_for(monitor);
        state.software_locks += 1;
        let locks = state.software_locks;
        trace!(?monitor, locks, "software cursor lock taken");
        self.events
            .emit(&PresentationEvent::SoftwareLockChanged { monitor, locks });
        if locks == 1 {
            self.update_cursor_backend(ctx);
            self.damage_cursor(ctx, monitor);
        }
    }

    pub fn unlock_software_for(&mut self, ctx: &mut PointerContext<'_>, monitor: MonitorHandle) {
        let Some(state) = self.states.get_mut(&monitor) else {
            return;
        };
        if state.software_locks == 0 {
            warn!(?monitor, "software cursor unlocked more often than locked");
            return;
        }
        state.software_locks -= 1;
        let locks = state.software_locks;
        trace!(?monitor, locks, "software cursor lock released");
        self.events
            .emit(&PresentationEvent::SoftwareLockChanged { monitor, locks });
        if locks == 0 {
            self.update_cursor_backend(ctx);
            self.damage_cursor(ctx, monitor);
        }
    }

    pub fn lock_software_all(&mut self, ctx: &mut PointerContext<'_>) {
        for monitor in ctx.monitors.handles() {
            self.lock_software_for(ctx, monitor);
        }
    }

    pub fn unlock_software_all(&mut self, ctx: &mut PointerContext<'_>) {
        for monitor in ctx.monitors.handles() {
            self.unlock_software_for(ctx, monitor);
        }
    }

    /// Whether `monitor` is locked to software or its plane failed.
    pub fn software_locked_for(&self, monitor: MonitorHandle) -> bool {
        self.states
            .get(&monitor)
            .is_some_and(|s| s.software_locks > 0 || s.hardware_failed)
    }

    /// Whether the cursor is composited into the frame on `monitor`.
    pub fn uses_software(&self, config: &Config, monitor: MonitorHandle) -> bool {
        self.states
            .get(&monitor)
            .is_some_and(|state| is_software(state, config))
    }

    // Rendering

    /// Draw the software cursor into the frame of `monitor`, if it uses one.
    ///
    /// `damage` limits drawing to a region; `override_pos` draws the cursor as if the
    /// pointer were there (screen capture uses this). Returns whether anything was
    /// drawn.
    pub fn render_software_cursors_for(
        &mut self,
        ctx: &mut PointerContext<'_>,
        monitor: MonitorHandle,
        damage: Option<Rectangle<f64, Logical>>,
        override_pos: Option<Point<f64, Logical>>,
    ) -> bool {
        tracy_span!("PointerManager::render_software_cursors_for");

        let Some(view) = self.view(ctx.scene) else {
            return false;
        };
        let Some(state) = self.states.get(&monitor) else {
            return false;
        };
        if !is_software(state, ctx.config) {
            return false;
        }
        let Some(mon) = ctx.monitors.get(monitor) else {
            return false;
        };

        let origin = override_pos.unwrap_or(self.position) - view.hotspot;
        let dest = Rectangle::new(origin, view.logical_size());
        let Some(mut visible) = dest.intersection(mon.logical_box()) else {
            return false;
        };
        if let Some(region) = damage {
            match visible.intersection(region) {
                Some(clipped) => visible = clipped,
                None => return false,
            }
        }

        ctx.renderer.draw_software_cursor(monitor, &view, dest, visible);
        if let Some(surface) = self.image.surface() {
            ctx.seat
                .send_frame_done(ctx.scene, surface, ctx.now.as_millis() as u32);
        }
        true
    }

    /// Damage the cursor on `monitor` regardless of how it is shown.
    pub fn damage_cursor(&mut self, ctx: &mut PointerContext<'_>, monitor: MonitorHandle) {
        let Some(mon) = ctx.monitors.get(monitor) else {
            return;
        };
        let Some(rect) = self.cursor_box_for(ctx.scene, mon) else {
            return;
        };
        ctx.damage.damage_box(monitor, rect, true);
        self.state_for(monitor).damage_box = Some(rect);
    }

    /// Damage the cursor on every monitor that composites it in software.
    pub fn damage_if_software(&mut self, ctx: &mut PointerContext<'_>) {
        if self.view(ctx.scene).is_none() {
            return;
        }
        let cursor_box = {
            let rect = self.cursor_box(ctx.scene);
            Rectangle::new(
                rect.loc - Point::from((DAMAGE_MARGIN, DAMAGE_MARGIN)),
                rect.size + Size::from((DAMAGE_MARGIN * 2.0, DAMAGE_MARGIN * 2.0)),
            )
        };

        for handle in self.layout.monitors().collect::<Vec<_>>() {
            let Some(monitor) = ctx.monitors.get(handle) else {
                continue;
            };
            let software = self
                .states
                .get(&handle)
                .is_some_and(|state| is_software(state, ctx.config));
            if !software {
                continue;
            }
            let Some(rect) = cursor_box.intersection(monitor.logical_box()) else {
                continue;
            };
            if ctx.config.zoomed() {
                ctx.damage.damage_monitor(handle);
            } else {
                let skip = should_skip_frame_on_mouse_event(
                    handle,
                    monitor,
                    ctx.scene,
                    ctx.config,
                    ctx.damage,
                    ctx.now,
                );
                ctx.damage.damage_box(handle, rect, !skip);
            }
            self.state_for(handle).damage_box = Some(rect);
        }
    }

    // Monitor tracking

    /// Update `entered` flags, emitting enter/leave for every change.
    pub fn recheck_entered_monitors(&mut self, ctx: &mut PointerContext<'_>) {
        let cursor_box = self.cursor_box(ctx.scene);
        let surface = self.image.surface();

        for handle in ctx.monitors.handles() {
            let Some(monitor) = ctx.monitors.get_mut(handle) else {
                continue;
            };
            let crosses = monitor.in_layout() && cursor_box.overlaps(monitor.logical_box());
            let state = self.states.entry(handle).or_default();
            if crosses == state.entered {
                continue;
            }
            state.entered = crosses;

            if crosses {
                trace!(monitor = %monitor.name, "cursor entered monitor");
                if let Some(surface) = surface {
                    ctx.seat.surface_enter(ctx.scene, surface, handle);
                }
                self.events.emit(&PresentationEvent::MonitorEntered(handle));
            } else {
                trace!(monitor = %monitor.name, "cursor left monitor");
                if !state.hardware_failed {
                    // Don't leave a stale image on the plane
                    hide_hardware_cursor(monitor, state);
                }
                if let Some(surface) = surface {
                    ctx.seat.surface_leave(ctx.scene, surface, handle);
                }
                self.events.emit(&PresentationEvent::MonitorLeft(handle));
            }
        }
    }

    /// Follow the pointer with the planes that already show it.
    fn on_cursor_moved(&mut self, ctx: &mut PointerContext<'_>) {
        if self.view(ctx.scene).is_none() {
            return;
        }
        let cursor_box = self.cursor_box(ctx.scene);
        let mut recalc = false;

        for handle in self.layout.monitors().collect::<Vec<_>>() {
            let Some(monitor) = ctx.monitors.get_mut(handle) else {
                continue;
            };
            let crosses = cursor_box.overlaps(monitor.logical_box());
            let skip = should_skip_frame_on_mouse_event(
                handle,
                monitor,
                ctx.scene,
                ctx.config,
                ctx.damage,
                ctx.now,
            );
            let position = self.position;
            let state = self.states.entry(handle).or_default();

            if !crosses {
                if state.hardware_buffer.is_some() {
                    trace!(monitor = %monitor.name, "cursor left the monitor, removing it from the plane");
                    hide_hardware_cursor(monitor, state);
                }
                continue;
            }
            if state.hardware_buffer.is_none() {
                if !is_software(state, ctx.config) {
                    recalc = true;
                }
                continue;
            }

            let plane_pos = plane_position(monitor, position);
            if let Some(plane) = monitor.plane_mut() {
                plane.move_cursor(plane_pos, skip);
            }
        }

        if recalc {
            self.update_cursor_backend(ctx);
        }
    }

    /// Decide hardware or software for every monitor and apply it.
    pub fn update_cursor_backend(&mut self, ctx: &mut PointerContext<'_>) {
        tracy_span!("PointerManager::update_cursor_backend");

        let cursor_box = self.cursor_box(ctx.scene);
        let hidden = self.hidden;
        let position = self.position;
        let view = if hidden { None } else { self.image.view(ctx.scene) };

        for handle in ctx.monitors.handles() {
            let Some(monitor) = ctx.monitors.get_mut(handle) else {
                continue;
            };
            let state = self.states.entry(handle).or_default();

            if !monitor.in_layout() || !monitor.dpms_on {
                hide_hardware_cursor(monitor, state);
                continue;
            }
            let Some(view) = view.as_ref() else {
                hide_hardware_cursor(monitor, state);
                continue;
            };
            if !cursor_box.overlaps(monitor.logical_box()) {
                hide_hardware_cursor(monitor, state);
                continue;
            }
            if state.software_locks > 0
                || ctx.config.cursor.no_hardware_cursors
                || ctx.config.zoomed()
            {
                hide_hardware_cursor(monitor, state);
                continue;
            }

            let skip = should_skip_frame_on_mouse_event(
                handle,
                monitor,
                ctx.scene,
                ctx.config,
                ctx.damage,
                ctx.now,
            );
            match attempt_hardware_cursor(
                monitor,
                state,
                view,
                position,
                skip,
                ctx.config,
                &mut *ctx.renderer,
            ) {
                Ok(buffer) => {
                    state.hardware_buffer = Some(buffer);
                    if state.hardware_failed {
                        state.hardware_failed = false;
                        debug!(monitor = %monitor.name, "hardware cursor restored");
                        self.events
                            .emit(&PresentationEvent::HardwareCursorRestored(handle));
                    }
                }
                Err(err) => {
                    debug!(monitor = %monitor.name, "falling back to a software cursor: {err}");
                    hide_hardware_cursor(monitor, state);
                    if !state.hardware_failed {
                        state.hardware_failed = true;
                        self.events.emit(&PresentationEvent::HardwareCursorFailed {
                            monitor: handle,
                            reason: err.to_string(),
                        });
                    }
                    if let Some(rect) = cursor_box.intersection(monitor.logical_box()) {
                        ctx.damage.damage_box(handle, rect, true);
                    }
                }
            }
        }

        tracy_plot!(
            "software cursor monitors",
            self.states
                .values()
                .filter(|s| is_software(s, ctx.config))
                .count()
        );
    }

    /// A monitor's frame reached the screen.
    pub fn frame_presented(&mut self, monitor: MonitorHandle) {
        if let Some(state) = self.states.get_mut(&monitor) {
            state.pending_render = false;
        }
    }

    /// A monitor appeared, moved, changed mode or was enabled or disabled.
    pub fn layout_changed(&mut self, ctx: &mut PointerContext<'_>) {
        self.layout = MonitorLayout::from_monitors(ctx.monitors);
        self.states.retain(|handle, _| ctx.monitors.contains(*handle));
        for handle in ctx.monitors.handles() {
            self.state_for(handle);
        }
        debug!(monitors = self.layout.monitors().count(), "pointer layout rebuilt");

        if !self.layout.is_empty() {
            let clamped = self.closest_valid(ctx.config, self.position);
            if clamped != self.position {
                self.damage_if_software(ctx);
                self.position = clamped;
            }
        }
        self.recheck_entered_monitors(ctx);
        self.update_cursor_backend(ctx);
        self.damage_if_software(ctx);
    }

    /// A monitor is about to be destroyed. Clears its plane and forgets its state;
    /// the caller removes the monitor and then calls [`Self::layout_changed`].
    pub fn monitor_removed(&mut self, ctx: &mut PointerContext<'_>, monitor: MonitorHandle) {
        let Some(mut state) = self.states.remove(&monitor) else {
            return;
        };
        if let Some(mon) = ctx.monitors.get_mut(monitor) {
            hide_hardware_cursor(mon, &mut state);
            state.swapchain.release();
        }
        if state.entered {
            if let Some(surface) = self.image.surface() {
                ctx.seat.surface_leave(ctx.scene, surface, monitor);
            }
            self.events.emit(&PresentationEvent::MonitorLeft(monitor));
        }
        ctx.damage.remove_monitor(monitor);
    }
}

/// Monitor-local physical plane position of the hotspot.
fn plane_position(monitor: &Monitor, position: Point<f64, Logical>) -> Point<i32, Physical> {
    let local = position - monitor.position.to_f64();
    let upright = monitor
        .transform
        .invert()
        .transform_point_in(local, &monitor.logical_size());
    upright.to_physical(monitor.scale).to_i32_round()
}

/// Take the cursor off a monitor's plane. Hiding cannot fail.
fn hide_hardware_cursor(monitor: &mut Monitor, state: &mut MonitorPointerState) {
    state.hardware_buffer = None;
    if !state.plane_armed {
        return;
    }
    state.plane_armed = false;
    if let Some(plane) = monitor.plane_mut() {
        if let Err(err) = plane.set_cursor(None, Point::default()) {
            warn!(monitor = %monitor.name, "cursor plane refused to hide: {err}");
        }
    }
}

fn attempt_hardware_cursor(
    monitor: &mut Monitor,
    state: &mut MonitorPointerState,
    view: &CursorView<'_>,
    position: Point<f64, Logical>,
    skip_frame: bool,
    config: &Config,
    renderer: &mut dyn CursorRenderer,
) -> Result<BufferHandle, HardwareCursorError> {
    let scale = monitor.scale;
    let transform = monitor.transform;
    let plane_pos = plane_position(monitor, position);
    let plane: &mut dyn CursorPlane = monitor.plane_mut().ok_or(PlaneError::NoCapability)?;

    let needed = cursor_buffer_size(view, scale, transform);
    let size = match plane.plane_size() {
        PlaneSize::Unsupported => return Err(PlaneError::NoCapability.into()),
        PlaneSize::Unlimited => needed,
        PlaneSize::Max(max) => {
            if needed.w > max.w || needed.h > max.h {
                return Err(HardwareCursorError::TooLarge { needed, max });
            }
            max
        }
    };
    let format = plane
        .formats()
        .first()
        .copied()
        .ok_or(HardwareCursorError::NoFormat)?;

    plane.move_cursor(plane_pos, skip_frame);

    let options = SwapchainOptions {
        size,
        format,
        length: CURSOR_SWAPCHAIN_LENGTH,
        cpu_mapped: config.cursor.use_cpu_buffer,
    };
    if state.swapchain.needs_reconfigure(&options) {
        state.hardware_buffer = None;
        state.pending_render = false;
        state.swapchain.reconfigure(options, plane)?;
    }
    if state.pending_render {
        // Previous render never made it to the screen, reuse its buffer
        state.swapchain.rollback();
    }
    let handle = state.swapchain.acquire()?;
    let buffer = state
        .swapchain
        .get_mut(handle)
        .ok_or(SwapchainError::NotConfigured)?;

    if options.cpu_mapped {
        blit_cursor(view, buffer, scale, transform)?;
    } else {
        renderer.render_cursor_to_buffer(view, buffer, scale, transform)?;
    }

    let hotspot = cursor_buffer_hotspot(view, scale, transform);
    state.plane_armed = true;
    plane.set_cursor(Some(&*buffer), hotspot)?;
    state.pending_render = true;
    trace!(monitor = %monitor.name, ?size, %format, "cursor on hardware plane");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn layout(boxes: &[(i32, i32, i32, i32)]) -> MonitorLayout {
        let mut monitors = Arena::new();
        for (i, (x, y, w, h)) in boxes.iter().enumerate() {
            monitors.insert(Monitor::new(format!("OUT-{i}"), (*w, *h)).with_position((*x, *y)));
        }
        MonitorLayout::from_monitors(&monitors)
    }

    #[test]
    fn test_closest_valid_inside_is_unchanged() {
        let layout = layout(&[(0, 0, 1920, 1080)]);
        let p = Point::from((100.5, 200.25));
        assert_eq!(closest_valid(&layout, p, 1.0), p);
    }

    #[test]
    fn test_closest_valid_empty_layout() {
        let p = closest_valid(&MonitorLayout::default(), (50.0, 50.0).into(), 1.0);
        assert_eq!(p, Point::default());
    }

    #[test]
    fn test_closest_valid_respects_padding() {
        let layout = layout(&[(0, 0, 1920, 1080)]);
        let p = closest_valid(&layout, (5000.0, 500.0).into(), 10.0);
        assert!((p.x - 1910.0).abs() < 1e-3, "{p:?}");
        assert_eq!(p.y, 500.0);

        let p = closest_valid(&layout, (-50.0, -50.0).into(), 0.0);
        assert_eq!(p, Point::from((0.0, 0.0)));
    }

    #[test]
    fn test_closest_valid_gap_between_monitors() {
        // Second monitor is lower, leaving a dead corner at the top right
        let layout = layout(&[(0, 0, 1920, 1080), (1920, 500, 1920, 1080)]);
        let p = closest_valid(&layout, (2500.0, 100.0).into(), 1.0);
        assert!(layout.contains(p));
        assert_eq!(closest_valid(&layout, p, 1.0), p);
    }

    proptest! {
        #[test]
        fn test_closest_valid_idempotent(
            x in -5000.0f64..8000.0,
            y in -5000.0f64..5000.0,
            padding in 0.0f64..100.0,
        ) {
            let layout = layout(&[(0, 0, 1920, 1080), (1920, 200, 2560, 1440), (-1280, 0, 1280, 1024)]);
            let once = closest_valid(&layout, (x, y).into(), padding);
            let twice = closest_valid(&layout, once, padding);
            prop_assert_eq!(once, twice);
            prop_assert!(layout.contains(once));
        }
    }

    #[test]
    fn test_plane_position_scaled_and_rotated() {
        let monitor = Monitor::new("DP-1", (1920, 1080))
            .with_position((100, 0))
            .with_scale(2.0);
        assert_eq!(
            plane_position(&monitor, (110.0, 20.0).into()),
            Point::from((20, 40))
        );

        let rotated = Monitor::new("DP-2", (1080, 1920)).with_transform(smithay::utils::Transform::_90);
        // Logical box is 1920x1080; mode space is 1080 wide
        let p = plane_position(&rotated, (0.0, 0.0).into());
        assert!(p.x >= 0 && p.x <= 1080 && p.y >= 0 && p.y <= 1920, "{p:?}");
    }

    struct Harness {
        config: Config,
        monitors: Arena<Monitor>,
        scene: Scene,
        seat: crate::seat::SeatManager,
        damage: DamageTracker,
        renderer: crate::render::SoftwareRenderer,
        pointer: PointerManager,
        now: Duration,
    }

    impl Harness {
        fn new(monitors: Vec<Monitor>) -> (Self, Vec<MonitorHandle>) {
            let mut arena = Arena::new();
            let handles = monitors.into_iter().map(|m| arena.insert(m)).collect();
            let mut harness = Self {
                config: Config::default(),
                monitors: arena,
                scene: Scene::new(),
                seat: crate::seat::SeatManager::new(),
                damage: DamageTracker::new(),
                renderer: crate::render::SoftwareRenderer::new(),
                pointer: PointerManager::new(),
                now: Duration::ZERO,
            };
            harness.run(|pointer, ctx| pointer.layout_changed(ctx));
            (harness, handles)
        }

        fn run<R>(&mut self, f: impl FnOnce(&mut PointerManager, &mut PointerContext<'_>) -> R) -> R {
            let mut ctx = PointerContext {
                config: &self.config,
                monitors: &mut self.monitors,
                scene: &self.scene,
                seat: &mut self.seat,
                damage: &mut self.damage,
                renderer: &mut self.renderer,
                now: self.now,
            };
            f(&mut self.pointer, &mut ctx)
        }

        fn record(&self) -> (Rc<std::cell::RefCell<Vec<PresentationEvent>>>, crate::event::Subscription) {
            let events = Rc::new(std::cell::RefCell::new(Vec::new()));
            let sink = events.clone();
            let sub = self
                .pointer
                .events()
                .subscribe(move |event| sink.borrow_mut().push(event.clone()));
            (events, sub)
        }
    }

    fn bitmap() -> Rc<CursorBitmap> {
        Rc::new(CursorBitmap::solid((24, 24), [0, 0, 255, 255], 1.0))
    }

    fn monitor_with_plane() -> (Monitor, crate::backend::PlaneProbe) {
        let (plane, probe) = crate::backend::HeadlessPlane::new(PlaneSize::Max((64, 64).into()));
        (Monitor::new("DP-1", (1920, 1080)).with_plane(plane), probe)
    }

    #[test]
    fn test_hardware_cursor_follows_pointer() {
        let (monitor, probe) = monitor_with_plane();
        let (mut h, handles) = Harness::new(vec![monitor]);

        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        let shown = probe.shown().unwrap();
        assert_eq!(shown.size, (64, 64).into());
        assert_eq!(shown.hotspot, Point::from((0, 0)));
        assert!(h.pointer.state(handles[0]).unwrap().hardware_buffer.is_some());
        assert!(!h.pointer.uses_software(&h.config, handles[0]));

        h.run(|p, ctx| p.warp_to(ctx, (100.0, 200.0).into()));
        assert_eq!(probe.position(), Some(Point::from((100, 200))));
        assert!(!h.run(|p, ctx| p.render_software_cursors_for(ctx, handles[0], None, None)));
    }

    #[test]
    fn test_plane_failure_falls_back_to_software() {
        let (monitor, probe) = monitor_with_plane();
        let (mut h, handles) = Harness::new(vec![monitor]);
        let (events, _sub) = h.record();
        probe.fail_set_cursor(true);

        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        let state = h.pointer.state(handles[0]).unwrap();
        assert!(state.hardware_failed);
        assert!(state.hardware_buffer.is_none());
        assert!(!probe.is_visible());
        assert!(h.pointer.software_locked_for(handles[0]));
        assert!(h.damage.is_damaged(handles[0]));
        assert!(h.run(|p, ctx| p.render_software_cursors_for(ctx, handles[0], None, None)));
        assert_eq!(h.renderer.software_draws(), 1);

        probe.fail_set_cursor(false);
        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        assert!(probe.is_visible());
        assert!(!h.pointer.uses_software(&h.config, handles[0]));

        let events = events.borrow();
        let failed = events
            .iter()
            .filter(|e| matches!(e, PresentationEvent::HardwareCursorFailed { .. }))
            .count();
        assert_eq!(failed, 1);
        assert!(events.contains(&PresentationEvent::HardwareCursorRestored(handles[0])));
    }

    #[test]
    fn test_oversized_cursor_uses_software() {
        let (monitor, probe) = monitor_with_plane();
        let (mut h, handles) = Harness::new(vec![monitor]);
        let big = Rc::new(CursorBitmap::solid((128, 128), [255; 4], 1.0));

        h.run(|p, ctx| p.set_cursor_buffer(ctx, big));
        assert!(!probe.is_visible());
        assert!(h.pointer.uses_software(&h.config, handles[0]));
    }

    #[test]
    fn test_plane_without_formats_uses_software() {
        let (plane, probe) = crate::backend::HeadlessPlane::new(PlaneSize::Max((64, 64).into()));
        let monitor = Monitor::new("DP-1", (1920, 1080)).with_plane(plane.with_formats(Vec::new()));
        let (mut h, handles) = Harness::new(vec![monitor]);

        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        assert!(!probe.is_visible());
        assert!(h.pointer.uses_software(&h.config, handles[0]));
    }

    #[test]
    fn test_zoom_forces_software_and_full_damage() {
        let (monitor, probe) = monitor_with_plane();
        let (mut h, handles) = Harness::new(vec![monitor]);
        h.config.cursor.zoom_factor = 2.0;

        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        assert!(!probe.is_visible());
        assert!(h.pointer.uses_software(&h.config, handles[0]));

        h.damage.clear();
        h.run(|p, ctx| p.warp_to(ctx, (300.0, 300.0).into()));
        assert!(h.damage.get(handles[0]).is_some_and(|d| d.full));
        assert!(h.run(|p, ctx| p.render_software_cursors_for(ctx, handles[0], None, None)));
    }

    #[test]
    fn test_cpu_buffer_path() {
        let (monitor, probe) = monitor_with_plane();
        let (mut h, handles) = Harness::new(vec![monitor]);
        h.config.cursor.use_cpu_buffer = true;

        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        let shown = probe.shown().unwrap();
        let state = h.pointer.state(handles[0]).unwrap();
        assert!(state.swapchain().options().is_some_and(|o| o.cpu_mapped));
        assert_eq!(shown.pixels.len(), 64 * 64 * 4);
        // First pixel carries the image, the bottom right corner is padding
        assert_ne!(&shown.pixels[..4], &[0, 0, 0, 0]);
        assert_eq!(&shown.pixels[shown.pixels.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_scaled_rotated_monitor_plane_math() {
        let (plane, probe) = crate::backend::HeadlessPlane::new(PlaneSize::Max((64, 64).into()));
        let monitor = Monitor::new("eDP-1", (2160, 3840))
            .with_scale(2.0)
            .with_transform(smithay::utils::Transform::_90)
            .with_plane(plane);
        let (mut h, _) = Harness::new(vec![monitor]);
        let cursor = Rc::new(CursorBitmap::new(
            [0, 0, 255, 255].repeat(24 * 24),
            (24, 24),
            (4, 8),
            1.0,
        ));

        h.run(|p, ctx| p.warp_to(ctx, (100.0, 200.0).into()));
        h.run(|p, ctx| p.set_cursor_buffer(ctx, cursor));

        // Logical (100, 200) on a 1920x1080 box rotated back into mode space, times 2
        assert_eq!(probe.position(), Some(Point::from((400, 3640))));
        let shown = probe.shown().unwrap();
        assert_eq!(shown.size, (64, 64).into());
        // Hotspot (4, 8) scaled to (8, 16) inside a 48x48 image, rotated the same way
        assert_eq!(shown.hotspot, Point::from((16, 40)));
    }

    #[test]
    fn test_hidden_cursor_still_tracks_monitors() {
        let (mut h, handles) = Harness::new(vec![
            Monitor::new("DP-1", (1920, 1080)),
            Monitor::new("DP-2", (1920, 1080)).with_position((1920, 0)),
        ]);
        h.run(|p, ctx| p.warp_to(ctx, (100.0, 100.0).into()));
        h.run(|p, ctx| p.set_hidden(ctx, true));
        let (events, _sub) = h.record();

        h.run(|p, ctx| p.warp_to(ctx, (2500.0, 100.0).into()));
        assert!(!h.pointer.state(handles[0]).unwrap().entered);
        assert!(h.pointer.state(handles[1]).unwrap().entered);
        assert_eq!(
            *events.borrow(),
            vec![
                PresentationEvent::MonitorLeft(handles[0]),
                PresentationEvent::MonitorEntered(handles[1]),
            ]
        );
    }

    #[test]
    fn test_software_locks_hide_plane() {
        let (monitor, probe) = monitor_with_plane();
        let (mut h, handles) = Harness::new(vec![monitor]);
        let mon = handles[0];
        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        assert!(probe.is_visible());

        h.run(|p, ctx| p.lock_software_for(ctx, mon));
        h.run(|p, ctx| p.lock_software_for(ctx, mon));
        assert!(!probe.is_visible());
        assert_eq!(h.pointer.state(mon).unwrap().software_locks, 2);

        h.run(|p, ctx| p.unlock_software_for(ctx, mon));
        assert!(!probe.is_visible());
        h.run(|p, ctx| p.unlock_software_for(ctx, mon));
        assert!(probe.is_visible());

        // Unbalanced unlock is ignored
        h.run(|p, ctx| p.unlock_software_for(ctx, mon));
        assert_eq!(h.pointer.state(mon).unwrap().software_locks, 0);
    }

    #[test]
    fn test_lock_software_all() {
        let (first, first_probe) = monitor_with_plane();
        let (plane, _) = crate::backend::HeadlessPlane::new(PlaneSize::Max((64, 64).into()));
        let second = Monitor::new("DP-2", (1920, 1080))
            .with_position((1920, 0))
            .with_plane(plane);
        let (mut h, handles) = Harness::new(vec![first, second]);
        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));

        h.run(|p, ctx| p.lock_software_all(ctx));
        for handle in &handles {
            assert!(h.pointer.software_locked_for(*handle));
            assert_eq!(h.pointer.state(*handle).unwrap().software_locks, 1);
        }
        assert!(!first_probe.is_visible());

        h.run(|p, ctx| p.unlock_software_all(ctx));
        for handle in &handles {
            assert!(!h.pointer.software_locked_for(*handle));
        }
    }

    #[test]
    fn test_reset_with_apply_hides_plane() {
        let (monitor, probe) = monitor_with_plane();
        let (mut h, _) = Harness::new(vec![monitor]);
        h.run(|p, ctx| p.set_cursor_buffer(ctx, bitmap()));
        assert!(probe.is_visible());

        h.run(|p, ctx| p.reset_cursor_image(ctx, true));
        assert!(!probe.is_visible());
        assert!(h.pointer.image().is_none());
    }

    #[test]
    fn test_crossing_monitors_emits_leave_then_enter() {
        let (mut h, handles) = Harness::new(vec![
            Monitor::new("DP-1", (1920, 1080)),
            Monitor::new("DP-2", (1920, 1080)).with_position((1920, 0)),
        ]);
        let (events, _sub) = h.record();

        h.run(|p, ctx| p.warp_to(ctx, (1919.0, 500.0).into()));
        assert!(events.borrow().is_empty());
        h.run(|p, ctx| p.move_by(ctx, (5.0, 0.0).into()));

        assert_eq!(
            *events.borrow(),
            vec![
                PresentationEvent::MonitorLeft(handles[0]),
                PresentationEvent::MonitorEntered(handles[1]),
            ]
        );
        assert!(!h.pointer.state(handles[0]).unwrap().entered);
        assert!(h.pointer.state(handles[1]).unwrap().entered);
    }

    #[test]
    fn test_skip_frame_under_fullscreen_vrr() {
        let mut scene = Scene::new();
        let ws = scene.add_workspace("1", None, false);
        let surface = scene.create_surface(1, (1920, 1080));
        let window = scene.map_window(surface, ws, (0, 0)).unwrap();
        scene.set_fullscreen(ws, Some((window, FullscreenMode::Exclusive)));

        let mut monitors = Arena::new();
        let mut monitor = Monitor::new("DP-1", (1920, 1080));
        monitor.adaptive_sync = true;
        monitor.active_workspace = Some(ws);
        monitor.frame_clock.presented(Duration::from_millis(100));
        let handle = monitors.insert(monitor);
        let monitor = monitors.get(handle).unwrap();

        let mut config = Config::default();
        let mut damage = DamageTracker::new();
        let now = Duration::from_millis(110);
        assert!(!should_skip_frame_on_mouse_event(handle, monitor, &scene, &config, &mut damage, now));

        config.cursor.no_break_fullscreen_vrr = true;
        assert!(should_skip_frame_on_mouse_event(handle, monitor, &scene, &config, &mut damage, now));
        assert!(!damage.is_damaged(handle));

        // Too long since the last frame: repaint instead of skipping
        let late = Duration::from_millis(200);
        assert!(!should_skip_frame_on_mouse_event(handle, monitor, &scene, &config, &mut damage, late));
        assert!(damage.get(handle).unwrap().full);
    }
}
