//! Focus resolution
//!
//! Decides which surface owns the pointer at a given position. The scene is
//! consulted top to bottom:
//!
//! 1. exclusive layer surfaces (these win even when the pointer is elsewhere)
//! 2. layer-shell popups
//! 3. the overlay layer
//! 4. the input-method popup
//! 5. the top layer
//! 6. an exclusive fullscreen window, unless a window opened above it or the special
//!    workspace claims the point
//! 7. in maximized fullscreen, floating windows and then the maximized window
//! 8. otherwise ordinary window hit-testing, floating windows first
//! 9. the bottom and background layers
//!
//! Nothing found means no pointer focus.
//!
//! [`InputManager`] layers the stateful policies on top: focus stays pinned to the
//! last surface while a button is held, and a grab restricts focus to its surfaces.

use cursor_icon::CursorIcon;
use smithay::utils::{Logical, Point, Rectangle};
use tracing::{debug, trace};

use crate::event::{FocusEvent, Signal};
use crate::monitor::{Monitor, MonitorHandle};
use crate::scene::{
    FullscreenMode, Layer, Scene, SurfaceHandle, SurfaceHit, SurfaceOwner, WindowHandle,
    WorkspaceHandle,
};

/// The surface resolved for a pointer position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusCandidate {
    pub surface: SurfaceHandle,
    /// Pointer position in surface-local coordinates.
    pub local: Point<f64, Logical>,
    pub owner: Option<SurfaceOwner>,
}

impl FocusCandidate {
    fn from_hit(scene: &Scene, hit: SurfaceHit) -> Self {
        Self {
            surface: hit.surface,
            local: hit.local,
            owner: scene.owner_of(hit.surface),
        }
    }

    /// The window this candidate belongs to, if any.
    pub fn window(&self) -> Option<WindowHandle> {
        match self.owner {
            Some(SurfaceOwner::Window(window)) => Some(window),
            _ => None,
        }
    }
}

/// Workspaces visible on a monitor, special workspace first.
fn visible_workspaces(monitor: &Monitor) -> Vec<WorkspaceHandle> {
    monitor
        .special_workspace
        .into_iter()
        .chain(monitor.active_workspace)
        .collect()
}

/// Resolve the surface under `point`.
///
/// `monitor` is the monitor under the pointer; without one only exclusive layers and
/// the input-method popup can be found.
pub fn resolve_focus(
    scene: &Scene,
    monitor: Option<(MonitorHandle, &Monitor)>,
    point: Point<f64, Logical>,
) -> Option<FocusCandidate> {
    let candidate = |hit: SurfaceHit| FocusCandidate::from_hit(scene, hit);

    // Exclusive layers short-circuit everything else
    let exclusive: Vec<_> = scene.exclusive_layers().collect();
    if let Some(first) = exclusive.first() {
        if let Some(hit) = exclusive
            .iter()
            .find_map(|layer| scene.layer_surface_under(*layer, point))
        {
            return Some(candidate(hit));
        }
        let layer = scene.layer(*first)?;
        return Some(FocusCandidate {
            surface: layer.surface,
            local: point - layer.loc.to_f64(),
            owner: Some(SurfaceOwner::Layer(*first)),
        });
    }

    let Some((handle, monitor)) = monitor else {
        return scene.ime_popup_under(point).map(candidate);
    };

    if let Some((_, hit)) = scene.layer_popup_under(handle, point) {
        return Some(candidate(hit));
    }
    if let Some((_, hit)) = scene.layer_under(handle, Layer::Overlay, point) {
        return Some(candidate(hit));
    }
    if let Some(hit) = scene.ime_popup_under(point) {
        return Some(candidate(hit));
    }
    if let Some((_, hit)) = scene.layer_under(handle, Layer::Top, point) {
        return Some(candidate(hit));
    }

    if let Some(hit) = window_focus(scene, monitor, point) {
        return Some(candidate(hit));
    }

    for layer in [Layer::Bottom, Layer::Background] {
        if let Some((_, hit)) = scene.layer_under(handle, layer, point) {
            return Some(candidate(hit));
        }
    }
    None
}

fn window_focus(
    scene: &Scene,
    monitor: &Monitor,
    point: Point<f64, Logical>,
) -> Option<SurfaceHit> {
    let workspaces = visible_workspaces(monitor);
    let fullscreen = monitor
        .active_workspace
        .and_then(|ws| scene.workspace(ws))
        .and_then(|ws| ws.fullscreen);

    match fullscreen {
        Some((window, FullscreenMode::Exclusive)) => {
            if let Some(special) = monitor.special_workspace {
                if let Some((_, hit)) = scene.window_under(point, &[special], |_, _| true) {
                    return Some(hit);
                }
            }
            let above = scene.window_under(point, &workspaces, |_, w| {
                w.floating && w.created_over_fullscreen
            });
            if let Some((_, hit)) = above {
                return Some(hit);
            }
            scene.window_surface_under(window, point).or_else(|| {
                // Exclusive fullscreen owns the whole monitor
                let w = scene.window(window)?;
                w.mapped.then(|| SurfaceHit {
                    surface: w.surface,
                    local: point - w.loc.to_f64(),
                })
            })
        }
        Some((window, FullscreenMode::Maximized)) => {
            let hit = scene.window_under(point, &workspaces, |handle, w| {
                handle == window || w.floating
            });
            match hit {
                Some((_, hit)) => Some(hit),
                None => scene.window_surface_under(window, point),
            }
        }
        None => scene
            .window_under(point, &workspaces, |_, _| true)
            .map(|(_, hit)| hit),
    }
}

/// Resize icon for a point near a window's border.
///
/// `window_box` is the window in global coordinates. Points inside the window or
/// farther than `grab_area` outside it have no icon. Within `corner_radius` of a
/// corner the diagonal icon is used.
pub fn border_icon_at(
    window_box: Rectangle<f64, Logical>,
    point: Point<f64, Logical>,
    grab_area: f64,
    corner_radius: f64,
) -> Option<CursorIcon> {
    if window_box.contains(point) {
        return None;
    }
    let grown = Rectangle::new(
        window_box.loc - Point::from((grab_area, grab_area)),
        (
            window_box.size.w + grab_area * 2.0,
            window_box.size.h + grab_area * 2.0,
        )
            .into(),
    );
    if !grown.contains(point) {
        return None;
    }

    let left = point.x < window_box.loc.x + corner_radius;
    let right = point.x >= window_box.loc.x + window_box.size.w - corner_radius;
    let top = point.y < window_box.loc.y + corner_radius;
    let bottom = point.y >= window_box.loc.y + window_box.size.h - corner_radius;

    let icon = match (top, bottom, left, right) {
        (true, _, true, _) => CursorIcon::NwResize,
        (true, _, _, true) => CursorIcon::NeResize,
        (_, true, true, _) => CursorIcon::SwResize,
        (_, true, _, true) => CursorIcon::SeResize,
        (true, _, _, _) => CursorIcon::NResize,
        (_, true, _, _) => CursorIcon::SResize,
        (_, _, true, _) => CursorIcon::WResize,
        _ => CursorIcon::EResize,
    };
    Some(icon)
}

/// A modal grab restricting pointer focus to a set of surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusGrab {
    pub surfaces: Vec<SurfaceHandle>,
}

impl FocusGrab {
    fn accepts(&self, scene: &Scene, surface: SurfaceHandle) -> bool {
        let root = scene.root_surface(surface);
        self.surfaces.iter().any(|s| *s == surface || *s == root)
    }
}

/// Stateful focus policy.
#[derive(Debug, Default)]
pub struct InputManager {
    held_buttons: Vec<u32>,
    grab: Option<FocusGrab>,
    /// Last resolved focus, kept while buttons are held.
    last_candidate: Option<FocusCandidate>,
    refocus_requested: bool,
    active_monitor: Option<MonitorHandle>,
    /// Resize icon shown while hovering a window border.
    border_icon: Option<CursorIcon>,
    /// Icon the compositor last installed, `None` while a client cursor is shown.
    cursor_icon: Option<CursorIcon>,
    kill_mode: bool,
    /// Window that last received keyboard focus from pointer motion.
    last_motion_window: Option<WindowHandle>,
    events: Signal<FocusEvent>,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &Signal<FocusEvent> {
        &self.events
    }

    pub(crate) fn emit(&self, event: FocusEvent) {
        self.events.emit(&event);
    }

    // Buttons

    pub fn button_pressed(&mut self, button: u32) {
        if !self.held_buttons.contains(&button) {
            self.held_buttons.push(button);
        }
    }

    pub fn button_released(&mut self, button: u32) {
        self.held_buttons.retain(|b| *b != button);
    }

    pub fn held_buttons(&self) -> &[u32] {
        &self.held_buttons
    }

    pub fn is_button_held(&self) -> bool {
        !self.held_buttons.is_empty()
    }

    // Grabs

    pub fn set_grab(&mut self, surfaces: Vec<SurfaceHandle>) {
        debug!(?surfaces, "focus grab set");
        self.grab = Some(FocusGrab { surfaces });
        self.refocus_requested = true;
    }

    pub fn clear_grab(&mut self) {
        if self.grab.take().is_some() {
            debug!("focus grab cleared");
            self.refocus_requested = true;
        }
    }

    pub fn grab(&self) -> Option<&FocusGrab> {
        self.grab.as_ref()
    }

    /// Re-run hit-testing on the next update even while buttons are held.
    pub fn request_refocus(&mut self) {
        self.refocus_requested = true;
    }

    pub fn refocus_requested(&self) -> bool {
        self.refocus_requested
    }

    pub(crate) fn take_refocus(&mut self) -> bool {
        std::mem::take(&mut self.refocus_requested)
    }

    // Monitors

    pub fn active_monitor(&self) -> Option<MonitorHandle> {
        self.active_monitor
    }

    /// Returns whether the active monitor changed.
    pub fn set_active_monitor(&mut self, monitor: MonitorHandle) -> bool {
        if self.active_monitor == Some(monitor) {
            return false;
        }
        trace!(?monitor, "active monitor changed");
        self.active_monitor = Some(monitor);
        self.events.emit(&FocusEvent::ActiveMonitorChanged(monitor));
        true
    }

    pub(crate) fn monitor_removed(&mut self, monitor: MonitorHandle) {
        if self.active_monitor == Some(monitor) {
            self.active_monitor = None;
        }
    }

    // Cursor icons

    pub fn border_icon(&self) -> Option<CursorIcon> {
        self.border_icon
    }

    pub(crate) fn set_border_icon(&mut self, icon: Option<CursorIcon>) -> bool {
        if self.border_icon == icon {
            return false;
        }
        trace!(?icon, "border icon changed");
        self.border_icon = icon;
        true
    }

    pub fn cursor_icon(&self) -> Option<CursorIcon> {
        self.cursor_icon
    }

    pub(crate) fn set_cursor_icon(&mut self, icon: Option<CursorIcon>) {
        self.cursor_icon = icon;
    }

    pub fn kill_mode(&self) -> bool {
        self.kill_mode
    }

    pub(crate) fn set_kill_mode(&mut self, enabled: bool) {
        self.kill_mode = enabled;
    }

    /// Icon used when nothing has pointer focus.
    pub fn idle_icon(&self) -> CursorIcon {
        if self.kill_mode {
            CursorIcon::Crosshair
        } else {
            CursorIcon::Default
        }
    }

    // Focus

    pub fn last_candidate(&self) -> Option<FocusCandidate> {
        self.last_candidate
    }

    pub(crate) fn set_last_candidate(&mut self, candidate: Option<FocusCandidate>) {
        self.last_candidate = candidate;
    }

    pub(crate) fn last_motion_window(&self) -> Option<WindowHandle> {
        self.last_motion_window
    }

    pub(crate) fn set_last_motion_window(&mut self, window: Option<WindowHandle>) {
        self.last_motion_window = window;
    }

    /// Forget a destroyed surface.
    pub(crate) fn surface_destroyed(&mut self, surface: SurfaceHandle) {
        if self.last_candidate.is_some_and(|c| c.surface == surface) {
            self.last_candidate = None;
            self.refocus_requested = true;
        }
        if let Some(grab) = &mut self.grab {
            grab.surfaces.retain(|s| *s != surface);
            if grab.surfaces.is_empty() {
                self.grab = None;
                self.refocus_requested = true;
            }
        }
    }

    /// Resolve focus with held buttons and grabs applied.
    ///
    /// `refocus` forces hit-testing even while a button is held.
    pub fn resolve(
        &self,
        scene: &Scene,
        monitor: Option<(MonitorHandle, &Monitor)>,
        point: Point<f64, Logical>,
        refocus: bool,
    ) -> Option<FocusCandidate> {
        if let Some(grab) = &self.grab {
            if let Some(found) = resolve_focus(scene, monitor, point) {
                if grab.accepts(scene, found.surface) {
                    return Some(found);
                }
            }
            // Nothing of the grab under the cursor: the first grabbed surface keeps focus
            return grab.surfaces.iter().find_map(|surface| {
                let origin = scene.surface_origin(*surface)?;
                Some(FocusCandidate {
                    surface: *surface,
                    local: point - origin,
                    owner: scene.owner_of(*surface),
                })
            });
        }

        if self.is_button_held() && !refocus {
            let last = self.last_candidate?;
            let origin = scene.surface_origin(last.surface)?;
            return Some(FocusCandidate {
                local: point - origin,
                ..last
            });
        }

        resolve_focus(scene, monitor, point)
    }
}
