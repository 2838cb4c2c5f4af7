//! Scene model consumed by focus resolution
//!
//! The scene is what window management and the shells hand to the pointer core:
//! surfaces with their input regions and sub-surfaces, the windows and layer surfaces
//! built from them, workspaces with their fullscreen state, and the input-method popup.
//! Layout policy lives elsewhere; this module only stores the result and answers
//! "what is under this point" questions.
//!
//! # Design Invariants
//!
//! 1. **Handles, not references**: every entity lives in an [`Arena`]. Destroying a
//!    surface removes the windows, layer surfaces and popups built on it, so a stale
//!    handle always resolves to `None`.
//!
//! 2. **Stacking order is explicit**: windows and layer surfaces are kept bottom to
//!    top; hit-testing walks them top to bottom.
//!
//! 3. **Input regions win over visual bounds**: a point only hits a surface if it is
//!    inside the surface and inside its input region.

use smithay::utils::{Buffer, Logical, Point, Rectangle, Size};
use tracing::trace;

use crate::arena::{Arena, Handle};
use crate::monitor::MonitorHandle;

/// Identifier of a connected client.
pub type ClientId = u32;

pub type SurfaceHandle = Handle<Surface>;
pub type WindowHandle = Handle<Window>;
pub type LayerHandle = Handle<LayerSurface>;
pub type WorkspaceHandle = Handle<Workspace>;

/// Committed contents of a surface, premultiplied ARGB8888.
#[derive(Clone, PartialEq)]
pub struct SurfaceBuffer {
    pub pixels: Vec<u8>,
    pub size: Size<i32, Buffer>,
    pub scale: f64,
}

impl std::fmt::Debug for SurfaceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceBuffer")
            .field("size", &self.size)
            .field("scale", &self.scale)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Surface {
    pub client: ClientId,
    pub size: Size<i32, Logical>,
    /// Surface-local input region. `None` accepts input everywhere on the surface.
    pub input_region: Option<Vec<Rectangle<i32, Logical>>>,
    pub buffer: Option<SurfaceBuffer>,
    /// Sub-surfaces with their offsets, bottom to top. All are stacked above the parent.
    pub children: Vec<(SurfaceHandle, Point<i32, Logical>)>,
    pub parent: Option<SurfaceHandle>,
}

impl Surface {
    /// Whether a surface-local point accepts input.
    pub fn accepts_input(&self, local: Point<f64, Logical>) -> bool {
        let bounds = Rectangle::from_size(self.size).to_f64();
        if !bounds.contains(local) {
            return false;
        }
        match &self.input_region {
            None => true,
            Some(rects) => rects.iter().any(|rect| rect.to_f64().contains(local)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Background,
    Bottom,
    Top,
    Overlay,
}

#[derive(Debug, Clone)]
pub struct LayerSurface {
    pub surface: SurfaceHandle,
    pub layer: Layer,
    pub monitor: MonitorHandle,
    pub loc: Point<i32, Logical>,
    /// Popups with their offsets from the layer surface origin.
    pub popups: Vec<(SurfaceHandle, Point<i32, Logical>)>,
    pub mapped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenMode {
    /// The window covers the monitor and nothing else on the workspace gets input.
    Exclusive,
    /// Maximized-style fullscreen: other windows may still be hit.
    Maximized,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub name: String,
    pub monitor: Option<MonitorHandle>,
    pub special: bool,
    pub fullscreen: Option<(WindowHandle, FullscreenMode)>,
}

#[derive(Debug, Clone)]
pub struct Window {
    pub surface: SurfaceHandle,
    /// Global position of the root surface.
    pub loc: Point<i32, Logical>,
    pub floating: bool,
    /// Floating window explicitly opened above a fullscreen window.
    pub created_over_fullscreen: bool,
    pub workspace: WorkspaceHandle,
    pub mapped: bool,
    /// Areas owned by server-side decorations, relative to `loc`.
    pub decorations: Vec<Rectangle<i32, Logical>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImePopup {
    pub surface: SurfaceHandle,
    pub loc: Point<i32, Logical>,
}

/// A surface under a point, with the point in surface-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub surface: SurfaceHandle,
    pub local: Point<f64, Logical>,
}

/// The scene entity a surface belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceOwner {
    Window(WindowHandle),
    Layer(LayerHandle),
    ImePopup,
}

#[derive(Debug, Default)]
pub struct Scene {
    surfaces: Arena<Surface>,
    windows: Arena<Window>,
    /// Window stacking order, bottom to top.
    stacking: Vec<WindowHandle>,
    layers: Arena<LayerSurface>,
    /// Layer surface stacking order within each layer, bottom to top.
    layer_order: Vec<LayerHandle>,
    /// Layer surfaces holding exclusive input, oldest first.
    exclusive_layers: Vec<LayerHandle>,
    workspaces: Arena<Workspace>,
    ime_popup: Option<ImePopup>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    // Surfaces

    pub fn create_surface(
        &mut self,
        client: ClientId,
        size: impl Into<Size<i32, Logical>>,
    ) -> SurfaceHandle {
        self.surfaces.insert(Surface {
            client,
            size: size.into(),
            input_region: None,
            buffer: None,
            children: Vec::new(),
            parent: None,
        })
    }

    pub fn surface(&self, surface: SurfaceHandle) -> Option<&Surface> {
        self.surfaces.get(surface)
    }

    pub fn surface_mut(&mut self, surface: SurfaceHandle) -> Option<&mut Surface> {
        self.surfaces.get_mut(surface)
    }

    pub fn surface_alive(&self, surface: SurfaceHandle) -> bool {
        self.surfaces.contains(surface)
    }

    pub fn client_of(&self, surface: SurfaceHandle) -> Option<ClientId> {
        self.surfaces.get(surface).map(|s| s.client)
    }

    pub fn surfaces_of(&self, client: ClientId) -> Vec<SurfaceHandle> {
        self.surfaces
            .iter()
            .filter(|(_, s)| s.client == client)
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Attach `child` as a sub-surface of `parent`, stacked on top of its siblings.
    pub fn add_subsurface(
        &mut self,
        parent: SurfaceHandle,
        child: SurfaceHandle,
        offset: impl Into<Point<i32, Logical>>,
    ) -> bool {
        let Some(child_surface) = self.surfaces.get(child) else {
            return false;
        };
        if child_surface.parent.is_some() || self.root_surface(parent) == child {
            return false;
        }
        let Some(parent_surface) = self.surfaces.get_mut(parent) else {
            return false;
        };
        parent_surface.children.push((child, offset.into()));
        if let Some(child_surface) = self.surfaces.get_mut(child) {
            child_surface.parent = Some(parent);
        }
        true
    }

    /// Topmost surface of a sub-surface tree.
    pub fn root_surface(&self, mut surface: SurfaceHandle) -> SurfaceHandle {
        while let Some(parent) = self.surfaces.get(surface).and_then(|s| s.parent) {
            surface = parent;
        }
        surface
    }

    /// Destroy a surface and everything built directly on it.
    pub fn destroy_surface(&mut self, surface: SurfaceHandle) {
        let Some(removed) = self.surfaces.remove(surface) else {
            return;
        };
        trace!(?surface, "surface destroyed");

        if let Some(parent) = removed.parent.and_then(|p| self.surfaces.get_mut(p)) {
            parent.children.retain(|(child, _)| *child != surface);
        }
        for (child, _) in &removed.children {
            if let Some(child) = self.surfaces.get_mut(*child) {
                child.parent = None;
            }
        }

        let windows: Vec<_> = self
            .windows
            .iter()
            .filter(|(_, w)| w.surface == surface)
            .map(|(h, _)| h)
            .collect();
        for window in windows {
            self.remove_window(window);
        }

        let layers: Vec<_> = self
            .layers
            .iter()
            .filter(|(_, l)| l.surface == surface)
            .map(|(h, _)| h)
            .collect();
        for layer in layers {
            self.remove_layer(layer);
        }
        for (_, layer) in self.layers.iter_mut() {
            layer.popups.retain(|(popup, _)| *popup != surface);
        }

        if self.ime_popup.is_some_and(|p| p.surface == surface) {
            self.ime_popup = None;
        }
    }

    // Workspaces

    pub fn add_workspace(
        &mut self,
        name: impl Into<String>,
        monitor: Option<MonitorHandle>,
        special: bool,
    ) -> WorkspaceHandle {
        self.workspaces.insert(Workspace {
            name: name.into(),
            monitor,
            special,
            fullscreen: None,
        })
    }

    pub fn workspace(&self, workspace: WorkspaceHandle) -> Option<&Workspace> {
        self.workspaces.get(workspace)
    }

    pub fn workspace_mut(&mut self, workspace: WorkspaceHandle) -> Option<&mut Workspace> {
        self.workspaces.get_mut(workspace)
    }

    pub fn set_fullscreen(
        &mut self,
        workspace: WorkspaceHandle,
        fullscreen: Option<(WindowHandle, FullscreenMode)>,
    ) -> bool {
        match self.workspaces.get_mut(workspace) {
            Some(ws) => {
                ws.fullscreen = fullscreen;
                true
            }
            None => false,
        }
    }

    // Windows

    pub fn map_window(
        &mut self,
        surface: SurfaceHandle,
        workspace: WorkspaceHandle,
        loc: impl Into<Point<i32, Logical>>,
    ) -> Option<WindowHandle> {
        if !self.surfaces.contains(surface) || !self.workspaces.contains(workspace) {
            return None;
        }
        let window = self.windows.insert(Window {
            surface,
            loc: loc.into(),
            floating: false,
            created_over_fullscreen: false,
            workspace,
            mapped: true,
            decorations: Vec::new(),
        });
        self.stacking.push(window);
        Some(window)
    }

    pub fn window(&self, window: WindowHandle) -> Option<&Window> {
        self.windows.get(window)
    }

    pub fn window_mut(&mut self, window: WindowHandle) -> Option<&mut Window> {
        self.windows.get_mut(window)
    }

    pub fn remove_window(&mut self, window: WindowHandle) -> Option<Window> {
        let removed = self.windows.remove(window)?;
        self.stacking.retain(|w| *w != window);
        for (_, ws) in self.workspaces.iter_mut() {
            if ws.fullscreen.is_some_and(|(w, _)| w == window) {
                ws.fullscreen = None;
            }
        }
        Some(removed)
    }

    /// Move a window to the top of the stack.
    pub fn raise_window(&mut self, window: WindowHandle) {
        if self.windows.contains(window) {
            self.stacking.retain(|w| *w != window);
            self.stacking.push(window);
        }
    }

    /// Window whose surface tree contains `surface`.
    pub fn window_for_surface(&self, surface: SurfaceHandle) -> Option<WindowHandle> {
        let root = self.root_surface(surface);
        self.windows
            .iter()
            .find(|(_, w)| w.surface == root)
            .map(|(h, _)| h)
    }

    /// Visual bounds of a window's root surface.
    pub fn window_box(&self, window: WindowHandle) -> Option<Rectangle<i32, Logical>> {
        let window = self.windows.get(window)?;
        let size = self.surfaces.get(window.surface)?.size;
        Some(Rectangle::new(window.loc, size))
    }

    // Layer surfaces

    pub fn add_layer(
        &mut self,
        surface: SurfaceHandle,
        layer: Layer,
        monitor: MonitorHandle,
        loc: impl Into<Point<i32, Logical>>,
    ) -> Option<LayerHandle> {
        if !self.surfaces.contains(surface) {
            return None;
        }
        let handle = self.layers.insert(LayerSurface {
            surface,
            layer,
            monitor,
            loc: loc.into(),
            popups: Vec::new(),
            mapped: true,
        });
        self.layer_order.push(handle);
        Some(handle)
    }

    pub fn layer(&self, layer: LayerHandle) -> Option<&LayerSurface> {
        self.layers.get(layer)
    }

    pub fn layer_mut(&mut self, layer: LayerHandle) -> Option<&mut LayerSurface> {
        self.layers.get_mut(layer)
    }

    pub fn remove_layer(&mut self, layer: LayerHandle) -> Option<LayerSurface> {
        let removed = self.layers.remove(layer)?;
        self.layer_order.retain(|l| *l != layer);
        self.exclusive_layers.retain(|l| *l != layer);
        Some(removed)
    }

    /// Grant or revoke exclusive input for a layer surface.
    pub fn set_layer_exclusive(&mut self, layer: LayerHandle, exclusive: bool) {
        self.exclusive_layers.retain(|l| *l != layer);
        if exclusive && self.layers.contains(layer) {
            self.exclusive_layers.push(layer);
        }
    }

    pub fn exclusive_layers(&self) -> impl Iterator<Item = LayerHandle> + '_ {
        self.exclusive_layers
            .iter()
            .copied()
            .filter(|l| self.layers.get(*l).is_some_and(|l| l.mapped))
    }

    pub fn add_layer_popup(
        &mut self,
        layer: LayerHandle,
        popup: SurfaceHandle,
        offset: impl Into<Point<i32, Logical>>,
    ) -> bool {
        if !self.surfaces.contains(popup) {
            return false;
        }
        match self.layers.get_mut(layer) {
            Some(l) => {
                l.popups.push((popup, offset.into()));
                true
            }
            None => false,
        }
    }

    /// Mapped layer surfaces of one layer on a monitor, top to bottom.
    pub fn layers_on(
        &self,
        monitor: MonitorHandle,
        layer: Layer,
    ) -> impl Iterator<Item = (LayerHandle, &LayerSurface)> + '_ {
        self.layer_order.iter().rev().filter_map(move |handle| {
            let surface = self.layers.get(*handle)?;
            (surface.mapped && surface.monitor == monitor && surface.layer == layer)
                .then_some((*handle, surface))
        })
    }

    // Input-method popup

    pub fn set_ime_popup(&mut self, popup: Option<ImePopup>) {
        self.ime_popup = popup;
    }

    pub fn ime_popup(&self) -> Option<ImePopup> {
        self.ime_popup
    }

    // Hit-testing

    /// Topmost surface of the tree rooted at `root` accepting input at `point`.
    /// Sub-surfaces are tested before their parent.
    pub fn surface_tree_under(
        &self,
        root: SurfaceHandle,
        origin: Point<f64, Logical>,
        point: Point<f64, Logical>,
    ) -> Option<SurfaceHit> {
        let surface = self.surfaces.get(root)?;
        for (child, offset) in surface.children.iter().rev() {
            if let Some(hit) = self.surface_tree_under(*child, origin + offset.to_f64(), point) {
                return Some(hit);
            }
        }
        let local = point - origin;
        surface.accepts_input(local).then_some(SurfaceHit {
            surface: root,
            local,
        })
    }

    /// Hit-test one window's surface tree.
    pub fn window_surface_under(
        &self,
        window: WindowHandle,
        point: Point<f64, Logical>,
    ) -> Option<SurfaceHit> {
        let w = self.windows.get(window)?;
        if !w.mapped {
            return None;
        }
        self.surface_tree_under(w.surface, w.loc.to_f64(), point)
    }

    /// Topmost mapped window under `point`. Workspaces are tried in the given order,
    /// and within each floating windows are tested before tiled ones.
    pub fn window_under(
        &self,
        point: Point<f64, Logical>,
        workspaces: &[WorkspaceHandle],
        filter: impl Fn(WindowHandle, &Window) -> bool,
    ) -> Option<(WindowHandle, SurfaceHit)> {
        for workspace in workspaces {
            for floating in [true, false] {
                for handle in self.stacking.iter().rev() {
                    let Some(window) = self.windows.get(*handle) else {
                        continue;
                    };
                    if window.floating != floating
                        || window.workspace != *workspace
                        || !filter(*handle, window)
                    {
                        continue;
                    }
                    if let Some(hit) = self.window_surface_under(*handle, point) {
                        return Some((*handle, hit));
                    }
                }
            }
        }
        None
    }

    /// Windows on one of `workspaces`, top to bottom.
    pub fn windows_on<'a>(
        &'a self,
        workspaces: &'a [WorkspaceHandle],
    ) -> impl Iterator<Item = (WindowHandle, &'a Window)> + 'a {
        self.stacking.iter().rev().filter_map(move |handle| {
            let window = self.windows.get(*handle)?;
            (window.mapped && workspaces.contains(&window.workspace)).then_some((*handle, window))
        })
    }

    pub fn layer_surface_under(
        &self,
        layer: LayerHandle,
        point: Point<f64, Logical>,
    ) -> Option<SurfaceHit> {
        let l = self.layers.get(layer)?;
        self.surface_tree_under(l.surface, l.loc.to_f64(), point)
    }

    /// Topmost layer surface of `layer` on `monitor` under `point`.
    pub fn layer_under(
        &self,
        monitor: MonitorHandle,
        layer: Layer,
        point: Point<f64, Logical>,
    ) -> Option<(LayerHandle, SurfaceHit)> {
        self.layers_on(monitor, layer).find_map(|(handle, l)| {
            self.surface_tree_under(l.surface, l.loc.to_f64(), point)
                .map(|hit| (handle, hit))
        })
    }

    /// Topmost layer-shell popup on `monitor` under `point`, upper layers first.
    pub fn layer_popup_under(
        &self,
        monitor: MonitorHandle,
        point: Point<f64, Logical>,
    ) -> Option<(LayerHandle, SurfaceHit)> {
        for layer in [Layer::Overlay, Layer::Top, Layer::Bottom, Layer::Background] {
            for (handle, l) in self.layers_on(monitor, layer) {
                for (popup, offset) in l.popups.iter().rev() {
                    let origin = (l.loc + *offset).to_f64();
                    if let Some(hit) = self.surface_tree_under(*popup, origin, point) {
                        return Some((handle, hit));
                    }
                }
            }
        }
        None
    }

    pub fn ime_popup_under(&self, point: Point<f64, Logical>) -> Option<SurfaceHit> {
        let popup = self.ime_popup?;
        self.surface_tree_under(popup.surface, popup.loc.to_f64(), point)
    }

    /// Global position of a surface's origin, if it is part of the scene.
    pub fn surface_origin(&self, surface: SurfaceHandle) -> Option<Point<f64, Logical>> {
        let s = self.surfaces.get(surface)?;
        if let Some(parent) = s.parent {
            let offset = self
                .surfaces
                .get(parent)?
                .children
                .iter()
                .find(|(child, _)| *child == surface)
                .map(|(_, offset)| *offset)?;
            return Some(self.surface_origin(parent)? + offset.to_f64());
        }
        if let Some((_, w)) = self.windows.iter().find(|(_, w)| w.surface == surface) {
            return Some(w.loc.to_f64());
        }
        for (_, l) in self.layers.iter() {
            if l.surface == surface {
                return Some(l.loc.to_f64());
            }
            if let Some((_, offset)) = l.popups.iter().find(|(p, _)| *p == surface) {
                return Some((l.loc + *offset).to_f64());
            }
        }
        self.ime_popup
            .filter(|p| p.surface == surface)
            .map(|p| p.loc.to_f64())
    }

    /// Window, layer surface or popup owning a surface tree.
    pub fn owner_of(&self, surface: SurfaceHandle) -> Option<SurfaceOwner> {
        let root = self.root_surface(surface);
        if let Some(window) = self.window_for_surface(root) {
            return Some(SurfaceOwner::Window(window));
        }
        if self.ime_popup.is_some_and(|p| p.surface == root) {
            return Some(SurfaceOwner::ImePopup);
        }
        self.layers
            .iter()
            .find(|(_, l)| l.surface == root || l.popups.iter().any(|(p, _)| *p == root))
            .map(|(h, _)| SurfaceOwner::Layer(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Monitor;

    fn monitor() -> MonitorHandle {
        let mut monitors = Arena::new();
        monitors.insert(Monitor::new("DP-1", (1920, 1080)))
    }

    #[test]
    fn test_input_region_limits_hits() {
        let mut scene = Scene::new();
        let ws = scene.add_workspace("1", None, false);
        let surface = scene.create_surface(1, (100, 100));
        scene.surface_mut(surface).unwrap().input_region =
            Some(vec![Rectangle::new((0, 0).into(), (50, 100).into())]);
        let window = scene.map_window(surface, ws, (10, 10)).unwrap();

        assert!(scene.window_under((20.0, 20.0).into(), &[ws], |_, _| true).is_some());
        assert!(scene.window_under((80.0, 20.0).into(), &[ws], |_, _| true).is_none());
        assert_eq!(
            scene.window_box(window),
            Some(Rectangle::new((10, 10).into(), (100, 100).into()))
        );
    }

    #[test]
    fn test_subsurface_precision() {
        let mut scene = Scene::new();
        let ws = scene.add_workspace("1", None, false);
        let parent = scene.create_surface(1, (200, 200));
        let child = scene.create_surface(1, (50, 50));
        assert!(scene.add_subsurface(parent, child, (100, 100)));
        scene.map_window(parent, ws, (0, 0));

        let (_, hit) = scene
            .window_under((120.0, 130.0).into(), &[ws], |_, _| true)
            .unwrap();
        assert_eq!(hit.surface, child);
        assert_eq!(hit.local, Point::from((20.0, 30.0)));
        assert_eq!(scene.surface_origin(child), Some(Point::from((100.0, 100.0))));

        let (_, hit) = scene
            .window_under((10.0, 10.0).into(), &[ws], |_, _| true)
            .unwrap();
        assert_eq!(hit.surface, parent);
    }

    #[test]
    fn test_subsurface_cycles_rejected() {
        let mut scene = Scene::new();
        let a = scene.create_surface(1, (100, 100));
        let b = scene.create_surface(1, (50, 50));
        let c = scene.create_surface(1, (20, 20));

        assert!(!scene.add_subsurface(a, a, (0, 0)));
        assert!(scene.add_subsurface(a, b, (10, 10)));
        assert!(!scene.add_subsurface(b, a, (0, 0)));
        assert!(scene.add_subsurface(b, c, (5, 5)));
        assert!(!scene.add_subsurface(c, a, (0, 0)));
        // Already parented
        assert!(!scene.add_subsurface(a, c, (0, 0)));

        assert_eq!(scene.root_surface(c), a);
        assert_eq!(scene.surface_origin(c), None);
        assert_eq!(scene.surface(a).unwrap().children.len(), 1);
    }

    #[test]
    fn test_floating_windows_hit_first() {
        let mut scene = Scene::new();
        let ws = scene.add_workspace("1", None, false);
        let floating_surface = scene.create_surface(1, (100, 100));
        let floating = scene.map_window(floating_surface, ws, (0, 0)).unwrap();
        scene.window_mut(floating).unwrap().floating = true;
        let tiled_surface = scene.create_surface(2, (100, 100));
        scene.map_window(tiled_surface, ws, (0, 0)).unwrap();

        let (window, _) = scene
            .window_under((50.0, 50.0).into(), &[ws], |_, _| true)
            .unwrap();
        assert_eq!(window, floating);
    }

    #[test]
    fn test_destroy_surface_removes_owners() {
        let mut scene = Scene::new();
        let mon = monitor();
        let ws = scene.add_workspace("1", Some(mon), false);
        let surface = scene.create_surface(1, (100, 100));
        let window = scene.map_window(surface, ws, (0, 0)).unwrap();
        scene.set_fullscreen(ws, Some((window, FullscreenMode::Exclusive)));
        let layer_surface = scene.create_surface(2, (1920, 30));
        let layer = scene.add_layer(layer_surface, Layer::Top, mon, (0, 0)).unwrap();
        scene.set_layer_exclusive(layer, true);

        scene.destroy_surface(surface);
        scene.destroy_surface(layer_surface);

        assert!(scene.window(window).is_none());
        assert!(scene.workspace(ws).unwrap().fullscreen.is_none());
        assert!(scene.layer(layer).is_none());
        assert_eq!(scene.exclusive_layers().count(), 0);
        assert!(scene.surface_origin(surface).is_none());
    }

    #[test]
    fn test_layer_popups_and_owner() {
        let mut scene = Scene::new();
        let mon = monitor();
        let bar = scene.create_surface(1, (1920, 30));
        let layer = scene.add_layer(bar, Layer::Top, mon, (0, 0)).unwrap();
        let popup = scene.create_surface(1, (200, 300));
        assert!(scene.add_layer_popup(layer, popup, (10, 30)));

        let (owner, hit) = scene.layer_popup_under(mon, (20.0, 40.0).into()).unwrap();
        assert_eq!(owner, layer);
        assert_eq!(hit.surface, popup);
        assert_eq!(hit.local, Point::from((10.0, 10.0)));
        assert_eq!(scene.owner_of(popup), Some(SurfaceOwner::Layer(layer)));
    }

    #[test]
    fn test_raise_window() {
        let mut scene = Scene::new();
        let ws = scene.add_workspace("1", None, false);
        let first_surface = scene.create_surface(1, (100, 100));
        let first = scene.map_window(first_surface, ws, (0, 0)).unwrap();
        let second_surface = scene.create_surface(2, (100, 100));
        let second = scene.map_window(second_surface, ws, (0, 0)).unwrap();

        let top = |scene: &Scene| scene.window_under((50.0, 50.0).into(), &[ws], |_, _| true);
        assert_eq!(top(&scene).map(|(w, _)| w), Some(second));
        scene.raise_window(first);
        assert_eq!(top(&scene).map(|(w, _)| w), Some(first));
    }

    #[test]
    fn test_ime_popup_hit_and_destroy() {
        let mut scene = Scene::new();
        let surface = scene.create_surface(1, (200, 40));
        scene.set_ime_popup(Some(ImePopup {
            surface,
            loc: (300, 500).into(),
        }));

        let hit = scene.ime_popup_under((310.0, 520.0).into()).unwrap();
        assert_eq!(hit.surface, surface);
        assert_eq!(hit.local, Point::from((10.0, 20.0)));
        assert!(scene.ime_popup_under((290.0, 520.0).into()).is_none());

        scene.destroy_surface(surface);
        assert!(scene.ime_popup().is_none());
    }
}
