//! Pointer constraints
//!
//! A client may lock the pointer in place or confine it to a region of one of its
//! surfaces. A constraint only takes effect while its surface has pointer focus.
//! Locked pointers still deliver relative motion.

use smithay::utils::{Logical, Point, Rectangle};
use tracing::debug;

use crate::monitor::closest_point_in;
use crate::scene::{Scene, SurfaceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Lock,
    Confine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerConstraint {
    pub surface: SurfaceHandle,
    pub kind: ConstraintKind,
    /// Surface-local region. `None` covers the whole surface.
    pub region: Option<Vec<Rectangle<i32, Logical>>>,
    /// Surface-local position the client wants the cursor at once a lock ends.
    pub cursor_hint: Option<Point<f64, Logical>>,
    active: bool,
}

impl PointerConstraint {
    pub fn new(surface: SurfaceHandle, kind: ConstraintKind) -> Self {
        Self {
            surface,
            kind,
            region: None,
            cursor_hint: None,
            active: false,
        }
    }

    pub fn with_region(mut self, region: Vec<Rectangle<i32, Logical>>) -> Self {
        self.region = Some(region);
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Global position a lock asks the pointer to end up at once it is released.
    pub fn unlock_hint(&self, scene: &Scene) -> Option<Point<f64, Logical>> {
        if self.kind != ConstraintKind::Lock {
            return None;
        }
        Some(scene.surface_origin(self.surface)? + self.cursor_hint?)
    }

    /// Region in global coordinates.
    fn global_region(&self, scene: &Scene) -> Option<Vec<Rectangle<f64, Logical>>> {
        let origin = scene.surface_origin(self.surface)?;
        let size = scene.surface(self.surface)?.size;
        let bounds = Rectangle::from_size(size);
        let rects = match &self.region {
            Some(region) => region
                .iter()
                .filter_map(|rect| rect.intersection(bounds))
                .collect(),
            None => vec![bounds],
        };
        Some(
            rects
                .into_iter()
                .filter(|rect| !rect.is_empty())
                .map(|rect| {
                    let rect = rect.to_f64();
                    Rectangle::new(rect.loc + origin, rect.size)
                })
                .collect(),
        )
    }

    /// Where the pointer ends up when it tries to move from `current` to `target`.
    pub fn constrain(
        &self,
        scene: &Scene,
        current: Point<f64, Logical>,
        target: Point<f64, Logical>,
    ) -> Point<f64, Logical> {
        match self.kind {
            ConstraintKind::Lock => current,
            ConstraintKind::Confine => {
                let Some(region) = self.global_region(scene) else {
                    return target;
                };
                if region.is_empty() || region.iter().any(|rect| rect.contains(target)) {
                    return target;
                }
                region
                    .iter()
                    .map(|rect| closest_point_in(*rect, target))
                    .min_by(|a, b| {
                        let da = (a.x - target.x).powi(2) + (a.y - target.y).powi(2);
                        let db = (b.x - target.x).powi(2) + (b.y - target.y).powi(2);
                        da.total_cmp(&db)
                    })
                    .unwrap_or(current)
            }
        }
    }
}

/// All constraints requested by clients, at most one per surface.
#[derive(Debug, Default)]
pub struct Constraints {
    constraints: Vec<PointerConstraint>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constraint. Fails if the surface already has one.
    pub fn add(&mut self, constraint: PointerConstraint) -> bool {
        if self.constraints.iter().any(|c| c.surface == constraint.surface) {
            return false;
        }
        self.constraints.push(constraint);
        true
    }

    /// Remove a surface's constraint, returning it.
    pub fn remove(&mut self, surface: SurfaceHandle) -> Option<PointerConstraint> {
        let index = self.constraints.iter().position(|c| c.surface == surface)?;
        Some(self.constraints.remove(index))
    }

    pub fn get(&self, surface: SurfaceHandle) -> Option<&PointerConstraint> {
        self.constraints.iter().find(|c| c.surface == surface)
    }

    pub fn get_mut(&mut self, surface: SurfaceHandle) -> Option<&mut PointerConstraint> {
        self.constraints.iter_mut().find(|c| c.surface == surface)
    }

    /// The constraint currently in effect.
    pub fn active(&self) -> Option<&PointerConstraint> {
        self.constraints.iter().find(|c| c.active)
    }

    /// Activate the constraint of the focused surface and deactivate all others.
    ///
    /// Returns the global cursor hint of a lock that was just released, if any.
    pub fn update_focus(
        &mut self,
        scene: &Scene,
        focus: Option<SurfaceHandle>,
    ) -> Option<Point<f64, Logical>> {
        let mut hint = None;
        for constraint in &mut self.constraints {
            let active = Some(constraint.surface) == focus;
            if active == constraint.active {
                continue;
            }
            constraint.active = active;
            debug!(surface = ?constraint.surface, kind = ?constraint.kind, active, "pointer constraint changed");
            if !active {
                hint = constraint.unlock_hint(scene).or(hint);
            }
        }
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_with_window() -> (Scene, SurfaceHandle) {
        let mut scene = Scene::new();
        let ws = scene.add_workspace("1", None, false);
        let surface = scene.create_surface(1, (200, 100));
        scene.map_window(surface, ws, (100, 100));
        (scene, surface)
    }

    #[test]
    fn test_lock_keeps_position() {
        let (scene, surface) = scene_with_window();
        let lock = PointerConstraint::new(surface, ConstraintKind::Lock);
        let current = Point::from((150.0, 150.0));
        assert_eq!(lock.constrain(&scene, current, (400.0, 400.0).into()), current);
    }

    #[test]
    fn test_confine_clamps_to_region() {
        let (scene, surface) = scene_with_window();
        let confine = PointerConstraint::new(surface, ConstraintKind::Confine)
            .with_region(vec![Rectangle::new((0, 0).into(), (50, 50).into())]);

        let inside = Point::from((120.0, 120.0));
        assert_eq!(confine.constrain(&scene, inside, inside), inside);

        let clamped = confine.constrain(&scene, inside, (400.0, 120.0).into());
        assert!(clamped.x < 150.0 && clamped.x > 149.9);
        assert_eq!(clamped.y, 120.0);
    }

    #[test]
    fn test_activation_follows_focus() {
        let (scene, surface) = scene_with_window();
        let mut constraints = Constraints::new();
        let mut lock = PointerConstraint::new(surface, ConstraintKind::Lock);
        lock.cursor_hint = Some((10.0, 20.0).into());
        assert!(constraints.add(lock.clone()));
        assert!(!constraints.add(lock));

        assert_eq!(constraints.update_focus(&scene, Some(surface)), None);
        assert!(constraints.active().is_some());

        let hint = constraints.update_focus(&scene, None);
        assert_eq!(hint, Some(Point::from((110.0, 120.0))));
        assert!(constraints.active().is_none());
    }
}
