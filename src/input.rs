//! Device input dispatch
//!
//! Routes [`InputEvent`]s from the device layer through the pointer engine (position,
//! cursor visibility) and focus resolution (pointer focus, keyboard focus, cursor
//! icons), and forwards the results to the seat.

use std::time::Duration;

use cursor_icon::CursorIcon;
use smithay::utils::{Logical, Point};
use tracing::{debug, trace};

use crate::config::FollowMouse;
use crate::device::DeviceClass;
use crate::event::{Axis, AxisSource, ButtonState, DeviceId, FocusEvent, InputEvent, Normalized};
use crate::focus::{border_icon_at, FocusCandidate};
use crate::pointer::PointerContext;
use crate::scene::{SurfaceHandle, SurfaceOwner};
use crate::seat::ProtocolSink;
use crate::{tracy_span, State};

/// Button a tablet tool tip acts as (`BTN_LEFT`).
const BTN_LEFT: u32 = 0x110;

impl State {
    /// Handle one event from the device layer.
    pub fn process_input_event(&mut self, event: InputEvent) {
        tracy_span!("State::process_input_event");

        self.advance_clock(Duration::from_millis(u64::from(event.time_msec())));
        let class = self.devices.class_of(event.device());
        self.devices.note_input(class);
        if class != DeviceClass::Touch && self.pointer.is_hidden() {
            let (pointer, mut ctx) = self.pointer_parts();
            pointer.set_hidden(&mut ctx, false);
        }

        match event {
            InputEvent::PointerMotion {
                time_msec,
                delta,
                delta_unaccel,
                ..
            } => self.on_pointer_motion(time_msec, delta, delta_unaccel),
            InputEvent::PointerMotionAbsolute {
                device,
                time_msec,
                position,
            } => self.on_absolute_motion(device, time_msec, position),
            InputEvent::PointerButton {
                time_msec,
                button,
                state,
                ..
            } => self.on_pointer_button(time_msec, button, state),
            InputEvent::PointerAxis {
                time_msec,
                axis,
                value,
                discrete,
                source,
                ..
            } => self.on_pointer_axis(time_msec, axis, value, discrete, source),
            InputEvent::TabletToolAxis {
                device,
                time_msec,
                position,
            } => self.on_absolute_motion(device, time_msec, position),
            InputEvent::TabletToolTip { time_msec, state, .. } => {
                self.on_pointer_button(time_msec, BTN_LEFT, state)
            }
            InputEvent::TouchDown {
                device,
                time_msec,
                position,
                ..
            }
            | InputEvent::TouchMotion {
                device,
                time_msec,
                position,
                ..
            } => {
                if self.config.cursor.hide_on_touch && !self.pointer.is_hidden() {
                    let (pointer, mut ctx) = self.pointer_parts();
                    pointer.set_hidden(&mut ctx, true);
                }
                self.on_absolute_motion(device, time_msec, position);
            }
            InputEvent::TouchUp { slot, .. } => trace!(slot, "touch up"),
        }
    }

    fn on_pointer_motion(
        &mut self,
        time_msec: u32,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
    ) {
        self.pointer.accumulate_relative(delta, delta_unaccel);

        let current = self.pointer.position();
        let mut target = current + delta;
        if let Some(constraint) = self.constraints.active() {
            target = constraint.constrain(&self.scene, current, target);
        }
        if target != current {
            let (pointer, mut ctx) = self.pointer_parts();
            pointer.warp_to(&mut ctx, target);
        }

        let (delta, delta_unaccel) = self.pointer.take_relative();
        self.seat
            .send_relative_motion(time_msec, delta, delta_unaccel);

        if !self.pointer_focus_update(time_msec, false) {
            // Relative motion alone still ends a batch
            self.seat.send_pointer_frame();
        }
    }

    fn on_absolute_motion(&mut self, device: DeviceId, time_msec: u32, position: Normalized) {
        {
            let State {
                config,
                monitors,
                scene,
                pointer,
                seat,
                damage,
                renderer,
                devices,
                now,
                ..
            } = self;
            let mut ctx = PointerContext {
                config,
                monitors,
                scene,
                seat,
                damage,
                renderer: &mut **renderer,
                now: *now,
            };
            pointer.warp_absolute(&mut ctx, devices, device, position);
        }
        self.pointer_focus_update(time_msec, false);
    }

    fn on_pointer_button(&mut self, time_msec: u32, button: u32, state: ButtonState) {
        match state {
            ButtonState::Pressed => {
                if let Some(monitor) = self.pointer.layout().monitor_at(self.pointer.position()) {
                    self.input.set_active_monitor(monitor);
                }
                self.focus_on_click();
                self.input.button_pressed(button);
            }
            ButtonState::Released => {
                self.input.button_released(button);
                if self.seat.is_dragging() && !self.input.is_button_held() {
                    self.seat.end_drag(true);
                }
            }
        }

        if let Some(serial) = self.seat.send_pointer_button(time_msec, button, state) {
            trace!(button, ?state, serial = u32::from(serial), "button sent");
        }
        self.seat.send_pointer_frame();

        if state == ButtonState::Released && !self.input.is_button_held() {
            // Focus was pinned while the button was down
            self.pointer_focus_update(time_msec, false);
        }
    }

    fn on_pointer_axis(
        &mut self,
        time_msec: u32,
        axis: Axis,
        value: f64,
        discrete: i32,
        source: AxisSource,
    ) {
        self.seat
            .send_pointer_axis(time_msec, axis, value, discrete, source);
        self.seat.send_pointer_frame();
    }

    /// Move keyboard focus to what was clicked, per `input.follow_mouse`.
    fn focus_on_click(&mut self) {
        if !self.config.input.follow_mouse.click_focuses() {
            return;
        }
        let Some(candidate) = self.input.last_candidate() else {
            return;
        };
        let target = match candidate.owner {
            Some(SurfaceOwner::Window(window)) => self.scene.window(window).map(|w| w.surface),
            Some(SurfaceOwner::Layer(layer)) => self.scene.layer(layer).map(|l| l.surface),
            _ => None,
        };
        if target.is_some() {
            self.set_keyboard_focus(target);
        }
    }

    fn set_keyboard_focus(&mut self, surface: Option<SurfaceHandle>) {
        let before = self.seat.keyboard_focus();
        self.seat.set_keyboard_focus(&self.scene, surface);
        let after = self.seat.keyboard_focus();
        if before != after {
            debug!(?after, "keyboard focus changed");
            self.input.emit(FocusEvent::KeyboardFocusChanged(after));
        }
    }

    /// Re-resolve pointer focus at the current position, e.g. after the scene changed
    /// under a still pointer.
    pub fn refocus_pointer(&mut self, force: bool) {
        let time_msec = self.now.as_millis() as u32;
        if force {
            self.input.request_refocus();
        }
        self.pointer_focus_update(time_msec, force);
    }

    /// Resolve focus at the pointer position and tell the seat.
    ///
    /// Returns whether a pointer frame was sent.
    fn pointer_focus_update(&mut self, time_msec: u32, force: bool) -> bool {
        tracy_span!("State::pointer_focus_update");

        let pos = self.pointer.position();
        let monitor_handle = self.pointer.layout().monitor_at(pos);
        if self.config.misc.mouse_move_focuses_monitor {
            if let Some(monitor) = monitor_handle {
                self.input.set_active_monitor(monitor);
            }
        }

        // Drags hit-test through held buttons
        let refocus = self.input.take_refocus() || force || self.seat.is_dragging();
        let monitor = monitor_handle.and_then(|h| self.monitors.get(h).map(|m| (h, m)));
        let candidate = self.input.resolve(&self.scene, monitor, pos, refocus);

        if self.seat.is_dragging() {
            let local = candidate.map(|c| c.local).unwrap_or_default();
            self.seat
                .set_pointer_focus(&self.scene, candidate.map(|c| c.surface), local);
            self.seat.send_pointer_motion(time_msec, local);
            self.input.set_last_candidate(candidate);
            return false;
        }

        let previous = self.input.last_candidate();
        let old_focus = self.seat.pointer_focus();
        let new_focus = candidate.map(|c| c.surface);
        let framed = if old_focus != new_focus {
            let local = candidate.map(|c| c.local).unwrap_or_default();
            self.seat.set_pointer_focus(&self.scene, new_focus, local);
            debug!(from = ?old_focus, to = ?new_focus, "pointer focus changed");
            self.input.emit(FocusEvent::PointerFocusChanged(new_focus));
            self.pointer_client_changed(old_focus, new_focus);
            true
        } else if let Some(c) = candidate.filter(|c| {
            force || previous.map_or(true, |p| p.surface != c.surface || p.local != c.local)
        }) {
            self.seat.send_pointer_motion(time_msec, c.local);
            self.seat.send_pointer_frame();
            true
        } else {
            false
        };
        self.input.set_last_candidate(candidate);

        if let Some(hint) = self
            .constraints
            .update_focus(&self.scene, self.seat.pointer_focus())
        {
            if !self.config.cursor.no_warps {
                let (pointer, mut ctx) = self.pointer_parts();
                pointer.warp_to(&mut ctx, hint);
            }
        }

        if !self.input.is_button_held() {
            self.follow_mouse(candidate);
        }
        self.update_border_icon(candidate);
        if old_focus != new_focus {
            self.refresh_cursor_icon(new_focus.is_some());
        }
        framed
    }

    /// Motion-driven keyboard focus.
    fn follow_mouse(&mut self, candidate: Option<FocusCandidate>) {
        if self.config.input.follow_mouse != FollowMouse::Always {
            return;
        }
        let Some(window) = candidate.and_then(|c| c.window()) else {
            return;
        };
        let crossed = self.input.last_motion_window() != Some(window);
        self.input.set_last_motion_window(Some(window));
        if !crossed && !self.config.input.mouse_refocus {
            return;
        }
        let surface = self.scene.window(window).map(|w| w.surface);
        if surface.is_some() && surface != self.seat.keyboard_focus() {
            self.set_keyboard_focus(surface);
        }
    }

    /// Resize icons near window borders, when `general.resize_on_border` is set.
    fn update_border_icon(&mut self, candidate: Option<FocusCandidate>) {
        let icon = if self.config.general.resize_on_border && !self.input.is_button_held() {
            self.border_icon_under_pointer(candidate)
        } else {
            None
        };
        if self.input.set_border_icon(icon) {
            self.refresh_cursor_icon(self.seat.pointer_focus().is_some());
        }
    }

    fn border_icon_under_pointer(
        &self,
        candidate: Option<FocusCandidate>,
    ) -> Option<CursorIcon> {
        // Over a window's own surface there is no border to grab
        if candidate.is_some_and(|c| c.window().is_some()) {
            return None;
        }
        let pos = self.pointer.position();
        let monitor = self
            .pointer
            .layout()
            .monitor_at(pos)
            .and_then(|h| self.monitors.get(h))?;
        let workspaces: Vec<_> = monitor
            .special_workspace
            .into_iter()
            .chain(monitor.active_workspace)
            .collect();
        let grab_area = self.config.general.extend_border_grab_area as f64;
        let corner = self.config.general.resize_corner_radius as f64;

        for (handle, window) in self.scene.windows_on(&workspaces) {
            let Some(window_box) = self.scene.window_box(handle) else {
                continue;
            };
            let window_box = window_box.to_f64();
            let claimed = window.decorations.iter().any(|rect| {
                let rect = rect.to_f64();
                rect.contains(pos - window.loc.to_f64())
            });
            if claimed {
                return None;
            }
            if let Some(icon) = border_icon_at(window_box, pos, grab_area, corner) {
                return Some(icon);
            }
        }
        None
    }

    /// A different client got pointer focus: its predecessor's cursor is stale.
    fn pointer_client_changed(
        &mut self,
        old: Option<SurfaceHandle>,
        new: Option<SurfaceHandle>,
    ) {
        let old_client = old.and_then(|s| self.scene.client_of(s));
        let new_client = new.and_then(|s| self.scene.client_of(s));
        if old_client != new_client && self.client_cursor.is_some() {
            trace!(?old_client, ?new_client, "dropping the previous client's cursor");
            self.client_cursor = None;
        }
    }
}
