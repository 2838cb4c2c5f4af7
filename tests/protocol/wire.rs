//! Wire event tests
//!
//! Tests for the exact event sequences clients receive: enter and leave ordering,
//! frame batching, synthesized releases and drag-and-drop routing.

use insta::assert_snapshot;
use pointer_core::event::ButtonState;
use pointer_core::scene::SurfaceHandle;
use pointer_core::seat::WireEvent;
use pointer_core::testing::Fixture;
use smithay::utils::Point;

const BTN_LEFT: u32 = 0x110;

/// Two clients with side-by-side windows, pointer resting on the first.
fn two_windows() -> (Fixture, SurfaceHandle, SurfaceHandle) {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let first = fixture.add_client();
    let second = fixture.add_client();
    let (_, a) = fixture.map_window(first, monitor, (0, 0), (800, 600)).unwrap();
    let (_, b) = fixture
        .map_window(second, monitor, (1000, 0), (800, 600))
        .unwrap();
    fixture.move_to(100.0, 100.0);
    fixture.take_wire_events();
    (fixture, a, b)
}

#[test]
fn test_click_sequence_snapshot() {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let client = fixture.add_client();
    fixture
        .map_window(client, monitor, (100, 100), (400, 300))
        .unwrap();
    fixture.take_wire_events();

    fixture.move_to(200.0, 200.0);
    fixture.motion(10.0, 0.0);
    fixture.click(BTN_LEFT);

    assert_snapshot!(fixture.wire_trace(), @r"
    wl_pointer@1.enter #0v0 serial=1 (100.0, 100.0)
    wl_pointer@1.frame
    wl_keyboard[1].enter #0v0 serial=2
    relative_pointer[1].motion t=1016 (10.0, 0.0) unaccel=(10.0, 0.0)
    wl_pointer@1.motion t=1016 (110.0, 100.0)
    wl_pointer@1.frame
    wl_pointer@1.button serial=3 t=1024 0x110 Pressed
    wl_pointer@1.frame
    wl_pointer@1.button serial=4 t=1032 0x110 Released
    wl_pointer@1.frame
    ");
}

/// The old surface is left before the new one is entered, and both get one frame
#[test]
fn test_crossing_windows_leaves_before_entering() {
    let (mut fixture, a, b) = two_windows();

    fixture.move_to(1100.0, 100.0);
    let events = fixture.take_wire_events();
    match events.as_slice() {
        [
            WireEvent::RelativeMotion { client: 1, .. },
            WireEvent::PointerLeave { resource: 1, surface: left, .. },
            WireEvent::PointerEnter { resource: 2, surface: entered, local, .. },
            WireEvent::PointerFrame { resource: 1 },
            WireEvent::PointerFrame { resource: 2 },
            WireEvent::KeyboardLeave { client: 1, .. },
            WireEvent::KeyboardEnter { client: 2, .. },
        ] => {
            assert_eq!(*left, a);
            assert_eq!(*entered, b);
            assert_eq!(*local, Point::from((100.0, 100.0)));
        }
        other => panic!("unexpected events: {other:#?}"),
    }
}

/// Motion within the focused surface is one motion and one frame
#[test]
fn test_motion_within_surface_is_framed_once() {
    let (mut fixture, _, _) = two_windows();

    fixture.motion(3.0, 4.0);
    let trace = fixture.wire_trace();
    let lines: Vec<_> = trace.lines().collect();
    assert_eq!(lines.len(), 3, "{trace}");
    assert!(lines[0].starts_with("relative_pointer[1].motion"));
    assert!(lines[1].starts_with("wl_pointer@1.motion"));
    assert_eq!(lines[2], "wl_pointer@1.frame");
}

#[test]
fn test_scroll_is_framed() {
    let (mut fixture, _, _) = two_windows();

    fixture.scroll(1.0);
    let events = fixture.take_wire_events();
    assert!(matches!(
        events.as_slice(),
        [
            WireEvent::PointerAxis {
                resource: 1,
                discrete: 1,
                ..
            },
            WireEvent::PointerFrame { resource: 1 }
        ]
    ));
}

/// Input over empty space reaches nobody
#[test]
fn test_nothing_is_sent_without_focus() {
    let (mut fixture, _, _) = two_windows();

    fixture.move_to(900.0, 800.0);
    fixture.take_wire_events();
    fixture.motion(1.0, 1.0);
    fixture.click(BTN_LEFT);
    fixture.scroll(-1.0);
    assert!(fixture.take_wire_events().is_empty());
}

/// A surface losing focus while a button is down sees the release first
#[test]
fn test_held_buttons_released_before_leave() {
    let (mut fixture, a, b) = two_windows();
    fixture.button(BTN_LEFT, true);
    fixture.take_wire_events();

    fixture.state_mut().set_focus_grab(vec![b]);
    let events = fixture.take_wire_events();
    assert!(matches!(
        events.as_slice(),
        [
            WireEvent::PointerButton {
                resource: 1,
                button: BTN_LEFT,
                state: ButtonState::Released,
                ..
            },
            WireEvent::PointerLeave { resource: 1, .. },
            WireEvent::PointerEnter { resource: 2, .. },
            WireEvent::PointerFrame { resource: 1 },
            WireEvent::PointerFrame { resource: 2 },
        ]
    ));
    assert_eq!(fixture.pointer_focus(), Some(b));

    // The client never saw the press, so the physical release is not forwarded
    fixture.button(BTN_LEFT, false);
    assert!(!fixture
        .take_wire_events()
        .iter()
        .any(|e| matches!(e, WireEvent::PointerButton { .. })));
    assert_ne!(fixture.pointer_focus(), Some(a));
}

/// A pointer bound while the client has focus is entered right away
#[test]
fn test_new_pointer_resource_is_entered() {
    let (mut fixture, a, _) = two_windows();

    let resource = fixture.state_mut().seat.bind_pointer(1);
    let events = fixture.take_wire_events();
    assert!(matches!(
        events.as_slice(),
        [
            WireEvent::PointerEnter { resource: r, surface, .. },
            WireEvent::PointerFrame { resource: f },
        ] if *r == resource && *f == resource && *surface == a
    ));

    // Both resources of the client now get motion
    fixture.motion(1.0, 0.0);
    let motions = fixture
        .take_wire_events()
        .into_iter()
        .filter(|e| matches!(e, WireEvent::PointerMotion { .. }))
        .count();
    assert_eq!(motions, 2);
}

/// During a drag focus goes to data devices and follows the pointer across clients
#[test]
fn test_drag_moves_between_clients_and_drops() {
    let (mut fixture, a, b) = two_windows();
    fixture.button(BTN_LEFT, true);
    fixture.take_wire_events();

    fixture.state_mut().start_drag();
    assert!(matches!(
        fixture.take_wire_events().as_slice(),
        [WireEvent::DndEnter { client: 1, surface, .. }] if *surface == a
    ));

    fixture.move_to(1100.0, 100.0);
    let events = fixture.take_wire_events();
    match events.as_slice() {
        [
            WireEvent::DndLeave { client: 1 },
            WireEvent::DndEnter { client: 2, surface, local, .. },
            WireEvent::DndMotion { client: 2, .. },
        ] => {
            assert_eq!(*surface, b);
            assert_eq!(*local, Point::from((100.0, 100.0)));
        }
        other => panic!("unexpected events: {other:#?}"),
    }

    fixture.button(BTN_LEFT, false);
    let events = fixture.take_wire_events();
    assert!(matches!(
        &events[..2],
        [WireEvent::DndDrop { client: 2 }, WireEvent::DndLeave { client: 2 }]
    ));
    assert!(!fixture.state().seat.is_dragging());
    assert_eq!(fixture.pointer_focus(), Some(b));
}
