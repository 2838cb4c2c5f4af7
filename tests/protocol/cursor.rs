//! Cursor image tests
//!
//! Tests for `wl_pointer.set_cursor` validation, client cursor surfaces, cursor
//! shapes and compositor-chosen icons.

use cursor_icon::CursorIcon;
use pointer_core::cursor::CursorImage;
use pointer_core::seat::{SeatError, WireEvent};
use pointer_core::testing::Fixture;
use pointer_core::{FocusEvent, MonitorHandle};
use smithay::utils::Serial;

/// A monitor with one client window under the pointer.
///
/// Returns the fixture, the monitor, the client and the serial of its pointer enter.
fn focused_client() -> (Fixture, MonitorHandle, u32, Serial) {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let client = fixture.add_client();
    fixture
        .map_window(client, monitor, (100, 100), (800, 600))
        .unwrap();
    fixture.take_wire_events();

    fixture.move_to(300.0, 300.0);
    let serial = fixture
        .take_wire_events()
        .into_iter()
        .find_map(|event| match event {
            WireEvent::PointerEnter { serial, .. } => Some(serial),
            _ => None,
        })
        .unwrap_or_else(|| panic!("client {client} got no pointer enter"));
    (fixture, monitor, client, serial)
}

#[test]
fn test_set_cursor_from_focused_client() {
    let (mut fixture, monitor, client, serial) = focused_client();
    let cursor = fixture.cursor_surface(client, (24, 24));

    fixture
        .state_mut()
        .handle_set_cursor_request(client, serial, Some(cursor), (4, 4).into())
        .unwrap();

    assert_eq!(fixture.state().pointer.image().surface(), Some(cursor));
    assert_eq!(fixture.state().input.cursor_icon(), None);
    // The cursor surface learns which output it is shown on
    assert!(fixture.take_wire_events().contains(&WireEvent::SurfaceEnter {
        client,
        surface: cursor,
        monitor,
    }));
}

#[test]
fn test_set_cursor_from_unfocused_client_is_rejected() {
    let (mut fixture, _, _, serial) = focused_client();
    let other = fixture.add_client();
    let cursor = fixture.cursor_surface(other, (24, 24));

    let result = fixture
        .state_mut()
        .handle_set_cursor_request(other, serial, Some(cursor), (0, 0).into());
    assert_eq!(result, Err(SeatError::NotFocused { client: other }));
    assert_eq!(fixture.state().pointer.image().surface(), None);
}

#[test]
fn test_set_cursor_with_unknown_serial_is_rejected() {
    let (mut fixture, _, client, _) = focused_client();
    let cursor = fixture.cursor_surface(client, (24, 24));

    let result = fixture.state_mut().handle_set_cursor_request(
        client,
        Serial::from(9999),
        Some(cursor),
        (0, 0).into(),
    );
    assert_eq!(
        result,
        Err(SeatError::StaleSerial {
            client,
            serial: 9999
        })
    );
}

#[test]
fn test_set_cursor_with_foreign_surface_is_rejected() {
    let (mut fixture, _, client, serial) = focused_client();
    let other = fixture.add_client();
    let cursor = fixture.cursor_surface(other, (24, 24));

    let result = fixture
        .state_mut()
        .handle_set_cursor_request(client, serial, Some(cursor), (0, 0).into());
    assert_eq!(result, Err(SeatError::DeadSurface));
}

#[test]
fn test_null_cursor_hides_the_image() {
    let (mut fixture, _, client, serial) = focused_client();

    fixture
        .state_mut()
        .handle_set_cursor_request(client, serial, None, (0, 0).into())
        .unwrap();
    assert_eq!(*fixture.state().pointer.image(), CursorImage::None);
}

#[test]
fn test_destroyed_cursor_surface_falls_back_to_default() {
    let (mut fixture, _, client, serial) = focused_client();
    let cursor = fixture.cursor_surface(client, (24, 24));
    fixture
        .state_mut()
        .handle_set_cursor_request(client, serial, Some(cursor), (0, 0).into())
        .unwrap();

    fixture.destroy_surface(cursor);
    assert_eq!(fixture.state().pointer.image().surface(), None);
    assert!(matches!(
        fixture.state().pointer.image(),
        CursorImage::Bitmap(_)
    ));
    assert_eq!(fixture.state().input.cursor_icon(), Some(CursorIcon::Default));
}

#[test]
fn test_cursor_shape_request_sets_icon() {
    let (mut fixture, _, client, serial) = focused_client();
    let events = fixture.record_focus();

    fixture
        .state_mut()
        .handle_set_cursor_shape(client, serial, CursorIcon::Text)
        .unwrap();

    assert_eq!(fixture.state().input.cursor_icon(), Some(CursorIcon::Text));
    assert!(matches!(
        fixture.state().pointer.image(),
        CursorImage::Bitmap(_)
    ));
    assert_eq!(
        events.take(),
        vec![FocusEvent::CursorIconChanged(CursorIcon::Text)]
    );
}

#[test]
fn test_kill_mode_overrides_client_cursor() {
    let (mut fixture, _, client, serial) = focused_client();
    let cursor = fixture.cursor_surface(client, (24, 24));
    fixture
        .state_mut()
        .handle_set_cursor_request(client, serial, Some(cursor), (0, 0).into())
        .unwrap();

    fixture.state_mut().set_kill_mode(true);
    assert_eq!(
        fixture.state().input.cursor_icon(),
        Some(CursorIcon::Crosshair)
    );

    // The client's cursor comes back once kill mode ends
    fixture.state_mut().set_kill_mode(false);
    assert_eq!(fixture.state().pointer.image().surface(), Some(cursor));
}

#[test]
fn test_leaving_all_surfaces_shows_default_icon() {
    let (mut fixture, _, client, serial) = focused_client();
    let cursor = fixture.cursor_surface(client, (24, 24));
    fixture
        .state_mut()
        .handle_set_cursor_request(client, serial, Some(cursor), (0, 0).into())
        .unwrap();

    fixture.move_to(1500.0, 900.0);
    assert_eq!(fixture.pointer_focus(), None);
    assert_eq!(fixture.state().input.cursor_icon(), Some(CursorIcon::Default));
}
