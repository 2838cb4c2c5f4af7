//! Focus resolution tests
//!
//! Tests for layer and window ordering, held-button pinning, focus grabs and
//! keyboard focus following the pointer.

use pointer_core::config::{Config, FollowMouse};
use pointer_core::scene::{FullscreenMode, Layer};
use pointer_core::testing::Fixture;
use pointer_core::FocusEvent;

const BTN_LEFT: u32 = 0x110;

/// An exclusive layer surface takes input even over an exclusive fullscreen window
#[test]
fn test_exclusive_layer_beats_fullscreen_window() {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let app = fixture.add_client();
    let shell = fixture.add_client();

    let (window, window_surface) = fixture
        .map_window(app, monitor, (0, 0), (1920, 1080))
        .unwrap();
    let workspace = fixture.workspace(monitor).unwrap();
    fixture
        .state_mut()
        .scene
        .set_fullscreen(workspace, Some((window, FullscreenMode::Exclusive)));
    fixture.warp(500.0, 500.0);
    assert_eq!(fixture.pointer_focus(), Some(window_surface));

    let (layer, layer_surface) = fixture
        .add_layer(shell, monitor, Layer::Top, (0, 0), (1920, 40))
        .unwrap();
    fixture.state_mut().scene.set_layer_exclusive(layer, true);
    fixture.state_mut().refocus_pointer(false);

    // Outside the layer's own area it still owns the pointer
    assert_eq!(fixture.pointer_focus(), Some(layer_surface));

    fixture.click(BTN_LEFT);
    assert_eq!(fixture.keyboard_focus(), Some(layer_surface));
}

/// Top layers sit above windows, windows above bottom layers
#[test]
fn test_layer_and_window_order() {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let app = fixture.add_client();
    let shell = fixture.add_client();

    let (_, bottom) = fixture
        .add_layer(shell, monitor, Layer::Bottom, (0, 0), (1920, 1080))
        .unwrap();
    let (_, window) = fixture.map_window(app, monitor, (0, 0), (800, 600)).unwrap();
    let (_, bar) = fixture
        .add_layer(shell, monitor, Layer::Top, (0, 0), (1920, 30))
        .unwrap();

    fixture.warp(100.0, 10.0);
    assert_eq!(fixture.pointer_focus(), Some(bar));

    fixture.warp(100.0, 300.0);
    assert_eq!(fixture.pointer_focus(), Some(window));

    fixture.warp(1000.0, 300.0);
    assert_eq!(fixture.pointer_focus(), Some(bottom));
}

/// While a button is held focus stays on the pressed surface
#[test]
fn test_held_button_pins_focus_until_release() {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let first = fixture.add_client();
    let second = fixture.add_client();
    let (_, a) = fixture.map_window(first, monitor, (0, 0), (800, 600)).unwrap();
    let (_, b) = fixture
        .map_window(second, monitor, (1000, 0), (800, 600))
        .unwrap();

    fixture.move_to(100.0, 100.0);
    assert_eq!(fixture.pointer_focus(), Some(a));

    fixture.button(BTN_LEFT, true);
    fixture.move_to(1100.0, 100.0);
    assert_eq!(fixture.pointer_focus(), Some(a));
    let pinned = fixture.state().input.last_candidate().unwrap();
    assert_eq!(pinned.surface, a);
    assert_eq!(pinned.local, (1100.0, 100.0).into());

    fixture.button(BTN_LEFT, false);
    assert_eq!(fixture.pointer_focus(), Some(b));
}

/// A focus grab keeps pointer focus on its surfaces
#[test]
fn test_focus_grab_restricts_pointer_focus() {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let first = fixture.add_client();
    let second = fixture.add_client();
    let (_, a) = fixture.map_window(first, monitor, (0, 0), (800, 600)).unwrap();
    let (_, b) = fixture
        .map_window(second, monitor, (1000, 0), (800, 600))
        .unwrap();

    fixture.state_mut().set_focus_grab(vec![a]);
    fixture.move_to(1100.0, 100.0);
    assert_eq!(fixture.pointer_focus(), Some(a));

    fixture.state_mut().clear_focus_grab();
    assert_eq!(fixture.pointer_focus(), Some(b));
}

/// With the default policy keyboard focus follows the pointer between windows
#[test]
fn test_keyboard_follows_mouse() {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let first = fixture.add_client();
    let second = fixture.add_client();
    let (_, a) = fixture.map_window(first, monitor, (0, 0), (800, 600)).unwrap();
    let (_, b) = fixture
        .map_window(second, monitor, (1000, 0), (800, 600))
        .unwrap();
    let events = fixture.record_focus();

    fixture.move_to(1100.0, 100.0);
    assert_eq!(fixture.keyboard_focus(), Some(b));
    fixture.move_to(100.0, 100.0);
    assert_eq!(fixture.keyboard_focus(), Some(a));

    let keyboard: Vec<_> = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, FocusEvent::KeyboardFocusChanged(_)))
        .collect();
    assert_eq!(
        keyboard,
        vec![
            FocusEvent::KeyboardFocusChanged(Some(b)),
            FocusEvent::KeyboardFocusChanged(Some(a))
        ]
    );
}

/// With `follow_mouse` off only clicks move keyboard focus
#[test]
fn test_follow_mouse_off_focuses_on_click() {
    let mut config = Config::default();
    config.input.follow_mouse = FollowMouse::Off;
    let mut fixture = Fixture::with_config(config);
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let client = fixture.add_client();
    let (_, window) = fixture
        .map_window(client, monitor, (100, 100), (800, 600))
        .unwrap();

    fixture.move_to(200.0, 200.0);
    assert_eq!(fixture.pointer_focus(), Some(window));
    assert_eq!(fixture.keyboard_focus(), None);

    fixture.click(BTN_LEFT);
    assert_eq!(fixture.keyboard_focus(), Some(window));
}

/// `Separate` never lets the pointer move keyboard focus
#[test]
fn test_follow_mouse_separate_ignores_clicks() {
    let mut config = Config::default();
    config.input.follow_mouse = FollowMouse::Separate;
    let mut fixture = Fixture::with_config(config);
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let client = fixture.add_client();
    fixture
        .map_window(client, monitor, (100, 100), (800, 600))
        .unwrap();

    fixture.move_to(200.0, 200.0);
    fixture.click(BTN_LEFT);
    assert_eq!(fixture.keyboard_focus(), None);
}

/// Destroying the focused surface hands focus to whatever is below
#[test]
fn test_destroyed_surface_refocuses_below() {
    let mut fixture = Fixture::new();
    let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
    let first = fixture.add_client();
    let second = fixture.add_client();
    let (_, below) = fixture.map_window(first, monitor, (0, 0), (800, 600)).unwrap();
    let (_, above) = fixture.map_window(second, monitor, (0, 0), (400, 400)).unwrap();

    fixture.warp(100.0, 100.0);
    assert_eq!(fixture.pointer_focus(), Some(above));

    fixture.destroy_surface(above);
    assert_eq!(fixture.pointer_focus(), Some(below));
}

/// Moving onto another monitor makes it the active one
#[test]
fn test_motion_changes_active_monitor() {
    let mut fixture = Fixture::new();
    let left = fixture.add_monitor("Virtual-1", 1920, 1080);
    let right = fixture.add_monitor("Virtual-2", 1920, 1080);
    assert_eq!(fixture.state().input.active_monitor(), Some(left));
    let events = fixture.record_focus();

    fixture.move_to(2500.0, 500.0);
    assert_eq!(fixture.state().input.active_monitor(), Some(right));
    assert!(events
        .events()
        .contains(&FocusEvent::ActiveMonitorChanged(right)));
}
