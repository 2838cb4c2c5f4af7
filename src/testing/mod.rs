//! Testing infrastructure for the pointer core
//!
//! This module provides a test fixture for driving [`State`](crate::State) the way a
//! compositor would, without real hardware.
//!
//! # Architecture
//!
//! The testing infrastructure is built on three key components:
//!
//! 1. **HeadlessPlane**: virtual cursor planes with scriptable failures, inspected
//!    through a [`PlaneProbe`](crate::backend::PlaneProbe).
//!
//! 2. **Fixture**: the test harness. It owns the compositor state, lays out monitors
//!    left to right, hands out clients, windows and layer surfaces, and feeds input
//!    events with an advancing clock.
//!
//! 3. **Recorder**: collects events emitted on a [`Signal`](crate::event::Signal)
//!    for later assertions.
//!
//! # Example
//!
//! ```ignore
//! use pointer_core::testing::Fixture;
//!
//! #[test]
//! fn test_window_gets_pointer_focus() {
//!     let mut fixture = Fixture::new();
//!     let monitor = fixture.add_monitor("Virtual-1", 1920, 1080);
//!     let client = fixture.add_client();
//!     let (_, surface) = fixture.map_window(client, monitor, (100, 100), (400, 300)).unwrap();
//!
//!     fixture.warp(200.0, 200.0);
//!     assert_eq!(fixture.pointer_focus(), Some(surface));
//! }
//! ```

mod fixture;

pub use fixture::{
    init_logging, Fixture, RecordingRenderer, Recorder, SoftwareDraw, MOUSE, TABLET, TOUCHSCREEN,
};
