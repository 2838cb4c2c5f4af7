//! Protocol-level tests
//!
//! These tests verify what clients observe on the wire and which surface the core
//! decides should receive input.
//!
//! # Test Organization
//!
//! - `focus.rs` - Layer and window ordering, held buttons, grabs, keyboard focus
//! - `cursor.rs` - `set_cursor` validation, client cursors, cursor icons
//! - `wire.rs` - Event sequences as clients see them

mod cursor;
mod focus;
mod wire;
