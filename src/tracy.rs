//! Tracy profiling integration
//!
//! Profiling macros that compile to no-ops when the `profile-with-tracy` feature is
//! disabled.
//!
//! # Usage
//!
//! Use the `tracy_span!` macro at the start of a hot path:
//!
//! ```ignore
//! fn update_cursor_backend() {
//!     tracy_span!("update_cursor_backend");
//!     // ...
//! }
//! ```
//!
//! Presentation feedback marks a frame with `tracy_frame_mark!`, and counters such as
//! the number of software-cursor monitors are tracked with `tracy_plot!`.

/// Create a Tracy span for the current scope.
/// Compiles to no-op when tracy feature is disabled.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_span {
    ($name:expr) => {
        let _span = tracy_client::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_span {
    ($name:expr) => {};
}

/// Mark a frame boundary for Tracy's frame view.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_frame_mark {
    () => {
        tracy_client::Client::running().map(|c| c.frame_mark());
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_frame_mark {
    () => {};
}

/// Create a Tracy plot value for tracking metrics over time.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {{
        static PLOT: std::sync::OnceLock<tracy_client::PlotName> = std::sync::OnceLock::new();
        let name = PLOT.get_or_init(|| tracy_client::plot_name!($name));
        tracy_client::Client::running().map(|c| c.plot(*name, $value as f64));
    }};
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {};
}
