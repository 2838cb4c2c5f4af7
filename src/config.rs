//! Pointer and focus configuration
//!
//! Configuration is read-only for the pointer core. It arrives either as a JSON
//! document (sections `cursor`, `input`, `misc`, `general`) or as individual
//! `section.key` keyword changes at runtime. Every value is validated on the way in,
//! so the rest of the crate can read fields directly.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound of `cursor.hotspot_padding`.
pub const MAX_HOTSPOT_PADDING: i64 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown config key `{0}`")]
    UnknownKey(String),
    #[error("config key `{key}` expects {expected}, got {got}")]
    WrongType {
        key: String,
        expected: &'static str,
        got: ConfigValue,
    },
    #[error("value {value} is out of range for `{key}`")]
    OutOfRange { key: String, value: ConfigValue },
}

/// A single typed configuration value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{v}"),
            ConfigValue::Int(v) => write!(f, "{v}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl ConfigValue {
    fn as_bool(self, key: &str) -> Result<bool, ConfigError> {
        match self {
            ConfigValue::Bool(v) => Ok(v),
            // Config files commonly spell booleans as 0/1
            ConfigValue::Int(0) => Ok(false),
            ConfigValue::Int(1) => Ok(true),
            got => Err(ConfigError::WrongType {
                key: key.to_string(),
                expected: "a boolean",
                got,
            }),
        }
    }

    fn as_int(self, key: &str) -> Result<i64, ConfigError> {
        match self {
            ConfigValue::Int(v) => Ok(v),
            got => Err(ConfigError::WrongType {
                key: key.to_string(),
                expected: "an integer",
                got,
            }),
        }
    }

    fn as_float(self, key: &str) -> Result<f64, ConfigError> {
        match self {
            ConfigValue::Float(v) => Ok(v),
            ConfigValue::Int(v) => Ok(v as f64),
            got => Err(ConfigError::WrongType {
                key: key.to_string(),
                expected: "a number",
                got,
            }),
        }
    }
}

/// Focus-follows-mouse policy (`input.follow_mouse`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowMouse {
    /// Motion never moves keyboard focus; a click does.
    Off,
    /// Keyboard focus follows the window under the cursor.
    #[default]
    Always,
    /// Pointer focus is detached from keyboard focus; a click moves keyboard focus.
    Detached,
    /// The pointer never moves keyboard focus.
    Separate,
}

impl FollowMouse {
    pub fn from_int(value: i64) -> Option<Self> {
        match value {
            0 => Some(FollowMouse::Off),
            1 => Some(FollowMouse::Always),
            2 => Some(FollowMouse::Detached),
            3 => Some(FollowMouse::Separate),
            _ => None,
        }
    }

    pub fn to_int(self) -> i64 {
        match self {
            FollowMouse::Off => 0,
            FollowMouse::Always => 1,
            FollowMouse::Detached => 2,
            FollowMouse::Separate => 3,
        }
    }

    /// Whether a button press may move keyboard focus.
    pub fn click_focuses(self) -> bool {
        self != FollowMouse::Separate
    }
}

impl<'de> Deserialize<'de> for FollowMouse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        FollowMouse::from_int(value).ok_or_else(|| {
            serde::de::Error::custom(format!("follow_mouse must be 0..=3, got {value}"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Magnification around the cursor. Anything but 1.0 forces software cursors.
    pub zoom_factor: f64,
    /// Distance kept between the hotspot and the edge of the layout.
    pub hotspot_padding: i64,
    /// Copy cursor pixels into a CPU-mapped plane buffer instead of rendering.
    pub use_cpu_buffer: bool,
    /// Don't schedule extra frames for cursor motion over fullscreen VRR content.
    #[serde(alias = "no_break_fs_vrr")]
    pub no_break_fullscreen_vrr: bool,
    /// Minimum refresh rate kept while frames are being skipped for VRR.
    pub min_refresh_rate: i64,
    pub no_hardware_cursors: bool,
    pub hide_on_touch: bool,
    /// Suppress cursor warps the compositor itself initiates.
    pub no_warps: bool,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            zoom_factor: 1.0,
            hotspot_padding: 1,
            use_cpu_buffer: false,
            no_break_fullscreen_vrr: false,
            min_refresh_rate: 24,
            no_hardware_cursors: false,
            hide_on_touch: true,
            no_warps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub follow_mouse: FollowMouse,
    pub mouse_refocus: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            follow_mouse: FollowMouse::Always,
            mouse_refocus: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MiscConfig {
    pub mouse_move_focuses_monitor: bool,
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self {
            mouse_move_focuses_monitor: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Show directional resize cursors when hovering window borders.
    pub resize_on_border: bool,
    /// Extra grab area around windows, in logical pixels.
    pub extend_border_grab_area: i64,
    /// Region around a corner that selects a diagonal resize cursor.
    pub resize_corner_radius: i64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            resize_on_border: false,
            extend_border_grab_area: 15,
            resize_corner_radius: 10,
        }
    }
}

/// Complete configuration surface consumed by the pointer core.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cursor: CursorConfig,
    pub input: InputConfig,
    pub misc: MiscConfig,
    pub general: GeneralConfig,
}

/// Every key accepted by [`Config::get`] and [`Config::set`].
pub const CONFIG_KEYS: &[&str] = &[
    "cursor.zoom_factor",
    "cursor.hotspot_padding",
    "cursor.use_cpu_buffer",
    "cursor.no_break_fullscreen_vrr",
    "cursor.min_refresh_rate",
    "cursor.no_hardware_cursors",
    "cursor.hide_on_touch",
    "cursor.no_warps",
    "input.follow_mouse",
    "input.mouse_refocus",
    "misc.mouse_move_focuses_monitor",
    "general.resize_on_border",
    "general.extend_border_grab_area",
    "general.resize_corner_radius",
];

impl Config {
    /// Parse a JSON document. Missing sections and keys keep their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let mut config: Config =
            serde_json::from_str(json).context("failed to parse pointer config")?;
        config.sanitize();
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), "loaded pointer config");
        Ok(config)
    }

    /// Clamp values that came from a file to their valid ranges.
    fn sanitize(&mut self) {
        let padding = self.cursor.hotspot_padding.clamp(0, MAX_HOTSPOT_PADDING);
        if padding != self.cursor.hotspot_padding {
            warn!(
                value = self.cursor.hotspot_padding,
                "cursor.hotspot_padding out of range, clamping to {padding}"
            );
            self.cursor.hotspot_padding = padding;
        }
        if !self.cursor.zoom_factor.is_finite() || self.cursor.zoom_factor < 1.0 {
            warn!(value = self.cursor.zoom_factor, "invalid cursor.zoom_factor, using 1.0");
            self.cursor.zoom_factor = 1.0;
        }
        self.cursor.min_refresh_rate = self.cursor.min_refresh_rate.max(0);
        self.general.extend_border_grab_area = self.general.extend_border_grab_area.max(0);
        self.general.resize_corner_radius = self.general.resize_corner_radius.max(0);
    }

    /// Hotspot padding in logical pixels, always within `0..=100`.
    pub fn hotspot_padding(&self) -> f64 {
        self.cursor.hotspot_padding.clamp(0, MAX_HOTSPOT_PADDING) as f64
    }

    /// Whether cursor magnification is active.
    pub fn zoomed(&self) -> bool {
        (self.cursor.zoom_factor - 1.0).abs() > f64::EPSILON
    }

    /// Look up a single value by its `section.key` name.
    pub fn get(&self, key: &str) -> Result<ConfigValue, ConfigError> {
        let value = match key {
            "cursor.zoom_factor" => ConfigValue::Float(self.cursor.zoom_factor),
            "cursor.hotspot_padding" => ConfigValue::Int(self.cursor.hotspot_padding),
            "cursor.use_cpu_buffer" => ConfigValue::Bool(self.cursor.use_cpu_buffer),
            "cursor.no_break_fullscreen_vrr" => {
                ConfigValue::Bool(self.cursor.no_break_fullscreen_vrr)
            }
            "cursor.min_refresh_rate" => ConfigValue::Int(self.cursor.min_refresh_rate),
            "cursor.no_hardware_cursors" => ConfigValue::Bool(self.cursor.no_hardware_cursors),
            "cursor.hide_on_touch" => ConfigValue::Bool(self.cursor.hide_on_touch),
            "cursor.no_warps" => ConfigValue::Bool(self.cursor.no_warps),
            "input.follow_mouse" => ConfigValue::Int(self.input.follow_mouse.to_int()),
            "input.mouse_refocus" => ConfigValue::Bool(self.input.mouse_refocus),
            "misc.mouse_move_focuses_monitor" => {
                ConfigValue::Bool(self.misc.mouse_move_focuses_monitor)
            }
            "general.resize_on_border" => ConfigValue::Bool(self.general.resize_on_border),
            "general.extend_border_grab_area" => {
                ConfigValue::Int(self.general.extend_border_grab_area)
            }
            "general.resize_corner_radius" => ConfigValue::Int(self.general.resize_corner_radius),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Change a single value at runtime. Out-of-range values are rejected, not clamped.
    pub fn set(&mut self, key: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let out_of_range = || ConfigError::OutOfRange {
            key: key.to_string(),
            value,
        };

        match key {
            "cursor.zoom_factor" => {
                let zoom = value.as_float(key)?;
                if !zoom.is_finite() || zoom < 1.0 {
                    return Err(out_of_range());
                }
                self.cursor.zoom_factor = zoom;
            }
            "cursor.hotspot_padding" => {
                let padding = value.as_int(key)?;
                if !(0..=MAX_HOTSPOT_PADDING).contains(&padding) {
                    return Err(out_of_range());
                }
                self.cursor.hotspot_padding = padding;
            }
            "cursor.use_cpu_buffer" => self.cursor.use_cpu_buffer = value.as_bool(key)?,
            "cursor.no_break_fullscreen_vrr" => {
                self.cursor.no_break_fullscreen_vrr = value.as_bool(key)?
            }
            "cursor.min_refresh_rate" => {
                let rate = value.as_int(key)?;
                if rate < 0 {
                    return Err(out_of_range());
                }
                self.cursor.min_refresh_rate = rate;
            }
            "cursor.no_hardware_cursors" => {
                self.cursor.no_hardware_cursors = value.as_bool(key)?
            }
            "cursor.hide_on_touch" => self.cursor.hide_on_touch = value.as_bool(key)?,
            "cursor.no_warps" => self.cursor.no_warps = value.as_bool(key)?,
            "input.follow_mouse" => {
                let raw = value.as_int(key)?;
                self.input.follow_mouse = FollowMouse::from_int(raw).ok_or_else(out_of_range)?;
            }
            "input.mouse_refocus" => self.input.mouse_refocus = value.as_bool(key)?,
            "misc.mouse_move_focuses_monitor" => {
                self.misc.mouse_move_focuses_monitor = value.as_bool(key)?
            }
            "general.resize_on_border" => self.general.resize_on_border = value.as_bool(key)?,
            "general.extend_border_grab_area" => {
                let area = value.as_int(key)?;
                if area < 0 {
                    return Err(out_of_range());
                }
                self.general.extend_border_grab_area = area;
            }
            "general.resize_corner_radius" => {
                let radius = value.as_int(key)?;
                if radius < 0 {
                    return Err(out_of_range());
                }
                self.general.resize_corner_radius = radius;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }

        debug!(key, %value, "config value changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cursor.zoom_factor, 1.0);
        assert_eq!(config.cursor.hotspot_padding, 1);
        assert_eq!(config.input.follow_mouse, FollowMouse::Always);
        assert!(config.input.mouse_refocus);
        assert!(config.misc.mouse_move_focuses_monitor);
        assert!(!config.zoomed());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json_str(
            r#"{ "cursor": { "use_cpu_buffer": true }, "input": { "follow_mouse": 2 } }"#,
        )
        .unwrap();

        assert!(config.cursor.use_cpu_buffer);
        assert_eq!(config.cursor.min_refresh_rate, 24);
        assert_eq!(config.input.follow_mouse, FollowMouse::Detached);
        assert!(config.misc.mouse_move_focuses_monitor);
    }

    #[test]
    fn test_json_clamps_padding() {
        let config = Config::from_json_str(r#"{ "cursor": { "hotspot_padding": 500 } }"#).unwrap();
        assert_eq!(config.cursor.hotspot_padding, 100);

        let config = Config::from_json_str(r#"{ "cursor": { "hotspot_padding": -3 } }"#).unwrap();
        assert_eq!(config.cursor.hotspot_padding, 0);
    }

    #[test]
    fn test_json_rejects_bad_follow_mouse() {
        assert!(Config::from_json_str(r#"{ "input": { "follow_mouse": 7 } }"#).is_err());
    }

    #[test]
    fn test_fs_vrr_alias() {
        let config = Config::from_json_str(r#"{ "cursor": { "no_break_fs_vrr": true } }"#).unwrap();
        assert!(config.cursor.no_break_fullscreen_vrr);
    }

    #[test]
    fn test_get_set_roundtrip_every_key() {
        let mut config = Config::default();
        for key in CONFIG_KEYS {
            let value = config.get(key).unwrap();
            config.set(key, value).unwrap();
        }
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_set_validation() {
        let mut config = Config::default();

        assert_eq!(
            config.set("cursor.nope", ConfigValue::Int(1)),
            Err(ConfigError::UnknownKey("cursor.nope".into()))
        );
        assert!(matches!(
            config.set("cursor.hotspot_padding", ConfigValue::Int(101)),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            config.set("input.follow_mouse", ConfigValue::Int(4)),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            config.set("cursor.zoom_factor", ConfigValue::Bool(true)),
            Err(ConfigError::WrongType { .. })
        ));

        config.set("cursor.zoom_factor", ConfigValue::Int(2)).unwrap();
        assert!(config.zoomed());
        config.set("cursor.use_cpu_buffer", ConfigValue::Int(1)).unwrap();
        assert!(config.cursor.use_cpu_buffer);
    }
}
