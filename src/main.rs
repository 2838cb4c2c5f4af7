//! pointer-replay binary entry point
//!
//! Replays a JSON script of monitor, surface and input steps through the pointer core
//! on headless cursor planes, and prints what the core emitted after every step as
//! one JSON object per line. Useful for reproducing focus and cursor bugs outside a
//! running compositor.
//!
//! ```json
//! [
//!   {"cmd": "monitor", "name": "DP-1", "width": 1920, "height": 1080, "plane": 64},
//!   {"cmd": "client", "id": 1},
//!   {"cmd": "window", "client": 1, "monitor": "DP-1", "x": 100, "y": 100, "width": 800, "height": 600},
//!   {"cmd": "motion", "dx": 200, "dy": 150}
//! ]
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context};
use pointer_core::backend::{HeadlessPlane, PlaneSize};
use pointer_core::config::ConfigValue;
use pointer_core::device::{DeviceClass, InputDevice};
use pointer_core::event::{ButtonState, Normalized};
use pointer_core::scene::{Layer, WorkspaceHandle};
use pointer_core::utils::int_to_transform;
use pointer_core::{Config, FocusEvent, InputEvent, Monitor, MonitorHandle, PresentationEvent, State};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Device ids used for scripted input.
const MOUSE: u32 = 1;
const TABLET: u32 = 2;

/// Milliseconds the replay clock advances per input step.
const TICK_MSEC: u32 = 8;

/// One scripted step.
#[derive(Deserialize, Debug)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Step {
    /// Change one `section.key` configuration value.
    Config { key: String, value: serde_json::Value },
    /// Connect a monitor. `plane` is the cursor plane size in pixels, if any.
    Monitor {
        name: String,
        width: i32,
        height: i32,
        #[serde(default)]
        x: i32,
        #[serde(default)]
        y: i32,
        #[serde(default = "default_scale")]
        scale: f64,
        /// Output transform, 0..=7 as in `wl_output.transform`.
        #[serde(default)]
        transform: i32,
        #[serde(default)]
        plane: Option<i32>,
    },
    /// Disconnect a monitor.
    RemoveMonitor { name: String },
    /// A client binding `wl_pointer`.
    Client { id: u32 },
    /// Map a toplevel on the monitor's workspace.
    Window {
        client: u32,
        monitor: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        #[serde(default)]
        floating: bool,
    },
    /// Map a layer surface.
    Layer {
        client: u32,
        monitor: String,
        layer: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        #[serde(default)]
        exclusive: bool,
    },
    Motion { dx: f64, dy: f64 },
    Absolute { x: f64, y: f64 },
    Warp { x: f64, y: f64 },
    Button { button: u32, pressed: bool },
    Present { monitor: String, time_msec: u64 },
    Render { monitor: String },
}

fn default_scale() -> f64 {
    1.0
}

/// What the core emitted while handling one step.
#[derive(Serialize, Debug)]
struct StepOutput {
    step: usize,
    wire: Vec<String>,
    events: Vec<String>,
    position: (f64, f64),
}

struct Replay {
    state: State,
    monitors: HashMap<String, (MonitorHandle, WorkspaceHandle)>,
    time_msec: u32,
}

impl Replay {
    fn new(config: Config) -> Self {
        let mut state = State::new(config);
        state
            .devices
            .add(InputDevice::new(MOUSE, "replay-mouse", DeviceClass::Mouse));
        state
            .devices
            .add(InputDevice::new(TABLET, "replay-tablet", DeviceClass::Tablet));
        Self {
            state,
            monitors: HashMap::new(),
            time_msec: 0,
        }
    }

    fn tick(&mut self) -> u32 {
        self.time_msec += TICK_MSEC;
        self.time_msec
    }

    fn monitor(&self, name: &str) -> anyhow::Result<(MonitorHandle, WorkspaceHandle)> {
        self.monitors
            .get(name)
            .copied()
            .with_context(|| format!("unknown monitor {name}"))
    }

    fn run(&mut self, step: Step) -> anyhow::Result<()> {
        match step {
            Step::Config { key, value } => {
                let value = match value {
                    serde_json::Value::Bool(v) => ConfigValue::Bool(v),
                    serde_json::Value::Number(n) if n.is_i64() => {
                        ConfigValue::Int(n.as_i64().unwrap_or_default())
                    }
                    serde_json::Value::Number(n) => ConfigValue::Float(n.as_f64().unwrap_or_default()),
                    other => bail!("unsupported value {other} for {key}"),
                };
                self.state.set_config(&key, value)?;
            }
            Step::Monitor {
                name,
                width,
                height,
                x,
                y,
                scale,
                transform,
                plane,
            } => {
                let mut monitor = Monitor::new(name.clone(), (width, height));
                monitor.position = (x, y).into();
                monitor.scale = scale;
                monitor.transform = int_to_transform(transform);
                if let Some(size) = plane {
                    let (plane, _probe) = HeadlessPlane::new(PlaneSize::Max((size, size).into()));
                    monitor = monitor.with_plane(plane);
                }
                let handle = self.state.add_monitor(monitor);
                let workspace = self.state.scene.add_workspace(name.clone(), Some(handle), false);
                self.state
                    .update_monitor(handle, |m| m.active_workspace = Some(workspace));
                self.monitors.insert(name, (handle, workspace));
            }
            Step::RemoveMonitor { name } => {
                let (handle, _) = self.monitor(&name)?;
                self.state.remove_monitor(handle);
                self.monitors.remove(&name);
            }
            Step::Client { id } => {
                self.state.seat.bind_pointer(id);
            }
            Step::Window {
                client,
                monitor,
                x,
                y,
                width,
                height,
                floating,
            } => {
                let (_, workspace) = self.monitor(&monitor)?;
                let surface = self.state.scene.create_surface(client, (width, height));
                let window = self
                    .state
                    .scene
                    .map_window(surface, workspace, (x, y))
                    .context("failed to map window")?;
                if let Some(w) = self.state.scene.window_mut(window) {
                    w.floating = floating;
                }
                self.state.refocus_pointer(false);
            }
            Step::Layer {
                client,
                monitor,
                layer,
                x,
                y,
                width,
                height,
                exclusive,
            } => {
                let (handle, _) = self.monitor(&monitor)?;
                let layer = match layer.as_str() {
                    "background" => Layer::Background,
                    "bottom" => Layer::Bottom,
                    "top" => Layer::Top,
                    "overlay" => Layer::Overlay,
                    other => bail!("unknown layer {other}"),
                };
                let surface = self.state.scene.create_surface(client, (width, height));
                let layer = self
                    .state
                    .scene
                    .add_layer(surface, layer, handle, (x, y))
                    .context("failed to add layer surface")?;
                self.state.scene.set_layer_exclusive(layer, exclusive);
                self.state.refocus_pointer(false);
            }
            Step::Motion { dx, dy } => {
                let time_msec = self.tick();
                self.state.process_input_event(InputEvent::PointerMotion {
                    device: MOUSE,
                    time_msec,
                    delta: (dx, dy).into(),
                    delta_unaccel: (dx, dy).into(),
                });
            }
            Step::Absolute { x, y } => {
                let time_msec = self.tick();
                self.state
                    .process_input_event(InputEvent::PointerMotionAbsolute {
                        device: TABLET,
                        time_msec,
                        position: Normalized::new(x, y),
                    });
            }
            Step::Warp { x, y } => {
                self.state.warp_pointer((x, y).into());
            }
            Step::Button { button, pressed } => {
                let time_msec = self.tick();
                let state = if pressed {
                    ButtonState::Pressed
                } else {
                    ButtonState::Released
                };
                self.state.process_input_event(InputEvent::PointerButton {
                    device: MOUSE,
                    time_msec,
                    button,
                    state,
                });
            }
            Step::Present { monitor, time_msec } => {
                let (handle, _) = self.monitor(&monitor)?;
                self.state
                    .frame_presented(handle, Duration::from_millis(time_msec));
            }
            Step::Render { monitor } => {
                let (handle, _) = self.monitor(&monitor)?;
                let damage = self.state.render_monitor(handle);
                debug!(monitor, boxes = damage.boxes.len(), full = damage.full, "rendered");
            }
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pointer_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(script_path) = args.first() else {
        eprintln!("Usage: pointer-replay <SCRIPT.json> [CONFIG.json]");
        eprintln!("Replays input and surface steps and prints the resulting events.");
        std::process::exit(1);
    };

    let config = match args.get(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let script = std::fs::read_to_string(script_path)
        .with_context(|| format!("failed to read script {script_path}"))?;
    let steps: Vec<Step> = serde_json::from_str(&script).context("failed to parse script")?;
    info!(steps = steps.len(), "replaying {script_path}");

    let mut replay = Replay::new(config);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    let _presentation = replay
        .state
        .pointer
        .events()
        .subscribe(move |event: &PresentationEvent| sink.borrow_mut().push(format!("{event:?}")));
    let sink = events.clone();
    let _focus = replay
        .state
        .input
        .events()
        .subscribe(move |event: &FocusEvent| sink.borrow_mut().push(format!("{event:?}")));

    for (index, step) in steps.into_iter().enumerate() {
        replay
            .run(step)
            .with_context(|| format!("step {index} failed"))?;
        let position = replay.state.pointer.position();
        let output = StepOutput {
            step: index,
            wire: replay
                .state
                .seat
                .take_events()
                .iter()
                .map(ToString::to_string)
                .collect(),
            events: std::mem::take(&mut *events.borrow_mut()),
            position: (position.x, position.y),
        };
        println!("{}", serde_json::to_string(&output)?);
    }

    Ok(())
}
