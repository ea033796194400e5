//! keytouch - replay touch traces against a keyboard layout
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │   Trace file  →  Dispatcher  →  Printer  │
//! ├──────────────────────────────────────────┤
//! │   Layout TOML →  Keyboard (grid)         │
//! │   Config TOML →  TouchConfig             │
//! └──────────────────────────────────────────┘
//! ```

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use keytouch::config::{self, Config, LayoutConfig};
use keytouch::dispatch::{Dispatcher, Engine, EngineBridge};
use keytouch::keyboard::{keycode, EngineState, Keyboard, Modifiers};
use keytouch::trace::Trace;

#[cfg(target_os = "linux")]
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Layout watch polling interval (milliseconds)
#[cfg(target_os = "linux")]
const WATCH_POLL_MS: u64 = 200;

// ============================================================================
// Replay Engine
// ============================================================================

/// Engine stand-in that prints what it receives
struct ReplayEngine {
    state: EngineState,
    actions: usize,
}

impl ReplayEngine {
    fn new(state: EngineState) -> Self {
        Self { state, actions: 0 }
    }
}

impl Engine for ReplayEngine {
    fn query_state(&self) -> EngineState {
        self.state
    }

    fn dispatch(&mut self, code: i32, mask: Modifiers) -> bool {
        self.actions += 1;
        let name = keycode::name_of(code).unwrap_or_else(|| code.to_string());
        if mask.is_empty() {
            println!("key  {}", name);
        } else {
            println!("key  {} {:?}", name, mask);
        }
        true
    }

    fn commit_text(&mut self, text: &str) -> bool {
        self.actions += 1;
        println!("text {:?}", text);
        true
    }
}

// ============================================================================
// Commands
// ============================================================================

fn print_help() {
    println!(
        r#"keytouch {} - touch-to-key dispatch for software keyboards

USAGE:
    keytouch [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --layout PATH           Layout file (default: config [layout] path, else built-in)
    --trace PATH            Touch trace to replay
    --width N               Display width in pixels (default: config display_width)
    --watch                 Replay again whenever the layout or trace file changes
    --init-config           Generate config file
    -f, --force             Overwrite config file

Without --trace, the laid-out keys are listed.

EXAMPLES:
    keytouch                                  List the built-in layout
    keytouch --trace swipe.toml               Replay a trace on the built-in layout
    keytouch --layout my.toml --width 720     List a layout fitted to 720px
    RUST_LOG=debug keytouch --trace t.toml    Trace the state machine

CONFIG FILE:
    ~/.config/keytouch/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Value following `flag` on the command line
fn arg_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| anyhow!("{} requires a value", flag)),
        None => Ok(None),
    }
}

fn init_config(force: bool) -> Result<()> {
    if let Some(path) = config::default_config_path() {
        if path.exists() && !force {
            println!("Config file already exists: {}", path.display());
            println!("Use --force to overwrite.");
            return Ok(());
        }
    }
    let path = Config::write_default_config()?;
    println!("Config file generated:");
    println!("  Path:   {}", path.display());
    Ok(())
}

fn list_keys(keyboard: &Keyboard) {
    println!(
        "{}: {} keys, {}x{}",
        keyboard.name(),
        keyboard.keys().len(),
        keyboard.min_width(),
        keyboard.height()
    );
    let state = EngineState::default();
    for (i, key) in keyboard.keys().iter().enumerate() {
        let r = key.rect();
        println!(
            "{:>3}  row {} col {:>2}  {:>4},{:>4} {:>4}x{:<4} {}",
            i,
            key.row(),
            key.column(),
            r.x,
            r.y,
            r.width,
            r.height,
            keyboard.key_label(i, &state)
        );
    }
}

/// Run a trace through a fresh dispatcher; returns the number of actions
fn replay(config: &Config, keyboard: Keyboard, trace: &Trace) -> usize {
    let mut dispatcher = Dispatcher::new(keyboard, config.touch.clone());
    let mut bridge = EngineBridge::new(ReplayEngine::new(trace.engine));

    for ev in trace.touch_events() {
        dispatcher.poll_timers(ev.time, &mut bridge);
        debug!("{:?} pointer {} at ({}, {}) t={}", ev.action, ev.pointer, ev.x, ev.y, ev.time);
        dispatcher.on_touch(ev, &mut bridge);
    }

    // Let timers armed by the last events run, then drop held gestures
    let settle = trace.end_time() + config.touch.long_press_timeout;
    dispatcher.poll_timers(settle, &mut bridge);
    if !dispatcher.is_idle() {
        warn!("Trace ends with fingers still down");
    }
    dispatcher.finish_input(&mut bridge);

    bridge.engine.actions
}

struct Run {
    config: Config,
    layout_path: Option<PathBuf>,
    trace_path: Option<PathBuf>,
    width: i32,
}

impl Run {
    fn load_layout(&self) -> Result<LayoutConfig> {
        match &self.layout_path {
            Some(path) => LayoutConfig::load(path),
            None => self.config.layout.load_layout(),
        }
    }

    fn execute(&self) -> Result<()> {
        let layout = self.load_layout()?;
        let keyboard = Keyboard::from_config(&layout, self.width)
            .with_context(|| format!("Failed to lay out '{}'", layout.name))?;
        info!("Layout '{}' with {} keys", keyboard.name(), keyboard.keys().len());

        match &self.trace_path {
            Some(path) => {
                let trace = Trace::load(path)?;
                let actions = replay(&self.config, keyboard, &trace);
                println!("-- {} events, {} actions", trace.events.len(), actions);
            }
            None => list_keys(&keyboard),
        }
        Ok(())
    }

    /// Re-run on every change to the layout or trace file
    #[cfg(target_os = "linux")]
    fn watch(&self) -> Result<()> {
        let watched: Vec<&Path> = self
            .layout_path
            .as_deref()
            .into_iter()
            .chain(self.trace_path.as_deref())
            .collect();
        if watched.is_empty() {
            return Err(anyhow!("--watch needs a layout or trace file"));
        }

        let watchers = watched
            .iter()
            .map(|p| config::LayoutWatcher::new(p))
            .collect::<Result<Vec<_>>>()?;
        info!("Watching {} file(s) for changes", watchers.len());

        loop {
            std::thread::sleep(Duration::from_millis(WATCH_POLL_MS));
            // Drain every watcher so one save triggers one replay
            let changed = watchers
                .iter()
                .fold(false, |changed, w| w.check_reload() || changed);
            if changed {
                println!();
                if let Err(e) = self.execute() {
                    warn!("Reload failed: {:#}", e);
                }
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn watch(&self) -> Result<()> {
        Err(anyhow!("--watch is only supported on Linux"))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Check command line arguments
    let args: Vec<String> = std::env::args().collect();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("keytouch {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // --init-config
    if args.iter().any(|a| a == "--init-config") {
        let force = args.iter().any(|a| a == "--force" || a == "-f");
        return init_config(force);
    }

    let config = Config::load();

    let width = match arg_value(&args, "--width")? {
        Some(w) => w
            .parse::<i32>()
            .with_context(|| format!("Invalid --width value: {}", w))?,
        None => config.layout.display_width,
    };
    let layout_path = match arg_value(&args, "--layout")? {
        Some(p) => Some(PathBuf::from(p)),
        None => config.layout.layout_path(),
    };
    let trace_path = arg_value(&args, "--trace")?.map(PathBuf::from);

    let run = Run {
        config,
        layout_path,
        trace_path,
        width,
    };
    run.execute()?;

    if args.iter().any(|a| a == "--watch") {
        run.watch()?;
    }

    Ok(())
}
