//! Configuration file management
//!
//! Loads TOML configuration files and provides touch timing settings.
//! Default config path: ~/.config/keytouch/config.toml

mod layout;

pub use layout::{KeyConfig, LayoutConfig, PresetKey, BUILTIN_LAYOUT};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(target_os = "linux")]
use std::ffi::OsStr;
#[cfg(target_os = "linux")]
use std::sync::mpsc;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Touch timing and swipe thresholds
    pub touch: TouchConfig,
    /// Layout selection
    pub layout: LayoutSettings,
}

/// Touch timing and swipe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchConfig {
    /// Hold time before a long-press fires, in milliseconds (default: 400)
    pub long_press_timeout: u64,
    /// Interval between repeats of a held repeatable key (default: 50)
    pub repeat_interval: u64,
    /// Hold time before the first repeat (default: long_press_timeout + 1)
    pub repeat_start_delay: Option<u64>,
    /// Detect swipes at all
    pub swipe_enabled: bool,
    /// Travel distance confirming a swipe, in pixels
    pub swipe_travel: f32,
    /// Travel distance used during fast input
    pub swipe_travel_fast: f32,
    /// A press starting within this many ms of the previous release is fast input
    pub fast_input_window: u64,
    /// Switch to the fast thresholds after quick taps
    pub hook_fast_input: bool,
    /// Report nearby key codes with each tap
    pub proximity_correction: bool,
    /// Show the key preview bubble
    pub show_preview: bool,
    /// More dirty keys than this trigger a full redraw
    pub max_dirty_keys: usize,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            long_press_timeout: 400,
            repeat_interval: 50,
            repeat_start_delay: None,
            swipe_enabled: true,
            swipe_travel: 80.0,
            swipe_travel_fast: 50.0,
            fast_input_window: 80,
            hook_fast_input: true,
            proximity_correction: false,
            show_preview: true,
            max_dirty_keys: 5,
        }
    }
}

impl TouchConfig {
    /// Delay before the first repeat
    pub fn repeat_start_delay(&self) -> u64 {
        self.repeat_start_delay
            .unwrap_or(self.long_press_timeout + 1)
    }
}

/// Layout selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Layout file (empty = built-in QWERTY)
    pub path: String,
    /// Display width the layout is fitted to, in pixels
    pub display_width: i32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            display_width: 1080,
        }
    }
}

impl LayoutSettings {
    /// Load the configured layout, falling back to the built-in one
    pub fn load_layout(&self) -> Result<LayoutConfig> {
        match self.layout_path() {
            Some(path) => LayoutConfig::load(&path),
            None => {
                info!("Using built-in layout");
                Ok(LayoutConfig::builtin())
            }
        }
    }

    /// Layout file path with `~/` expanded (None = built-in layout)
    pub fn layout_path(&self) -> Option<PathBuf> {
        if self.path.is_empty() {
            None
        } else {
            Some(expand_home(&self.path))
        }
    }
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/keytouch/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. KEYTOUCH_CONFIG environment variable
        if let Ok(path) = std::env::var("KEYTOUCH_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/keytouch/config.toml
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Some(path);
            }
        }

        // 3. System config: /etc/keytouch/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. KEYTOUCH_CONFIG environment variable
    /// 2. ~/.config/keytouch/config.toml (user config)
    /// 3. /etc/keytouch/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write the commented default config to the user config directory
    pub fn write_default_config() -> Result<PathBuf> {
        let config_path =
            default_config_path().ok_or_else(|| anyhow::anyhow!("Config directory not found"))?;
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let touch = TouchConfig::default();
        let template = format!(
            r#"# keytouch configuration
# Generated by: keytouch --init-config

[touch]
# Hold time before a long-press fires (ms)
long_press_timeout = {long_press}
# Interval between repeats of a held repeatable key (ms)
repeat_interval = {repeat}
# Hold time before the first repeat (ms, default: long_press_timeout + 1)
# repeat_start_delay = {repeat_start}

# Swipe detection
swipe_enabled = {swipe_enabled}
# Travel (px) that confirms a swipe
swipe_travel = {travel:.1}

# Fast input: a press within fast_input_window ms of a tap uses the
# fast threshold instead
hook_fast_input = {hook}
fast_input_window = {window}
swipe_travel_fast = {travel_fast:.1}

# Report nearby key codes with each tap
proximity_correction = {proximity}
# Show the key preview bubble
show_preview = {preview}
# More dirty keys than this trigger a full redraw
max_dirty_keys = {dirty}

[layout]
# Layout file (empty = built-in QWERTY)
path = ""
# Display width the layout is fitted to (px)
display_width = {width}
"#,
            long_press = touch.long_press_timeout,
            repeat = touch.repeat_interval,
            repeat_start = touch.repeat_start_delay(),
            swipe_enabled = touch.swipe_enabled,
            travel = touch.swipe_travel,
            hook = touch.hook_fast_input,
            window = touch.fast_input_window,
            travel_fast = touch.swipe_travel_fast,
            proximity = touch.proximity_correction,
            preview = touch.show_preview,
            dirty = touch.max_dirty_keys,
            width = LayoutSettings::default().display_width,
        );

        std::fs::write(&config_path, template)?;
        Ok(config_path)
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Watches one file for edits (Linux only).
///
/// The parent directory is watched so saves that write a temp file and
/// rename it over the original are seen. Events naming any other file in
/// that directory are ignored.
#[cfg(target_os = "linux")]
pub struct LayoutWatcher {
    _watcher: RecommendedWatcher,
    changes: mpsc::Receiver<PathBuf>,
}

#[cfg(target_os = "linux")]
impl LayoutWatcher {
    pub fn new(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(OsStr::to_os_string)
            .with_context(|| format!("Not a file path: {}", path.display()))?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, changes) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if let Some(changed) = changed_path(&event, &name) {
                        let _ = tx.send(changed.to_path_buf());
                    }
                }
                Err(e) => warn!("File watch error: {}", e),
            }
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// Whether the file changed since the last call (non-blocking).
    /// Drains every queued event so one save reports once.
    pub fn check_reload(&self) -> bool {
        self.changes.try_iter().fold(false, |_, path| {
            log::debug!("Changed: {}", path.display());
            true
        })
    }
}

/// Path in `event` naming the watched file, for events that can change
/// its content
#[cfg(target_os = "linux")]
fn changed_path<'a>(event: &'a Event, name: &OsStr) -> Option<&'a Path> {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return None;
    }
    event
        .paths
        .iter()
        .map(PathBuf::as_path)
        .find(|p| p.file_name() == Some(name))
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keytouch").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_defaults() {
        let touch = TouchConfig::default();
        assert_eq!(touch.long_press_timeout, 400);
        assert_eq!(touch.repeat_interval, 50);
        assert_eq!(touch.repeat_start_delay(), 401);
        assert!(touch.swipe_travel_fast < touch.swipe_travel);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [touch]
            long_press_timeout = 300
            swipe_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.touch.long_press_timeout, 300);
        assert_eq!(config.touch.repeat_start_delay(), 301);
        assert!(!config.touch.swipe_enabled);
        assert_eq!(config.touch.repeat_interval, 50);
        assert_eq!(config.layout.display_width, 1080);
    }

    #[test]
    fn test_explicit_repeat_start_delay() {
        let config: Config = toml::from_str("[touch]\nrepeat_start_delay = 250").unwrap();
        assert_eq!(config.touch.repeat_start_delay(), 250);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/layout.toml"), PathBuf::from("/abs/layout.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/l.toml"), home.join("l.toml"));
        }
    }

    #[test]
    fn test_builtin_layout_when_path_empty() {
        let settings = LayoutSettings::default();
        assert_eq!(settings.layout_path(), None);
        let layout = settings.load_layout().unwrap();
        assert_eq!(layout.name, "qwerty");

        let settings = LayoutSettings {
            path: "/nonexistent/keytouch/layout.toml".to_string(),
            ..LayoutSettings::default()
        };
        assert!(settings.load_layout().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_watch_filters_by_file_name() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

        let name = OsStr::new("layout.toml");
        let event = |kind, paths: &[&str]| {
            paths
                .iter()
                .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
        };

        let edit = event(EventKind::Modify(ModifyKind::Any), &["/tmp/kt/layout.toml"]);
        assert_eq!(changed_path(&edit, name), Some(Path::new("/tmp/kt/layout.toml")));

        let other = event(EventKind::Create(CreateKind::File), &["/tmp/kt/notes.txt"]);
        assert_eq!(changed_path(&other, name), None);

        let removed = event(EventKind::Remove(RemoveKind::File), &["/tmp/kt/layout.toml"]);
        assert_eq!(changed_path(&removed, name), None);

        // Temp file renamed over the layout
        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/tmp/kt/.layout.toml.tmp", "/tmp/kt/layout.toml"],
        );
        assert_eq!(changed_path(&renamed, name), Some(Path::new("/tmp/kt/layout.toml")));
    }
}
