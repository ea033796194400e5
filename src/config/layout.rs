//! Keyboard layout files
//!
//! A layout is a TOML file listing keys row by row. Keys wrap to a new
//! row when the column limit or the display width is reached.
//!
//! ```toml
//! name = "qwerty"
//! width = 10.0          # default key width, percent of display width
//! height = 48           # default key height, pixels
//!
//! [[keys]]
//! click = "q"
//! swipe_up = "1"
//!
//! [[keys]]
//! click = "Shift_L"
//! width = 15.0
//!
//! [preset_keys.Shift_L]
//! label = "⇧"
//! send = "Shift_L"
//! shift_lock = "long"
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::keyboard::GestureType;

/// Named key definition referenced from bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetKey {
    /// Label drawn on the key
    pub label: Option<String>,
    /// Text committed instead of a key code
    pub text: Option<String>,
    /// Key to send: `"Return"`, `"Control+a"`
    pub send: Option<String>,
    /// Engine command name
    pub command: Option<String>,
    /// Preview bubble text
    pub preview: Option<String>,
    /// Modifier latching: "long" | "click" | "ascii_long"
    pub shift_lock: Option<String>,
    /// Key toggles on/off on each tap
    pub sticky: bool,
    /// Key repeats while held
    pub repeatable: bool,
    /// Functional key (not subject to label transforms)
    pub functional: bool,
}

impl Default for PresetKey {
    fn default() -> Self {
        Self {
            label: None,
            text: None,
            send: None,
            command: None,
            preview: None,
            shift_lock: None,
            sticky: false,
            repeatable: false,
            functional: true,
        }
    }
}

/// One key in a layout file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub click: Option<String>,
    pub long_click: Option<String>,
    pub swipe_up: Option<String>,
    pub swipe_down: Option<String>,
    pub swipe_left: Option<String>,
    pub swipe_right: Option<String>,
    pub combo: Option<String>,
    pub ascii: Option<String>,
    pub composing: Option<String>,
    pub has_menu: Option<String>,
    pub paging: Option<String>,
    pub extra: Option<String>,
    /// Overrides the binding label
    pub label: Option<String>,
    pub hint: Option<String>,
    /// Long-press popup characters
    pub popup: Option<String>,
    /// Key width, percent of display width (layout default when unset)
    pub width: Option<f32>,
    /// Key height, pixels (layout default when unset)
    pub height: Option<i32>,
    /// Send engine-state bindings (default: on when any are defined)
    pub send_bindings: Option<bool>,
}

impl KeyConfig {
    /// Binding strings in gesture order
    pub fn bindings(&self) -> impl Iterator<Item = (GestureType, &str)> {
        [
            (GestureType::Composing, &self.composing),
            (GestureType::HasMenu, &self.has_menu),
            (GestureType::Paging, &self.paging),
            (GestureType::Combo, &self.combo),
            (GestureType::Ascii, &self.ascii),
            (GestureType::Click, &self.click),
            (GestureType::SwipeUp, &self.swipe_up),
            (GestureType::LongClick, &self.long_click),
            (GestureType::SwipeDown, &self.swipe_down),
            (GestureType::SwipeLeft, &self.swipe_left),
            (GestureType::SwipeRight, &self.swipe_right),
            (GestureType::Extra, &self.extra),
        ]
        .into_iter()
        .filter_map(|(g, b)| b.as_deref().map(|b| (g, b)))
    }

    /// A key without a tap binding only occupies space
    pub fn is_spacer(&self) -> bool {
        self.click.is_none()
    }
}

/// Layout file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub name: String,
    /// Default key width, percent of display width
    pub width: f32,
    /// Default key height, pixels
    pub height: i32,
    /// Horizontal gap between keys, pixels
    pub horizontal_gap: i32,
    /// Vertical gap between rows, pixels
    pub vertical_gap: i32,
    /// Maximum keys per row before wrapping
    pub columns: usize,
    /// Layout is intended for ASCII mode
    pub ascii_mode: bool,
    /// Label transform: "none" | "uppercase"
    pub label_transform: String,
    pub keys: Vec<KeyConfig>,
    pub preset_keys: HashMap<String, PresetKey>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            width: 10.0,
            height: 48,
            horizontal_gap: 4,
            vertical_gap: 4,
            columns: 30,
            ascii_mode: false,
            label_transform: "none".to_string(),
            keys: Vec::new(),
            preset_keys: HashMap::new(),
        }
    }
}

impl LayoutConfig {
    /// Parse and validate layout TOML
    pub fn parse(content: &str) -> std::result::Result<Self, LayoutError> {
        let layout: LayoutConfig = toml::from_str(content)?;
        if layout.keys.is_empty() {
            return Err(LayoutError::NoKeys(layout.name));
        }
        Ok(layout)
    }

    /// Load a layout file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read layout file: {}", path.display()))?;
        let layout = Self::parse(&content)
            .with_context(|| format!("Failed to parse layout file: {}", path.display()))?;
        Ok(layout)
    }

    /// Built-in QWERTY layout used when no layout file is configured
    pub fn builtin() -> Self {
        // The built-in layout is a compile-time constant covered by tests
        Self::parse(BUILTIN_LAYOUT).unwrap_or_default()
    }

    pub fn uppercase_labels(&self) -> bool {
        self.label_transform == "uppercase"
    }
}

/// Built-in layout
pub const BUILTIN_LAYOUT: &str = r#"
name = "qwerty"
width = 10.0
height = 48

[[keys]]
click = "q"
swipe_up = "1"
[[keys]]
click = "w"
swipe_up = "2"
[[keys]]
click = "e"
swipe_up = "3"
popup = "eéèêë"
[[keys]]
click = "r"
swipe_up = "4"
[[keys]]
click = "t"
swipe_up = "5"
[[keys]]
click = "y"
swipe_up = "6"
[[keys]]
click = "u"
swipe_up = "7"
popup = "uúùûü"
[[keys]]
click = "i"
swipe_up = "8"
[[keys]]
click = "o"
swipe_up = "9"
popup = "oóòôö"
[[keys]]
click = "p"
swipe_up = "0"

[[keys]]
width = 5.0
[[keys]]
click = "a"
swipe_up = "@"
popup = "aáàâäå"
[[keys]]
click = "s"
[[keys]]
click = "d"
[[keys]]
click = "f"
[[keys]]
click = "g"
[[keys]]
click = "h"
[[keys]]
click = "j"
[[keys]]
click = "k"
[[keys]]
click = "l"
[[keys]]
width = 5.0

[[keys]]
click = "Shift_L"
width = 15.0
[[keys]]
click = "z"
[[keys]]
click = "x"
[[keys]]
click = "c"
[[keys]]
click = "v"
[[keys]]
click = "b"
[[keys]]
click = "n"
[[keys]]
click = "m"
[[keys]]
click = "BackSpace"
width = 15.0

[[keys]]
click = "Control_L"
width = 15.0
[[keys]]
click = "comma"
[[keys]]
click = "space"
swipe_up = "Tab"
composing = "{Control+space}"
label = "space"
width = 50.0
[[keys]]
click = "period"
[[keys]]
click = "Return"
composing = "Return"
width = 15.0

[preset_keys.Shift_L]
label = "⇧"
send = "Shift_L"
shift_lock = "ascii_long"

[preset_keys.Control_L]
label = "Ctrl"
send = "Control_L"

[preset_keys.BackSpace]
label = "⌫"
send = "BackSpace"
repeatable = true

[preset_keys.Return]
label = "⏎"
send = "Return"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layout_parses() {
        let layout = LayoutConfig::parse(BUILTIN_LAYOUT).unwrap();
        assert_eq!(layout.name, "qwerty");
        assert_eq!(layout.keys.len(), 35);
        assert!(layout.preset_keys["BackSpace"].repeatable);
        assert!(layout.preset_keys["Return"].functional);
    }

    #[test]
    fn test_empty_layout_rejected() {
        let err = LayoutConfig::parse("name = \"empty\"").unwrap_err();
        assert!(matches!(err, LayoutError::NoKeys(name) if name == "empty"));
    }

    #[test]
    fn test_key_bindings_in_gesture_order() {
        let key = KeyConfig {
            click: Some("a".into()),
            swipe_up: Some("1".into()),
            composing: Some("b".into()),
            ..Default::default()
        };
        let gestures: Vec<_> = key.bindings().map(|(g, _)| g).collect();
        assert_eq!(
            gestures,
            vec![GestureType::Composing, GestureType::Click, GestureType::SwipeUp]
        );
        assert!(!key.is_spacer());
        assert!(KeyConfig::default().is_spacer());
    }
}
