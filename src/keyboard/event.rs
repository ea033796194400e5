//! Key events
//!
//! An [`Event`] is the immutable unit of output a key produces for one
//! gesture: a key code with modifier mask, or a text string, plus the
//! display attributes (label, preview) and behaviour flags (sticky,
//! repeatable) that the dispatcher consults.
//!
//! Events are built from layout binding strings:
//!
//! ```text
//! {Control+a}   send Ctrl+A
//! Return        preset key (if defined by the layout) or named key
//! q             key code for `q`
//! hello         literal text "hello"
//! (empty)       void key
//! ```

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::keycode;
use crate::config::PresetKey;
use crate::constants::VOID_KEY_CODE;

bitflags! {
    /// Modifier mask sent with a key code.
    ///
    /// Bit values match the Android meta state so engines can pass the
    /// mask through unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 0x0000_0001;
        const ALT   = 0x0000_0002;
        const SYM   = 0x0000_0004;
        const CTRL  = 0x0000_1000;
        const META  = 0x0001_0000;
    }
}

impl Modifiers {
    /// Modifier bit controlled by a modifier key code
    pub fn from_keycode(code: i32) -> Modifiers {
        match code {
            keycode::KEYCODE_SHIFT_LEFT | keycode::KEYCODE_SHIFT_RIGHT => Modifiers::SHIFT,
            keycode::KEYCODE_CTRL_LEFT | keycode::KEYCODE_CTRL_RIGHT => Modifiers::CTRL,
            keycode::KEYCODE_ALT_LEFT | keycode::KEYCODE_ALT_RIGHT => Modifiers::ALT,
            keycode::KEYCODE_META_LEFT | keycode::KEYCODE_META_RIGHT => Modifiers::META,
            keycode::KEYCODE_SYM => Modifiers::SYM,
            _ => Modifiers::empty(),
        }
    }

    /// Modifier bit for a name used in `{Mod+key}` bindings
    fn from_binding_name(name: &str) -> Option<Modifiers> {
        match name {
            "Shift" | "Shift_L" | "Shift_R" => Some(Modifiers::SHIFT),
            "Control" | "Control_L" | "Control_R" => Some(Modifiers::CTRL),
            "Alt" | "Alt_L" | "Alt_R" => Some(Modifiers::ALT),
            "Meta" | "Meta_L" | "Meta_R" => Some(Modifiers::META),
            "Sym" => Some(Modifiers::SYM),
            _ => None,
        }
    }
}

/// How a modifier key latches.
///
/// Layout value of the `shift_lock` preset attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Tap is one-shot, long-press does nothing special
    #[default]
    None,
    /// Tap is one-shot, long-press latches
    #[serde(rename = "long")]
    OnLongPress,
    /// Tap latches
    #[serde(rename = "click")]
    OnClick,
    /// Tap latches unless the engine is in ASCII mode, where long-press latches
    #[serde(rename = "ascii_long")]
    OnClickUnlessAsciiMode,
}

impl LockPolicy {
    /// Parse the layout attribute; unknown values mean no locking
    pub fn parse(s: &str) -> LockPolicy {
        match s {
            "long" => LockPolicy::OnLongPress,
            "click" => LockPolicy::OnClick,
            "ascii_long" => LockPolicy::OnClickUnlessAsciiMode,
            _ => LockPolicy::None,
        }
    }

    /// Whether a tap latches the modifier
    pub fn latches_on_click(self, ascii_mode: bool) -> bool {
        match self {
            LockPolicy::OnClick => true,
            LockPolicy::OnClickUnlessAsciiMode => !ascii_mode,
            LockPolicy::None | LockPolicy::OnLongPress => false,
        }
    }

    /// Whether a long-press latches the modifier
    pub fn latches_on_long_press(self, ascii_mode: bool) -> bool {
        match self {
            LockPolicy::OnLongPress => true,
            LockPolicy::OnClickUnlessAsciiMode => ascii_mode,
            LockPolicy::None | LockPolicy::OnClick => false,
        }
    }
}

/// Output of one key gesture.
///
/// Immutable once built; the keyboard shares events between gestures by
/// cloning (all strings are inline `SmolStr`s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    code: i32,
    mask: Modifiers,
    text: Option<SmolStr>,
    label: SmolStr,
    shift_label: Option<SmolStr>,
    preview: Option<SmolStr>,
    command: Option<SmolStr>,
    sticky: bool,
    repeatable: bool,
    functional: bool,
    shift_lock: LockPolicy,
}

impl Event {
    /// Event sending a bare key code
    pub fn key(code: i32) -> Event {
        Self::key_with_mask(code, Modifiers::empty())
    }

    /// Event sending a key code with a modifier mask
    pub fn key_with_mask(code: i32, mask: Modifiers) -> Event {
        let label = keycode::display_label(code);
        let shift_label = keycode::shifted_char_of(code)
            .filter(|c| c.to_string() != label)
            .map(|c| SmolStr::new(c.to_string()));
        Event {
            code,
            mask,
            text: None,
            label: SmolStr::new(label),
            shift_label,
            preview: None,
            command: None,
            sticky: false,
            repeatable: false,
            functional: true,
            shift_lock: LockPolicy::None,
        }
    }

    /// Event committing literal text
    pub fn text(text: &str) -> Event {
        Event {
            code: VOID_KEY_CODE,
            mask: Modifiers::empty(),
            text: Some(SmolStr::new(text)),
            label: SmolStr::new(strip_braces(text)),
            shift_label: None,
            preview: None,
            command: None,
            sticky: false,
            repeatable: false,
            functional: true,
            shift_lock: LockPolicy::None,
        }
    }

    /// Event that does nothing (layout spacer binding)
    pub fn void() -> Event {
        let mut event = Event::key(VOID_KEY_CODE);
        event.label = SmolStr::default();
        event
    }

    /// Parse a layout binding string.
    ///
    /// Resolution order: `{Mod+key}` send syntax, layout preset, key name,
    /// literal text. The empty string is a void key.
    pub fn parse(s: &str, presets: &HashMap<String, PresetKey>) -> Event {
        if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            if !inner.is_empty() && !inner.contains(|c: char| c == '{' || c == '}') {
                if let Some((code, mask)) = parse_send(inner) {
                    return Event::key_with_mask(code, mask);
                }
            }
        }

        if let Some(preset) = presets.get(s) {
            return Event::from_preset(s, preset);
        }

        if s.is_empty() {
            return Event::void();
        }

        match keycode::code_of(s) {
            Some(code) => Event::key(code),
            None => Event::text(s),
        }
    }

    /// Build the event described by a layout preset
    pub fn from_preset(name: &str, preset: &PresetKey) -> Event {
        let (code, mask) = preset
            .send
            .as_deref()
            .and_then(parse_send)
            .unwrap_or((VOID_KEY_CODE, Modifiers::empty()));

        let mut event = Event::key_with_mask(code, mask);

        event.text = match &preset.text {
            Some(text) => Some(SmolStr::new(text)),
            // A preset that resolves to nothing commits its own name
            None if code == VOID_KEY_CODE && preset.command.is_none() => Some(SmolStr::new(name)),
            None => None,
        };
        event.label = match (&preset.label, &event.text) {
            (Some(label), _) => SmolStr::new(label),
            (None, Some(text)) if code == VOID_KEY_CODE => SmolStr::new(strip_braces(text)),
            _ => event.label,
        };
        if preset.label.is_some() {
            event.shift_label = None;
        }
        event.preview = preset.preview.as_deref().map(SmolStr::new);
        event.command = preset.command.as_deref().map(SmolStr::new);
        event.sticky = preset.sticky;
        event.repeatable = preset.repeatable;
        event.functional = preset.functional;
        event.shift_lock = preset
            .shift_lock
            .as_deref()
            .map(LockPolicy::parse)
            .unwrap_or_default();
        event
    }

    pub fn with_label(mut self, label: &str) -> Event {
        self.label = SmolStr::new(label);
        self.shift_label = None;
        self
    }

    pub fn with_preview(mut self, preview: &str) -> Event {
        self.preview = Some(SmolStr::new(preview));
        self
    }

    pub fn with_repeatable(mut self, repeatable: bool) -> Event {
        self.repeatable = repeatable;
        self
    }

    pub fn with_sticky(mut self, sticky: bool) -> Event {
        self.sticky = sticky;
        self
    }

    pub fn with_shift_lock(mut self, policy: LockPolicy) -> Event {
        self.shift_lock = policy;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn mask(&self) -> Modifiers {
        self.mask
    }

    /// Text committed instead of a key code, if any
    pub fn text_value(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Label under the given modifier state.
    ///
    /// With Shift active the shifted label is used; `upper` uppercases
    /// single-letter labels (layouts with an uppercase label transform).
    pub fn label_for(&self, modifiers: Modifiers, upper: bool) -> SmolStr {
        let shifted = (modifiers | self.mask).contains(Modifiers::SHIFT);
        let label = match (&self.shift_label, shifted) {
            (Some(shift_label), true) => shift_label.clone(),
            _ => self.label.clone(),
        };
        if (shifted || upper) && label.chars().count() == 1 {
            SmolStr::new(label.to_uppercase())
        } else {
            label
        }
    }

    /// Preview text (falls back to the label)
    pub fn preview(&self) -> &str {
        self.preview.as_deref().unwrap_or(&self.label)
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn is_sticky(&self) -> bool {
        self.sticky
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub fn shift_lock(&self) -> LockPolicy {
        self.shift_lock
    }

    /// Binding that produces nothing
    pub fn is_void(&self) -> bool {
        self.code == VOID_KEY_CODE && self.text.is_none() && self.command.is_none()
    }

    /// Whether this event sends a modifier key code
    pub fn is_modifier(&self) -> bool {
        keycode::is_modifier(self.code)
    }
}

/// Parse `Mod+Mod+key` into (code, mask).
///
/// Returns `None` when the final component is not a known key and no
/// modifier was named.
fn parse_send(s: &str) -> Option<(i32, Modifiers)> {
    let mut mask = Modifiers::empty();
    let mut parts = s.split('+').peekable();
    let mut code = None;

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            code = keycode::code_of(part);
            if code.is_none() {
                if let Some(m) = Modifiers::from_binding_name(part) {
                    // `{Shift}` alone sends the modifier key itself
                    mask |= m;
                    code = keycode::code_of(part).or(Some(VOID_KEY_CODE));
                }
            }
        } else if let Some(m) = Modifiers::from_binding_name(part) {
            mask |= m;
        } else {
            return None;
        }
    }

    match code {
        Some(code) if code != VOID_KEY_CODE || !mask.is_empty() => Some((code, mask)),
        _ => None,
    }
}

/// Remove `{...}` markup from a display label
fn strip_braces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}
