//! Keys
//!
//! A [`Key`] is one rectangle on the keyboard with a binding per gesture
//! type. Which binding fires depends on the gesture and on the engine's
//! current state (composing, paging, ASCII mode); see [`Key::event_for`].

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::event::{Event, LockPolicy, Modifiers};
use crate::geometry::{EdgeFlags, Point, Rect};

/// Gesture kinds a key can bind.
///
/// Declaration order matters: variants before [`GestureType::Combo`] are
/// engine-state bindings (consulted only when the key sends bindings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureType {
    Composing,
    HasMenu,
    Paging,
    Combo,
    Ascii,
    Click,
    SwipeUp,
    LongClick,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
    Extra,
}

impl GestureType {
    pub const COUNT: usize = 12;

    pub const ALL: [GestureType; GestureType::COUNT] = [
        GestureType::Composing,
        GestureType::HasMenu,
        GestureType::Paging,
        GestureType::Combo,
        GestureType::Ascii,
        GestureType::Click,
        GestureType::SwipeUp,
        GestureType::LongClick,
        GestureType::SwipeDown,
        GestureType::SwipeLeft,
        GestureType::SwipeRight,
        GestureType::Extra,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Engine-state binding (composing / has-menu / paging)
    pub fn is_state_binding(self) -> bool {
        self < GestureType::Combo
    }

    pub fn is_swipe(self) -> bool {
        matches!(
            self,
            GestureType::SwipeUp
                | GestureType::SwipeDown
                | GestureType::SwipeLeft
                | GestureType::SwipeRight
        )
    }
}

/// Snapshot of the input engine's state, queried per dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineState {
    /// Engine holds uncommitted input
    pub composing: bool,
    /// Candidate list has more than one page
    pub paging: bool,
    /// Candidate menu is visible
    pub has_menu: bool,
    /// Engine passes keys through as plain ASCII
    pub ascii_mode: bool,
}

/// Visual state of a key, for the renderer to map onto a drawable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVisualState {
    Normal,
    Pressed,
    /// Sticky / modifier key, latched
    NormalOn,
    PressedOn,
    /// Sticky / modifier key, not latched
    NormalOff,
    PressedOff,
}

/// One key on a keyboard
#[derive(Debug, Clone)]
pub struct Key {
    pub(crate) rect: Rect,
    pub(crate) edge_flags: EdgeFlags,
    pub(crate) gap: i32,
    pub(crate) row: usize,
    pub(crate) column: usize,
    events: [Option<Event>; GestureType::COUNT],
    send_bindings: bool,
    label: Option<SmolStr>,
    hint: Option<SmolStr>,
    popup: Option<SmolStr>,
    pressed: bool,
    on: bool,
}

impl Key {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            edge_flags: EdgeFlags::empty(),
            gap: 0,
            row: 0,
            column: 0,
            events: Default::default(),
            send_bindings: false,
            label: None,
            hint: None,
            popup: None,
            pressed: false,
            on: false,
        }
    }

    /// Bind an event to a gesture.
    ///
    /// Binding any engine-state gesture turns on binding sends, unless
    /// overridden afterwards with [`Key::with_send_bindings`].
    pub fn with_event(mut self, gesture: GestureType, event: Event) -> Self {
        if gesture.is_state_binding() {
            self.send_bindings = true;
        }
        self.events[gesture.index()] = Some(event);
        self
    }

    pub fn with_send_bindings(mut self, send: bool) -> Self {
        self.send_bindings = send;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(SmolStr::new(label));
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(SmolStr::new(hint));
        self
    }

    /// Characters offered by the long-press popup
    pub fn with_popup(mut self, characters: &str) -> Self {
        if !characters.is_empty() {
            self.popup = Some(SmolStr::new(characters));
        }
        self
    }

    pub fn with_gap(mut self, gap: i32) -> Self {
        self.gap = gap;
        self
    }

    // ========================================================================
    // Geometry
    // ========================================================================

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn edge_flags(&self) -> EdgeFlags {
        self.edge_flags
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Hit test, extending edge keys to the keyboard border
    pub fn is_inside(&self, p: Point) -> bool {
        self.rect.contains_with_edges(p, self.edge_flags)
    }

    pub fn squared_distance_from(&self, p: Point) -> i64 {
        self.rect.squared_distance_from(p)
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Raw binding for a gesture, with no fallback
    pub fn event(&self, gesture: GestureType) -> Option<&Event> {
        self.events[gesture.index()].as_ref()
    }

    pub fn has_event(&self, gesture: GestureType) -> bool {
        self.events[gesture.index()].is_some()
    }

    pub fn click(&self) -> Option<&Event> {
        self.event(GestureType::Click)
    }

    pub fn long_click(&self) -> Option<&Event> {
        self.event(GestureType::LongClick)
    }

    /// Key code of the tap binding (0 when unbound)
    pub fn code(&self) -> i32 {
        self.click().map(|e| e.code()).unwrap_or_default()
    }

    /// Resolve the event for a gesture under the engine's state.
    ///
    /// 1. an explicit binding for a non-tap gesture
    /// 2. the ASCII binding while the engine is in ASCII mode
    /// 3. paging / has-menu / composing bindings, when the key sends bindings
    /// 4. the tap binding
    pub fn event_for(&self, gesture: GestureType, state: &EngineState) -> Option<&Event> {
        if gesture != GestureType::Click {
            if let Some(event) = self.event(gesture) {
                return Some(event);
            }
        }
        if state.ascii_mode {
            if let Some(event) = self.event(GestureType::Ascii) {
                return Some(event);
            }
        }
        if self.send_bindings {
            let candidates = [
                (state.paging, GestureType::Paging),
                (state.has_menu, GestureType::HasMenu),
                (state.composing, GestureType::Composing),
            ];
            for (active, g) in candidates {
                if active {
                    if let Some(event) = self.event(g) {
                        return Some(event);
                    }
                }
            }
        }
        self.click()
    }

    /// Whether the gesture resolves to a binding other than the tap.
    ///
    /// A modifier key that does not send a binding toggles its modifier
    /// instead of emitting.
    pub fn sends_binding(&self, gesture: GestureType, state: &EngineState) -> bool {
        if gesture != GestureType::Click && self.has_event(gesture) {
            return true;
        }
        if state.ascii_mode && self.has_event(GestureType::Ascii) {
            return false;
        }
        self.send_bindings
            && ((state.paging && self.has_event(GestureType::Paging))
                || (state.has_menu && self.has_event(GestureType::HasMenu))
                || (state.composing && self.has_event(GestureType::Composing)))
    }

    /// Key has a binding that only applies while the engine composes
    pub fn has_state_bindings(&self) -> bool {
        GestureType::ALL
            .iter()
            .any(|g| g.is_state_binding() && self.has_event(*g))
    }

    /// Label to draw: the explicit key label, else the resolved binding's
    pub fn label(&self, state: &EngineState, modifiers: Modifiers, upper: bool) -> SmolStr {
        let event = self.event_for(GestureType::Click, state);
        let uses_click = match (event, self.click()) {
            (Some(resolved), Some(click)) => std::ptr::eq(resolved, click),
            _ => true,
        };
        match (&self.label, event) {
            (Some(label), _) if uses_click => label.clone(),
            (_, Some(event)) => event.label_for(modifiers, upper),
            (Some(label), None) => label.clone(),
            (None, None) => SmolStr::default(),
        }
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Long-press popup characters
    pub fn popup_characters(&self) -> Option<&str> {
        self.popup.as_deref()
    }

    // ========================================================================
    // Modifier / flags
    // ========================================================================

    /// Tap binding sends a modifier key code
    pub fn is_modifier(&self) -> bool {
        self.click().map(|e| e.is_modifier()).unwrap_or(false)
    }

    /// Modifier bit this key toggles (empty for ordinary keys)
    pub fn modifier_mask(&self) -> Modifiers {
        Modifiers::from_keycode(self.code())
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.click().map(|e| e.shift_lock()).unwrap_or_default()
    }

    pub fn is_repeatable(&self) -> bool {
        self.click().map(|e| e.is_repeatable()).unwrap_or(false)
    }

    pub fn is_sticky(&self) -> bool {
        self.click().map(|e| e.is_sticky()).unwrap_or(false)
    }

    /// Key is shown as on/off (sticky or modifier)
    pub fn is_toggle(&self) -> bool {
        self.is_sticky() || self.is_modifier()
    }

    // ========================================================================
    // Press state
    // ========================================================================

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn on_pressed(&mut self) {
        self.pressed = true;
    }

    /// Release the key; `inside` is false when the finger slid off.
    ///
    /// Sticky keys toggle only on a release that stayed on the key.
    pub fn on_released(&mut self, inside: bool) {
        self.pressed = false;
        if inside && self.is_sticky() {
            self.on = !self.on;
        }
    }

    pub fn set_on(&mut self, on: bool) {
        self.on = on;
    }

    pub fn visual_state(&self) -> KeyVisualState {
        match (self.is_toggle(), self.on, self.pressed) {
            (false, _, false) => KeyVisualState::Normal,
            (false, _, true) => KeyVisualState::Pressed,
            (true, true, false) => KeyVisualState::NormalOn,
            (true, true, true) => KeyVisualState::PressedOn,
            (true, false, false) => KeyVisualState::NormalOff,
            (true, false, true) => KeyVisualState::PressedOff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::keycode::*;

    fn composing_key() -> Key {
        Key::new(Rect::new(0, 0, 10, 10))
            .with_event(GestureType::Click, Event::key(KEYCODE_SPACE))
            .with_event(GestureType::Composing, Event::key(KEYCODE_ENTER))
            .with_event(GestureType::Paging, Event::key(KEYCODE_PAGE_DOWN))
            .with_event(GestureType::Ascii, Event::text("ascii"))
            .with_event(GestureType::SwipeUp, Event::text("Tab"))
    }

    #[test]
    fn test_gesture_order() {
        assert!(GestureType::Composing < GestureType::HasMenu);
        assert!(GestureType::Paging < GestureType::Combo);
        assert!(GestureType::Click < GestureType::SwipeUp);
        assert!(GestureType::SwipeUp < GestureType::LongClick);
        assert_eq!(GestureType::ALL.len(), GestureType::COUNT);
        for (i, g) in GestureType::ALL.iter().enumerate() {
            assert_eq!(g.index(), i);
        }
    }

    #[test]
    fn test_event_for_resolution_order() {
        let key = composing_key();
        let idle = EngineState::default();
        assert_eq!(key.event_for(GestureType::Click, &idle).unwrap().code(), KEYCODE_SPACE);

        let composing = EngineState {
            composing: true,
            ..Default::default()
        };
        assert_eq!(
            key.event_for(GestureType::Click, &composing).unwrap().code(),
            KEYCODE_ENTER
        );

        let paging = EngineState {
            composing: true,
            paging: true,
            ..Default::default()
        };
        assert_eq!(
            key.event_for(GestureType::Click, &paging).unwrap().code(),
            KEYCODE_PAGE_DOWN
        );

        let ascii = EngineState {
            composing: true,
            ascii_mode: true,
            ..Default::default()
        };
        assert_eq!(
            key.event_for(GestureType::Click, &ascii).unwrap().text_value(),
            Some("ascii")
        );

        // Explicit swipe binding wins over everything
        assert_eq!(
            key.event_for(GestureType::SwipeUp, &paging).unwrap().text_value(),
            Some("Tab")
        );
        // Missing swipe binding falls back
        assert_eq!(
            key.event_for(GestureType::SwipeDown, &idle).unwrap().code(),
            KEYCODE_SPACE
        );
    }

    #[test]
    fn test_send_bindings_disabled() {
        let key = composing_key().with_send_bindings(false);
        let composing = EngineState {
            composing: true,
            ..Default::default()
        };
        assert_eq!(
            key.event_for(GestureType::Click, &composing).unwrap().code(),
            KEYCODE_SPACE
        );
    }

    #[test]
    fn test_unbound_key_has_no_event() {
        let key = Key::new(Rect::new(0, 0, 10, 10));
        assert!(key.event_for(GestureType::Click, &EngineState::default()).is_none());
        assert_eq!(key.code(), 0);
    }

    #[test]
    fn test_modifier_key() {
        let shift = Key::new(Rect::new(0, 0, 10, 10)).with_event(
            GestureType::Click,
            Event::key(KEYCODE_SHIFT_LEFT).with_shift_lock(LockPolicy::OnClick),
        );
        assert!(shift.is_modifier());
        assert_eq!(shift.modifier_mask(), Modifiers::SHIFT);
        assert_eq!(shift.lock_policy(), LockPolicy::OnClick);
        assert!(!shift.sends_binding(GestureType::Click, &EngineState::default()));
        assert_eq!(shift.visual_state(), KeyVisualState::NormalOff);
    }

    #[test]
    fn test_sticky_toggles_only_inside() {
        let mut key = Key::new(Rect::new(0, 0, 10, 10))
            .with_event(GestureType::Click, Event::key(KEYCODE_A).with_sticky(true));
        key.on_pressed();
        assert_eq!(key.visual_state(), KeyVisualState::PressedOff);
        key.on_released(false);
        assert!(!key.is_on());
        key.on_pressed();
        key.on_released(true);
        assert!(key.is_on());
        assert_eq!(key.visual_state(), KeyVisualState::NormalOn);
    }

    #[test]
    fn test_label_prefers_key_label_for_click() {
        let key = composing_key().with_label("space");
        assert_eq!(key.label(&EngineState::default(), Modifiers::empty(), false), "space");
        let composing = EngineState {
            composing: true,
            ..Default::default()
        };
        assert_eq!(key.label(&composing, Modifiers::empty(), false), "Return");
    }
}
