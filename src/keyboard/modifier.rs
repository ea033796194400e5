//! Modifier state
//!
//! Tracks which modifiers are active for the next emitted key. A bit is
//! either one-shot (cleared after the next non-modifier emission) or
//! latched (survives until toggled off).

use super::event::Modifiers;

/// Active modifier bits, split into one-shot and latched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    one_shot: Modifiers,
    latched: Modifiers,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modifiers applied to the next emitted key
    pub fn active(&self) -> Modifiers {
        self.one_shot | self.latched
    }

    pub fn contains(&self, m: Modifiers) -> bool {
        self.active().contains(m)
    }

    pub fn is_latched(&self, m: Modifiers) -> bool {
        self.latched.contains(m)
    }

    /// Handle a tap on a modifier key.
    ///
    /// With `latch`, the tap toggles the latched bit. Otherwise it
    /// unlatches and toggles the one-shot bit.
    pub fn click(&mut self, m: Modifiers, latch: bool) {
        if latch {
            let on = !self.latched.contains(m);
            self.latched.set(m, on);
            self.one_shot.remove(m);
        } else {
            let was_active = self.contains(m);
            self.latched.remove(m);
            self.one_shot.set(m, !was_active);
        }
    }

    /// Latch or unlatch a bit (long-press lock)
    pub fn latch(&mut self, m: Modifiers, on: bool) {
        self.latched.set(m, on);
        self.one_shot.remove(m);
    }

    /// Force a one-shot bit on or off
    pub fn set(&mut self, m: Modifiers, on: bool) {
        self.one_shot.set(m, on);
        if !on {
            self.latched.remove(m);
        }
    }

    /// Clear one-shot bits after an emission; returns whether anything changed
    pub fn refresh(&mut self) -> bool {
        let changed = !self.one_shot.is_empty();
        self.one_shot = Modifiers::empty();
        changed
    }

    /// Clear everything (keyboard switch)
    pub fn clear(&mut self) -> bool {
        let changed = !self.active().is_empty();
        *self = Self::default();
        changed
    }

    /// Exactly Shift is active
    pub fn is_only_shift(&self) -> bool {
        self.active() == Modifiers::SHIFT
    }
}
