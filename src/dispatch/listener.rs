//! Dispatch output
//!
//! The dispatcher reports everything through [`KeyboardActionListener`]:
//! emitted key actions, press/release feedback, preview and popup
//! changes, and redraw requests. [`EngineBridge`] adapts a listener onto
//! an input [`Engine`] plus optional [`Effects`] (sound / haptics).

use log::{debug, warn};
use smol_str::SmolStr;

use crate::geometry::Rect;
use crate::keyboard::{EngineState, Event, GestureType, Modifiers};

/// One emitted key action
#[derive(Debug, Clone, PartialEq)]
pub struct KeyAction {
    pub event: Event,
    /// Active modifiers at emission, merged with the event's own mask
    pub mask: Modifiers,
    pub gesture: GestureType,
    /// Index of the key on the keyboard that produced it
    pub key: usize,
    /// Nearby key codes (proximity correction only)
    pub nearby: Vec<i32>,
}

impl KeyAction {
    pub fn code(&self) -> i32 {
        self.event.code()
    }

    pub fn text(&self) -> Option<&str> {
        self.event.text_value()
    }
}

/// Region to redraw, in keyboard coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Keys(Vec<Rect>),
    All,
}

/// Key preview bubble
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Show { key: usize, label: SmolStr, rect: Rect },
    Hide,
}

/// Long-press popup keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupEvent {
    /// Popup opened for `key`, at `bounds` (keyboard coordinates)
    Opened { key: usize, bounds: Rect },
    Dismissed,
}

/// Receiver of dispatch results
pub trait KeyboardActionListener {
    /// Engine state used to resolve bindings
    fn engine_state(&self) -> EngineState {
        EngineState::default()
    }

    /// A finger went down on a key (`code` 0 off-key)
    fn on_press(&mut self, _code: i32) {}

    /// A key action finished
    fn on_release(&mut self, _code: i32) {}

    fn on_event(&mut self, action: &KeyAction);

    /// Text to commit directly
    fn on_text(&mut self, _text: &str) {}

    /// A chord, in pointer-down order
    fn on_combo(&mut self, actions: &[KeyAction]) {
        for action in actions {
            self.on_event(action);
        }
    }

    fn on_preview(&mut self, _preview: &Preview) {}

    fn on_popup(&mut self, _popup: &PopupEvent) {}

    fn invalidate(&mut self, _region: &Invalidation) {}
}

/// Input engine consuming key codes and text
pub trait Engine {
    fn query_state(&self) -> EngineState;

    /// Process a key; returns false if the engine did not handle it
    fn dispatch(&mut self, code: i32, mask: Modifiers) -> bool;

    fn commit_text(&mut self, text: &str) -> bool;
}

/// Press feedback (sound, vibration)
pub trait Effects {
    fn on_press(&mut self, code: i32) -> anyhow::Result<()>;

    fn on_release(&mut self, _code: i32) -> anyhow::Result<()> {
        Ok(())
    }
}

/// No feedback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEffects;

impl Effects for NoEffects {
    fn on_press(&mut self, _code: i32) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Listener forwarding key actions to an engine.
///
/// Feedback failures are logged and never affect dispatch.
pub struct EngineBridge<E, F = NoEffects> {
    pub engine: E,
    pub effects: F,
}

impl<E: Engine> EngineBridge<E, NoEffects> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            effects: NoEffects,
        }
    }
}

impl<E: Engine, F: Effects> EngineBridge<E, F> {
    pub fn with_effects(engine: E, effects: F) -> Self {
        Self { engine, effects }
    }
}

impl<E: Engine, F: Effects> KeyboardActionListener for EngineBridge<E, F> {
    fn engine_state(&self) -> EngineState {
        self.engine.query_state()
    }

    fn on_press(&mut self, code: i32) {
        if let Err(e) = self.effects.on_press(code) {
            warn!("Press feedback failed: {}", e);
        }
    }

    fn on_release(&mut self, code: i32) {
        if let Err(e) = self.effects.on_release(code) {
            warn!("Release feedback failed: {}", e);
        }
    }

    fn on_event(&mut self, action: &KeyAction) {
        if let Some(command) = action.event.command() {
            debug!("Key command '{}' has no engine handler", command);
        }
        match action.text() {
            Some(text) if action.code() == 0 => self.on_text(text),
            _ => {
                if !self.engine.dispatch(action.code(), action.mask) {
                    debug!("Engine ignored key {} (mask {:?})", action.code(), action.mask);
                }
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        if !self.engine.commit_text(text) {
            debug!("Engine rejected text {:?}", text);
        }
    }
}
