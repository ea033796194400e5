//! Keyboard model
//!
//! Keys, their per-gesture events, the keyboard layout with its spatial
//! lookup grid, and modifier state.

mod event;
mod key;
pub mod keycode;
mod layout;
mod modifier;

pub use event::{Event, LockPolicy, Modifiers};
pub use key::{EngineState, GestureType, Key, KeyVisualState};
pub use layout::{KeyHit, Keyboard};
pub use modifier::ModifierState;
