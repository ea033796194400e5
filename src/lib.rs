//! keytouch - touch-to-key dispatch for software keyboards
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Touch source (down/move/up)       │
//! ├──────────────────────────────────────────┤
//! │  Keyboard (keys, grid)  ←  Layout TOML   │
//! │              ↓                           │
//! │  Dispatcher (sessions, timers, chords)   │
//! │              ↓                           │
//! │  KeyboardActionListener  →  Engine       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! The dispatcher owns no clock and no thread. Callers feed
//! [`dispatch::TouchEvent`]s with their timestamps and call
//! [`dispatch::Dispatcher::poll_timers`] when
//! [`dispatch::Dispatcher::next_timer_due`] comes around.

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod keyboard;
pub mod trace;

pub use config::{Config, LayoutConfig, TouchConfig};
pub use dispatch::{
    Dispatcher, Engine, EngineBridge, KeyAction, KeyboardActionListener, TouchAction, TouchEvent,
};
pub use error::{LayoutError, TraceError};
pub use keyboard::{EngineState, Event, GestureType, Key, Keyboard, Modifiers};
