//! Touch sessions
//!
//! One [`TouchSession`] follows a single pointer from down to up. It
//! records which key the finger is on, how long it dwelt there (for
//! slide-over debounce), the motion samples for swipe detection, and the
//! timers armed on its behalf.

use serde::{Deserialize, Serialize};

use super::swipe::SwipeTracker;
use super::timer::CancelHandle;
use crate::constants::DEBOUNCE_TIME_MS;
use crate::geometry::Point;

/// Pointer identifier supplied by the touch source
pub type PointerId = u32;

/// Touch action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TouchAction {
    Down,
    Move,
    Up,
    Cancel,
}

/// One raw touch event in keyboard coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub pointer: PointerId,
    pub action: TouchAction,
    pub x: f32,
    pub y: f32,
    /// Event time, milliseconds
    pub time: u64,
}

impl TouchEvent {
    pub fn new(pointer: PointerId, action: TouchAction, x: f32, y: f32, time: u64) -> Self {
        Self {
            pointer,
            action,
            x,
            y,
            time,
        }
    }

    pub fn point(&self) -> Point {
        Point::from_f32(self.x, self.y)
    }
}

/// Phase of a touch session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchSessionState {
    /// No session for the pointer
    Idle,
    /// Finger down, nothing armed
    Down,
    /// Long-press (and possibly repeat) timer armed
    LongPressArmed,
    /// Finger moved off its first key or past the swipe travel
    Moving,
    /// Held repeatable key has fired `repeats` times
    Repeating { repeats: u32 },
    /// Part of a multi-finger chord
    ComboAccumulating,
    /// Lifted
    Released,
    /// Gesture consumed (long-press, keyboard switch); emits nothing more
    Aborted,
}

/// Timers armed for a session
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionTimers {
    pub long_press: Option<CancelHandle>,
    pub repeat: Option<CancelHandle>,
}

/// Per-pointer gesture state
#[derive(Debug, Clone)]
pub struct TouchSession {
    pointer: PointerId,
    /// Monotonic per dispatcher; stale timers compare against it
    generation: u64,
    state: TouchSessionState,
    fast_input: bool,

    down_time: u64,
    down_x: f32,
    down_y: f32,
    down_key: Option<usize>,

    /// Key under the finger and dwell time on it
    current_key: Option<usize>,
    current_key_time: u64,
    /// Previous key and dwell time on it
    last_key: Option<usize>,
    last_key_time: u64,
    last_move_time: u64,

    /// Key drawn as pressed
    pub(crate) pressed_key: Option<usize>,
    /// Repeatable key held by this session
    pub(crate) repeat_key: Option<usize>,
    repeats: u32,
    moved: bool,
    swipe_pending: bool,

    pub(crate) nearby: Vec<i32>,
    pub(crate) swipe: SwipeTracker,
    pub(crate) timers: SessionTimers,
}

impl TouchSession {
    pub(crate) fn new(ev: &TouchEvent, generation: u64, key: Option<usize>, nearby: Vec<i32>) -> Self {
        let mut swipe = SwipeTracker::new();
        swipe.add_point(ev.x, ev.y, ev.time);
        Self {
            pointer: ev.pointer,
            generation,
            state: TouchSessionState::Down,
            fast_input: false,
            down_time: ev.time,
            down_x: ev.x,
            down_y: ev.y,
            down_key: key,
            current_key: key,
            current_key_time: 0,
            last_key: None,
            last_key_time: 0,
            last_move_time: ev.time,
            pressed_key: None,
            repeat_key: None,
            repeats: 0,
            moved: false,
            swipe_pending: false,
            nearby,
            swipe,
            timers: SessionTimers::default(),
        }
    }

    pub fn pointer(&self) -> PointerId {
        self.pointer
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> TouchSessionState {
        self.state
    }

    pub fn down_time(&self) -> u64 {
        self.down_time
    }

    pub fn down_key(&self) -> Option<usize> {
        self.down_key
    }

    pub fn current_key(&self) -> Option<usize> {
        self.current_key
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }

    pub fn is_fast_input(&self) -> bool {
        self.fast_input
    }

    pub(crate) fn set_fast_input(&mut self, fast: bool) {
        self.fast_input = fast;
    }

    /// Still able to emit on its own (not chorded, aborted or released)
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            TouchSessionState::Down
                | TouchSessionState::LongPressArmed
                | TouchSessionState::Moving
                | TouchSessionState::Repeating { .. }
        )
    }

    pub fn is_combo(&self) -> bool {
        self.state == TouchSessionState::ComboAccumulating
    }

    pub fn is_aborted(&self) -> bool {
        self.state == TouchSessionState::Aborted
    }

    pub fn is_swipe_pending(&self) -> bool {
        self.swipe_pending
    }

    pub(crate) fn abort(&mut self) {
        self.state = TouchSessionState::Aborted;
        self.repeat_key = None;
    }

    /// Abort and drop key references (keyboard replaced underneath)
    pub(crate) fn detach(&mut self) {
        self.abort();
        self.down_key = None;
        self.current_key = None;
        self.last_key = None;
        self.pressed_key = None;
    }

    pub(crate) fn enter_combo(&mut self) {
        if self.is_active() {
            self.state = TouchSessionState::ComboAccumulating;
            self.repeat_key = None;
        }
    }

    pub(crate) fn mark_swipe_pending(&mut self) {
        self.swipe_pending = true;
        self.moved = true;
    }

    pub(crate) fn record_repeat(&mut self) {
        self.repeats += 1;
        self.state = TouchSessionState::Repeating {
            repeats: self.repeats,
        };
    }

    pub(crate) fn release(&mut self) {
        self.state = TouchSessionState::Released;
    }

    /// Recompute the phase after timers or position changed
    pub(crate) fn settle(&mut self) {
        if !matches!(
            self.state,
            TouchSessionState::Down | TouchSessionState::LongPressArmed | TouchSessionState::Moving
        ) {
            return;
        }
        self.state = if self.timers.long_press.is_some() || self.timers.repeat.is_some() {
            TouchSessionState::LongPressArmed
        } else if self.moved {
            TouchSessionState::Moving
        } else {
            TouchSessionState::Down
        };
    }

    /// Displacement from the down point
    pub fn delta(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.down_x, y - self.down_y)
    }

    /// Track a move onto `key` at `time`.
    ///
    /// Returns true when the tracked key changed. Gaps between keys keep
    /// the previous key, and a repeating key stays pinned.
    pub(crate) fn track_move(&mut self, key: Option<usize>, time: u64) -> bool {
        let elapsed = time.saturating_sub(self.last_move_time);
        let mut changed = false;
        match key {
            Some(_) if self.current_key.is_none() => {
                self.current_key = key;
                self.current_key_time = time.saturating_sub(self.down_time);
                self.moved = true;
                changed = true;
            }
            Some(_) if key == self.current_key => {
                self.current_key_time += elapsed;
            }
            Some(_) if self.repeats == 0 => {
                self.last_key = self.current_key;
                self.last_key_time = self.current_key_time + elapsed;
                self.current_key = key;
                self.current_key_time = 0;
                self.moved = true;
                changed = true;
            }
            _ => {}
        }
        self.last_move_time = time;
        changed
    }

    /// Track the final position at lift-off
    pub(crate) fn track_up(&mut self, key: Option<usize>, time: u64) {
        let elapsed = time.saturating_sub(self.last_move_time);
        if key == self.current_key {
            self.current_key_time += elapsed;
        } else {
            self.last_key = self.current_key;
            self.last_key_time = self.current_key_time + elapsed;
            self.current_key = key;
            self.current_key_time = 0;
        }
        self.last_move_time = time;
    }

    /// Key to dispatch on release.
    ///
    /// A key touched only briefly while sliding off a key held longer
    /// resolves to the earlier key.
    pub fn debounced_key(&self) -> Option<usize> {
        if self.current_key_time < self.last_key_time
            && self.current_key_time < DEBOUNCE_TIME_MS
            && self.last_key.is_some()
        {
            self.last_key
        } else {
            self.current_key
        }
    }
}
