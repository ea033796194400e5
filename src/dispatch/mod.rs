//! Touch dispatch
//!
//! Turns raw touch events into key actions: taps, long-presses, key
//! repeat, swipes and multi-finger chords.
//!
//! # Session state machine
//!
//! ```text
//!            DOWN
//!   Idle ──────────► Down / LongPressArmed ──── timer ───► Repeating ──┐
//!                          │        │                          │        │
//!                     MOVE │        │ long-press timer    MOVE off key  │
//!                          ▼        ▼                          ▼        │
//!                       Moving    Aborted ◄────────────────────┘        │
//!                          │        │                                   │
//!       second DOWN ──► ComboAccumulating                               │
//!                          │        │ UP                                │
//!                       UP ▼        ▼                                   │
//!                        Released (tap / swipe / chord flush) ◄─────────┘
//! ```
//!
//! Nothing here runs on its own: timers fire only from
//! [`Dispatcher::poll_timers`], driven by the caller's clock.

mod listener;
mod session;
mod swipe;
mod timer;

pub use listener::{
    Effects, Engine, EngineBridge, Invalidation, KeyAction, KeyboardActionListener, NoEffects,
    PopupEvent, Preview,
};
pub use session::{PointerId, TouchAction, TouchEvent, TouchSession, TouchSessionState};
pub use swipe::{
    detect_distance, detect_fling, travel_threshold, SwipeDirection, SwipeMotion, SwipeTracker,
};
pub use timer::{CancelHandle, TimerQueue};

use log::{debug, info, warn};
use smol_str::SmolStr;

use crate::config::TouchConfig;
use crate::constants::{
    DEBOUNCE_TIME_MS, DELAY_AFTER_PREVIEW_MS, DELAY_BEFORE_PREVIEW_MS, MAX_COMBO_CODES,
    POPUP_MAX_COLUMNS,
};
use crate::error::LayoutError;
use crate::geometry::{Point, Rect};
use crate::keyboard::{Event, GestureType, Key, Keyboard, Modifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    LongPress { pointer: PointerId },
    Repeat { pointer: PointerId },
    ShowPreview { key: usize },
    HidePreview,
}

/// Scheduled work; `generation` detects timers outliving their session
#[derive(Debug, Clone, Copy)]
struct TimerToken {
    generation: u64,
    kind: TimerKind,
}

#[derive(Debug, Default)]
struct PreviewState {
    key: Option<usize>,
    visible: bool,
    generation: u64,
    pending: Option<CancelHandle>,
}

#[derive(Debug, Default)]
struct DirtyKeys {
    keys: Vec<usize>,
    all: bool,
}

impl DirtyKeys {
    fn mark(&mut self, key: usize) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }
}

#[derive(Debug, Clone)]
enum ComboItem {
    Modifier(Modifiers),
    Event(Event),
}

#[derive(Debug, Clone)]
struct ComboEntry {
    /// Generation of the session, i.e. pointer-down order
    order: u64,
    key: usize,
    item: ComboItem,
}

#[derive(Debug)]
struct Popup {
    dispatcher: Dispatcher,
    origin: Point,
}

impl Popup {
    fn bounds(&self) -> Rect {
        let keyboard = self.dispatcher.keyboard();
        Rect::new(
            self.origin.x,
            self.origin.y,
            keyboard.min_width(),
            keyboard.height(),
        )
    }
}

/// Touch-to-key dispatcher for one keyboard
#[derive(Debug)]
pub struct Dispatcher {
    keyboard: Keyboard,
    config: TouchConfig,
    /// Live sessions in pointer-down order
    sessions: Vec<TouchSession>,
    timers: TimerQueue<TimerToken>,
    next_generation: u64,
    combo: Vec<ComboEntry>,
    chord_open: bool,
    preview: PreviewState,
    dirty: DirtyKeys,
    popup: Option<Box<Popup>>,
    last_up_time: Option<u64>,
    /// Previous gesture ended in a plain tap
    click_at_last: bool,
    last_sent: Option<(usize, u64)>,
    tap_count: u32,
    pending_width: Option<i32>,
}

impl Dispatcher {
    pub fn new(keyboard: Keyboard, config: TouchConfig) -> Self {
        Self {
            keyboard,
            config,
            sessions: Vec::new(),
            timers: TimerQueue::new(),
            next_generation: 0,
            combo: Vec::new(),
            chord_open: false,
            preview: PreviewState::default(),
            dirty: DirtyKeys::default(),
            popup: None,
            last_up_time: None,
            click_at_last: false,
            last_sent: None,
            tap_count: 0,
            pending_width: None,
        }
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    /// Replace timing settings; gestures in flight keep their timers
    pub fn set_config(&mut self, config: TouchConfig) {
        self.config = config;
    }

    /// No finger is down
    pub fn is_idle(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_state(&self, pointer: PointerId) -> TouchSessionState {
        self.sessions
            .iter()
            .find(|s| s.pointer() == pointer)
            .map(|s| s.state())
            .unwrap_or(TouchSessionState::Idle)
    }

    /// Popup keyboard, if one is open
    pub fn popup_keyboard(&self) -> Option<&Keyboard> {
        self.popup.as_ref().map(|p| p.dispatcher.keyboard())
    }

    /// Popup bounds in keyboard coordinates
    pub fn popup_bounds(&self) -> Option<Rect> {
        self.popup.as_ref().map(|p| p.bounds())
    }

    /// Consecutive taps on the same key within the long-press timeout
    pub fn multi_tap_count(&self) -> u32 {
        self.tap_count
    }

    /// Earliest pending timer, for scheduling the next `poll_timers`
    pub fn next_timer_due(&self) -> Option<u64> {
        let own = self.timers.next_due();
        let popup = self.popup.as_ref().and_then(|p| p.dispatcher.next_timer_due());
        match (own, popup) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ========================================================================
    // Touch input
    // ========================================================================

    /// Feed one touch event
    pub fn on_touch(&mut self, ev: TouchEvent, listener: &mut dyn KeyboardActionListener) {
        match ev.action {
            TouchAction::Down => {
                if self.popup.is_none() {
                    self.pointer_down(ev, listener);
                } else if self.popup_bounds().is_some_and(|b| b.contains(ev.point())) {
                    self.forward_to_popup(ev, listener);
                } else {
                    // A touch outside the popup only dismisses it
                    self.dismiss_popup(listener);
                }
            }
            TouchAction::Move => match self.session_index(ev.pointer) {
                Some(i) => self.pointer_move(i, ev, listener),
                None => self.route_unowned(ev, listener),
            },
            TouchAction::Up => match self.session_index(ev.pointer) {
                Some(i) => self.pointer_up(i, ev, listener),
                None => self.route_unowned(ev, listener),
            },
            TouchAction::Cancel => match self.session_index(ev.pointer) {
                Some(i) => self.pointer_cancel(i, ev.time, listener),
                None => self.route_unowned(ev, listener),
            },
        }
        self.finish_dispatch(listener);
    }

    /// Fire every timer due at or before `now`
    pub fn poll_timers(&mut self, now: u64, listener: &mut dyn KeyboardActionListener) {
        while let Some((due, token)) = self.timers.pop_due(now) {
            self.fire(due, token, listener);
        }

        if let Some(popup) = self.popup.as_mut() {
            let emitted = {
                let mut sink = PopupSink::new(&mut *listener, popup.origin);
                popup.dispatcher.poll_timers(now, &mut sink);
                sink.emitted
            };
            if emitted {
                self.popup_emitted(listener);
            }
        }

        self.finish_dispatch(listener);
    }

    fn session_index(&self, pointer: PointerId) -> Option<usize> {
        self.sessions.iter().position(|s| s.pointer() == pointer)
    }

    /// Event for a pointer with no session: belongs to the popup, if any
    fn route_unowned(&mut self, ev: TouchEvent, listener: &mut dyn KeyboardActionListener) {
        if self.popup.is_none() {
            debug!("Ignoring {:?} for unknown pointer {}", ev.action, ev.pointer);
            return;
        }
        if ev.action == TouchAction::Cancel {
            self.dismiss_popup(listener);
        } else {
            self.forward_to_popup(ev, listener);
        }
    }

    fn pointer_down(&mut self, ev: TouchEvent, listener: &mut dyn KeyboardActionListener) {
        if let Some(i) = self.session_index(ev.pointer) {
            warn!("Pointer {} went down twice; dropping its old session", ev.pointer);
            self.pointer_cancel(i, ev.time, listener);
        }

        let now = ev.time;
        let hit = self
            .keyboard
            .resolve(ev.point(), self.config.proximity_correction);
        let generation = self.next_generation;
        self.next_generation += 1;

        // A key that already repeated keeps its output and stays out of chords
        for s in self.sessions.iter_mut().filter(|s| s.is_active() && s.repeats() > 0) {
            Self::cancel_session_timers(&mut self.timers, s);
            s.abort();
        }

        // A second finger turns every live session into a chord
        let chord = self.chord_open
            || self
                .sessions
                .iter()
                .any(|s| s.is_active() || s.is_combo());
        if chord {
            self.chord_open = true;
            for s in self.sessions.iter_mut().filter(|s| s.is_active()) {
                Self::cancel_session_timers(&mut self.timers, s);
                s.enter_combo();
            }
        }

        let mut session = TouchSession::new(&ev, generation, hit.key, hit.nearby);
        session.set_fast_input(
            self.config.hook_fast_input
                && self
                    .last_up_time
                    .is_some_and(|t| now.saturating_sub(t) < self.config.fast_input_window),
        );
        if chord {
            session.enter_combo();
        }

        self.check_multi_tap(now, hit.key);
        let code = hit
            .key
            .and_then(|k| self.keyboard.key(k))
            .map(Key::code)
            .unwrap_or(0);
        listener.on_press(code);

        if let Some(k) = hit.key {
            Self::repress(&mut self.keyboard, &mut self.dirty, &mut session, Some(k));
            if !chord {
                let token = |kind| TimerToken { generation, kind };
                if self.keyboard.key(k).is_some_and(Key::is_repeatable) {
                    session.repeat_key = Some(k);
                    session.timers.repeat = Some(self.timers.schedule(
                        now,
                        self.config.repeat_start_delay(),
                        token(TimerKind::Repeat {
                            pointer: ev.pointer,
                        }),
                    ));
                }
                session.timers.long_press = Some(self.timers.schedule(
                    now,
                    self.config.long_press_timeout,
                    token(TimerKind::LongPress {
                        pointer: ev.pointer,
                    }),
                ));
            }
        }

        session.settle();
        self.sessions.push(session);
        self.show_preview(hit.key, now, listener);
    }

    fn pointer_move(&mut self, i: usize, ev: TouchEvent, listener: &mut dyn KeyboardActionListener) {
        let now = ev.time;
        self.sessions[i].swipe.add_point(ev.x, ev.y, now);
        if self.sessions[i].is_aborted() {
            return;
        }

        let key = self
            .keyboard
            .resolve(ev.point(), self.config.proximity_correction)
            .key;
        let s = &mut self.sessions[i];
        let changed = s.track_move(key, now);
        let current = s.current_key();
        Self::repress(&mut self.keyboard, &mut self.dirty, s, current);

        if s.is_combo() {
            self.show_preview(current, now, listener);
            return;
        }

        // Sliding off a repeating key ends the repeat
        if let Some(repeat_key) = s.repeat_key {
            if key != Some(repeat_key) {
                if let Some(h) = s.timers.repeat.take() {
                    self.timers.cancel(h);
                }
                s.repeat_key = None;
                if s.repeats() > 0 {
                    Self::cancel_session_timers(&mut self.timers, s);
                    s.abort();
                    self.show_preview(None, now, listener);
                    return;
                }
            }
        }

        if self.config.swipe_enabled && !s.is_swipe_pending() {
            let fast = s.is_fast_input() && self.click_at_last;
            let travel = travel_threshold(&self.config, fast);
            let (dx, dy) = s.delta(ev.x, ev.y);
            if dx.abs().max(dy.abs()) > travel {
                s.mark_swipe_pending();
                if s.repeats() == 0 {
                    if let Some(h) = s.timers.repeat.take() {
                        self.timers.cancel(h);
                    }
                    s.repeat_key = None;
                }
            }
        }

        if s.is_swipe_pending() || changed {
            if let Some(h) = s.timers.long_press.take() {
                self.timers.cancel(h);
            }
        }
        if !s.is_swipe_pending() && changed {
            let delay = self.config.long_press_timeout.max(DEBOUNCE_TIME_MS);
            s.timers.long_press = Some(self.timers.schedule(
                now,
                delay,
                TimerToken {
                    generation: s.generation(),
                    kind: TimerKind::LongPress {
                        pointer: s.pointer(),
                    },
                },
            ));
        }

        s.settle();
        self.show_preview(current, now, listener);
    }

    fn pointer_up(&mut self, i: usize, ev: TouchEvent, listener: &mut dyn KeyboardActionListener) {
        let now = ev.time;
        let mut s = self.sessions.remove(i);
        Self::cancel_session_timers(&mut self.timers, &mut s);
        s.swipe.add_point(ev.x, ev.y, now);
        let key = self
            .keyboard
            .resolve(ev.point(), self.config.proximity_correction)
            .key;
        s.track_up(key, now);
        self.last_up_time = Some(now);
        self.show_preview(None, now, listener);

        if s.is_aborted() {
            Self::release_pressed(&mut self.keyboard, &mut self.dirty, &mut s, false);
            self.click_at_last = false;
            s.release();
            self.end_chord_if_idle(now, listener);
            return;
        }

        if s.is_combo() {
            Self::release_pressed(&mut self.keyboard, &mut self.dirty, &mut s, false);
            if let Some(k) = s.debounced_key() {
                self.buffer_combo(k, s.generation(), listener);
            }
            self.click_at_last = false;
            s.release();
            self.end_chord_if_idle(now, listener);
            return;
        }

        if self.config.swipe_enabled {
            if let Some(direction) = self.detect_swipe(&s, ev.x, ev.y) {
                debug!("Swipe {:?} on key {:?}", direction, s.down_key());
                Self::release_pressed(&mut self.keyboard, &mut self.dirty, &mut s, false);
                if let Some(k) = s.down_key() {
                    self.detect_and_send(k, direction.gesture(), Vec::new(), now, listener);
                }
                self.click_at_last = false;
                s.release();
                return;
            }
        }

        if s.repeats() > 0 {
            Self::release_pressed(&mut self.keyboard, &mut self.dirty, &mut s, false);
            self.click_at_last = false;
            s.release();
            return;
        }

        let target = s.debounced_key();
        if let Some(k) = target {
            let nearby = std::mem::take(&mut s.nearby);
            self.detect_and_send(k, GestureType::Click, nearby, now, listener);
        }
        self.click_at_last = true;
        let inside = target.is_some() && target == s.pressed_key;
        Self::release_pressed(&mut self.keyboard, &mut self.dirty, &mut s, inside);
        s.release();
    }

    fn pointer_cancel(&mut self, i: usize, now: u64, listener: &mut dyn KeyboardActionListener) {
        let mut s = self.sessions.remove(i);
        Self::cancel_session_timers(&mut self.timers, &mut s);
        Self::release_pressed(&mut self.keyboard, &mut self.dirty, &mut s, false);
        s.abort();
        self.click_at_last = false;
        self.show_preview(None, now, listener);
        self.dismiss_popup(listener);
        if self.sessions.is_empty() && self.chord_open {
            debug!("Chord cancelled, dropping {} buffered keys", self.combo.len());
            self.combo.clear();
            self.chord_open = false;
        }
    }

    /// Fling first, then the plain distance check
    fn detect_swipe(&self, s: &TouchSession, x: f32, y: f32) -> Option<SwipeDirection> {
        let (dx, dy) = s.delta(x, y);
        let travel = travel_threshold(&self.config, s.is_fast_input() && self.click_at_last);
        let motion = SwipeMotion::new(dx, dy, &s.swipe);
        let key = s.down_key().and_then(|k| self.keyboard.key(k));
        key.and_then(|key| detect_fling(&motion, travel, |d| key.has_event(d.gesture())))
            .or_else(|| detect_distance(dx, dy, travel))
    }

    // ========================================================================
    // Emission
    // ========================================================================

    /// Resolve and emit the event a key produces for a gesture.
    ///
    /// Modifier keys without a binding for the gesture toggle their
    /// modifier instead.
    fn detect_and_send(
        &mut self,
        k: usize,
        gesture: GestureType,
        nearby: Vec<i32>,
        now: u64,
        listener: &mut dyn KeyboardActionListener,
    ) {
        let state = listener.engine_state();
        let Some(key) = self.keyboard.key(k) else {
            return;
        };

        if key.is_modifier() && !key.sends_binding(gesture, &state) {
            let latch = key.lock_policy().latches_on_click(state.ascii_mode);
            let code = key.code();
            self.keyboard.click_modifier(k, latch);
            self.dirty.all = true;
            listener.on_release(code);
            self.last_sent = Some((k, now));
            return;
        }

        // Repeatable keys only answer gestures they bind explicitly
        if key.is_repeatable() && gesture > GestureType::Click && !key.has_event(gesture) {
            return;
        }

        let event = match key.event_for(gesture, &state) {
            Some(event) if !event.is_void() => event.clone(),
            _ => {
                debug!("Key {} has no binding for {:?}", k, gesture);
                return;
            }
        };

        let action = KeyAction {
            mask: self.keyboard.active_modifiers() | event.mask(),
            event,
            gesture,
            key: k,
            nearby,
        };
        if self.keyboard.refresh_modifiers() {
            self.dirty.all = true;
        }
        listener.on_event(&action);
        listener.on_release(action.code());
        self.dirty.mark(k);
        self.last_sent = Some((k, now));
    }

    fn buffer_combo(&mut self, k: usize, order: u64, listener: &mut dyn KeyboardActionListener) {
        let state = listener.engine_state();
        let Some(key) = self.keyboard.key(k) else {
            return;
        };
        let item = if key.is_modifier() && !key.sends_binding(GestureType::Combo, &state) {
            ComboItem::Modifier(key.modifier_mask())
        } else {
            match key.event_for(GestureType::Combo, &state) {
                Some(event) if !event.is_void() => ComboItem::Event(event.clone()),
                _ => return,
            }
        };
        if self.combo.len() >= MAX_COMBO_CODES {
            warn!("Chord buffer full, dropping key {}", k);
            return;
        }
        self.combo.push(ComboEntry { order, key: k, item });
    }

    fn end_chord_if_idle(&mut self, now: u64, listener: &mut dyn KeyboardActionListener) {
        if self.sessions.is_empty() && self.chord_open {
            self.chord_open = false;
            self.flush_combo(now, listener);
        }
    }

    /// Emit the buffered chord as one batch, in pointer-down order
    fn flush_combo(&mut self, now: u64, listener: &mut dyn KeyboardActionListener) {
        let mut entries = std::mem::take(&mut self.combo);
        entries.sort_by_key(|e| e.order);

        let chord_mask = entries
            .iter()
            .fold(Modifiers::empty(), |mask, e| match e.item {
                ComboItem::Modifier(m) => mask | m,
                ComboItem::Event(_) => mask,
            });
        let base = self.keyboard.active_modifiers() | chord_mask;

        let actions: Vec<KeyAction> = entries
            .into_iter()
            .filter_map(|e| match e.item {
                ComboItem::Event(event) => Some(KeyAction {
                    mask: base | event.mask(),
                    event,
                    gesture: GestureType::Combo,
                    key: e.key,
                    nearby: Vec::new(),
                }),
                ComboItem::Modifier(_) => None,
            })
            .collect();
        if actions.is_empty() {
            return;
        }

        debug!("Chord of {} keys", actions.len());
        if self.keyboard.refresh_modifiers() {
            self.dirty.all = true;
        }
        listener.on_combo(&actions);
        for action in &actions {
            listener.on_release(action.code());
            self.dirty.mark(action.key);
        }
        self.last_sent = actions.last().map(|a| (a.key, now));
    }

    fn check_multi_tap(&mut self, now: u64, key: Option<usize>) {
        match (self.last_sent, key) {
            (Some((last, time)), Some(key))
                if last == key && now.saturating_sub(time) <= self.config.long_press_timeout =>
            {
                self.tap_count += 1;
            }
            _ => self.tap_count = 0,
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn fire(&mut self, due: u64, token: TimerToken, listener: &mut dyn KeyboardActionListener) {
        match token.kind {
            TimerKind::LongPress { pointer } => {
                if let Some(i) = self.live_session(pointer, token.generation) {
                    self.sessions[i].timers.long_press = None;
                    self.long_press(i, due, listener);
                }
            }
            TimerKind::Repeat { pointer } => {
                if let Some(i) = self.live_session(pointer, token.generation) {
                    self.sessions[i].timers.repeat = None;
                    self.repeat(i, due, listener);
                }
            }
            TimerKind::ShowPreview { key } => {
                if token.generation == self.preview.generation {
                    self.preview.pending = None;
                    self.preview.visible = true;
                    self.emit_preview(key, listener);
                }
            }
            TimerKind::HidePreview => {
                if token.generation == self.preview.generation {
                    self.preview.pending = None;
                    self.preview.visible = false;
                    listener.on_preview(&Preview::Hide);
                }
            }
        }
    }

    fn live_session(&self, pointer: PointerId, generation: u64) -> Option<usize> {
        let found = self
            .sessions
            .iter()
            .position(|s| s.pointer() == pointer && s.generation() == generation);
        if found.is_none() {
            debug!("Dropping stale timer for pointer {}", pointer);
        }
        found
    }

    fn long_press(&mut self, i: usize, now: u64, listener: &mut dyn KeyboardActionListener) {
        let s = &self.sessions[i];
        if !s.is_active() || s.repeats() > 0 || s.is_swipe_pending() {
            return;
        }
        let Some(k) = s.current_key() else {
            return;
        };
        let Some(key) = self.keyboard.key(k) else {
            return;
        };
        let state = listener.engine_state();
        let has_long_click = key.long_click().is_some();
        let latches = key.is_modifier() && key.lock_policy().latches_on_long_press(state.ascii_mode);
        let mask = key.modifier_mask();
        let has_popup = key.popup_characters().is_some();

        if has_long_click {
            self.consume_session(i);
            self.show_preview(None, now, listener);
            self.detect_and_send(k, GestureType::LongClick, Vec::new(), now, listener);
        } else if latches {
            let on = !self.keyboard.modifiers().is_latched(mask);
            self.keyboard.latch_modifier(mask, on);
            self.dirty.all = true;
            self.consume_session(i);
        } else if has_popup {
            self.consume_session(i);
            self.show_preview(None, now, listener);
            self.open_popup(k, listener);
        }
    }

    fn repeat(&mut self, i: usize, now: u64, listener: &mut dyn KeyboardActionListener) {
        let s = &self.sessions[i];
        let Some(k) = s.repeat_key else {
            return;
        };
        if !s.is_active() || s.current_key() != Some(k) {
            return;
        }

        self.detect_and_send(k, GestureType::Click, Vec::new(), now, listener);

        let s = &mut self.sessions[i];
        s.record_repeat();
        s.timers.repeat = Some(self.timers.schedule(
            now,
            self.config.repeat_interval,
            TimerToken {
                generation: s.generation(),
                kind: TimerKind::Repeat {
                    pointer: s.pointer(),
                },
            },
        ));
    }

    /// The gesture was handled mid-press; the release emits nothing
    fn consume_session(&mut self, i: usize) {
        let s = &mut self.sessions[i];
        Self::cancel_session_timers(&mut self.timers, s);
        s.abort();
    }

    fn cancel_session_timers(timers: &mut TimerQueue<TimerToken>, s: &mut TouchSession) {
        if let Some(h) = s.timers.long_press.take() {
            timers.cancel(h);
        }
        if let Some(h) = s.timers.repeat.take() {
            timers.cancel(h);
        }
    }

    // ========================================================================
    // Key visuals / preview
    // ========================================================================

    fn repress(keyboard: &mut Keyboard, dirty: &mut DirtyKeys, s: &mut TouchSession, key: Option<usize>) {
        if s.pressed_key == key {
            return;
        }
        Self::release_pressed(keyboard, dirty, s, false);
        if let Some(k) = key {
            if let Some(pressed) = keyboard.key_mut(k) {
                pressed.on_pressed();
                dirty.mark(k);
                s.pressed_key = Some(k);
            }
        }
    }

    fn release_pressed(keyboard: &mut Keyboard, dirty: &mut DirtyKeys, s: &mut TouchSession, inside: bool) {
        if let Some(k) = s.pressed_key.take() {
            if let Some(key) = keyboard.key_mut(k) {
                key.on_released(inside);
                dirty.mark(k);
            }
        }
    }

    fn show_preview(&mut self, key: Option<usize>, now: u64, listener: &mut dyn KeyboardActionListener) {
        if self.preview.key == key {
            return;
        }
        self.preview.key = key;
        if !self.config.show_preview {
            return;
        }
        if let Some(h) = self.preview.pending.take() {
            self.timers.cancel(h);
        }
        self.preview.generation += 1;
        let generation = self.preview.generation;

        match key {
            None if self.preview.visible => {
                self.preview.pending = Some(self.timers.schedule(
                    now,
                    DELAY_AFTER_PREVIEW_MS,
                    TimerToken {
                        generation,
                        kind: TimerKind::HidePreview,
                    },
                ));
            }
            None => {}
            Some(k) if self.preview.visible => self.emit_preview(k, listener),
            Some(k) => {
                self.preview.pending = Some(self.timers.schedule(
                    now,
                    DELAY_BEFORE_PREVIEW_MS,
                    TimerToken {
                        generation,
                        kind: TimerKind::ShowPreview { key: k },
                    },
                ));
            }
        }
    }

    fn emit_preview(&self, k: usize, listener: &mut dyn KeyboardActionListener) {
        let Some(key) = self.keyboard.key(k) else {
            return;
        };
        let state = listener.engine_state();
        let label = key
            .event_for(GestureType::Click, &state)
            .map(|e| SmolStr::new(e.preview()))
            .unwrap_or_else(|| self.keyboard.key_label(k, &state));
        listener.on_preview(&Preview::Show {
            key: k,
            label,
            rect: key.rect(),
        });
    }

    fn hide_preview_now(&mut self, listener: &mut dyn KeyboardActionListener) {
        if let Some(h) = self.preview.pending.take() {
            self.timers.cancel(h);
        }
        self.preview.key = None;
        self.preview.generation += 1;
        if self.preview.visible {
            self.preview.visible = false;
            listener.on_preview(&Preview::Hide);
        }
    }

    // ========================================================================
    // Popup keyboard
    // ========================================================================

    fn open_popup(&mut self, k: usize, listener: &mut dyn KeyboardActionListener) {
        let Some(key) = self.keyboard.key(k) else {
            return;
        };
        let Some(characters) = key.popup_characters() else {
            return;
        };
        let rect = key.rect();
        let mini = Keyboard::from_characters(
            characters,
            POPUP_MAX_COLUMNS,
            rect.width,
            rect.height,
            key.gap,
        );

        // Right-aligned with the key, just above it
        let origin = Point::new((rect.right() - mini.min_width()).max(0), rect.y - mini.height());
        let mut config = self.config.clone();
        config.swipe_enabled = false;

        let popup = Popup {
            dispatcher: Dispatcher::new(mini, config),
            origin,
        };
        let bounds = popup.bounds();
        info!("Popup opened for key {} with {} keys", k, popup.dispatcher.keyboard().keys().len());
        self.popup = Some(Box::new(popup));
        listener.on_popup(&PopupEvent::Opened { key: k, bounds });
        self.dirty.all = true;
    }

    fn forward_to_popup(&mut self, ev: TouchEvent, listener: &mut dyn KeyboardActionListener) {
        let Some(popup) = self.popup.as_mut() else {
            return;
        };
        let local = TouchEvent {
            x: ev.x - popup.origin.x as f32,
            y: ev.y - popup.origin.y as f32,
            ..ev
        };
        let emitted = {
            let mut sink = PopupSink::new(&mut *listener, popup.origin);
            popup.dispatcher.on_touch(local, &mut sink);
            sink.emitted
        };
        if emitted {
            self.popup_emitted(listener);
        }
    }

    fn popup_emitted(&mut self, listener: &mut dyn KeyboardActionListener) {
        self.dismiss_popup(listener);
        if self.keyboard.refresh_modifiers() {
            self.dirty.all = true;
        }
    }

    fn dismiss_popup(&mut self, listener: &mut dyn KeyboardActionListener) -> bool {
        if self.popup.take().is_none() {
            return false;
        }
        debug!("Popup dismissed");
        listener.on_popup(&PopupEvent::Dismissed);
        self.dirty.all = true;
        true
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Swap in another keyboard.
    ///
    /// Gestures in flight are aborted: their fingers emit nothing until
    /// lifted.
    pub fn set_keyboard(&mut self, keyboard: Keyboard, listener: &mut dyn KeyboardActionListener) {
        self.reset_interaction(listener);
        info!("Switching keyboard to '{}'", keyboard.name());
        self.keyboard = keyboard;
        self.dirty.all = true;
        self.finish_dispatch(listener);
    }

    /// Re-layout for a new display width, deferred while fingers are down
    pub fn set_display_width(
        &mut self,
        width: i32,
        listener: &mut dyn KeyboardActionListener,
    ) -> Result<(), LayoutError> {
        if !self.sessions.is_empty() || self.popup.is_some() {
            debug!("Deferring re-layout to width {} until the gesture ends", width);
            self.pending_width = Some(width);
            return Ok(());
        }
        self.keyboard.relayout(width)?;
        self.dirty.all = true;
        self.finish_dispatch(listener);
        Ok(())
    }

    /// Input finished (focus lost): drop popup, timers and gestures
    pub fn finish_input(&mut self, listener: &mut dyn KeyboardActionListener) {
        self.reset_interaction(listener);
        self.finish_dispatch(listener);
    }

    /// Back key: closes the popup if open; returns whether it was consumed
    pub fn handle_back(&mut self, listener: &mut dyn KeyboardActionListener) -> bool {
        let consumed = self.dismiss_popup(listener);
        self.finish_dispatch(listener);
        consumed
    }

    /// Engine composing state changed: redraw keys that depend on it
    pub fn invalidate_composing_keys(&mut self, listener: &mut dyn KeyboardActionListener) {
        let keys: Vec<usize> = self.keyboard.composing_keys().collect();
        for k in keys {
            self.dirty.mark(k);
        }
        self.flush_invalidation(listener);
    }

    fn reset_interaction(&mut self, listener: &mut dyn KeyboardActionListener) {
        self.timers.clear();
        self.preview.pending = None;
        self.hide_preview_now(listener);
        for s in self.sessions.iter_mut() {
            Self::release_pressed(&mut self.keyboard, &mut self.dirty, s, false);
            s.detach();
        }
        self.combo.clear();
        self.chord_open = false;
        self.dismiss_popup(listener);
    }

    fn finish_dispatch(&mut self, listener: &mut dyn KeyboardActionListener) {
        if self.sessions.is_empty() && self.popup.is_none() {
            if let Some(width) = self.pending_width.take() {
                match self.keyboard.relayout(width) {
                    Ok(()) => self.dirty.all = true,
                    Err(e) => warn!("Re-layout to width {} failed: {}", width, e),
                }
            }
        }
        self.flush_invalidation(listener);
    }

    fn flush_invalidation(&mut self, listener: &mut dyn KeyboardActionListener) {
        let dirty = std::mem::take(&mut self.dirty);
        if dirty.all || dirty.keys.len() > self.config.max_dirty_keys {
            listener.invalidate(&Invalidation::All);
        } else if !dirty.keys.is_empty() {
            let rects = dirty
                .keys
                .iter()
                .filter_map(|&k| self.keyboard.key(k))
                .map(Key::rect)
                .collect();
            listener.invalidate(&Invalidation::Keys(rects));
        }
    }
}

/// Listener wrapper for popup output: translates geometry to the parent
/// keyboard and notes whether a key was emitted
struct PopupSink<'a> {
    inner: &'a mut dyn KeyboardActionListener,
    origin: Point,
    emitted: bool,
}

impl<'a> PopupSink<'a> {
    fn new(inner: &'a mut dyn KeyboardActionListener, origin: Point) -> Self {
        Self {
            inner,
            origin,
            emitted: false,
        }
    }

    fn to_parent(&self, rect: Rect) -> Rect {
        Rect::new(rect.x + self.origin.x, rect.y + self.origin.y, rect.width, rect.height)
    }
}

impl KeyboardActionListener for PopupSink<'_> {
    fn engine_state(&self) -> crate::keyboard::EngineState {
        self.inner.engine_state()
    }

    fn on_press(&mut self, code: i32) {
        self.inner.on_press(code);
    }

    fn on_release(&mut self, code: i32) {
        self.inner.on_release(code);
    }

    fn on_event(&mut self, action: &KeyAction) {
        self.emitted = true;
        self.inner.on_event(action);
    }

    fn on_text(&mut self, text: &str) {
        self.inner.on_text(text);
    }

    fn on_combo(&mut self, actions: &[KeyAction]) {
        self.emitted = true;
        self.inner.on_combo(actions);
    }

    fn on_preview(&mut self, preview: &Preview) {
        match preview {
            Preview::Show { key, label, rect } => self.inner.on_preview(&Preview::Show {
                key: *key,
                label: label.clone(),
                rect: self.to_parent(*rect),
            }),
            Preview::Hide => self.inner.on_preview(preview),
        }
    }

    fn on_popup(&mut self, popup: &PopupEvent) {
        self.inner.on_popup(popup);
    }

    fn invalidate(&mut self, region: &Invalidation) {
        match region {
            Invalidation::Keys(rects) => {
                let rects = rects.iter().map(|r| self.to_parent(*r)).collect();
                self.inner.invalidate(&Invalidation::Keys(rects));
            }
            Invalidation::All => self.inner.invalidate(region),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::keycode::{KEYCODE_A, KEYCODE_DEL, KEYCODE_SHIFT_LEFT};
    use crate::keyboard::LockPolicy;

    const KEYCODE_B: i32 = KEYCODE_A + 1;
    const KEYCODE_E: i32 = KEYCODE_A + 4;

    #[derive(Default)]
    struct Recorder {
        events: Vec<(i32, Option<String>, Modifiers, GestureType)>,
        combos: Vec<Vec<(i32, Modifiers)>>,
        presses: Vec<i32>,
        previews: Vec<Preview>,
        popups: Vec<PopupEvent>,
        redraws: usize,
    }

    impl KeyboardActionListener for Recorder {
        fn on_press(&mut self, code: i32) {
            self.presses.push(code);
        }

        fn on_event(&mut self, action: &KeyAction) {
            self.events.push((
                action.code(),
                action.text().map(str::to_string),
                action.mask,
                action.gesture,
            ));
        }

        fn on_combo(&mut self, actions: &[KeyAction]) {
            self.combos
                .push(actions.iter().map(|a| (a.code(), a.mask)).collect());
        }

        fn on_preview(&mut self, preview: &Preview) {
            self.previews.push(preview.clone());
        }

        fn on_popup(&mut self, popup: &PopupEvent) {
            self.popups.push(*popup);
        }

        fn invalidate(&mut self, _region: &Invalidation) {
            self.redraws += 1;
        }
    }

    /// a (swipe up "1"), b (swipe right ">"), Delete (repeats),
    /// Shift (long-press lock), e (popup)
    fn keyboard() -> Keyboard {
        let key = |x: i32, event: Event| {
            Key::new(Rect::new(x, 0, 100, 100)).with_event(GestureType::Click, event)
        };
        Keyboard::new(
            "test",
            vec![
                key(0, Event::key(KEYCODE_A)).with_event(GestureType::SwipeUp, Event::text("1")),
                key(100, Event::key(KEYCODE_B)).with_event(GestureType::SwipeRight, Event::text(">")),
                key(200, Event::key(KEYCODE_DEL).with_repeatable(true)),
                key(
                    300,
                    Event::key(KEYCODE_SHIFT_LEFT).with_shift_lock(LockPolicy::OnLongPress),
                ),
                key(400, Event::key(KEYCODE_E)).with_popup("éèê"),
            ],
        )
    }

    struct Harness {
        dispatcher: Dispatcher,
        out: Recorder,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dispatcher: Dispatcher::new(keyboard(), TouchConfig::default()),
                out: Recorder::default(),
            }
        }

        fn touch(&mut self, pointer: PointerId, action: TouchAction, x: f32, y: f32, time: u64) {
            self.dispatcher.poll_timers(time, &mut self.out);
            self.dispatcher
                .on_touch(TouchEvent::new(pointer, action, x, y, time), &mut self.out);
        }

        fn tap(&mut self, x: f32, y: f32, time: u64) {
            self.touch(0, TouchAction::Down, x, y, time);
            self.touch(0, TouchAction::Up, x, y, time + 50);
        }

        fn poll(&mut self, now: u64) {
            self.dispatcher.poll_timers(now, &mut self.out);
        }

        fn codes(&self) -> Vec<i32> {
            self.out.events.iter().map(|e| e.0).collect()
        }
    }

    #[test]
    fn test_tap_emits_once() {
        let mut h = Harness::new();
        h.tap(50.0, 50.0, 0);
        h.poll(2000);
        assert_eq!(
            h.out.events,
            vec![(KEYCODE_A, None, Modifiers::empty(), GestureType::Click)]
        );
        assert_eq!(h.out.presses, vec![KEYCODE_A]);
        assert!(h.dispatcher.is_idle());
        assert!(h.out.redraws > 0);
    }

    #[test]
    fn test_tap_outside_keys_emits_nothing() {
        let mut h = Harness::new();
        h.tap(50.0, 500.0, 0);
        assert!(h.out.events.is_empty());
        assert_eq!(h.out.presses, vec![0]);
    }

    #[test]
    fn test_swipe_uses_down_key() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 50.0, 80.0, 0);
        h.touch(0, TouchAction::Move, 50.0, 40.0, 20);
        h.touch(0, TouchAction::Move, 50.0, -10.0, 40);
        assert_eq!(h.dispatcher.session_state(0), TouchSessionState::Moving);
        h.touch(0, TouchAction::Up, 50.0, -10.0, 50);
        assert_eq!(
            h.out.events,
            vec![(0, Some("1".to_string()), Modifiers::empty(), GestureType::SwipeUp)]
        );
    }

    #[test]
    fn test_horizontal_swipe_ends_on_other_key() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 150.0, 50.0, 0);
        h.touch(0, TouchAction::Move, 200.0, 50.0, 20);
        h.touch(0, TouchAction::Move, 260.0, 50.0, 40);
        h.touch(0, TouchAction::Up, 260.0, 50.0, 50);
        assert_eq!(
            h.out.events,
            vec![(0, Some(">".to_string()), Modifiers::empty(), GestureType::SwipeRight)]
        );
    }

    #[test]
    fn test_fast_jitter_is_a_tap() {
        let mut h = Harness::new();
        h.tap(50.0, 50.0, 0);
        // Within the fast-input window of a tap, 8px in 5ms
        h.touch(0, TouchAction::Down, 50.0, 50.0, 100);
        h.touch(0, TouchAction::Move, 50.0, 42.0, 105);
        h.touch(0, TouchAction::Up, 50.0, 42.0, 106);
        assert_eq!(h.codes(), vec![KEYCODE_A, KEYCODE_A]);
        assert!(h.out.events.iter().all(|e| e.3 == GestureType::Click));
    }

    #[test]
    fn test_fast_threshold_needs_tap_just_before() {
        let mut h = Harness::new();
        h.tap(50.0, 50.0, 0);
        // A repeat gesture ends, not a tap
        h.touch(0, TouchAction::Down, 250.0, 50.0, 100);
        h.touch(0, TouchAction::Up, 250.0, 50.0, 600);
        assert_eq!(h.codes(), vec![KEYCODE_A, KEYCODE_DEL, KEYCODE_DEL]);

        // Quick follow-up press: 60px is short of the normal threshold
        h.touch(0, TouchAction::Down, 50.0, 90.0, 650);
        h.touch(0, TouchAction::Move, 50.0, 60.0, 660);
        h.touch(0, TouchAction::Move, 50.0, 30.0, 670);
        h.touch(0, TouchAction::Up, 50.0, 30.0, 680);
        assert_eq!(
            h.codes(),
            vec![KEYCODE_A, KEYCODE_DEL, KEYCODE_DEL, KEYCODE_A]
        );
    }

    #[test]
    fn test_short_move_is_still_a_tap() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 50.0, 50.0, 0);
        h.touch(0, TouchAction::Move, 50.0, 30.0, 30);
        h.touch(0, TouchAction::Up, 50.0, 30.0, 60);
        assert_eq!(h.out.events[0].3, GestureType::Click);
        assert_eq!(h.codes(), vec![KEYCODE_A]);
    }

    #[test]
    fn test_repeat_schedule() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 250.0, 50.0, 0);
        // First repeat one tick after the long-press timeout, then every 50ms
        h.poll(400);
        assert!(h.out.events.is_empty());
        h.poll(551);
        assert_eq!(h.codes(), vec![KEYCODE_DEL; 4]);
        assert_eq!(
            h.dispatcher.session_state(0),
            TouchSessionState::Repeating { repeats: 4 }
        );
        // Lifting after repeats emits nothing more
        h.touch(0, TouchAction::Up, 250.0, 50.0, 560);
        assert_eq!(h.codes().len(), 4);
    }

    #[test]
    fn test_quick_tap_on_repeat_key() {
        let mut h = Harness::new();
        h.tap(250.0, 50.0, 0);
        h.poll(2000);
        assert_eq!(h.codes(), vec![KEYCODE_DEL]);
    }

    #[test]
    fn test_sliding_off_repeat_key_stops_repeat() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 250.0, 50.0, 0);
        h.poll(451);
        assert_eq!(h.codes().len(), 2);
        h.touch(0, TouchAction::Move, 150.0, 50.0, 460);
        assert_eq!(h.dispatcher.session_state(0), TouchSessionState::Aborted);
        h.poll(1000);
        h.touch(0, TouchAction::Up, 150.0, 50.0, 1000);
        assert_eq!(h.codes(), vec![KEYCODE_DEL; 2]);
    }

    #[test]
    fn test_repeat_key_stays_out_of_chord() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 250.0, 50.0, 0);
        h.poll(551);
        h.touch(1, TouchAction::Down, 50.0, 50.0, 560);
        assert_eq!(h.dispatcher.session_state(0), TouchSessionState::Aborted);
        h.touch(1, TouchAction::Up, 50.0, 50.0, 600);
        h.touch(0, TouchAction::Up, 250.0, 50.0, 620);
        h.poll(2000);
        assert!(h.out.combos.is_empty());
        assert_eq!(
            h.codes(),
            vec![KEYCODE_DEL, KEYCODE_DEL, KEYCODE_DEL, KEYCODE_DEL, KEYCODE_A]
        );
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut h = Harness::new();
        // Pointer 0 taps (generation 0), then goes down again on Delete
        h.tap(50.0, 50.0, 0);
        h.touch(0, TouchAction::Down, 250.0, 50.0, 100);

        let stale = |kind| TimerToken {
            generation: 0,
            kind,
        };
        h.dispatcher
            .timers
            .schedule(100, 10, stale(TimerKind::Repeat { pointer: 0 }));
        h.dispatcher
            .timers
            .schedule(100, 10, stale(TimerKind::LongPress { pointer: 0 }));
        h.poll(110);
        assert_eq!(h.codes(), vec![KEYCODE_A]);
        assert_eq!(
            h.dispatcher.session_state(0),
            TouchSessionState::LongPressArmed
        );

        // The live session's own repeat still runs
        h.poll(501);
        assert_eq!(h.codes(), vec![KEYCODE_A, KEYCODE_DEL]);
    }

    #[test]
    fn test_release_before_long_press() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 450.0, 50.0, 0);
        h.touch(0, TouchAction::Up, 450.0, 50.0, 300);
        h.poll(1000);
        assert_eq!(h.codes(), vec![KEYCODE_E]);
        assert!(h.out.popups.is_empty());
        assert!(h.dispatcher.popup_keyboard().is_none());
    }

    #[test]
    fn test_long_press_popup() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 450.0, 50.0, 0);
        h.poll(400);
        let bounds = Rect::new(200, -100, 300, 100);
        assert_eq!(
            h.out.popups,
            vec![PopupEvent::Opened { key: 4, bounds }]
        );
        assert_eq!(h.dispatcher.popup_bounds(), Some(bounds));
        assert_eq!(h.dispatcher.popup_keyboard().map(|k| k.keys().len()), Some(3));

        // The long-pressed finger lifts without output
        h.touch(0, TouchAction::Up, 450.0, 50.0, 450);
        assert!(h.out.events.is_empty());

        h.touch(1, TouchAction::Down, 250.0, -50.0, 500);
        h.touch(1, TouchAction::Up, 250.0, -50.0, 550);
        assert_eq!(
            h.out.events,
            vec![(0, Some("é".to_string()), Modifiers::empty(), GestureType::Click)]
        );
        assert_eq!(h.out.popups.last(), Some(&PopupEvent::Dismissed));
        assert!(h.dispatcher.popup_keyboard().is_none());
    }

    #[test]
    fn test_touch_outside_popup_dismisses() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 450.0, 50.0, 0);
        h.poll(400);
        h.touch(0, TouchAction::Up, 450.0, 50.0, 450);
        h.touch(1, TouchAction::Down, 50.0, 50.0, 500);
        h.touch(1, TouchAction::Up, 50.0, 50.0, 550);
        assert!(h.out.events.is_empty());
        assert!(h.dispatcher.popup_keyboard().is_none());
        assert_eq!(h.out.popups.last(), Some(&PopupEvent::Dismissed));
    }

    #[test]
    fn test_back_closes_popup() {
        let mut h = Harness::new();
        assert!(!h.dispatcher.handle_back(&mut h.out));
        h.touch(0, TouchAction::Down, 450.0, 50.0, 0);
        h.poll(400);
        assert!(h.dispatcher.handle_back(&mut h.out));
        assert!(h.dispatcher.popup_keyboard().is_none());
    }

    #[test]
    fn test_one_shot_modifier() {
        let mut h = Harness::new();
        h.tap(350.0, 50.0, 0);
        assert!(h.out.events.is_empty());
        assert_eq!(h.dispatcher.keyboard().active_modifiers(), Modifiers::SHIFT);

        h.tap(50.0, 50.0, 200);
        h.tap(50.0, 50.0, 400);
        let masks: Vec<Modifiers> = h.out.events.iter().map(|e| e.2).collect();
        assert_eq!(masks, vec![Modifiers::SHIFT, Modifiers::empty()]);
    }

    #[test]
    fn test_long_press_latches_modifier() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 350.0, 50.0, 0);
        h.poll(400);
        h.touch(0, TouchAction::Up, 350.0, 50.0, 450);
        assert!(h.dispatcher.keyboard().modifiers().is_latched(Modifiers::SHIFT));
        assert!(h.dispatcher.keyboard().key(3).is_some_and(Key::is_on));

        h.tap(50.0, 50.0, 600);
        h.tap(150.0, 50.0, 800);
        let masks: Vec<Modifiers> = h.out.events.iter().map(|e| e.2).collect();
        assert_eq!(masks, vec![Modifiers::SHIFT, Modifiers::SHIFT]);
    }

    #[test]
    fn test_chord_in_down_order() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 150.0, 50.0, 0);
        h.touch(1, TouchAction::Down, 50.0, 50.0, 20);
        assert_eq!(
            h.dispatcher.session_state(0),
            TouchSessionState::ComboAccumulating
        );
        h.touch(1, TouchAction::Up, 50.0, 50.0, 60);
        assert!(h.out.combos.is_empty());
        h.touch(0, TouchAction::Up, 150.0, 50.0, 80);
        assert_eq!(
            h.out.combos,
            vec![vec![
                (KEYCODE_B, Modifiers::empty()),
                (KEYCODE_A, Modifiers::empty())
            ]]
        );
        assert!(h.out.events.is_empty());
        // Chorded keys never long-press
        h.poll(2000);
        assert!(h.out.combos.len() == 1 && h.out.popups.is_empty());
    }

    #[test]
    fn test_chord_modifier_applies_to_batch() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 350.0, 50.0, 0);
        h.touch(1, TouchAction::Down, 50.0, 50.0, 20);
        h.touch(1, TouchAction::Up, 50.0, 50.0, 60);
        h.touch(0, TouchAction::Up, 350.0, 50.0, 80);
        assert_eq!(h.out.combos, vec![vec![(KEYCODE_A, Modifiers::SHIFT)]]);
        assert!(h.dispatcher.keyboard().active_modifiers().is_empty());
    }

    #[test]
    fn test_cancel_discards_chord() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 50.0, 50.0, 0);
        h.touch(1, TouchAction::Down, 150.0, 50.0, 20);
        h.touch(0, TouchAction::Up, 50.0, 50.0, 60);
        h.touch(1, TouchAction::Cancel, 150.0, 50.0, 80);
        assert!(h.out.combos.is_empty());
        assert!(h.dispatcher.is_idle());

        // The next tap is a plain tap again
        h.tap(150.0, 50.0, 200);
        assert_eq!(h.codes(), vec![KEYCODE_B]);
    }

    #[test]
    fn test_slide_debounce() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 90.0, 50.0, 0);
        h.touch(0, TouchAction::Move, 95.0, 50.0, 150);
        h.touch(0, TouchAction::Move, 110.0, 50.0, 200);
        h.touch(0, TouchAction::Up, 110.0, 50.0, 230);
        assert_eq!(h.codes(), vec![KEYCODE_A]);
    }

    #[test]
    fn test_slide_to_settled_key() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 90.0, 50.0, 0);
        h.touch(0, TouchAction::Move, 110.0, 50.0, 20);
        h.touch(0, TouchAction::Up, 110.0, 50.0, 200);
        assert_eq!(h.codes(), vec![KEYCODE_B]);
    }

    #[test]
    fn test_keyboard_switch_aborts_gesture() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 50.0, 50.0, 0);
        h.dispatcher.set_keyboard(keyboard(), &mut h.out);
        assert_eq!(h.dispatcher.session_state(0), TouchSessionState::Aborted);
        h.poll(1000);
        h.touch(0, TouchAction::Up, 50.0, 50.0, 1000);
        assert!(h.out.events.is_empty());

        h.tap(50.0, 50.0, 1200);
        assert_eq!(h.codes(), vec![KEYCODE_A]);
    }

    #[test]
    fn test_preview_show_and_hide() {
        let mut h = Harness::new();
        h.touch(0, TouchAction::Down, 50.0, 50.0, 0);
        h.poll(0);
        assert!(matches!(
            h.out.previews.as_slice(),
            [Preview::Show { key: 0, .. }]
        ));
        h.touch(0, TouchAction::Up, 50.0, 50.0, 50);
        h.poll(119);
        assert_eq!(h.out.previews.len(), 1);
        h.poll(120);
        assert_eq!(h.out.previews.last(), Some(&Preview::Hide));
    }

    #[test]
    fn test_preview_disabled() {
        let mut h = Harness::new();
        let config = TouchConfig {
            show_preview: false,
            ..TouchConfig::default()
        };
        h.dispatcher.set_config(config);
        h.tap(50.0, 50.0, 0);
        h.poll(500);
        assert!(h.out.previews.is_empty());
        assert_eq!(h.codes(), vec![KEYCODE_A]);
    }

    #[test]
    fn test_multi_tap_count() {
        let mut h = Harness::new();
        h.tap(50.0, 50.0, 0);
        h.tap(50.0, 50.0, 100);
        assert_eq!(h.dispatcher.multi_tap_count(), 1);
        h.tap(50.0, 50.0, 200);
        assert_eq!(h.dispatcher.multi_tap_count(), 2);
        h.tap(150.0, 50.0, 300);
        assert_eq!(h.dispatcher.multi_tap_count(), 0);
    }

    #[test]
    fn test_next_timer_due() {
        let mut h = Harness::new();
        assert_eq!(h.dispatcher.next_timer_due(), None);
        h.touch(0, TouchAction::Down, 50.0, 50.0, 10);
        // Preview shows immediately, long-press at 410
        assert_eq!(h.dispatcher.next_timer_due(), Some(10));
        h.poll(10);
        assert_eq!(h.dispatcher.next_timer_due(), Some(410));
    }
}
