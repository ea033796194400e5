//! Swipe detection
//!
//! Two detectors run when a single-finger gesture ends:
//!
//! - **Fling**: travel past the threshold in a direction the key binds,
//!   with the rolling velocity and the lift-off velocity both still
//!   pointing that way.
//! - **Distance**: the dominant-axis travel alone exceeds the threshold.
//!   The key's binding for that direction is used if it has one,
//!   otherwise its tap binding.
//!
//! The travel threshold tightens during fast input so quick directional
//! strokes register reliably. Nothing shorter than the threshold is ever
//! a swipe, however fast it moved.

use std::collections::VecDeque;

use crate::config::TouchConfig;
use crate::constants::{SWIPE_LONGEST_PAST_TIME_MS, SWIPE_NUM_PAST, SWIPE_VELOCITY_UNITS_MS};
use crate::keyboard::GestureType;

/// Direction of a confirmed swipe (screen coordinates: up is -y)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    pub fn gesture(self) -> GestureType {
        match self {
            SwipeDirection::Up => GestureType::SwipeUp,
            SwipeDirection::Down => GestureType::SwipeDown,
            SwipeDirection::Left => GestureType::SwipeLeft,
            SwipeDirection::Right => GestureType::SwipeRight,
        }
    }
}

/// Travel threshold in pixels; `fast` selects the tightened fast-input one
pub fn travel_threshold(config: &TouchConfig, fast: bool) -> f32 {
    if fast {
        config.swipe_travel_fast
    } else {
        config.swipe_travel
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    x: f32,
    y: f32,
    time: u64,
}

/// Rolling window of recent touch samples for velocity estimation
#[derive(Debug, Clone, Default)]
pub struct SwipeTracker {
    samples: VecDeque<Sample>,
}

impl SwipeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample, dropping ones too old or beyond the window size
    pub fn add_point(&mut self, x: f32, y: f32, time: u64) {
        let horizon = time.saturating_sub(SWIPE_LONGEST_PAST_TIME_MS);
        while self.samples.front().is_some_and(|s| s.time < horizon) {
            self.samples.pop_front();
        }
        if self.samples.len() == SWIPE_NUM_PAST {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { x, y, time });
    }

    /// Rolling average velocity relative to the oldest sample (px/s)
    pub fn velocity(&self) -> (f32, f32) {
        let Some(oldest) = self.samples.front() else {
            return (0.0, 0.0);
        };
        let mut accum_x = 0.0f32;
        let mut accum_y = 0.0f32;
        for s in self.samples.iter().skip(1) {
            let dur = s.time.saturating_sub(oldest.time);
            if dur == 0 {
                continue;
            }
            let dur = dur as f32;
            let vx = (s.x - oldest.x) / dur * SWIPE_VELOCITY_UNITS_MS;
            let vy = (s.y - oldest.y) / dur * SWIPE_VELOCITY_UNITS_MS;
            accum_x = if accum_x == 0.0 { vx } else { (accum_x + vx) * 0.5 };
            accum_y = if accum_y == 0.0 { vy } else { (accum_y + vy) * 0.5 };
        }
        (accum_x, accum_y)
    }

    /// Velocity between the two newest samples (px/s)
    pub fn ending_velocity(&self) -> (f32, f32) {
        let n = self.samples.len();
        if n < 2 {
            return (0.0, 0.0);
        }
        let (a, b) = (self.samples[n - 2], self.samples[n - 1]);
        let dur = b.time.saturating_sub(a.time);
        if dur == 0 {
            return (0.0, 0.0);
        }
        let dur = dur as f32;
        (
            (b.x - a.x) / dur * SWIPE_VELOCITY_UNITS_MS,
            (b.y - a.y) / dur * SWIPE_VELOCITY_UNITS_MS,
        )
    }
}

/// Motion summary of a finished gesture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeMotion {
    /// Displacement from the down point
    pub dx: f32,
    pub dy: f32,
    /// Rolling fling velocity
    pub vx: f32,
    pub vy: f32,
    /// Velocity at lift-off
    pub end_vx: f32,
    pub end_vy: f32,
}

impl SwipeMotion {
    pub fn new(dx: f32, dy: f32, tracker: &SwipeTracker) -> Self {
        let (vx, vy) = tracker.velocity();
        let (end_vx, end_vy) = tracker.ending_velocity();
        Self {
            dx,
            dy,
            vx,
            vy,
            end_vx,
            end_vy,
        }
    }
}

/// Fling detector.
///
/// `has_binding` reports whether the pressed key binds a direction. The
/// cross-axis check is relaxed when the key has no binding for the
/// cross-axis direction the finger drifted towards.
pub fn detect_fling(
    motion: &SwipeMotion,
    travel: f32,
    has_binding: impl Fn(SwipeDirection) -> bool,
) -> Option<SwipeDirection> {
    let abs_x = motion.dx.abs();
    let abs_y = motion.dy.abs();

    let vertical_free = || {
        abs_y < abs_x
            || (motion.dy > 0.0 && !has_binding(SwipeDirection::Down))
            || (motion.dy <= 0.0 && !has_binding(SwipeDirection::Up))
    };
    let horizontal_free = || {
        abs_x < abs_y
            || (motion.dx > 0.0 && !has_binding(SwipeDirection::Right))
            || (motion.dx <= 0.0 && !has_binding(SwipeDirection::Left))
    };

    // (direction, travelled far enough, still moving that way at lift-off)
    let candidates = [
        (
            SwipeDirection::Right,
            motion.dx > travel,
            motion.vx > 0.0 && motion.end_vx >= 0.0,
        ),
        (
            SwipeDirection::Left,
            motion.dx < -travel,
            motion.vx < 0.0 && motion.end_vx <= 0.0,
        ),
        (
            SwipeDirection::Up,
            motion.dy < -travel,
            motion.vy < 0.0 && motion.end_vy <= 0.0,
        ),
        (
            SwipeDirection::Down,
            motion.dy > travel,
            motion.vy > 0.0 && motion.end_vy >= 0.0,
        ),
    ];

    candidates
        .into_iter()
        .find(|&(dir, moved, same_way)| {
            let cross_free = match dir {
                SwipeDirection::Left | SwipeDirection::Right => vertical_free(),
                SwipeDirection::Up | SwipeDirection::Down => horizontal_free(),
            };
            moved && same_way && cross_free && has_binding(dir)
        })
        .map(|(dir, _, _)| dir)
}

/// Distance detector: dominant axis travel past the threshold
pub fn detect_distance(dx: f32, dy: f32, travel: f32) -> Option<SwipeDirection> {
    let abs_x = dx.abs();
    let abs_y = dy.abs();
    if abs_x.max(abs_y) <= travel {
        return None;
    }
    Some(if abs_x < abs_y {
        if dy > 0.0 {
            SwipeDirection::Down
        } else {
            SwipeDirection::Up
        }
    } else if dx > 0.0 {
        SwipeDirection::Right
    } else {
        SwipeDirection::Left
    })
}
