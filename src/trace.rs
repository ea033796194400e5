//! Touch traces
//!
//! A trace is a recorded stream of touch events in TOML, replayed by the
//! `keytouch` binary:
//!
//! ```toml
//! [engine]
//! composing = false
//!
//! [[events]]
//! time = 0
//! action = "down"
//! x = 50.0
//! y = 40.0
//!
//! [[events]]
//! time = 60
//! action = "up"
//! x = 50.0
//! y = 40.0
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dispatch::{PointerId, TouchAction, TouchEvent};
use crate::error::TraceError;
use crate::keyboard::EngineState;

/// One recorded touch event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Milliseconds since the start of the trace
    pub time: u64,
    #[serde(default)]
    pub pointer: PointerId,
    pub action: TouchAction,
    pub x: f32,
    pub y: f32,
}

impl From<TraceEntry> for TouchEvent {
    fn from(e: TraceEntry) -> Self {
        TouchEvent::new(e.pointer, e.action, e.x, e.y, e.time)
    }
}

/// Recorded touch session plus the engine state to replay it under
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trace {
    pub engine: EngineState,
    pub events: Vec<TraceEntry>,
}

impl Trace {
    /// Parse a trace; event times must never decrease
    pub fn parse(content: &str) -> Result<Self, TraceError> {
        let trace: Trace = toml::from_str(content)?;
        let mut previous = 0;
        for (index, entry) in trace.events.iter().enumerate() {
            if entry.time < previous {
                return Err(TraceError::NonMonotonic {
                    index,
                    time: entry.time,
                    previous,
                });
            }
            previous = entry.time;
        }
        Ok(trace)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trace: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid trace: {}", path.display()))
    }

    /// Time of the last event
    pub fn end_time(&self) -> u64 {
        self.events.last().map(|e| e.time).unwrap_or(0)
    }

    pub fn touch_events(&self) -> impl Iterator<Item = TouchEvent> + '_ {
        self.events.iter().copied().map(TouchEvent::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace() {
        let trace = Trace::parse(
            r#"
[engine]
composing = true

[[events]]
time = 0
action = "down"
x = 10.0
y = 20.0

[[events]]
time = 40
pointer = 1
action = "cancel"
x = 10.0
y = 20.0
"#,
        )
        .unwrap();
        assert!(trace.engine.composing);
        assert_eq!(trace.events.len(), 2);
        assert_eq!(trace.events[0].pointer, 0);
        assert_eq!(trace.events[1].action, TouchAction::Cancel);
        assert_eq!(trace.end_time(), 40);

        let events: Vec<TouchEvent> = trace.touch_events().collect();
        assert_eq!(events[1].pointer, 1);
    }

    #[test]
    fn test_empty_trace() {
        let trace = Trace::parse("").unwrap();
        assert!(trace.events.is_empty());
        assert_eq!(trace.engine, EngineState::default());
    }

    #[test]
    fn test_rejects_time_going_backwards() {
        let err = Trace::parse(
            r#"
[[events]]
time = 100
action = "down"
x = 0.0
y = 0.0

[[events]]
time = 50
action = "up"
x = 0.0
y = 0.0
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TraceError::NonMonotonic {
                index: 1,
                time: 50,
                previous: 100
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_action() {
        let err = Trace::parse(
            r#"
[[events]]
time = 0
action = "hover"
x = 0.0
y = 0.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::Parse(_)));
    }
}
