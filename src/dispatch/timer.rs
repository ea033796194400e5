//! Deferred timer queue
//!
//! Long-press, key repeat and preview timers are scheduled here against a
//! caller-supplied millisecond clock. Nothing fires on its own: the owner
//! pops due timers with [`TimerQueue::pop_due`], which keeps dispatch
//! single-threaded and deterministic under a virtual clock.

/// Handle for cancelling a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelHandle(u64);

#[derive(Debug)]
struct Pending<T> {
    id: u64,
    due: u64,
    token: T,
}

/// Timers ordered by due time, ties fired in scheduling order
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_id: u64,
    pending: Vec<Pending<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Schedule `token` to fire `delay` ms after `now`
    pub fn schedule(&mut self, now: u64, delay: u64, token: T) -> CancelHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(Pending {
            id,
            due: now.saturating_add(delay),
            token,
        });
        CancelHandle(id)
    }

    /// Cancel a timer; returns false if it already fired or was cancelled
    pub fn cancel(&mut self, handle: CancelHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != handle.0);
        self.pending.len() != before
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Earliest due time, if any timer is pending
    pub fn next_due(&self) -> Option<u64> {
        self.pending.iter().map(|p| p.due).min()
    }

    /// Remove and return the earliest timer due at or before `now`
    pub fn pop_due(&mut self, now: u64) -> Option<(u64, T)> {
        let pos = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= now)
            .min_by_key(|(_, p)| (p.due, p.id))
            .map(|(i, _)| i)?;
        let pending = self.pending.remove(pos);
        Some((pending.due, pending.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_due_order() {
        let mut q = TimerQueue::new();
        q.schedule(0, 50, "b");
        q.schedule(0, 10, "a");
        q.schedule(0, 50, "c");
        assert_eq!(q.next_due(), Some(10));
        assert_eq!(q.pop_due(5), None);
        assert_eq!(q.pop_due(100), Some((10, "a")));
        assert_eq!(q.pop_due(100), Some((50, "b")));
        assert_eq!(q.pop_due(100), Some((50, "c")));
        assert_eq!(q.next_due(), None);
    }

    #[test]
    fn test_cancel() {
        let mut q = TimerQueue::new();
        let h = q.schedule(0, 10, 1);
        q.schedule(0, 20, 2);
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        assert_eq!(q.next_due(), Some(20));
        assert_eq!(q.pop_due(100), Some((20, 2)));
        assert_eq!(q.next_due(), None);
    }
}
