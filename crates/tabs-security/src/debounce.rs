//! Suppression of repeated switch requests.
//!
//! Browsers and impatient users fire the same switch several times in a row.
//! The debouncer remembers when each `(session, tab)` pair last completed a
//! switch and suppresses repeats that arrive inside the window. Checking and
//! recording are separate steps so a switch that is later vetoed leaves no
//! trace.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Recorded switches between sweeps of stale entries.
const SWEEP_EVERY: usize = 256;

#[derive(Debug, Default)]
struct Accepted {
    at: HashMap<String, Instant>,
    since_sweep: usize,
}

/// Thread-safe switch debouncer.
#[derive(Debug)]
pub struct SwitchDebouncer {
    window: Duration,
    accepted: Mutex<Accepted>,
}

impl SwitchDebouncer {
    /// Create a debouncer. A zero window disables debouncing.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            accepted: Mutex::new(Accepted::default()),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn key(session_id: &str, tab_id: &str) -> String {
        format!("{session_id}:{tab_id}")
    }

    /// Whether a switch to `tab_id` in `session_id` should be suppressed.
    ///
    /// Read-only: only [`SwitchDebouncer::record`] starts a window.
    #[must_use]
    pub fn is_debounced(&self, session_id: &str, tab_id: &str) -> bool {
        if self.window.is_zero() {
            return false;
        }

        let accepted = self.accepted.lock().unwrap_or_else(PoisonError::into_inner);
        let debounced = accepted
            .at
            .get(&Self::key(session_id, tab_id))
            .is_some_and(|prev| prev.elapsed() < self.window);
        if debounced {
            tracing::debug!(tab_id, session_id, "tab_switch_debounced");
        }
        debounced
    }

    /// Record a completed switch, starting a new window for the pair.
    pub fn record(&self, session_id: &str, tab_id: &str) {
        if self.window.is_zero() {
            return;
        }

        let now = Instant::now();
        let mut accepted = self.accepted.lock().unwrap_or_else(PoisonError::into_inner);
        accepted.at.insert(Self::key(session_id, tab_id), now);

        accepted.since_sweep += 1;
        if accepted.since_sweep >= SWEEP_EVERY {
            accepted.since_sweep = 0;
            let window = self.window;
            accepted.at.retain(|_, at| now.duration_since(*at) < window);
        }
    }

    /// Drop entries older than the window. Returns the number dropped.
    pub fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let mut accepted = self.accepted.lock().unwrap_or_else(PoisonError::into_inner);
        let before = accepted.at.len();
        let window = self.window;
        accepted.at.retain(|_, at| now.duration_since(*at) < window);
        before - accepted.at.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_repeat_within_window_is_debounced() {
        let debouncer = SwitchDebouncer::new(Duration::from_millis(50));

        assert!(!debouncer.is_debounced("s1", "a"));
        debouncer.record("s1", "a");
        assert!(debouncer.is_debounced("s1", "a"));
    }

    #[test]
    fn test_check_alone_does_not_start_window() {
        let debouncer = SwitchDebouncer::new(Duration::from_secs(10));

        assert!(!debouncer.is_debounced("s1", "a"));
        assert!(!debouncer.is_debounced("s1", "a"));
    }

    #[test]
    fn test_repeat_after_window_is_accepted() {
        let debouncer = SwitchDebouncer::new(Duration::from_millis(10));

        debouncer.record("s1", "a");
        thread::sleep(Duration::from_millis(15));
        assert!(!debouncer.is_debounced("s1", "a"));
    }

    #[test]
    fn test_keys_are_per_session_and_tab() {
        let debouncer = SwitchDebouncer::new(Duration::from_secs(10));

        debouncer.record("s1", "a");
        assert!(!debouncer.is_debounced("s1", "b"));
        assert!(!debouncer.is_debounced("s2", "a"));
    }

    #[test]
    fn test_zero_window_disables() {
        let debouncer = SwitchDebouncer::new(Duration::ZERO);
        debouncer.record("s1", "a");
        assert!(!debouncer.is_debounced("s1", "a"));
        assert!(debouncer.accepted.lock().unwrap().at.is_empty());
    }

    #[test]
    fn test_purge_stale() {
        let debouncer = SwitchDebouncer::new(Duration::from_millis(10));
        debouncer.record("s1", "a");
        debouncer.record("s1", "b");

        thread::sleep(Duration::from_millis(15));
        debouncer.record("s1", "c");

        assert_eq!(debouncer.purge_stale(), 2);
    }

    #[test]
    fn test_stale_entries_are_swept_on_record() {
        let debouncer = SwitchDebouncer::new(Duration::from_millis(10));
        for i in 0..SWEEP_EVERY - 1 {
            debouncer.record("s1", &format!("t{i}"));
        }

        thread::sleep(Duration::from_millis(15));
        debouncer.record("s1", "last");

        let accepted = debouncer.accepted.lock().unwrap();
        assert_eq!(accepted.at.len(), 1);
        assert!(accepted.at.contains_key("s1:last"));
    }
}
