//! Fixed-window rate limiting of tab switch attempts.
//!
//! Counters are keyed by `tabs:<tab>:<caller>`. Each counter lives behind its
//! own mutex, so concurrent callers only contend when they share a key. The
//! outer map lock is held just long enough to find or insert a counter.
//! Expired counters are swept every `SWEEP_EVERY` new keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use tabs_config::RateLimitKey;

/// Longest window a limiter accepts. Longer decays are clamped.
pub const MAX_DECAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// New counters between sweeps of expired ones.
const SWEEP_EVERY: usize = 256;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    /// Attempt counted. `remaining` attempts are left in the window.
    NotLimited { remaining: u32 },
    /// Window exhausted until `reset_at`.
    Limited { reset_at: SystemTime },
}

impl RateLimit {
    #[must_use]
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

/// Facts about the caller from which a rate-limit key is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub subject_id: Option<String>,
    pub session_id: Option<String>,
    pub ip: Option<String>,
}

impl CallerIdentity {
    /// Caller key for `kind`.
    ///
    /// Subject and session keys fall back to the network address when the
    /// caller has none.
    #[must_use]
    pub fn caller_key(&self, kind: RateLimitKey) -> String {
        let ip = || self.ip.clone().unwrap_or_else(|| "unknown".to_owned());
        match kind {
            RateLimitKey::Ip => ip(),
            RateLimitKey::Session => self.session_id.clone().unwrap_or_else(ip),
            RateLimitKey::Subject => self.subject_id.clone().unwrap_or_else(ip),
        }
    }
}

#[derive(Debug)]
struct Window {
    hits: u32,
    started: Instant,
    reset_at: SystemTime,
}

impl Window {
    fn new(decay: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            hits: 0,
            started: Instant::now(),
            reset_at: now.checked_add(decay).unwrap_or(now),
        }
    }

    fn roll(&mut self, decay: Duration) {
        if self.started.elapsed() >= decay {
            *self = Self::new(decay);
        }
    }
}

/// Counts switch attempts per `(tab, caller)` within a decay window.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    attempts: u32,
    decay: Duration,
    windows: RwLock<HashMap<String, Arc<Mutex<Window>>>>,
    inserted: AtomicUsize,
}

impl RateLimiter {
    /// Create a limiter. `decay` is clamped to [`MAX_DECAY`].
    #[must_use]
    pub fn new(enabled: bool, attempts: u32, decay: Duration) -> Self {
        Self {
            enabled,
            attempts,
            decay: decay.min(MAX_DECAY),
            windows: RwLock::new(HashMap::new()),
            inserted: AtomicUsize::new(0),
        }
    }

    /// Limiter that never limits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false, u32::MAX, Duration::ZERO)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn key(tab_id: &str, caller: &str) -> String {
        format!("tabs:{tab_id}:{caller}")
    }

    fn window(&self, key: &str) -> Option<Arc<Mutex<Window>>> {
        self.windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(Arc::clone)
    }

    fn window_or_insert(&self, key: String) -> Arc<Mutex<Window>> {
        if let Some(window) = self.window(&key) {
            return window;
        }

        let mut inserted = false;
        let window = {
            let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(windows.entry(key).or_insert_with(|| {
                inserted = true;
                Arc::new(Mutex::new(Window::new(self.decay)))
            }))
        };

        if inserted && (self.inserted.fetch_add(1, Ordering::Relaxed) + 1).is_multiple_of(SWEEP_EVERY) {
            let purged = self.purge_expired();
            tracing::trace!(purged, "swept expired rate-limit counters");
        }
        window
    }

    /// Record an attempt unless the window is exhausted.
    ///
    /// A limited check does not count as an attempt.
    pub fn check(&self, tab_id: &str, caller: &str) -> RateLimit {
        if !self.enabled {
            return RateLimit::NotLimited {
                remaining: u32::MAX,
            };
        }

        let window = self.window_or_insert(Self::key(tab_id, caller));
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.roll(self.decay);

        if window.hits >= self.attempts {
            return RateLimit::Limited {
                reset_at: window.reset_at,
            };
        }
        window.hits += 1;
        RateLimit::NotLimited {
            remaining: self.attempts - window.hits,
        }
    }

    /// Attempts left in the current window (`None` when limiting is off).
    #[must_use]
    pub fn remaining_attempts(&self, tab_id: &str, caller: &str) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        let Some(window) = self.window(&Self::key(tab_id, caller)) else {
            return Some(self.attempts);
        };
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.roll(self.decay);
        Some(self.attempts.saturating_sub(window.hits))
    }

    /// Time until the current window resets (`None` when limiting is off).
    #[must_use]
    pub fn available_in(&self, tab_id: &str, caller: &str) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let Some(window) = self.window(&Self::key(tab_id, caller)) else {
            return Some(Duration::ZERO);
        };
        let window = window.lock().unwrap_or_else(PoisonError::into_inner);
        Some(self.decay.saturating_sub(window.started.elapsed()))
    }

    /// Forget the counter for `(tab, caller)`.
    pub fn clear(&self, tab_id: &str, caller: &str) {
        self.windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(tab_id, caller));
    }

    /// Drop counters whose window has elapsed. Returns the number dropped.
    pub fn purge_expired(&self) -> usize {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, w| {
            w.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .started
                .elapsed()
                < self.decay
        });
        before - windows.len()
    }
}
