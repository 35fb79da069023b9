use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Sliding-window rate limiter keyed by an arbitrary string
/// (the tool orchestrator uses `"<session>:<tool>"`).
///
/// A call is admitted when fewer than `limit` calls were admitted for the
/// same key within the trailing window. Denied calls are not recorded, so a
/// caller hammering a limited key does not extend its own lockout.
///
/// Keys whose window has emptied are dropped: on lookup, and by a sweep that
/// `check` runs at most once per window.
pub struct RateLimiter {
    window: Duration,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    windows: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl LimiterState {
    fn sweep(&mut self, now: Instant, window: Duration) {
        self.windows.retain(|_, calls| {
            evict_expired(calls, now, window);
            !calls.is_empty()
        });
        self.last_sweep = now;
    }

    /// Live calls for `key`, or `None` (and the key forgotten) when none remain.
    fn live(&mut self, key: &str, now: Instant, window: Duration) -> Option<&VecDeque<Instant>> {
        let calls = self.windows.get_mut(key)?;
        evict_expired(calls, now, window);
        if calls.is_empty() {
            self.windows.remove(key);
            return None;
        }
        self.windows.get(key)
    }
}

impl RateLimiter {
    /// Create a limiter with the given window length.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Create a limiter counting calls per minute.
    pub fn per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to admit one call for `key` under `limit` calls per window.
    /// Returns `true` if allowed, `false` if rate limited.
    pub async fn check(&self, key: &str, limit: u32) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if now.duration_since(state.last_sweep) >= self.window {
            state.sweep(now, self.window);
        }
        let calls = state.windows.entry(key.to_string()).or_default();
        evict_expired(calls, now, self.window);

        if calls.len() >= limit as usize {
            warn!(key = %key, limit, "Rate limit exceeded");
            if calls.is_empty() {
                state.windows.remove(key);
            }
            return false;
        }
        calls.push_back(now);
        true
    }

    /// Number of calls still admissible for `key` in the current window.
    pub async fn remaining(&self, key: &str, limit: u32) -> u32 {
        let mut state = self.state.lock().await;
        let used = state
            .live(key, Instant::now(), self.window)
            .map_or(0, VecDeque::len);
        limit.saturating_sub(used as u32)
    }

    /// Time until the oldest admitted call for `key` leaves the window.
    pub async fn reset_in(&self, key: &str) -> Duration {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state
            .live(key, now, self.window)
            .and_then(VecDeque::front)
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Forget all calls recorded for `key`.
    pub async fn reset(&self, key: &str) {
        self.state.lock().await.windows.remove(key);
    }

    /// Drop keys whose windows have fully expired.
    pub async fn cleanup(&self) {
        self.state.lock().await.sweep(Instant::now(), self.window);
    }

    /// Number of keys with calls still inside the window (or not yet swept).
    pub async fn tracked_keys(&self) -> usize {
        self.state.lock().await.windows.len()
    }
}

fn evict_expired(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = calls.front() {
        if now.duration_since(*oldest) >= window {
            calls.pop_front();
        } else {
            break;
        }
    }
}
