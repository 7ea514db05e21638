use std::{
    collections::HashMap,
    sync::{Mutex, OnceLock},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy)]
struct WarnThrottleState {
    last: Instant,
    suppressed: u64,
}

/// Keep the first `head` and last `tail` characters of a long value, e.g. a file name on a
/// progress line.
pub fn shorten(value: &str, head: usize, tail: usize) -> String {
    let len = value.chars().count();
    if len <= head + tail + 2 {
        return value.to_string();
    }
    let start: String = value.chars().take(head).collect();
    let end: String = value.chars().skip(len - tail).collect();
    format!("{start}..{end}")
}

/// Emit at most one warning per `key` and `interval`. Returns whether the caller may log now.
pub fn warn_throttled(key: &'static str, interval: Duration) -> bool {
    let Some(suppressed) = warn_throttled_with_count(key, interval) else {
        return false;
    };
    if suppressed > 0 {
        tracing::warn!(
            event = "throttled_warning_summary",
            key,
            suppressed,
            "throttled warnings were suppressed"
        );
    }
    true
}

pub fn warn_throttled_with_count(key: &'static str, interval: Duration) -> Option<u64> {
    static LAST_WARN: OnceLock<Mutex<HashMap<&'static str, WarnThrottleState>>> = OnceLock::new();
    let map = LAST_WARN.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = match map.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("warn throttle lock poisoned; continuing with recovered state");
            poisoned.into_inner()
        }
    };
    let now = Instant::now();
    if let Some(state) = guard.get_mut(key) {
        if now.saturating_duration_since(state.last) < interval {
            state.suppressed = state.suppressed.saturating_add(1);
            return None;
        }
        let suppressed = state.suppressed;
        state.last = now;
        state.suppressed = 0;
        return Some(suppressed);
    }
    guard.insert(
        key,
        WarnThrottleState {
            last: now,
            suppressed: 0,
        },
    );
    Some(0)
}
