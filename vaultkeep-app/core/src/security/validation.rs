//! Input validation and attempt rate limiting.
//!
//! `validate` is a defense-in-depth deny-list applied to every user-supplied
//! string before it is stored; the presentation layer still renders vault
//! contents as literal text. `RateLimiter` throttles authentication attempts
//! before they reach key derivation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::RegexSet;
use tracing::warn;

use crate::clock::Clock;

/// Default attempts allowed per window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default window length (1 minute).
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

/// Patterns that indicate markup or script injection.
const DENY_PATTERNS: &[&str] = &[
    r"<[^>]*>",
    r"javascript:",
    r"on\w+\s*=",
    r"data:[^,]*script",
    r"<script",
    r"<iframe",
    r"<object",
    r"<embed",
    r"<img",
    r"<svg",
    r"eval\s*\(",
    r"expression\s*\(",
    r"import\s+",
    r"require\s*\(",
];

fn deny_list() -> &'static RegexSet {
    static DENY: OnceLock<RegexSet> = OnceLock::new();
    DENY.get_or_init(|| {
        let patterns = DENY_PATTERNS.iter().map(|p| format!("(?i){}", p));
        RegexSet::new(patterns).expect("deny-list patterns are valid regexes")
    })
}

/// Check that `text` is at most `max_len` characters and matches none of the
/// deny-list patterns.
pub fn validate(text: &str, max_len: usize) -> bool {
    if text.chars().count() > max_len {
        return false;
    }
    !deny_list().is_match(text)
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    first_ms: i64,
}

/// Per-action sliding-window attempt counter.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    attempts: HashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            attempts: HashMap::new(),
        }
    }

    /// Record an attempt for `key` with the default limits.
    pub fn check(&mut self, key: &str) -> bool {
        self.check_with(key, DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW_MS)
    }

    /// Record an attempt for `key`; returns `false` once more than `max`
    /// attempts fall inside the window that started with the first one.
    pub fn check_with(&mut self, key: &str, max: u32, window_ms: i64) -> bool {
        let now = self.clock.now_ms();

        match self.attempts.get_mut(key) {
            Some(window) if now - window.first_ms <= window_ms => {
                window.count = window.count.saturating_add(1);
                let allowed = window.count <= max;
                if !allowed {
                    warn!("Rate limit exceeded for '{}' ({} attempts)", key, window.count);
                }
                allowed
            }
            _ => {
                self.attempts.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        first_ms: now,
                    },
                );
                true
            }
        }
    }

    /// Forget all recorded attempts for `key`.
    pub fn reset(&mut self, key: &str) {
        self.attempts.remove(key);
    }
}
