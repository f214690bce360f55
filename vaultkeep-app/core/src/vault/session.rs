//! Session expiry arithmetic.
//!
//! A session is nothing more than an expiry instant; whether it is active is
//! recomputed from the clock on every check.

/// Default session length for a login.
pub const DEFAULT_SESSION_MS: i64 = 60_000;

/// Session length granted by a successful re-authentication.
pub const REAUTH_SESSION_MS: i64 = 60_000;

/// Upper bound on an extended session, measured from the moment it is extended.
pub const MAX_SESSION_MS: i64 = 60 * 60_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    expiry_ms: i64,
}

impl Session {
    /// A session lasting `duration_ms` from `now_ms`. Negative durations
    /// start already expired.
    pub fn start(now_ms: i64, duration_ms: i64) -> Self {
        Self {
            expiry_ms: now_ms + duration_ms.max(0),
        }
    }

    pub fn expiry_ms(&self) -> i64 {
        self.expiry_ms
    }

    /// Active strictly before the expiry instant.
    pub fn is_active(&self, now_ms: i64) -> bool {
        now_ms < self.expiry_ms
    }

    pub fn remaining(&self, now_ms: i64) -> i64 {
        (self.expiry_ms - now_ms).max(0)
    }

    /// Add `additional_ms` on top of the remaining time, capped at
    /// `MAX_SESSION_MS` from `now_ms`.
    pub fn extend(&mut self, now_ms: i64, additional_ms: i64) {
        let extended = now_ms + self.remaining(now_ms) + additional_ms.max(0);
        self.expiry_ms = extended.min(now_ms + MAX_SESSION_MS);
    }

    pub fn end(&mut self) {
        self.expiry_ms = 0;
    }
}
