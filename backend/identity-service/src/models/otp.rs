//! One-time passcode state for a single phone.
//!
//! The lock/attempt arithmetic lives here so every store backend applies
//! exactly the same rules; stores only provide per-phone atomicity.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// OTP lifetime (5 minutes)
pub const DEFAULT_OTP_TTL_SECS: i64 = 300;

/// Consecutive failures that trigger a lockout
pub const DEFAULT_LOCK_THRESHOLD: i32 = 5;

/// Lockout duration (15 minutes)
pub const DEFAULT_LOCKOUT_SECS: i64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    pub ttl: Duration,
    pub lock_threshold: i32,
    pub lockout: Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_OTP_TTL_SECS),
            lock_threshold: DEFAULT_LOCK_THRESHOLD,
            lockout: Duration::seconds(DEFAULT_LOCKOUT_SECS),
        }
    }
}

/// Row of the `otps` table.
///
/// `code`/`expires_at` are `None` on a row that only tracks attempts.
/// `failed_attempts` only counts while `attempts_expire_at` is in the future;
/// the window opens on the first failure and lasts one lockout period.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OtpEntry {
    pub phone: String,
    pub code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub attempts_expire_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Attempt/lock state after recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttemptState {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    /// True only for the call that crossed the threshold
    pub newly_locked: bool,
}

impl AttemptState {
    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some()
    }
}

/// Result of checking a submitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Accepted,
    Rejected(AttemptState),
    Locked { until: DateTime<Utc> },
}

impl OtpEntry {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            code: None,
            expires_at: None,
            failed_attempts: 0,
            attempts_expire_at: None,
            locked_until: None,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }

    /// Lock deadline if the lock is still in force
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }

    /// Replace the outstanding code. Attempt and lock state are kept.
    pub fn set_code(&mut self, code: &str, now: DateTime<Utc>, policy: &OtpPolicy) {
        self.code = Some(code.to_string());
        self.expires_at = Some(now + policy.ttl);
    }

    pub fn clear_code(&mut self) {
        self.code = None;
        self.expires_at = None;
    }

    /// Drop the code if it has expired. Returns true when something was dropped.
    pub fn expire_code(&mut self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) if exp <= now => {
                self.clear_code();
                true
            }
            _ => false,
        }
    }

    /// Failures still inside their window
    pub fn live_attempts(&self, now: DateTime<Utc>) -> i32 {
        match self.attempts_expire_at {
            Some(exp) if exp > now => self.failed_attempts,
            _ => 0,
        }
    }

    /// Current code, or `None` when missing, expired, or locked out
    pub fn active_code(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.is_locked(now) {
            return None;
        }
        match (&self.code, self.expires_at) {
            (Some(code), Some(exp)) if exp > now => Some(code.as_str()),
            _ => None,
        }
    }

    /// Count one failure.
    ///
    /// While locked this is a no-op that reports the existing lock. An
    /// expired lock or attempt window is cleared first so counting restarts
    /// from zero.
    pub fn register_failure(&mut self, now: DateTime<Utc>, policy: &OtpPolicy) -> AttemptState {
        if let Some(until) = self.locked_until {
            if until > now {
                return AttemptState {
                    failed_attempts: self.failed_attempts,
                    locked_until: Some(until),
                    newly_locked: false,
                };
            }
            self.locked_until = None;
        }

        self.failed_attempts = self.live_attempts(now);
        if self.failed_attempts == 0 {
            self.attempts_expire_at = Some(now + policy.lockout);
        }

        self.failed_attempts += 1;
        let mut newly_locked = false;
        if self.failed_attempts >= policy.lock_threshold {
            self.locked_until = Some(now + policy.lockout);
            self.failed_attempts = 0;
            self.attempts_expire_at = None;
            newly_locked = true;
        }

        AttemptState {
            failed_attempts: self.failed_attempts,
            locked_until: self.locked_until,
            newly_locked,
        }
    }

    pub fn reset_attempts(&mut self) {
        self.failed_attempts = 0;
        self.attempts_expire_at = None;
        self.locked_until = None;
    }

    /// Check `submitted` against the outstanding code.
    ///
    /// Lockout is reported before any comparison. A match consumes the code
    /// and clears attempts; anything else counts as a failure.
    pub fn check(&mut self, submitted: &str, now: DateTime<Utc>, policy: &OtpPolicy) -> CodeCheck {
        if let Some(until) = self.active_lock(now) {
            return CodeCheck::Locked { until };
        }

        self.expire_code(now);
        let matched = self
            .active_code(now)
            .map(|code| crypto_core::hash::constant_time_eq(code.as_bytes(), submitted.as_bytes()))
            .unwrap_or(false);

        if matched {
            self.clear_code();
            self.reset_attempts();
            CodeCheck::Accepted
        } else {
            CodeCheck::Rejected(self.register_failure(now, policy))
        }
    }

    /// Nothing left worth keeping: no live code, no counted attempts, no lock
    pub fn is_disposable(&self, now: DateTime<Utc>) -> bool {
        self.active_code(now).is_none()
            && self.live_attempts(now) == 0
            && self.active_lock(now).is_none()
    }
}
