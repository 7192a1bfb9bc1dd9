/// OTP Store
///
/// Short-lived one-time codes keyed by phone, with failure-count lockout.
///
/// Every operation is atomic per phone: concurrent verifies for the same
/// number can never both read a pre-increment counter. Two backends:
/// - `InMemoryOtpStore`: single-process deployments and tests
/// - `db::otps::PgOtpStore`: shared `otps` table for multi-instance deployments
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{AttemptState, CodeCheck, OtpEntry, OtpPolicy};

#[async_trait]
pub trait OtpStore: Send + Sync {
    fn policy(&self) -> &OtpPolicy;

    /// Upsert the active code and restart its TTL
    async fn put(&self, phone: &str, code: &str) -> Result<()>;

    /// Active code, or `None` if absent, expired (deleted on read) or locked out
    async fn get(&self, phone: &str) -> Result<Option<String>>;

    /// Delete the entry outright
    async fn pop(&self, phone: &str) -> Result<()>;

    async fn record_failed_attempt(&self, phone: &str) -> Result<AttemptState>;

    /// Lock deadline while a lock is in force
    async fn locked_until(&self, phone: &str) -> Result<Option<DateTime<Utc>>>;

    async fn is_locked(&self, phone: &str) -> Result<bool> {
        Ok(self.locked_until(phone).await?.is_some())
    }

    async fn reset_attempts(&self, phone: &str) -> Result<()>;

    /// Lock check, comparison and attempt bookkeeping as one atomic step
    async fn check_code(&self, phone: &str, code: &str) -> Result<CodeCheck>;

    /// Delete entries with no live code, counted attempt or lock.
    /// Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Run `purge_expired` every `every` until the runtime shuts down
pub fn spawn_otp_sweeper(otps: Arc<dyn OtpStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        info!(interval_secs = every.as_secs(), "Starting OTP sweeper");

        loop {
            ticker.tick().await;
            match otps.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Purged stale OTP entries"),
                Err(e) => warn!(error = %e, "OTP sweep failed"),
            }
        }
    })
}

/// DashMap-backed store; each operation holds the shard lock for its phone
#[derive(Debug, Default)]
pub struct InMemoryOtpStore {
    entries: DashMap<String, OtpEntry>,
    policy: OtpPolicy,
}

impl InMemoryOtpStore {
    pub fn new(policy: OtpPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    /// Number of phones with live state
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `f` on the phone's entry, creating a blank one if needed
    fn with_entry<T>(&self, phone: &str, f: impl FnOnce(&mut OtpEntry, DateTime<Utc>) -> T) -> T {
        let now = Utc::now();
        let out = {
            let mut entry = self
                .entries
                .entry(phone.to_string())
                .or_insert_with(|| OtpEntry::new(phone));
            f(entry.value_mut(), now)
        };
        self.entries.remove_if(phone, |_, e| e.is_disposable(now));
        out
    }

    /// Run `f` only if the phone already has an entry
    fn with_existing<T>(
        &self,
        phone: &str,
        f: impl FnOnce(&mut OtpEntry, DateTime<Utc>) -> T,
    ) -> Option<T> {
        let now = Utc::now();
        let out = self
            .entries
            .get_mut(phone)
            .map(|mut entry| f(entry.value_mut(), now));
        if out.is_some() {
            self.entries.remove_if(phone, |_, e| e.is_disposable(now));
        }
        out
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    async fn put(&self, phone: &str, code: &str) -> Result<()> {
        let policy = self.policy;
        self.with_entry(phone, |entry, now| entry.set_code(code, now, &policy));
        Ok(())
    }

    async fn get(&self, phone: &str) -> Result<Option<String>> {
        Ok(self
            .with_existing(phone, |entry, now| {
                entry.expire_code(now);
                entry.active_code(now).map(str::to_string)
            })
            .flatten())
    }

    async fn pop(&self, phone: &str) -> Result<()> {
        self.entries.remove(phone);
        Ok(())
    }

    async fn record_failed_attempt(&self, phone: &str) -> Result<AttemptState> {
        let policy = self.policy;
        Ok(self.with_entry(phone, |entry, now| entry.register_failure(now, &policy)))
    }

    async fn locked_until(&self, phone: &str) -> Result<Option<DateTime<Utc>>> {
        let now = Utc::now();
        Ok(self
            .entries
            .get(phone)
            .and_then(|entry| entry.active_lock(now)))
    }

    async fn reset_attempts(&self, phone: &str) -> Result<()> {
        self.with_existing(phone, |entry, _| entry.reset_attempts());
        Ok(())
    }

    async fn check_code(&self, phone: &str, code: &str) -> Result<CodeCheck> {
        let policy = self.policy;
        Ok(self.with_entry(phone, |entry, now| entry.check(code, now, &policy)))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_disposable(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const PHONE: &str = "+249912345678";

    fn short_policy() -> OtpPolicy {
        OtpPolicy {
            ttl: Duration::milliseconds(100),
            lock_threshold: 5,
            lockout: Duration::milliseconds(200),
        }
    }

    #[tokio::test]
    async fn test_put_then_get_until_ttl() {
        let store = InMemoryOtpStore::new(short_policy());
        store.put(PHONE, "1234").await.unwrap();
        assert_eq!(store.get(PHONE).await.unwrap().as_deref(), Some("1234"));

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(store.get(PHONE).await.unwrap(), None);
        assert!(store.is_empty(), "expired entry should be deleted on read");
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_code() {
        let store = InMemoryOtpStore::default();
        store.put(PHONE, "1111").await.unwrap();
        store.put(PHONE, "2222").await.unwrap();
        assert_eq!(store.get(PHONE).await.unwrap().as_deref(), Some("2222"));
    }

    #[tokio::test]
    async fn test_pop_removes_entry() {
        let store = InMemoryOtpStore::default();
        store.put(PHONE, "1234").await.unwrap();
        store.pop(PHONE).await.unwrap();
        assert_eq!(store.get(PHONE).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_lock_after_threshold_and_get_hidden() {
        let store = InMemoryOtpStore::default();
        store.put(PHONE, "1234").await.unwrap();

        for _ in 0..4 {
            let state = store.record_failed_attempt(PHONE).await.unwrap();
            assert!(!state.is_locked());
        }
        assert!(!store.is_locked(PHONE).await.unwrap());

        let state = store.record_failed_attempt(PHONE).await.unwrap();
        assert!(state.newly_locked);
        assert!(store.is_locked(PHONE).await.unwrap());
        assert_eq!(store.get(PHONE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_attempts_clears_lock() {
        let store = InMemoryOtpStore::default();
        for _ in 0..5 {
            store.record_failed_attempt(PHONE).await.unwrap();
        }
        assert!(store.is_locked(PHONE).await.unwrap());

        store.reset_attempts(PHONE).await.unwrap();
        store.reset_attempts(PHONE).await.unwrap();
        assert!(!store.is_locked(PHONE).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_lock_expires_lazily() {
        let store = InMemoryOtpStore::new(short_policy());
        for _ in 0..5 {
            store.record_failed_attempt(PHONE).await.unwrap();
        }
        assert!(store.is_locked(PHONE).await.unwrap());

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        assert!(!store.is_locked(PHONE).await.unwrap());

        let state = store.record_failed_attempt(PHONE).await.unwrap();
        assert_eq!(state.failed_attempts, 1);
        assert!(!state.is_locked());
    }

    #[tokio::test]
    async fn test_check_code_flow() {
        let store = InMemoryOtpStore::default();
        store.put(PHONE, "4321").await.unwrap();

        assert!(matches!(
            store.check_code(PHONE, "0000").await.unwrap(),
            CodeCheck::Rejected(AttemptState { failed_attempts: 1, .. })
        ));
        assert_eq!(store.check_code(PHONE, "4321").await.unwrap(), CodeCheck::Accepted);

        // consumed
        assert!(matches!(
            store.check_code(PHONE, "4321").await.unwrap(),
            CodeCheck::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_counted_only_entries_purged_after_window() {
        let store = InMemoryOtpStore::new(short_policy());
        for i in 0..100 {
            let phone = format!("+1555{:07}", i);
            assert!(matches!(
                store.check_code(&phone, "1234").await.unwrap(),
                CodeCheck::Rejected(_)
            ));
        }
        store.put(PHONE, "1234").await.unwrap();
        assert_eq!(store.len(), 101);
        assert_eq!(store.purge_expired().await.unwrap(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 101);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_purge_keeps_live_locks() {
        let store = InMemoryOtpStore::default();
        for _ in 0..5 {
            store.record_failed_attempt(PHONE).await.unwrap();
        }
        store.record_failed_attempt("+249911111111").await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert!(store.is_locked(PHONE).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_sweeper_purges_in_background() {
        let store = Arc::new(InMemoryOtpStore::new(short_policy()));
        store.record_failed_attempt(PHONE).await.unwrap();
        assert_eq!(store.len(), 1);

        let sweeper = spawn_otp_sweeper(store.clone(), std::time::Duration::from_millis(50));
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        sweeper.abort();

        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_failures_lock_exactly_once() {
        let store = Arc::new(InMemoryOtpStore::default());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.record_failed_attempt(PHONE).await.unwrap() })
            })
            .collect();

        let mut locks = 0;
        for handle in handles {
            if handle.await.unwrap().newly_locked {
                locks += 1;
            }
        }

        assert_eq!(locks, 1);
        assert!(store.is_locked(PHONE).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_wrong_codes_lock_exactly_once() {
        let store = Arc::new(InMemoryOtpStore::default());
        store.put(PHONE, "123456").await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.check_code(PHONE, "000000").await.unwrap() })
            })
            .collect();

        let mut newly_locked = 0;
        for handle in handles {
            if let CodeCheck::Rejected(state) = handle.await.unwrap() {
                if state.newly_locked {
                    newly_locked += 1;
                }
            }
        }

        assert_eq!(newly_locked, 1);
        assert!(matches!(
            store.check_code(PHONE, "123456").await.unwrap(),
            CodeCheck::Locked { .. }
        ));
    }
}
