/// Postgres-backed OTP store.
///
/// Every read-modify-write runs in one transaction holding the phone's row
/// lock (`SELECT ... FOR UPDATE`). The state transition itself is
/// `OtpEntry`'s, so this backend and the in-memory one agree exactly.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::error::{IdentityError, Result};
use crate::models::{AttemptState, CodeCheck, OtpEntry, OtpPolicy};
use crate::security::OtpStore;

const OTP_COLUMNS: &str =
    "phone, code, expires_at, failed_attempts, attempts_expire_at, locked_until";

#[derive(Clone)]
pub struct PgOtpStore {
    pool: PgPool,
    policy: OtpPolicy,
}

impl PgOtpStore {
    pub fn new(pool: PgPool, policy: OtpPolicy) -> Self {
        Self { pool, policy }
    }

    async fn lock_row(conn: &mut PgConnection, phone: &str) -> Result<Option<OtpEntry>> {
        let entry = sqlx::query_as::<_, OtpEntry>(&format!(
            "SELECT {} FROM otps WHERE phone = $1 FOR UPDATE",
            OTP_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(conn)
        .await?;

        Ok(entry)
    }

    /// Persist the entry, or delete the row once nothing is left to track
    async fn save(conn: &mut PgConnection, entry: &OtpEntry, now: DateTime<Utc>) -> Result<()> {
        if entry.is_disposable(now) {
            sqlx::query("DELETE FROM otps WHERE phone = $1")
                .bind(&entry.phone)
                .execute(conn)
                .await?;
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE otps
            SET code = $2, expires_at = $3, failed_attempts = $4,
                attempts_expire_at = $5, locked_until = $6
            WHERE phone = $1
            "#,
        )
        .bind(&entry.phone)
        .bind(&entry.code)
        .bind(entry.expires_at)
        .bind(entry.failed_attempts)
        .bind(entry.attempts_expire_at)
        .bind(entry.locked_until)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Apply `f` to the phone's row under its row lock.
    ///
    /// With `create` a blank row is inserted first so attempts on phones
    /// without an outstanding code are still counted.
    async fn update<T, F>(&self, phone: &str, create: bool, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut OtpEntry, DateTime<Utc>) -> T + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        if create {
            sqlx::query("INSERT INTO otps (phone) VALUES ($1) ON CONFLICT (phone) DO NOTHING")
                .bind(phone)
                .execute(&mut *tx)
                .await?;
        }

        let Some(mut entry) = Self::lock_row(&mut *tx, phone).await? else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = Utc::now();
        let out = f(&mut entry, now);
        Self::save(&mut *tx, &entry, now).await?;
        tx.commit().await?;

        Ok(Some(out))
    }

    async fn upsert<T, F>(&self, phone: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut OtpEntry, DateTime<Utc>) -> T + Send,
        T: Send,
    {
        self.update(phone, true, f)
            .await?
            .ok_or_else(|| IdentityError::Internal("OTP row missing after upsert".into()))
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    async fn put(&self, phone: &str, code: &str) -> Result<()> {
        let policy = self.policy;
        self.upsert(phone, |entry, now| entry.set_code(code, now, &policy))
            .await
    }

    async fn get(&self, phone: &str) -> Result<Option<String>> {
        let code = self
            .update(phone, false, |entry, now| {
                entry.expire_code(now);
                entry.active_code(now).map(str::to_string)
            })
            .await?;
        Ok(code.flatten())
    }

    async fn pop(&self, phone: &str) -> Result<()> {
        sqlx::query("DELETE FROM otps WHERE phone = $1")
            .bind(phone)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failed_attempt(&self, phone: &str) -> Result<AttemptState> {
        let policy = self.policy;
        self.upsert(phone, |entry, now| entry.register_failure(now, &policy))
            .await
    }

    async fn locked_until(&self, phone: &str) -> Result<Option<DateTime<Utc>>> {
        let until = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT locked_until FROM otps WHERE phone = $1 AND locked_until > $2",
        )
        .bind(phone)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(until)
    }

    async fn reset_attempts(&self, phone: &str) -> Result<()> {
        self.update(phone, false, |entry, _| entry.reset_attempts())
            .await?;
        Ok(())
    }

    async fn check_code(&self, phone: &str, code: &str) -> Result<CodeCheck> {
        let policy = self.policy;
        self.upsert(phone, |entry, now| entry.check(code, now, &policy))
            .await
    }

    /// Same predicate as `OtpEntry::is_disposable`. Rows locked by an
    /// in-flight transaction are skipped and picked up next sweep.
    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM otps
            WHERE phone IN (
                SELECT phone FROM otps
                WHERE (code IS NULL OR expires_at IS NULL OR expires_at <= $1)
                  AND (attempts_expire_at IS NULL OR attempts_expire_at <= $1 OR failed_attempts = 0)
                  AND (locked_until IS NULL OR locked_until <= $1)
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
