/// JWT Token Revocation
///
/// Tracks `jti`s that were explicitly invalidated before their natural expiry.
/// An entry only needs to live until the token itself would have expired.
///
/// - **InMemoryRevocationStore**: process-lifetime map, pruned on every access.
///   A restart forgets revocations; only tokens revoked and not yet expired
///   are affected.
/// - **RedisRevocationStore**: shared across instances, pruned by key TTL.
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use redis::aio::ConnectionManager;

use crate::error::Result;

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `jti` as revoked until `expires_at` (Unix seconds).
    ///
    /// Returns `false` when `jti` was already revoked, so exactly one of
    /// several concurrent callers sees `true`.
    async fn revoke(&self, jti: &str, expires_at: i64) -> Result<bool>;

    async fn is_revoked(&self, jti: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    revoked: DashMap<String, i64>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose token has expired anyway
    fn prune(&self, now: i64) {
        self.revoked.retain(|_, exp| *exp > now);
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: &str, expires_at: i64) -> Result<bool> {
        let now = Utc::now().timestamp();
        // An expired token is dead already; nothing to remember
        let newly = expires_at <= now || self.revoked.insert(jti.to_string(), expires_at).is_none();
        self.prune(now);
        Ok(newly)
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        self.prune(Utc::now().timestamp());
        Ok(self.revoked.contains_key(jti))
    }
}

const REVOKED_JTI_PREFIX: &str = "mahaseel:revoked:jti:";

/// Redis-backed store for multi-instance deployments
#[derive(Clone)]
pub struct RedisRevocationStore {
    redis: ConnectionManager,
}

impl RedisRevocationStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(jti: &str) -> String {
        format!("{}{}", REVOKED_JTI_PREFIX, jti)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: &str, expires_at: i64) -> Result<bool> {
        let remaining_ttl = expires_at - Utc::now().timestamp();
        if remaining_ttl <= 0 {
            return Ok(true);
        }

        let mut conn = self.redis.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(Self::key(jti))
            .arg(1)
            .arg("EX")
            .arg(remaining_ttl)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        tracing::info!(
            jti = %jti,
            ttl_secs = remaining_ttl,
            newly = set.is_some(),
            "Token revoked, entry expires with the token"
        );
        Ok(set.is_some())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(jti))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }
}
