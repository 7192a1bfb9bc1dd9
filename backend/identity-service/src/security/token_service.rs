/// Token Service
///
/// Issues, decodes and revokes signed session tokens.
///
/// - Access tokens are short-lived, refresh tokens live for days
/// - Every token carries a fresh `jti` so it can be revoked individually
/// - `scope` is fixed at issuance; a `link_phone` session only becomes a
///   `user` session by minting a brand-new token
///
/// Signature, format and expiry failures all surface as `InvalidToken`.
/// Revocation surfaces as `TokenRevoked` so it stays visible in logs.
use chrono::{Duration, Utc};
use crypto_core::JwtKeys;
use std::sync::Arc;
use uuid::Uuid;

use super::token_revocation::RevocationStore;
use crate::error::{IdentityError, Result};
use crate::models::{Claims, Role, Scope, TokenContext, TokenPair, TokenType};

pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;

pub struct TokenService {
    keys: JwtKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revocations: Arc<dyn RevocationStore>,
}

impl TokenService {
    pub fn new(
        keys: JwtKeys,
        access_ttl: Duration,
        refresh_ttl: Duration,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        Self {
            keys,
            access_ttl,
            refresh_ttl,
            revocations,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn create_access_token(
        &self,
        subject: Uuid,
        role: Role,
        scope: Scope,
        extra: TokenContext,
    ) -> Result<String> {
        self.create_token(subject, role, scope, TokenType::Access, self.access_ttl, extra)
    }

    pub fn create_refresh_token(
        &self,
        subject: Uuid,
        role: Role,
        scope: Scope,
        extra: TokenContext,
    ) -> Result<String> {
        self.create_token(subject, role, scope, TokenType::Refresh, self.refresh_ttl, extra)
    }

    pub fn create_token_pair(
        &self,
        subject: Uuid,
        role: Role,
        scope: Scope,
        extra: TokenContext,
    ) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.create_access_token(subject, role, scope, extra.clone())?,
            refresh_token: self.create_refresh_token(subject, role, scope, extra)?,
            token_type: "bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    fn create_token(
        &self,
        subject: Uuid,
        role: Role,
        scope: Scope,
        typ: TokenType,
        ttl: Duration,
        extra: TokenContext,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            typ,
            jti: Uuid::new_v4().to_string(),
            role,
            scope,
            phone: extra.phone,
            extra: extra.extra,
        };

        self.keys.sign(&claims).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign token");
            IdentityError::Internal(format!("Failed to sign token: {}", e))
        })
    }

    /// Verify signature and expiry only
    fn verify(&self, token: &str) -> Result<Claims> {
        self.keys.verify::<Claims>(token).map_err(|e| {
            tracing::debug!(error = %e, "Token verification failed");
            IdentityError::InvalidToken
        })
    }

    /// Verify signature and expiry, then reject revoked `jti`s
    pub async fn decode(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token)?;
        if self.revocations.is_revoked(&claims.jti).await? {
            tracing::warn!(jti = %claims.jti, sub = %claims.sub, "Revoked token presented");
            return Err(IdentityError::TokenRevoked);
        }
        Ok(claims)
    }

    /// Revoke a still-valid token until its natural expiry.
    ///
    /// Revoking twice is harmless. Garbage tokens are rejected.
    pub async fn revoke(&self, token: &str) -> Result<Claims> {
        let claims = self.verify(token)?;
        self.revocations.revoke(&claims.jti, claims.exp).await?;
        tracing::info!(jti = %claims.jti, sub = %claims.sub, typ = ?claims.typ, "Token revoked");
        Ok(claims)
    }

    /// Revoke a token that may only be used once. Of several concurrent
    /// callers with the same token, only one gets the claims back.
    pub async fn consume(&self, token: &str) -> Result<Claims> {
        let claims = self.decode(token).await?;
        if !self.revocations.revoke(&claims.jti, claims.exp).await? {
            tracing::warn!(jti = %claims.jti, sub = %claims.sub, "Token already consumed");
            return Err(IdentityError::TokenRevoked);
        }
        Ok(claims)
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool> {
        self.revocations.is_revoked(jti).await
    }

    /// Decode and require both token type and scope
    pub async fn authorize(&self, token: &str, typ: TokenType, scope: Scope) -> Result<Claims> {
        let claims = self.decode(token).await?;
        require_type(&claims, typ)?;
        require_scope(&claims, scope)?;
        Ok(claims)
    }
}

pub fn require_scope(claims: &Claims, expected: Scope) -> Result<()> {
    if claims.scope == expected {
        Ok(())
    } else {
        tracing::warn!(
            sub = %claims.sub,
            expected = expected.as_str(),
            actual = claims.scope.as_str(),
            "Token scope mismatch"
        );
        Err(IdentityError::InsufficientScope)
    }
}

pub fn require_type(claims: &Claims, expected: TokenType) -> Result<()> {
    if claims.typ == expected {
        Ok(())
    } else {
        Err(IdentityError::WrongTokenType)
    }
}
