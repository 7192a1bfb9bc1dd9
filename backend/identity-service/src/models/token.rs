use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::user::Role;
use crate::error::{IdentityError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// What a token may be used for, independent of role.
///
/// `LinkPhone` sessions can only continue phone linking; `User` is full access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    User,
    LinkPhone,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::LinkPhone => "link_phone",
        }
    }
}

/// Claim names owned by `Claims`; extra context may not shadow them
pub const RESERVED_CLAIMS: [&str; 8] = ["sub", "iat", "exp", "typ", "jti", "role", "scope", "phone"];

/// Optional context embedded in a token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenContext {
    pub phone: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl TokenContext {
    pub fn with_phone(phone: impl Into<String>) -> Self {
        Self {
            phone: Some(phone.into()),
            ..Self::default()
        }
    }

    /// Add a free-form claim
    pub fn claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        let key = key.into();
        if RESERVED_CLAIMS.contains(&key.as_str()) {
            return Err(IdentityError::Internal(format!(
                "extra token claim `{}` shadows a reserved claim",
                key
            )));
        }
        self.extra.insert(key, value.into());
        Ok(self)
    }
}

/// Session token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub typ: TokenType,
    /// Unique token id, the revocation key
    pub jti: String,
    pub role: Role,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Any further context claims
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| IdentityError::InvalidToken)
    }
}

/// Token pair handed to clients after a verified login
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}
