use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;
use validator::Validate;

use crate::validators::validate_otp_code;

/// Supported social identity providers, matching database social_provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "social_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SocialProvider {
    Google,
    Facebook,
}

impl SocialProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }
}

/// Link between a provider identity and a local user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SocialAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: SocialProvider,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Identity asserted by a provider after token verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialProfile {
    pub provider: SocialProvider,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl SocialProfile {
    /// Name for a placeholder user; providers may omit or blank it
    pub fn user_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| n.chars().take(100).collect())
            .unwrap_or_else(|| "User".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewSocialAccount {
    pub user_id: Uuid,
    pub profile: SocialProfile,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SocialLoginRequest {
    #[validate(length(min = 1, max = 4096))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LinkPhoneRequest {
    #[validate(length(min = 6, max = 32))]
    pub phone: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyLinkRequest {
    #[validate(length(min = 6, max = 32))]
    pub phone: String,
    #[validate(custom(function = "validate_otp_code"))]
    pub code: String,
}
