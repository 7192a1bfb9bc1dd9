/// Phone Authentication Service
///
/// Registration and passwordless login by SMS one-time code.
///
/// Security features:
/// - Lockout after repeated wrong codes, shared with phone linking
/// - OTP expiration (5 minutes by default)
/// - Refresh-token rotation: a refresh token is single use
/// - Phone numbers masked in every log line
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use super::otp_delivery::{OtpPurpose, OtpSender};
use crate::db::IdentityRepository;
use crate::error::{IdentityError, Result};
use crate::models::{
    AttemptState, Claims, CodeCheck, NewUser, RegisterRequest, Scope, TokenContext, TokenPair,
    TokenType, User,
};
use crate::security::{require_type, OtpStore, TokenService};
use crate::validators::{mask_phone, normalize_phone};

/// Login codes are short; link codes use the full six digits
pub const LOGIN_CODE_DIGITS: usize = 4;

/// Behaviour switches shared by the auth services
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub default_country_code: String,
    /// Return issued codes to the caller (dev only)
    pub expose_code: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            default_country_code: "+249".to_string(),
            expose_code: false,
        }
    }
}

/// Result of a login code request
#[derive(Debug, Clone)]
pub struct OtpDispatch {
    pub phone: String,
    pub expires_in: i64,
    /// Present only when codes are exposed
    pub code: Option<String>,
}

/// Map a rejected code to the caller-facing error.
///
/// The attempt that trips the lock already reports the lock.
pub(crate) fn rejected_code_error(state: AttemptState) -> IdentityError {
    match state.locked_until {
        Some(until) => IdentityError::OtpLocked { until },
        None => IdentityError::InvalidOtp,
    }
}

#[derive(Clone)]
pub struct PhoneAuthService {
    users: Arc<dyn IdentityRepository>,
    otps: Arc<dyn OtpStore>,
    tokens: Arc<TokenService>,
    sender: Arc<dyn OtpSender>,
    options: AuthOptions,
}

impl PhoneAuthService {
    pub fn new(
        users: Arc<dyn IdentityRepository>,
        otps: Arc<dyn OtpStore>,
        tokens: Arc<TokenService>,
        sender: Arc<dyn OtpSender>,
        options: AuthOptions,
    ) -> Self {
        Self {
            users,
            otps,
            tokens,
            sender,
            options,
        }
    }

    fn normalize(&self, phone: &str) -> Result<String> {
        normalize_phone(phone, &self.options.default_country_code)
    }

    /// Create an account with an unverified phone
    pub async fn register(&self, request: RegisterRequest) -> Result<User> {
        request.validate()?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(IdentityError::Validation("Name must not be blank".to_string()));
        }
        let phone = self.normalize(&request.phone)?;

        let user = self
            .users
            .create_user(NewUser {
                name: name.to_string(),
                phone: Some(phone.clone()),
                role: request.role.map(Into::into).unwrap_or_default(),
            })
            .await?;

        info!(user_id = %user.id, phone = %mask_phone(&phone), role = user.role.as_str(), "User registered");
        Ok(user)
    }

    /// Issue a login code for a registered phone
    pub async fn request_login_otp(&self, phone: &str) -> Result<OtpDispatch> {
        let phone = self.normalize(phone)?;

        if self.users.find_user_by_phone(&phone).await?.is_none() {
            return Err(IdentityError::UserNotFound);
        }
        if let Some(until) = self.otps.locked_until(&phone).await? {
            warn!(phone = %mask_phone(&phone), "Login code requested while locked out");
            return Err(IdentityError::OtpLocked { until });
        }

        let code = crypto_core::otp::generate_numeric_code(LOGIN_CODE_DIGITS);
        self.otps.put(&phone, &code).await?;
        self.sender.send(&phone, &code, OtpPurpose::Login).await?;

        info!(phone = %mask_phone(&phone), "Login code issued");
        Ok(OtpDispatch {
            expires_in: self.otps.policy().ttl.num_seconds(),
            code: self.options.expose_code.then_some(code),
            phone,
        })
    }

    /// Exchange a login code for a `user`-scoped token pair
    pub async fn verify_login(&self, phone: &str, code: &str) -> Result<TokenPair> {
        let phone = self.normalize(phone)?;

        match self.otps.check_code(&phone, code).await? {
            CodeCheck::Accepted => {}
            CodeCheck::Locked { until } => {
                warn!(phone = %mask_phone(&phone), "Login verify while locked out");
                return Err(IdentityError::OtpLocked { until });
            }
            CodeCheck::Rejected(state) => {
                warn!(
                    phone = %mask_phone(&phone),
                    failed_attempts = state.failed_attempts,
                    locked = state.is_locked(),
                    "Invalid login code"
                );
                return Err(rejected_code_error(state));
            }
        }

        let mut user = self
            .users
            .find_user_by_phone(&phone)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        if !user.phone_verified {
            user = self.users.mark_phone_verified(user.id, &phone).await?;
        }

        info!(user_id = %user.id, phone = %mask_phone(&phone), "Phone login verified");
        self.tokens.create_token_pair(
            user.id,
            user.role,
            Scope::User,
            TokenContext::with_phone(phone),
        )
    }

    /// Rotate a refresh token into a fresh pair; the old refresh token dies
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self
            .tokens
            .authorize(refresh_token, TokenType::Refresh, Scope::User)
            .await?;

        // The account may have been merged away or deleted since issuance
        let user = self
            .users
            .find_user(claims.user_id()?)
            .await?
            .ok_or(IdentityError::InvalidToken)?;

        // Single use even when the same token is presented concurrently
        self.tokens.consume(refresh_token).await?;

        info!(user_id = %user.id, "Refresh token rotated");
        self.tokens
            .create_token_pair(user.id, user.role, Scope::User, session_context(&user))
    }

    /// Revoke the presented access token and, optionally, a refresh token
    /// belonging to the same user
    pub async fn logout(
        &self,
        session: &Claims,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        if let Some(refresh_token) = refresh_token {
            match self.tokens.decode(refresh_token).await {
                Ok(refresh) => {
                    require_type(&refresh, TokenType::Refresh)?;
                    if refresh.sub != session.sub {
                        warn!(sub = %session.sub, "Logout with another user's refresh token");
                        return Err(IdentityError::InvalidToken);
                    }
                    self.tokens.revoke(refresh_token).await?;
                }
                // Already revoked counts as logged out
                Err(IdentityError::TokenRevoked) => {}
                Err(e) => return Err(e),
            }
        }

        self.tokens.revoke(access_token).await?;
        info!(user_id = %session.sub, "User logged out");
        Ok(())
    }

    pub async fn me(&self, session: &Claims) -> Result<User> {
        self.users
            .find_user(session.user_id()?)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }
}

/// Verified phone, if any, embedded into `user`-scoped tokens
pub(crate) fn session_context(user: &User) -> TokenContext {
    match (&user.phone, user.phone_verified) {
        (Some(phone), true) => TokenContext::with_phone(phone.clone()),
        _ => TokenContext::default(),
    }
}
