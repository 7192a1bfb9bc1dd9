/// Social identity linking
///
/// Google/Facebook sign-in never yields a full session by itself. The
/// caller gets a `link_phone` token and must prove a phone number:
///
/// ```text
/// unlinked-social --login--> temp-user --link-phone--> otp-pending --verify-otp--> linked
///                                                           |
///                                                           +--(phone owned by a verified user)--> merged into owner
/// ```
///
/// Ownership rules are evaluated by `decide_link` before a code is sent and
/// again by `decide_verify` after the code is proven, since the phone may
/// change hands in between.
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::oauth::SocialVerifier;
use super::otp_delivery::{OtpPurpose, OtpSender};
use super::phone_auth::{rejected_code_error, session_context, AuthOptions};
use crate::db::IdentityRepository;
use crate::error::{IdentityError, Result};
use crate::models::{
    Claims, CodeCheck, NewUser, Role, Scope, SocialProvider, TokenContext, TokenPair, User,
};
use crate::security::{require_scope, OtpStore, TokenService};
use crate::validators::{mask_phone, normalize_phone};

pub const LINK_CODE_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    UnlinkedSocial,
    /// Placeholder user holding a `link_phone` session
    TempUser,
    OtpPending,
    Linked,
}

impl LinkState {
    pub fn of(user: &User) -> Self {
        if user.phone_verified {
            LinkState::Linked
        } else {
            LinkState::TempUser
        }
    }
}

/// What a link-phone request should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDecision {
    SendCode,
    ResendCode,
    AlreadyVerified,
    /// Phone proven by another account; a verified code merges into it
    SendMergeCode { owner: Uuid },
    Conflict,
}

impl LinkDecision {
    /// Caller-facing message. A merge code reads exactly like a fresh one so
    /// the response does not reveal that the number belongs to someone.
    pub fn message(&self) -> &'static str {
        match self {
            LinkDecision::SendCode | LinkDecision::SendMergeCode { .. } => "otp_sent",
            LinkDecision::ResendCode => "otp_resent",
            LinkDecision::AlreadyVerified => "already_verified",
            LinkDecision::Conflict => "phone_in_use",
        }
    }
}

/// What a verified link code should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyDecision {
    /// Attach the phone to the current user
    Upgrade,
    Merge { into: Uuid },
    Conflict,
}

/// A merge only folds a placeholder into a proven owner; an account that
/// already proved its own phone is never deleted by a merge.
fn can_merge_into(current: &User, owner: &User) -> bool {
    owner.phone_verified && !current.phone_verified
}

pub fn decide_link(current: &User, owner: Option<&User>) -> LinkDecision {
    match owner {
        None => LinkDecision::SendCode,
        Some(owner) if owner.id == current.id => {
            if owner.phone_verified {
                LinkDecision::AlreadyVerified
            } else {
                LinkDecision::ResendCode
            }
        }
        Some(owner) if can_merge_into(current, owner) => {
            LinkDecision::SendMergeCode { owner: owner.id }
        }
        Some(_) => LinkDecision::Conflict,
    }
}

pub fn decide_verify(current: &User, owner: Option<&User>) -> VerifyDecision {
    match owner {
        None => VerifyDecision::Upgrade,
        Some(owner) if owner.id == current.id => VerifyDecision::Upgrade,
        Some(owner) if can_merge_into(current, owner) => VerifyDecision::Merge { into: owner.id },
        Some(_) => VerifyDecision::Conflict,
    }
}

/// Result of a social login
#[derive(Debug, Clone)]
pub struct SocialSession {
    pub user: User,
    /// Always `link_phone`-scoped
    pub access_token: String,
    pub state: LinkState,
}

/// Result of a link-phone request
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub decision: LinkDecision,
    pub state: LinkState,
    /// Present only when codes are exposed
    pub code: Option<String>,
    /// Present only for `AlreadyVerified`
    pub tokens: Option<TokenPair>,
}

#[derive(Clone)]
pub struct SocialLinkService {
    users: Arc<dyn IdentityRepository>,
    otps: Arc<dyn OtpStore>,
    tokens: Arc<TokenService>,
    sender: Arc<dyn OtpSender>,
    verifier: Arc<dyn SocialVerifier>,
    options: AuthOptions,
}

impl SocialLinkService {
    pub fn new(
        users: Arc<dyn IdentityRepository>,
        otps: Arc<dyn OtpStore>,
        tokens: Arc<TokenService>,
        sender: Arc<dyn OtpSender>,
        verifier: Arc<dyn SocialVerifier>,
        options: AuthOptions,
    ) -> Self {
        Self {
            users,
            otps,
            tokens,
            sender,
            verifier,
            options,
        }
    }

    /// Verify a provider credential and open a `link_phone` session
    pub async fn social_login(&self, provider: SocialProvider, token: &str) -> Result<SocialSession> {
        let profile = self.verifier.verify(provider, token).await?;

        let user = match self
            .users
            .find_social_account(provider, &profile.provider_user_id)
            .await?
        {
            Some(account) => self
                .users
                .find_user(account.user_id)
                .await?
                .ok_or(IdentityError::UserNotFound)?,
            None => {
                let placeholder = NewUser {
                    name: profile.user_name(),
                    phone: None,
                    role: Role::Seller,
                };
                let (user, _) = self.users.create_social_user(placeholder, &profile).await?;
                info!(user_id = %user.id, provider = provider.as_str(), "Created placeholder user for social login");
                user
            }
        };

        let access_token = self.tokens.create_access_token(
            user.id,
            user.role,
            Scope::LinkPhone,
            TokenContext::default(),
        )?;

        info!(user_id = %user.id, provider = provider.as_str(), "Social login issued link_phone session");
        Ok(SocialSession {
            state: LinkState::of(&user),
            access_token,
            user,
        })
    }

    async fn current_user(&self, session: &Claims) -> Result<User> {
        require_scope(session, Scope::LinkPhone)?;
        self.users
            .find_user(session.user_id()?)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    /// Start (or short-circuit) proving a phone for the session's user.
    ///
    /// `link_token` is the presented session token; it is revoked when the
    /// request ends in a full session.
    pub async fn link_phone(&self, session: &Claims, link_token: &str, phone: &str) -> Result<LinkOutcome> {
        let current = self.current_user(session).await?;
        let phone = normalize_phone(phone, &self.options.default_country_code)?;
        let owner = self.users.find_user_by_phone(&phone).await?;

        let decision = decide_link(&current, owner.as_ref());
        match decision {
            LinkDecision::Conflict => {
                warn!(user_id = %current.id, phone = %mask_phone(&phone), "Phone held by an unverified account");
                return Err(IdentityError::PhoneInUse);
            }
            LinkDecision::AlreadyVerified => {
                let pair = self.tokens.create_token_pair(
                    current.id,
                    current.role,
                    Scope::User,
                    session_context(&current),
                )?;
                self.tokens.revoke(link_token).await?;
                info!(user_id = %current.id, "Phone already verified, upgraded session");
                return Ok(LinkOutcome {
                    decision,
                    state: LinkState::Linked,
                    code: None,
                    tokens: Some(pair),
                });
            }
            LinkDecision::SendCode | LinkDecision::ResendCode | LinkDecision::SendMergeCode { .. } => {}
        }

        if let Some(until) = self.otps.locked_until(&phone).await? {
            warn!(phone = %mask_phone(&phone), "Link code requested while locked out");
            return Err(IdentityError::OtpLocked { until });
        }

        let code = crypto_core::otp::generate_numeric_code(LINK_CODE_DIGITS);
        self.otps.put(&phone, &code).await?;
        self.sender.send(&phone, &code, OtpPurpose::LinkPhone).await?;

        info!(
            user_id = %current.id,
            phone = %mask_phone(&phone),
            outcome = decision.message(),
            merge = matches!(decision, LinkDecision::SendMergeCode { .. }),
            "Link code issued"
        );
        Ok(LinkOutcome {
            decision,
            state: LinkState::OtpPending,
            code: self.options.expose_code.then_some(code),
            tokens: None,
        })
    }

    /// Prove the phone and finish linking, merging into the owner if needed
    pub async fn verify_link(
        &self,
        session: &Claims,
        link_token: &str,
        phone: &str,
        code: &str,
    ) -> Result<TokenPair> {
        require_scope(session, Scope::LinkPhone)?;
        let phone = normalize_phone(phone, &self.options.default_country_code)?;

        match self.otps.check_code(&phone, code).await? {
            CodeCheck::Accepted => {}
            CodeCheck::Locked { until } => {
                warn!(phone = %mask_phone(&phone), "Link verify while locked out");
                return Err(IdentityError::OtpLocked { until });
            }
            CodeCheck::Rejected(state) => {
                warn!(
                    sub = %session.sub,
                    phone = %mask_phone(&phone),
                    failed_attempts = state.failed_attempts,
                    locked = state.is_locked(),
                    "Invalid link code"
                );
                return Err(rejected_code_error(state));
            }
        }

        let current = self.current_user(session).await?;
        let owner = self.users.find_user_by_phone(&phone).await?;

        let linked = match (decide_verify(&current, owner.as_ref()), owner) {
            (VerifyDecision::Merge { into }, Some(owner)) => {
                let moved = self.users.merge_users(current.id, into).await?;
                info!(
                    from = %current.id,
                    into = %owner.id,
                    moved,
                    "Merged social placeholder into phone owner"
                );
                owner
            }
            (VerifyDecision::Upgrade, _) if current.owns_verified_phone(&phone) => current,
            (VerifyDecision::Upgrade, _) => {
                let user = self.users.mark_phone_verified(current.id, &phone).await?;
                info!(user_id = %user.id, phone = %mask_phone(&phone), "Phone linked to social account");
                user
            }
            _ => {
                warn!(user_id = %current.id, phone = %mask_phone(&phone), "Phone held by an unverified account");
                return Err(IdentityError::PhoneInUse);
            }
        };

        self.tokens.revoke(link_token).await?;
        self.tokens
            .create_token_pair(linked.id, linked.role, Scope::User, session_context(&linked))
    }
}
