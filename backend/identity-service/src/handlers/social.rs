/// Social sign-in and phone linking
use actix_web::{web, HttpResponse};
use serde::Serialize;
use validator::Validate;

use crate::error::Result;
use crate::middleware::LinkPhoneSession;
use crate::models::{LinkPhoneRequest, Scope, SocialLoginRequest, SocialProvider, VerifyLinkRequest};
use crate::services::LinkOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SocialTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub scope: Scope,
}

#[derive(Debug, Serialize)]
pub struct LinkPhoneResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<LinkOutcome> for LinkPhoneResponse {
    fn from(outcome: LinkOutcome) -> Self {
        let (access_token, refresh_token) = match outcome.tokens {
            Some(pair) => (Some(pair.access_token), Some(pair.refresh_token)),
            None => (None, None),
        };

        Self {
            message: outcome.decision.message(),
            code: outcome.code,
            access_token,
            refresh_token,
        }
    }
}

async fn social_login(
    state: web::Data<AppState>,
    provider: SocialProvider,
    body: SocialLoginRequest,
) -> Result<HttpResponse> {
    body.validate()?;
    let session = state.social.social_login(provider, &body.token).await?;

    Ok(HttpResponse::Ok().json(SocialTokenResponse {
        access_token: session.access_token,
        token_type: "bearer",
        scope: Scope::LinkPhone,
    }))
}

/// POST /auth/social/google
pub async fn google(
    state: web::Data<AppState>,
    body: web::Json<SocialLoginRequest>,
) -> Result<HttpResponse> {
    social_login(state, SocialProvider::Google, body.into_inner()).await
}

/// POST /auth/social/facebook
pub async fn facebook(
    state: web::Data<AppState>,
    body: web::Json<SocialLoginRequest>,
) -> Result<HttpResponse> {
    social_login(state, SocialProvider::Facebook, body.into_inner()).await
}

/// POST /auth/link-phone
pub async fn link_phone(
    state: web::Data<AppState>,
    session: LinkPhoneSession,
    body: web::Json<LinkPhoneRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    let outcome = state
        .social
        .link_phone(&session.claims, &session.token, &body.phone)
        .await?;
    Ok(HttpResponse::Ok().json(LinkPhoneResponse::from(outcome)))
}

/// POST /auth/verify-otp
pub async fn verify_otp(
    state: web::Data<AppState>,
    session: LinkPhoneSession,
    body: web::Json<VerifyLinkRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    let pair = state
        .social
        .verify_link(&session.claims, &session.token, &body.phone, &body.code)
        .await?;
    Ok(HttpResponse::Ok().json(pair))
}
