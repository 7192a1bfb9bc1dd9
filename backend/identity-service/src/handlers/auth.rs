/// Phone registration, OTP login and session management
use actix_web::{web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::middleware::UserSession;
use crate::models::{
    LoginRequest, LogoutRequest, RefreshTokenRequest, RegisterRequest, Role, Scope, User,
    VerifyRequest,
};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
}

impl From<User> for RegisterResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            phone: user.phone,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_otp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub role: Role,
    pub scope: Scope,
}

/// POST /auth/register
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let user = state.phone_auth.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(RegisterResponse::from(user)))
}

/// POST /auth/login
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    let dispatch = state.phone_auth.request_login_otp(&body.phone).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        message: "otp_sent",
        expires_in: dispatch.expires_in,
        dev_otp: dispatch.code,
    }))
}

/// POST /auth/verify
pub async fn verify(
    state: web::Data<AppState>,
    body: web::Json<VerifyRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    let pair = state.phone_auth.verify_login(&body.phone, &body.otp).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/refresh
pub async fn refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshTokenRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    let pair = state.phone_auth.refresh(&body.refresh_token).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/logout
///
/// The body is optional; without it only the bearer token is revoked.
pub async fn logout(
    state: web::Data<AppState>,
    session: UserSession,
    body: Option<web::Json<LogoutRequest>>,
) -> Result<HttpResponse> {
    let refresh_token = body.and_then(|b| b.into_inner().refresh_token);
    state
        .phone_auth
        .logout(&session.claims, &session.token, refresh_token.as_deref())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /auth/me
pub async fn me(state: web::Data<AppState>, session: UserSession) -> Result<HttpResponse> {
    let user = state.phone_auth.me(&session.claims).await?;
    Ok(HttpResponse::Ok().json(MeResponse {
        id: user.id,
        name: user.name,
        phone: user.phone,
        phone_verified: user.phone_verified,
        role: user.role,
        scope: session.claims.scope,
    }))
}
