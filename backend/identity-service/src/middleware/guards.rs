//! Session extractors that enforce token type and scope at the type level.
//!
//! A handler taking `UserSession` can only run with a live, unrevoked,
//! `user`-scoped access token; `LinkPhoneSession` admits only `link_phone`.

use actix_middleware::{bearer_token, BearerError};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::Future;
use std::pin::Pin;

use crate::error::{IdentityError, Result};
use crate::models::{Claims, Scope, TokenType};
use crate::AppState;

/// Full-access session
#[derive(Debug, Clone)]
pub struct UserSession {
    pub claims: Claims,
    /// Raw bearer token, needed to revoke it
    pub token: String,
}

/// Session that may only continue phone linking
#[derive(Debug, Clone)]
pub struct LinkPhoneSession {
    pub claims: Claims,
    pub token: String,
}

type SessionFuture<T> = Pin<Box<dyn Future<Output = Result<T>>>>;

fn authenticate(req: &HttpRequest, scope: Scope) -> SessionFuture<(Claims, String)> {
    let token = bearer_token(req.headers())
        .map(str::to_string)
        .map_err(|e| match e {
            BearerError::Missing => IdentityError::MissingToken,
            BearerError::Malformed => IdentityError::InvalidToken,
        });
    let state = req.app_data::<web::Data<AppState>>().cloned();

    Box::pin(async move {
        let token = token?;
        let state = state
            .ok_or_else(|| IdentityError::Internal("application state not registered".to_string()))?;
        let claims = state.tokens.authorize(&token, TokenType::Access, scope).await?;
        Ok((claims, token))
    })
}

impl FromRequest for UserSession {
    type Error = IdentityError;
    type Future = SessionFuture<Self>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let session = authenticate(req, Scope::User);
        Box::pin(async move {
            let (claims, token) = session.await?;
            Ok(UserSession { claims, token })
        })
    }
}

impl FromRequest for LinkPhoneSession {
    type Error = IdentityError;
    type Future = SessionFuture<Self>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let session = authenticate(req, Scope::LinkPhone);
        Box::pin(async move {
            let (claims, token) = session.await?;
            Ok(LinkPhoneSession { claims, token })
        })
    }
}
