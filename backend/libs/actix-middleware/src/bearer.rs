//! `Authorization: Bearer <token>` extraction

use actix_web::{
    http::header::AUTHORIZATION, http::header::HeaderMap, http::StatusCode, HttpResponse,
    ResponseError,
};
use serde_json::json;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BearerError {
    #[error("Missing Authorization header")]
    Missing,

    #[error("Invalid Authorization header format")]
    Malformed,
}

impl ResponseError for BearerError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": "missing_token",
            "message": self.to_string(),
        }))
    }
}

/// Pull the bearer token out of request headers.
///
/// The scheme is matched case-insensitively; an empty token is malformed.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, BearerError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::Malformed)?;

    let (scheme, token) = value.split_once(' ').ok_or(BearerError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(BearerError::Malformed);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(BearerError::Malformed);
    }
    Ok(token)
}
