/// HTTP handlers for the auth API
pub mod auth;
pub mod social;

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::error::IdentityError;

/// Request bodies are small; anything larger is rejected outright
const JSON_LIMIT_BYTES: usize = 16 * 1024;

/// Malformed JSON is reported with the same error body as field validation
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT_BYTES)
        .error_handler(|err, _req| {
            IdentityError::Validation(format!("Invalid request body: {}", err)).into()
        })
}

/// Register all routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health))
        .service(
            web::scope("/auth")
                .route("/register", web::post().to(auth::register))
                .route("/login", web::post().to(auth::login))
                .route("/verify", web::post().to(auth::verify))
                .route("/refresh", web::post().to(auth::refresh))
                .route("/logout", web::post().to(auth::logout))
                .route("/me", web::get().to(auth::me))
                .route("/social/google", web::post().to(social::google))
                .route("/social/facebook", web::post().to(social::facebook))
                .route("/link-phone", web::post().to(social::link_phone))
                .route("/verify-otp", web::post().to(social::verify_otp)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
