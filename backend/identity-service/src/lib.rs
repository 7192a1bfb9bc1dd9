/// Identity Service Library
///
/// Phone-first authentication for the Mahaseel marketplace.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Repositories for users, social accounts and OTPs (Postgres or in-memory)
/// - `error`: Error types and HTTP mapping
/// - `handlers`: actix-web endpoints under `/auth`
/// - `middleware`: Bearer session extractors
/// - `models`: Data models
/// - `security`: OTP store, JWT issuance, token revocation
/// - `services`: Phone login, social linking, OTP delivery
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

use std::sync::Arc;

use db::IdentityRepository;
use security::{OtpStore, TokenService};
use services::{AuthOptions, OtpSender, PhoneAuthService, SocialLinkService, SocialVerifier};

// Re-export commonly used types
pub use error::{IdentityError, Result};
pub use handlers::configure;

/// Shared state injected into every handler through `web::Data`
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub phone_auth: PhoneAuthService,
    pub social: SocialLinkService,
}

impl AppState {
    pub fn new(
        users: Arc<dyn IdentityRepository>,
        otps: Arc<dyn OtpStore>,
        tokens: Arc<TokenService>,
        sender: Arc<dyn OtpSender>,
        verifier: Arc<dyn SocialVerifier>,
        options: AuthOptions,
    ) -> Self {
        let phone_auth = PhoneAuthService::new(
            users.clone(),
            otps.clone(),
            tokens.clone(),
            sender.clone(),
            options.clone(),
        );
        let social = SocialLinkService::new(users, otps, tokens.clone(), sender, verifier, options);

        Self {
            tokens,
            phone_auth,
            social,
        }
    }
}
