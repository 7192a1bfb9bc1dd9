/// Security module for session trust
///
/// Provides the core security primitives for identity-service:
/// - OTP storage with failure-count lockout
/// - JWT issuance, decoding and scope checks
/// - Token revocation (in-memory or Redis)
///
/// Key material comes from `crypto_core::jwt`.
pub mod otp_store;
pub mod token_revocation;
pub mod token_service;

pub use otp_store::{spawn_otp_sweeper, InMemoryOtpStore, OtpStore};
pub use token_revocation::{InMemoryRevocationStore, RedisRevocationStore, RevocationStore};
pub use token_service::{require_scope, require_type, TokenService};
