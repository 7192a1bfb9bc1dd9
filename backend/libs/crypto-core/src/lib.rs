//! Shared cryptographic helpers for the Mahaseel backend.
//!
//! - `jwt`: signing/verification keys built from configuration (no globals)
//! - `otp`: numeric one-time code generation
//! - `hash`: constant-time comparison of submitted codes

pub mod hash;
pub mod jwt;
pub mod otp;

pub use jwt::{JwtKeys, KeyError};
