//! # Actix Middleware Library
//!
//! Shared HTTP plumbing for Mahaseel actix services
//!
//! ## Modules
//! - `logging`: request/response logging with correlation ids
//! - `bearer`: `Authorization: Bearer` extraction

pub mod bearer;
pub mod logging;

pub use bearer::{bearer_token, BearerError};
pub use logging::{CorrelationId, RequestLogging, CORRELATION_ID_HEADER};
