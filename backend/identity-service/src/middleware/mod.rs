/// Request guards for bearer-authenticated endpoints
pub mod guards;

pub use guards::{LinkPhoneSession, UserSession};
