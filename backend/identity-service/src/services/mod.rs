/// Service layer for identity-service
///
/// Business logic behind the HTTP handlers:
/// - Phone authentication (registration, SMS OTP login, refresh, logout)
/// - Social sign-in and phone linking (Google, Facebook)
/// - OTP delivery
pub mod oauth;
pub mod otp_delivery;
pub mod phone_auth;
pub mod social_link;

pub use oauth::{HttpSocialVerifier, SocialVerifier};
pub use otp_delivery::{LogOtpSender, OtpPurpose, OtpSender};
pub use phone_auth::{AuthOptions, OtpDispatch, PhoneAuthService};
pub use social_link::{
    decide_link, decide_verify, LinkDecision, LinkOutcome, LinkState, SocialLinkService,
    SocialSession, VerifyDecision,
};
