/// Data models for the auth core
pub mod otp;
pub mod social_account;
pub mod token;
pub mod user;

pub use otp::{AttemptState, CodeCheck, OtpEntry, OtpPolicy};
pub use social_account::{
    LinkPhoneRequest, NewSocialAccount, SocialAccount, SocialLoginRequest, SocialProfile,
    SocialProvider, VerifyLinkRequest,
};
pub use token::{Claims, Scope, TokenContext, TokenPair, TokenType};
pub use user::{
    LoginRequest, LogoutRequest, NewUser, RefreshTokenRequest, RegisterRequest, Role, SignupRole,
    User, VerifyRequest,
};
