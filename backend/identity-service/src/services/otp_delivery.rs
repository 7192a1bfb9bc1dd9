/// OTP delivery
///
/// No SMS gateway is wired in; `LogOtpSender` records the dispatch in the
/// logs. Production deployments plug a real gateway in behind `OtpSender`.
use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::validators::mask_phone;

/// Why a code is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Login,
    LinkPhone,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::LinkPhone => "link_phone",
        }
    }
}

#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, phone: &str, code: &str, purpose: OtpPurpose) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LogOtpSender {
    /// Dev only: write the code itself to the log
    log_code: bool,
}

impl LogOtpSender {
    pub fn new(log_code: bool) -> Self {
        Self { log_code }
    }
}

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, phone: &str, code: &str, purpose: OtpPurpose) -> Result<()> {
        if self.log_code {
            warn!(
                phone = %mask_phone(phone),
                purpose = purpose.as_str(),
                otp = %code,
                "SMS service not configured - OTP logged for development"
            );
        } else {
            info!(
                phone = %mask_phone(phone),
                purpose = purpose.as_str(),
                digits = code.len(),
                "OTP dispatched"
            );
        }
        Ok(())
    }
}
