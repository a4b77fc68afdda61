use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::errors::{AppError, Result};

pub const OTP_WINDOW_SECS: u32 = 120;
const MAX_TOKEN_LEN: usize = 128;

pub const PIN_SENT_MESSAGE: &str = "A PIN has been sent to your email.";
pub const PIN_RESENT_MESSAGE: &str = "A new PIN has been sent to your email.";
pub const RESEND_PENDING_MESSAGE: &str = "Requesting new PIN...";
pub const SEND_FAILED_MESSAGE: &str = "Failed to send OTP. Please refresh.";
pub const RESEND_FAILED_MESSAGE: &str = "Failed to resend OTP. Please try again.";
pub const INVALID_PIN_MESSAGE: &str = "Invalid or expired PIN. Please try again.";
pub const EXPIRED_MESSAGE: &str = "Your PIN expired. Request a new PIN to try again.";
pub const MISSING_PIN_MESSAGE: &str = "Please enter the PIN from your email.";
pub const VERIFY_UNAVAILABLE_MESSAGE: &str = "Could not check your PIN. Please try again.";
pub const VERIFIED_MESSAGE: &str = "PIN verified.";

/// Opaque public link token for a document.
///
/// Tokens travel as a URL path segment and must never look like a row id,
/// so purely numeric values are refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectToken(String);

impl SubjectToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let token = raw.trim();
        let well_formed = !token.is_empty()
            && token.len() <= MAX_TOKEN_LEN
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed || token.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::InvalidToken);
        }
        Ok(SubjectToken(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SubjectToken {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        SubjectToken::parse(s)
    }
}

impl fmt::Display for SubjectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpState {
    Unsent,
    Pending { expires_at: DateTime<Utc> },
    Expired,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpEvent {
    /// The server accepted a PIN dispatch.
    Sent {
        at: DateTime<Utc>,
        message: Option<String>,
    },
    SendFailed,
    ResendRequested,
    Tick,
    PinMissing,
    PinRejected,
    PinExpired,
    VerifyUnavailable,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpSession {
    subject_token: SubjectToken,
    state: OtpState,
    seconds_remaining: u32,
    message: String,
}

impl OtpSession {
    pub fn new(subject_token: SubjectToken) -> Self {
        OtpSession {
            subject_token,
            state: OtpState::Unsent,
            seconds_remaining: OTP_WINDOW_SECS,
            message: PIN_SENT_MESSAGE.to_string(),
        }
    }

    /// Next session for `event`. `Verified` absorbs every event.
    pub fn apply(mut self, event: OtpEvent) -> Self {
        if self.state == OtpState::Verified {
            return self;
        }

        match event {
            OtpEvent::Sent { at, message } => {
                let fallback = if self.state == OtpState::Unsent {
                    PIN_SENT_MESSAGE
                } else {
                    PIN_RESENT_MESSAGE
                };
                self.state = OtpState::Pending {
                    expires_at: at + Duration::seconds(i64::from(OTP_WINDOW_SECS)),
                };
                self.seconds_remaining = OTP_WINDOW_SECS;
                self.message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string());
            }
            OtpEvent::SendFailed => {
                self.message = if self.state == OtpState::Unsent {
                    SEND_FAILED_MESSAGE.to_string()
                } else {
                    RESEND_FAILED_MESSAGE.to_string()
                };
            }
            OtpEvent::ResendRequested => {
                if self.state == OtpState::Expired {
                    self.message = RESEND_PENDING_MESSAGE.to_string();
                }
            }
            OtpEvent::Tick => {
                if let OtpState::Pending { .. } = self.state {
                    self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
                    if self.seconds_remaining == 0 {
                        self.state = OtpState::Expired;
                        self.message = EXPIRED_MESSAGE.to_string();
                    }
                }
            }
            OtpEvent::PinMissing => self.message = MISSING_PIN_MESSAGE.to_string(),
            OtpEvent::PinRejected => self.message = INVALID_PIN_MESSAGE.to_string(),
            OtpEvent::PinExpired => self.message = EXPIRED_MESSAGE.to_string(),
            OtpEvent::VerifyUnavailable => self.message = VERIFY_UNAVAILABLE_MESSAGE.to_string(),
            OtpEvent::Verified => {
                // A verification sent while pending may land after the last tick.
                if matches!(self.state, OtpState::Pending { .. } | OtpState::Expired) {
                    self.state = OtpState::Verified;
                    self.message = VERIFIED_MESSAGE.to_string();
                }
            }
        }

        self
    }

    pub fn subject_token(&self) -> &SubjectToken {
        &self.subject_token
    }

    pub fn state(&self) -> &OtpState {
        &self.state
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn can_resend(&self) -> bool {
        self.state == OtpState::Expired
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, OtpState::Pending { .. })
    }

    pub fn is_verified(&self) -> bool {
        self.state == OtpState::Verified
    }

    /// Remaining time as `mm:ss`.
    pub fn formatted_remaining(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.seconds_remaining / 60,
            self.seconds_remaining % 60
        )
    }

    /// Elapsed share of the window, 0 to 100.
    pub fn progress_percent(&self) -> u32 {
        (OTP_WINDOW_SECS - self.seconds_remaining.min(OTP_WINDOW_SECS)) * 100 / OTP_WINDOW_SECS
    }
}
