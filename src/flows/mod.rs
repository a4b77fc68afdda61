pub mod acknowledgment;
pub mod otp_gate;

pub use acknowledgment::{AcknowledgmentFlow, AcknowledgmentForm, FlowState};
pub use otp_gate::{OtpGate, VerifiedAccess};
