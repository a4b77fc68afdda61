use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};
use validator::Validate;

use crate::dtos::public_dtos::VerifyPinRequest;
use crate::errors::{AppError, Result};
use crate::models::otp::{OtpEvent, OtpSession, OtpState, SubjectToken};
use crate::services::portal_api::PortalApi;

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Proof that the viewer passed the PIN check for a document.
///
/// Only the gate can mint one, so the document flow cannot run unverified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAccess {
    subject_token: SubjectToken,
}

impl VerifiedAccess {
    pub fn subject_token(&self) -> &SubjectToken {
        &self.subject_token
    }

    #[cfg(test)]
    pub(crate) fn for_tests(subject_token: SubjectToken) -> Self {
        VerifiedAccess { subject_token }
    }
}

/// One-second countdown owned by the gate. Dropping it stops the ticks.
struct Countdown {
    interval: Interval,
}

impl Countdown {
    fn start() -> Self {
        let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Countdown { interval }
    }

    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

pub struct OtpGate<A: PortalApi + ?Sized> {
    api: Arc<A>,
    session: OtpSession,
    countdown: Option<Countdown>,
}

impl<A: PortalApi + ?Sized> OtpGate<A> {
    pub fn new(api: Arc<A>, subject_token: SubjectToken) -> Self {
        OtpGate {
            api,
            session: OtpSession::new(subject_token),
            countdown: None,
        }
    }

    pub fn session(&self) -> &OtpSession {
        &self.session
    }

    pub fn has_active_countdown(&self) -> bool {
        self.countdown.is_some()
    }

    fn apply(&mut self, event: OtpEvent) {
        self.session = self.session.clone().apply(event);
        if !self.session.is_pending() {
            self.countdown = None;
        }
    }

    /// Dispatches a PIN and restarts the countdown.
    pub async fn request_otp(&mut self) -> Result<()> {
        if self.session.is_verified() {
            return Err(AppError::invalid_state("PIN already verified"));
        }
        self.dispatch().await
    }

    async fn dispatch(&mut self) -> Result<()> {
        match self.api.request_otp(self.session.subject_token()).await {
            Ok(message) => {
                self.apply(OtpEvent::Sent {
                    at: Utc::now(),
                    message,
                });
                self.countdown = Some(Countdown::start());
                info!("PIN dispatched, countdown started");
                Ok(())
            }
            Err(e) => {
                warn!("PIN dispatch failed: {}", e);
                self.apply(OtpEvent::SendFailed);
                Err(e)
            }
        }
    }

    /// Advances the countdown by one second. The running timer calls this
    /// through `next_tick`.
    pub(crate) fn tick(&mut self) -> &OtpState {
        let was_pending = self.session.is_pending();
        self.apply(OtpEvent::Tick);
        if was_pending && self.session.can_resend() {
            info!("PIN window elapsed");
        }
        self.session.state()
    }

    /// Waits for the next countdown second and applies it.
    ///
    /// Never resolves while no countdown is running, so it can sit in a
    /// `select!` next to user input.
    pub async fn next_tick(&mut self) -> OtpState {
        match self.countdown.as_mut() {
            Some(countdown) => countdown.tick().await,
            None => std::future::pending::<()>().await,
        }
        self.tick().clone()
    }

    pub async fn submit_pin(&mut self, pin: &str) -> Result<VerifiedAccess> {
        match self.session.state().clone() {
            OtpState::Verified => return Err(AppError::invalid_state("PIN already verified")),
            OtpState::Unsent => return Err(AppError::invalid_state("No PIN has been sent yet")),
            OtpState::Expired => {
                self.apply(OtpEvent::PinExpired);
                return Err(AppError::OtpExpired);
            }
            OtpState::Pending { .. } => {}
        }

        let request = VerifyPinRequest::new(pin);
        if let Err(e) = request.validate() {
            self.apply(OtpEvent::PinMissing);
            return Err(e.into());
        }

        match self
            .api
            .verify_otp(self.session.subject_token(), &request)
            .await
        {
            Ok(()) => {
                self.apply(OtpEvent::Verified);
                info!("PIN verified");
                Ok(VerifiedAccess {
                    subject_token: self.session.subject_token().clone(),
                })
            }
            Err(AppError::InvalidPin) => {
                warn!("PIN rejected");
                self.apply(OtpEvent::PinRejected);
                Err(AppError::InvalidPin)
            }
            Err(e) => {
                warn!("PIN verification unavailable: {}", e);
                self.apply(OtpEvent::VerifyUnavailable);
                Err(e)
            }
        }
    }

    /// Requests a new PIN once the previous one has expired.
    pub async fn resend(&mut self) -> Result<()> {
        if !self.session.can_resend() {
            return Err(AppError::invalid_state(
                "A new PIN can be requested once the current one expires",
            ));
        }
        self.apply(OtpEvent::ResendRequested);
        self.dispatch().await
    }
}
