//! In-memory `PortalApi` that records every call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::dtos::public_dtos::{AcknowledgeRequest, PaymentUpdateRequest, VerifyPinRequest};
use crate::errors::{AppError, Result};
use crate::models::document::Document;
use crate::models::otp::SubjectToken;
use crate::models::testimonial::TestimonialTheme;
use crate::services::portal_api::PortalApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    RequestOtp,
    VerifyOtp,
    FetchDocument,
    Acknowledge,
    UpdatePayment,
    GenerateTestimonial,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    RequestOtp,
    VerifyOtp(String),
    FetchDocument,
    Acknowledge(serde_json::Value),
    UpdatePayment(i64, serde_json::Value),
    GenerateTestimonial(TestimonialTheme),
}

pub struct FakePortalApi {
    expected_pin: String,
    document: Mutex<Option<Document>>,
    calls: Mutex<Vec<ApiCall>>,
    failures: Mutex<HashMap<Op, AppError>>,
}

impl FakePortalApi {
    pub fn new(expected_pin: &str) -> Self {
        FakePortalApi {
            expected_pin: expected_pin.to_string(),
            document: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_document(self, document: Document) -> Self {
        *self.document.lock().unwrap() = Some(document);
        self
    }

    /// Makes the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: Op, err: AppError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn acknowledgments(&self) -> Vec<serde_json::Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Acknowledge(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: Op, call: ApiCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PortalApi for FakePortalApi {
    async fn request_otp(&self, _token: &SubjectToken) -> Result<Option<String>> {
        self.record(Op::RequestOtp, ApiCall::RequestOtp)?;
        Ok(None)
    }

    async fn verify_otp(&self, _token: &SubjectToken, request: &VerifyPinRequest) -> Result<()> {
        self.record(Op::VerifyOtp, ApiCall::VerifyOtp(request.pin.clone()))?;
        if request.pin == self.expected_pin {
            Ok(())
        } else {
            Err(AppError::InvalidPin)
        }
    }

    async fn fetch_document(&self, _token: &SubjectToken) -> Result<Document> {
        self.record(Op::FetchDocument, ApiCall::FetchDocument)?;
        self.document
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::api(404, "Invalid or expired token"))
    }

    async fn acknowledge(&self, _token: &SubjectToken, request: &AcknowledgeRequest) -> Result<()> {
        let body = serde_json::to_value(request)?;
        self.record(Op::Acknowledge, ApiCall::Acknowledge(body))
    }

    async fn update_payment(&self, document_id: i64, update: &PaymentUpdateRequest) -> Result<()> {
        let body = serde_json::to_value(update)?;
        self.record(Op::UpdatePayment, ApiCall::UpdatePayment(document_id, body))
    }

    async fn generate_testimonial(&self, theme: TestimonialTheme) -> Result<String> {
        self.record(Op::GenerateTestimonial, ApiCall::GenerateTestimonial(theme))?;
        Ok(format!("Great {} from start to finish.", theme))
    }
}
