use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::dtos::public_dtos::{AcknowledgeRequest, PaymentUpdateRequest};
use crate::errors::{AppError, MissingItem, Result};
use crate::flows::otp_gate::VerifiedAccess;
use crate::models::document::Document;
use crate::models::payment::{PaymentDetails, PaymentStatus, PaymentType};
use crate::models::signature::{SignatureImage, SignaturePad};
use crate::models::testimonial::TestimonialTheme;
use crate::services::portal_api::PortalApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Loading,
    Loaded,
    Submitting,
    Submitted,
}

/// Everything the viewer can edit before submitting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcknowledgmentForm {
    pub agreed: bool,
    pub signature: SignaturePad,
    pub testimonial: String,
    pub payment: PaymentDetails,
}

impl AcknowledgmentForm {
    /// Form pre-filled from what the server already has on record.
    pub fn from_document(document: &Document) -> Self {
        let signature = match &document.acknowledgment.signature {
            Some(image) => SignaturePad::with_existing(image.clone()),
            None => SignaturePad::default(),
        };
        AcknowledgmentForm {
            agreed: document.acknowledgment.accepted,
            signature,
            testimonial: document.testimonial.clone().unwrap_or_default(),
            payment: document.payment.clone(),
        }
    }
}

/// Checks the form against the document and builds the request to send.
///
/// Errors here are raised before any network traffic.
pub fn prepare_acknowledgment(
    document: &Document,
    form: &AcknowledgmentForm,
    now: DateTime<Utc>,
) -> Result<AcknowledgeRequest> {
    let on_file = document.acknowledgment.signature.is_some();
    let pad = &form.signature;

    // Once accepted, the pad may only carry the signature that was loaded.
    let replaced = pad.was_cleared() || (on_file && pad.is_freshly_drawn());
    if document.is_accepted() && replaced && !pad.is_empty() {
        return Err(AppError::SignatureLocked);
    }

    let mut missing = Vec::new();
    if !form.agreed {
        missing.push(MissingItem::Terms);
    }
    if pad.is_empty() && !(on_file && !pad.was_cleared()) {
        missing.push(MissingItem::Signature);
    }
    if !missing.is_empty() {
        return Err(AppError::MissingAcknowledgment(missing));
    }

    // A clear over a signature on file keeps the stored one.
    let signature_base64 = match pad.image() {
        Some(_) if pad.was_cleared() && on_file => None,
        Some(image) => Some(image.as_data_url().to_string()),
        None => None,
    };

    let testimonial = Some(form.testimonial.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    Ok(AcknowledgeRequest {
        kind: document.kind,
        accepted: true,
        signed_at: now,
        signature_base64,
        testimonial,
    })
}

pub struct AcknowledgmentFlow<A: PortalApi + ?Sized> {
    api: Arc<A>,
    access: VerifiedAccess,
    state: FlowState,
    document: Option<Document>,
    form: AcknowledgmentForm,
}

impl<A: PortalApi + ?Sized> AcknowledgmentFlow<A> {
    pub fn new(api: Arc<A>, access: VerifiedAccess) -> Self {
        AcknowledgmentFlow {
            api,
            access,
            state: FlowState::Loading,
            document: None,
            form: AcknowledgmentForm::default(),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn form(&self) -> &AcknowledgmentForm {
        &self.form
    }

    pub fn is_read_only(&self) -> bool {
        self.state == FlowState::Submitted
    }

    pub async fn load_document(&mut self) -> Result<&Document> {
        if self.state != FlowState::Loading {
            return Err(AppError::invalid_state("Document already loaded"));
        }

        let document = self
            .api
            .fetch_document(self.access.subject_token())
            .await?;
        info!(
            document_id = document.id,
            kind = document.kind.label(),
            accepted = document.is_accepted(),
            "Document loaded"
        );

        self.form = AcknowledgmentForm::from_document(&document);
        self.state = FlowState::Loaded;
        Ok(self.document.insert(document))
    }

    fn editable(&mut self) -> Result<&mut AcknowledgmentForm> {
        match self.state {
            FlowState::Loaded => Ok(&mut self.form),
            FlowState::Submitted => Err(AppError::invalid_state("Acknowledgment already submitted")),
            _ => Err(AppError::invalid_state("Document is not ready")),
        }
    }

    pub fn set_agreed(&mut self, agreed: bool) -> Result<()> {
        self.editable()?.agreed = agreed;
        Ok(())
    }

    pub fn set_testimonial(&mut self, testimonial: impl Into<String>) -> Result<()> {
        self.editable()?.testimonial = testimonial.into();
        Ok(())
    }

    /// Puts a freshly captured signature image on the pad.
    pub fn draw_signature(&mut self, image_bytes: &[u8]) -> Result<()> {
        let image = SignatureImage::from_image_bytes(image_bytes)?;
        self.editable()?.signature.draw(image);
        Ok(())
    }

    pub fn clear_signature(&mut self) -> Result<()> {
        self.editable()?.signature.clear();
        Ok(())
    }

    pub async fn suggest_testimonial(&mut self, theme: TestimonialTheme) -> Result<&str> {
        self.editable()?;
        let suggestion = self.api.generate_testimonial(theme).await?;
        self.form.testimonial = suggestion;
        Ok(&self.form.testimonial)
    }

    pub async fn submit(&mut self) -> Result<()> {
        match self.state {
            FlowState::Loaded => {}
            FlowState::Submitted => {
                return Err(AppError::invalid_state("Acknowledgment already submitted"))
            }
            _ => return Err(AppError::invalid_state("Document is not ready")),
        }
        let Some(document) = self.document.as_ref() else {
            return Err(AppError::invalid_state("Document is not ready"));
        };

        let request = match prepare_acknowledgment(document, &self.form, Utc::now()) {
            Ok(request) => request,
            Err(e) => {
                warn!("Acknowledgment blocked: {}", e);
                return Err(e);
            }
        };

        self.state = FlowState::Submitting;
        match self
            .api
            .acknowledge(self.access.subject_token(), &request)
            .await
        {
            Ok(()) => {
                if let Some(document) = self.document.as_mut() {
                    let acknowledgment = &mut document.acknowledgment;
                    acknowledgment.accepted = true;
                    acknowledgment.signed_at = Some(request.signed_at);
                    if let Some(image) = self.form.signature.image().filter(|_| request.signature_base64.is_some()) {
                        acknowledgment.signature = Some(image.clone());
                    }
                    if request.testimonial.is_some() {
                        document.testimonial = request.testimonial.clone();
                    }
                }
                self.state = FlowState::Submitted;
                info!("Acknowledgment recorded");
                Ok(())
            }
            Err(e) => {
                warn!("Acknowledgment failed: {}", e);
                self.state = FlowState::Loaded;
                Err(e)
            }
        }
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus) -> Result<()> {
        self.payment_form()?.status = status;
        Ok(())
    }

    pub fn set_payment_type(&mut self, payment_type: Option<PaymentType>) -> Result<()> {
        self.payment_form()?.payment_type = payment_type;
        Ok(())
    }

    pub fn set_payment_notes(&mut self, notes: impl Into<String>) -> Result<()> {
        let notes = notes.into();
        self.payment_form()?.notes = Some(notes).filter(|n| !n.trim().is_empty());
        Ok(())
    }

    /// Payment fields stay editable after submission.
    fn payment_form(&mut self) -> Result<&mut PaymentDetails> {
        match self.state {
            FlowState::Loaded | FlowState::Submitted => Ok(&mut self.form.payment),
            _ => Err(AppError::invalid_state("Document is not ready")),
        }
    }

    /// Sends the local payment fields. Only accepted documents can be marked.
    pub async fn record_payment(&mut self) -> Result<()> {
        self.payment_form()?;
        let document = self
            .document
            .as_mut()
            .ok_or_else(|| AppError::invalid_state("Document is not ready"))?;
        if !document.is_accepted() {
            return Err(AppError::invalid_state(
                "Payments can be recorded once the document is accepted",
            ));
        }

        let update = PaymentUpdateRequest::from(&self.form.payment);
        self.api.update_payment(document.id, &update).await?;
        document.payment = self.form.payment.clone();
        if document.is_paid() && document.paid_at.is_none() {
            document.paid_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
    use serde_json::json;

    use super::*;
    use crate::dtos::public_dtos::fixtures::{document_from, document_json};
    use crate::models::otp::SubjectToken;
    use crate::models::signature::fixtures::{OTHER_PNG_BYTES, PNG_BYTES};
    use crate::testing::{ApiCall, FakePortalApi, Op};

    fn signed_json(is_estimate: bool) -> serde_json::Value {
        let mut value = document_json(is_estimate);
        let prefix = if is_estimate { "estimate_" } else { "" };
        value[format!("{prefix}accepted")] = json!(true);
        value[format!("{prefix}signed_at")] = json!("2025-04-01T15:30:00");
        value[format!("{prefix}signature_base64")] =
            json!(format!("data:image/png;base64,{}", base64.encode(PNG_BYTES)));
        value["testimonial"] = json!("Fast and friendly");
        value
    }

    async fn loaded_flow(document: Document) -> (Arc<FakePortalApi>, AcknowledgmentFlow<FakePortalApi>) {
        let api = Arc::new(FakePortalApi::new("482913").with_document(document));
        let access = VerifiedAccess::for_tests(SubjectToken::parse("doc-123").unwrap());
        let mut flow = AcknowledgmentFlow::new(api.clone(), access);
        flow.load_document().await.unwrap();
        (api, flow)
    }

    #[tokio::test]
    async fn estimate_submission_uses_prefixed_fields() {
        let (api, mut flow) = loaded_flow(document_from(document_json(true))).await;

        flow.set_agreed(true).unwrap();
        flow.draw_signature(PNG_BYTES).unwrap();
        flow.submit().await.unwrap();

        let bodies = api.acknowledgments();
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        assert_eq!(body["estimate_accepted"], json!(true));
        assert!(body["estimate_signature_base64"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(body.get("estimate_signed_at").is_some());
        assert!(body.get("accepted").is_none());
        assert!(body.get("signature_base64").is_none());
        assert!(body.get("testimonial").is_none());

        assert_eq!(flow.state(), FlowState::Submitted);
        assert!(flow.is_read_only());
        assert!(flow.document().unwrap().is_accepted());
    }

    #[tokio::test]
    async fn unagreed_submission_makes_no_call() {
        let (api, mut flow) = loaded_flow(document_from(document_json(false))).await;
        flow.draw_signature(PNG_BYTES).unwrap();

        let err = flow.submit().await.unwrap_err();
        assert!(matches!(err, AppError::MissingAcknowledgment(ref m) if m == &vec![MissingItem::Terms]));
        assert_eq!(api.calls(), vec![ApiCall::FetchDocument]);
        assert_eq!(flow.state(), FlowState::Loaded);
    }

    #[tokio::test]
    async fn unsigned_submission_makes_no_call() {
        let (api, mut flow) = loaded_flow(document_from(document_json(false))).await;
        flow.set_agreed(true).unwrap();

        let err = flow.submit().await.unwrap_err();
        assert!(
            matches!(err, AppError::MissingAcknowledgment(ref m) if m == &vec![MissingItem::Signature])
        );
        assert!(api.acknowledgments().is_empty());
    }

    #[tokio::test]
    async fn accepted_document_loads_signed() {
        let document = document_from(signed_json(false));
        let stored = document.acknowledgment.signature.clone();
        let (_api, flow) = loaded_flow(document).await;

        let form = flow.form();
        assert!(form.agreed);
        assert_eq!(form.signature.image(), stored.as_ref());
        assert!(!form.signature.is_freshly_drawn());
        assert_eq!(form.testimonial, "Fast and friendly");
        assert!(!flow.is_read_only());
    }

    #[tokio::test]
    async fn accepted_signature_cannot_be_replaced() {
        let (api, mut flow) = loaded_flow(document_from(signed_json(false))).await;

        flow.clear_signature().unwrap();
        flow.draw_signature(OTHER_PNG_BYTES).unwrap();
        let err = flow.submit().await.unwrap_err();

        assert!(matches!(err, AppError::SignatureLocked));
        assert_eq!(
            err.to_string(),
            "This document was already signed. You cannot change the original signature."
        );
        assert!(api.acknowledgments().is_empty());
    }

    #[tokio::test]
    async fn accepted_signature_cannot_be_drawn_over() {
        let document = document_from(signed_json(false));
        let stored = document.acknowledgment.signature.clone();
        let (api, mut flow) = loaded_flow(document).await;

        flow.draw_signature(OTHER_PNG_BYTES).unwrap();
        let err = flow.submit().await.unwrap_err();

        assert!(matches!(err, AppError::SignatureLocked));
        assert!(api.acknowledgments().is_empty());
        assert_eq!(flow.state(), FlowState::Loaded);
        assert_eq!(flow.document().unwrap().acknowledgment.signature, stored);
    }

    #[tokio::test]
    async fn accepted_document_without_stored_signature_can_be_signed() {
        let mut value = document_json(false);
        value["accepted"] = json!(true);
        let (api, mut flow) = loaded_flow(document_from(value)).await;

        flow.draw_signature(PNG_BYTES).unwrap();
        flow.submit().await.unwrap();

        let expected = SignatureImage::from_image_bytes(PNG_BYTES).unwrap();
        assert_eq!(api.acknowledgments()[0]["signature_base64"], json!(expected.as_data_url()));
    }

    #[tokio::test]
    async fn resending_accepted_document_keeps_original_signature() {
        let document = document_from(signed_json(true));
        let stored = document.acknowledgment.signature.clone().unwrap();
        let (api, mut flow) = loaded_flow(document).await;

        flow.submit().await.unwrap();
        let body = &api.acknowledgments()[0];
        assert_eq!(body["estimate_signature_base64"], json!(stored.as_data_url()));
        assert_eq!(body["testimonial"], json!("Fast and friendly"));
    }

    #[tokio::test]
    async fn clear_without_redraw_requires_signature() {
        let (api, mut flow) = loaded_flow(document_from(signed_json(false))).await;
        flow.clear_signature().unwrap();

        let err = flow.submit().await.unwrap_err();
        assert!(matches!(err, AppError::MissingAcknowledgment(_)));
        assert!(api.acknowledgments().is_empty());
    }

    #[tokio::test]
    async fn redraw_over_unaccepted_signature_keeps_stored_one() {
        let mut value = signed_json(false);
        value["accepted"] = json!(false);
        let (api, mut flow) = loaded_flow(document_from(value)).await;

        flow.set_agreed(true).unwrap();
        flow.clear_signature().unwrap();
        flow.draw_signature(OTHER_PNG_BYTES).unwrap();
        flow.submit().await.unwrap();

        let body = &api.acknowledgments()[0];
        assert_eq!(body["accepted"], json!(true));
        assert!(body.get("signature_base64").is_none());
    }

    #[tokio::test]
    async fn redraw_on_fresh_document_is_sent() {
        let (api, mut flow) = loaded_flow(document_from(document_json(false))).await;

        flow.set_agreed(true).unwrap();
        flow.draw_signature(PNG_BYTES).unwrap();
        flow.clear_signature().unwrap();
        flow.draw_signature(OTHER_PNG_BYTES).unwrap();
        flow.set_testimonial("  Tidy work  ").unwrap();
        flow.submit().await.unwrap();

        let body = &api.acknowledgments()[0];
        let expected = SignatureImage::from_image_bytes(OTHER_PNG_BYTES).unwrap();
        assert_eq!(body["signature_base64"], json!(expected.as_data_url()));
        assert_eq!(body["testimonial"], json!("Tidy work"));
    }

    #[tokio::test]
    async fn second_submit_is_rejected_locally() {
        let (api, mut flow) = loaded_flow(document_from(document_json(false))).await;
        flow.set_agreed(true).unwrap();
        flow.draw_signature(PNG_BYTES).unwrap();
        flow.submit().await.unwrap();

        assert!(flow.submit().await.is_err());
        assert!(flow.set_agreed(false).is_err());
        assert!(flow.clear_signature().is_err());
        assert_eq!(api.acknowledgments().len(), 1);
    }

    #[tokio::test]
    async fn failed_submit_can_be_retried() {
        let (api, mut flow) = loaded_flow(document_from(document_json(false))).await;
        flow.set_agreed(true).unwrap();
        flow.draw_signature(PNG_BYTES).unwrap();

        api.fail_next(Op::Acknowledge, AppError::api(500, "Failed to submit. Try again."));
        let err = flow.submit().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to submit. Try again.");
        assert_eq!(flow.state(), FlowState::Loaded);
        assert!(!flow.document().unwrap().is_accepted());

        flow.submit().await.unwrap();
        assert_eq!(flow.state(), FlowState::Submitted);
        assert_eq!(api.acknowledgments().len(), 2);
    }

    #[tokio::test]
    async fn edits_before_load_are_refused() {
        let api = Arc::new(FakePortalApi::new("482913"));
        let access = VerifiedAccess::for_tests(SubjectToken::parse("doc-123").unwrap());
        let mut flow = AcknowledgmentFlow::new(api.clone(), access);

        assert!(flow.set_agreed(true).is_err());
        assert!(flow.submit().await.is_err());
        assert!(flow.load_document().await.is_err());
        assert_eq!(flow.state(), FlowState::Loading);
        assert_eq!(api.calls(), vec![ApiCall::FetchDocument]);
    }

    #[tokio::test]
    async fn suggested_testimonial_replaces_text() {
        let (api, mut flow) = loaded_flow(document_from(document_json(false))).await;

        let text = flow.suggest_testimonial(TestimonialTheme::Clean).await.unwrap();
        assert_eq!(text, "Great clean from start to finish.");
        assert_eq!(flow.form().testimonial, "Great clean from start to finish.");
        assert!(api
            .calls()
            .contains(&ApiCall::GenerateTestimonial(TestimonialTheme::Clean)));
    }

    #[tokio::test]
    async fn payment_requires_accepted_document() {
        let (api, mut flow) = loaded_flow(document_from(document_json(false))).await;
        flow.set_payment_status(PaymentStatus::Paid).unwrap();

        assert!(flow.record_payment().await.is_err());
        assert_eq!(api.calls(), vec![ApiCall::FetchDocument]);
    }

    #[tokio::test]
    async fn payment_recorded_after_acceptance() {
        let (api, mut flow) = loaded_flow(document_from(signed_json(false))).await;
        flow.set_payment_status(PaymentStatus::Paid).unwrap();
        flow.set_payment_type(Some(PaymentType::Check)).unwrap();
        flow.set_payment_notes("Check #1042").unwrap();

        flow.record_payment().await.unwrap();

        assert!(api.calls().contains(&ApiCall::UpdatePayment(
            41,
            json!({ "status": "paid", "payment_type": "check", "notes": "Check #1042" })
        )));
        let document = flow.document().unwrap();
        assert!(document.is_paid());
        assert!(document.paid_at.is_some());
        assert_eq!(document.amount_due(), 0.0);
    }
}
