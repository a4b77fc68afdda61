// services/portal_api.rs
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::dtos::public_dtos::{
    AcknowledgeRequest, DocumentResponse, ErrorResponse, OtpMessageResponse, PaymentUpdateRequest,
    VerifyPinRequest,
};
use crate::errors::{AppError, Result};
use crate::models::document::Document;
use crate::models::otp::SubjectToken;
use crate::models::testimonial::TestimonialTheme;

pub const SUBMIT_FAILED_MESSAGE: &str = "Failed to submit. Try again.";

/// The invoicing REST API as seen by the public acknowledgment flow.
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Asks the server to email a fresh PIN. Returns the server's status line.
    async fn request_otp(&self, token: &SubjectToken) -> Result<Option<String>>;

    async fn verify_otp(&self, token: &SubjectToken, request: &VerifyPinRequest) -> Result<()>;

    async fn fetch_document(&self, token: &SubjectToken) -> Result<Document>;

    async fn acknowledge(&self, token: &SubjectToken, request: &AcknowledgeRequest) -> Result<()>;

    async fn update_payment(&self, document_id: i64, update: &PaymentUpdateRequest) -> Result<()>;

    async fn generate_testimonial(&self, theme: TestimonialTheme) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpPortalApi {
    base_url: String,
    staff_token: Option<String>,
    client: Client,
}

impl HttpPortalApi {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpPortalApi {
            base_url: config.api_base_url.clone(),
            staff_token: config.staff_token.clone(),
            client,
        })
    }

    fn public_url(&self, token: &SubjectToken, suffix: &str) -> String {
        format!("{}/public/document/{}{}", self.base_url, token.as_str(), suffix)
    }

    /// Staff endpoints get the bearer token; public ones never do.
    fn with_staff_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.staff_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Passes successful responses through, turns the rest into `AppError::Api`.
async fn check_status(response: Response, fallback: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .and_then(|parsed| parsed.detail_text())
        .unwrap_or_else(|| fallback.to_string());

    warn!("Portal API returned {}: {}", status, detail);
    Err(AppError::api(status.as_u16(), detail))
}

fn transport_error(context: &str, err: reqwest::Error) -> AppError {
    error!("{} failed: {}", context, err);
    AppError::from(err)
}

#[async_trait]
impl PortalApi for HttpPortalApi {
    async fn request_otp(&self, token: &SubjectToken) -> Result<Option<String>> {
        info!("Requesting one-time PIN");
        let response = self
            .client
            .get(self.public_url(token, "/request-otp"))
            .send()
            .await
            .map_err(|e| transport_error("PIN request", e))?;
        let response = check_status(response, "Failed to send OTP.").await?;

        let body = response.text().await?;
        let parsed = serde_json::from_str::<OtpMessageResponse>(&body).unwrap_or_default();
        Ok(parsed.message)
    }

    async fn verify_otp(&self, token: &SubjectToken, request: &VerifyPinRequest) -> Result<()> {
        info!("Verifying one-time PIN");
        let response = self
            .client
            .post(self.public_url(token, "/verify-otp"))
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error("PIN verification", e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS => {
                debug!("PIN rejected with {}", status);
                Err(AppError::InvalidPin)
            }
            _ => check_status(response, "Failed to verify PIN.").await.map(|_| ()),
        }
    }

    async fn fetch_document(&self, token: &SubjectToken) -> Result<Document> {
        info!("Fetching public document");
        let response = self
            .client
            .get(self.public_url(token, ""))
            .send()
            .await
            .map_err(|e| transport_error("Document fetch", e))?;
        let response = check_status(response, "Document not found.").await?;

        let raw: DocumentResponse = response.json().await?;
        Document::try_from(raw)
    }

    async fn acknowledge(&self, token: &SubjectToken, request: &AcknowledgeRequest) -> Result<()> {
        info!(
            kind = request.kind.label(),
            with_signature = request.signature_base64.is_some(),
            "Submitting acknowledgment"
        );
        let response = self
            .client
            .post(self.public_url(token, "/acknowledge"))
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error("Acknowledgment", e))?;
        check_status(response, SUBMIT_FAILED_MESSAGE).await?;
        Ok(())
    }

    async fn update_payment(&self, document_id: i64, update: &PaymentUpdateRequest) -> Result<()> {
        if self.staff_token.is_none() {
            return Err(AppError::configuration(
                "PORTAL_STAFF_TOKEN is required to record payments",
            ));
        }

        info!(document_id, status = %update.status, "Recording payment");
        let request = self
            .client
            .patch(format!("{}/invoices/{}", self.base_url, document_id))
            .json(update);
        let response = self
            .with_staff_auth(request)
            .send()
            .await
            .map_err(|e| transport_error("Payment update", e))?;
        check_status(response, "Failed to update invoice.").await?;
        Ok(())
    }

    async fn generate_testimonial(&self, theme: TestimonialTheme) -> Result<String> {
        debug!(%theme, "Requesting testimonial suggestion");
        let request = self
            .client
            .get(format!("{}/ai/generate-testimonial", self.base_url))
            .query(&[("theme", theme.as_str())]);
        let response = self
            .with_staff_auth(request)
            .send()
            .await
            .map_err(|e| transport_error("Testimonial suggestion", e))?;
        let response = check_status(response, "Failed to generate testimonial.").await?;

        // The endpoint answers with text, sometimes JSON-quoted.
        let text = response.text().await?;
        let text = serde_json::from_str::<String>(&text).unwrap_or(text);
        Ok(text.trim().to_string())
    }
}
