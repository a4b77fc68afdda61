use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::document::{
    round_cents, Acknowledgment, Customer, Document, DocumentKind, LineItem,
};
use crate::models::payment::{PaymentDetails, PaymentStatus, PaymentType};
use crate::models::signature::SignatureImage;

// Request DTOs
#[derive(Debug, Serialize, Validate)]
pub struct VerifyPinRequest {
    #[validate(length(min = 1, message = "PIN is required"))]
    pub pin: String,
}

impl VerifyPinRequest {
    pub fn new(pin: &str) -> Self {
        VerifyPinRequest {
            pin: pin.trim().to_string(),
        }
    }
}

/// Acknowledgment body. Field names carry the `estimate_` prefix for estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeRequest {
    pub kind: DocumentKind,
    pub accepted: bool,
    pub signed_at: DateTime<Utc>,
    pub signature_base64: Option<String>,
    pub testimonial: Option<String>,
}

impl Serialize for AcknowledgeRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let prefix = self.kind.field_prefix();
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(&format!("{prefix}accepted"), &self.accepted)?;
        map.serialize_entry(
            &format!("{prefix}signed_at"),
            &self.signed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        if let Some(signature) = &self.signature_base64 {
            map.serialize_entry(&format!("{prefix}signature_base64"), signature)?;
        }
        if let Some(testimonial) = &self.testimonial {
            map.serialize_entry("testimonial", testimonial)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentUpdateRequest {
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<PaymentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<&PaymentDetails> for PaymentUpdateRequest {
    fn from(details: &PaymentDetails) -> Self {
        PaymentUpdateRequest {
            status: details.status,
            payment_type: details.payment_type,
            notes: details.notes.clone().filter(|n| !n.trim().is_empty()),
        }
    }
}

// Response DTOs
#[derive(Debug, Default, Deserialize)]
pub struct OtpMessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// FastAPI error body. `detail` is a string, or a list for validation errors.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            serde_json::Value::Null | serde_json::Value::String(_) => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomerResponse {
    #[serde(default, alias = "first_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zipcode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LineItemResponse {
    pub description: String,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct DocumentResponse {
    pub id: i64,
    #[serde(default, alias = "number")]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub is_estimate: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub customer: Option<CustomerResponse>,
    #[serde(default)]
    pub items: Vec<LineItemResponse>,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub tax: Option<f64>,
    #[serde(default)]
    pub final_total: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub testimonial: Option<String>,
    #[serde(default)]
    pub media_folder_url: Option<String>,

    #[serde(default)]
    pub accepted: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signature_base64: Option<String>,

    #[serde(default)]
    pub estimate_accepted: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub estimate_signed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimate_signature_base64: Option<String>,
}

impl TryFrom<DocumentResponse> for Document {
    type Error = AppError;

    fn try_from(raw: DocumentResponse) -> Result<Self> {
        let kind = if raw.is_estimate.unwrap_or(false) {
            DocumentKind::Estimate
        } else {
            DocumentKind::Invoice
        };

        let (accepted, signed_at, signature, inactive_set) = match kind {
            DocumentKind::Invoice => (
                raw.accepted,
                raw.signed_at,
                raw.signature_base64,
                raw.estimate_accepted.unwrap_or(false) || raw.estimate_signature_base64.is_some(),
            ),
            DocumentKind::Estimate => (
                raw.estimate_accepted,
                raw.estimate_signed_at,
                raw.estimate_signature_base64,
                raw.accepted.unwrap_or(false) || raw.signature_base64.is_some(),
            ),
        };
        if inactive_set {
            tracing::debug!(
                document_id = raw.id,
                kind = kind.label(),
                "Ignoring acceptance fields of the inactive document kind"
            );
        }

        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .map(|s| SignatureImage::from_data_url(&s))
            .transpose()
            .map_err(|_| AppError::invalid_data("Stored signature is not a valid image"))?;

        let number = raw
            .invoice_number
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| AppError::invalid_data("Document number is missing"))?;

        let items = raw
            .items
            .into_iter()
            .map(|item| {
                let quantity = u32::try_from(item.quantity).map_err(|_| {
                    AppError::invalid_data(format!("Invalid quantity for {}", item.description))
                })?;
                if !item.unit_price.is_finite() {
                    return Err(AppError::invalid_data(format!(
                        "Invalid unit price for {}",
                        item.description
                    )));
                }
                Ok(LineItem {
                    description: item.description,
                    quantity,
                    unit_price: item.unit_price,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let customer = raw.customer.unwrap_or_default();
        let document = Document {
            id: raw.id,
            number,
            kind,
            issued_at: raw.date,
            due_at: raw.due_date,
            customer: Customer {
                name: customer.name,
                email: customer.email,
                phone: customer.phone,
                street: customer.street,
                city: customer.city,
                state: customer.state,
                zipcode: customer.zipcode,
            },
            items,
            discount: raw.discount.unwrap_or(0.0),
            tax_percent: raw.tax.unwrap_or(0.0),
            payment: PaymentDetails {
                status: PaymentStatus::from_wire(raw.status.as_deref()),
                payment_type: raw.payment_type.as_deref().and_then(PaymentType::from_wire),
                notes: raw.notes.filter(|n| !n.trim().is_empty()),
            },
            paid_at: raw.paid_at,
            testimonial: raw.testimonial.filter(|t| !t.trim().is_empty()),
            media_folder_url: raw.media_folder_url.filter(|u| !u.trim().is_empty()),
            acknowledgment: Acknowledgment {
                accepted: accepted.unwrap_or(false),
                signed_at,
                signature,
            },
        };

        if let Some(reported) = raw.final_total {
            let computed = document.totals().final_total;
            if (round_cents(reported) - computed).abs() >= 0.01 {
                tracing::warn!(
                    document_id = document.id,
                    reported,
                    computed,
                    "Server total differs from line items"
                );
            }
        }

        Ok(document)
    }
}

/// Parses RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` (as UTC) or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn de_opt_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}
