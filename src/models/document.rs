use chrono::{DateTime, Utc};

use crate::models::payment::{PaymentDetails, PaymentStatus};
use crate::models::signature::SignatureImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Invoice,
    Estimate,
}

impl DocumentKind {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "Invoice",
            DocumentKind::Estimate => "Estimate",
        }
    }

    /// Prefix of the acceptance fields this kind owns on the wire.
    pub fn field_prefix(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "",
            DocumentKind::Estimate => "estimate_",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Customer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
}

impl Customer {
    pub fn address_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(street) = self.street.as_deref().filter(|s| !s.is_empty()) {
            lines.push(street.to_string());
        }

        let locality = [self.city.as_deref(), self.state.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        let locality = match self.zipcode.as_deref().filter(|z| !z.is_empty()) {
            Some(zip) if !locality.is_empty() => format!("{} {}", locality, zip),
            Some(zip) => zip.to_string(),
            None => locality,
        };
        if !locality.is_empty() {
            lines.push(locality);
        }
        lines
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
}

impl LineItem {
    pub fn amount(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub discount: f64,
    pub tax_percent: f64,
    pub final_total: f64,
}

/// Subtotal less discount, then tax applied as a percentage, rounded to cents.
pub fn compute_totals(items: &[LineItem], discount: f64, tax_percent: f64) -> Totals {
    let subtotal: f64 = items.iter().map(LineItem::amount).sum();
    let final_total = round_cents((subtotal - discount) * (1.0 + tax_percent / 100.0));
    Totals {
        subtotal,
        discount,
        tax_percent,
        final_total,
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The active acceptance field-pair of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Acknowledgment {
    pub accepted: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub signature: Option<SignatureImage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: i64,
    pub number: String,
    pub kind: DocumentKind,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub customer: Customer,
    pub items: Vec<LineItem>,
    pub discount: f64,
    pub tax_percent: f64,
    pub payment: PaymentDetails,
    pub paid_at: Option<DateTime<Utc>>,
    pub testimonial: Option<String>,
    pub media_folder_url: Option<String>,
    pub acknowledgment: Acknowledgment,
}

impl Document {
    pub fn totals(&self) -> Totals {
        compute_totals(&self.items, self.discount, self.tax_percent)
    }

    pub fn is_paid(&self) -> bool {
        self.payment.status == PaymentStatus::Paid
    }

    pub fn amount_due(&self) -> f64 {
        if self.is_paid() {
            0.0
        } else {
            self.totals().final_total
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.acknowledgment.accepted
    }
}
