//! Plain-text rendering of a loaded document.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::models::document::Document;

const RULE_WIDTH: usize = 64;

fn date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|v| v.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn money(value: f64) -> String {
    format!("${:.2}", value)
}

pub fn render_preview(document: &Document) -> String {
    let mut out = String::new();
    let rule = "-".repeat(RULE_WIDTH);

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{} {}", document.kind.label().to_uppercase(), document.number);
    let _ = writeln!(out, "Date: {}", date(document.issued_at));
    if document.due_at.is_some() {
        let _ = writeln!(out, "Due:  {}", date(document.due_at));
    }
    if document.is_paid() {
        match document.paid_at {
            Some(paid_at) => {
                let _ = writeln!(out, "PAID on {}", date(Some(paid_at)));
            }
            None => {
                let _ = writeln!(out, "PAID");
            }
        }
        if let Some(payment_type) = document.payment.payment_type {
            let _ = writeln!(out, "Payment: {}", payment_type);
        }
    }
    let _ = writeln!(out, "{rule}");

    let customer = &document.customer;
    let _ = writeln!(out, "Bill to: {}", customer.name.as_deref().unwrap_or("-"));
    for line in customer.address_lines() {
        let _ = writeln!(out, "         {}", line);
    }
    for contact in [customer.email.as_deref(), customer.phone.as_deref()]
        .into_iter()
        .flatten()
        .filter(|c| !c.is_empty())
    {
        let _ = writeln!(out, "         {}", contact);
    }
    let _ = writeln!(out, "{rule}");

    let _ = writeln!(out, "{:<34} {:>5} {:>10} {:>11}", "Description", "Qty", "Price", "Amount");
    for item in &document.items {
        let _ = writeln!(
            out,
            "{:<34} {:>5} {:>10} {:>11}",
            item.description,
            item.quantity,
            money(item.unit_price),
            money(item.amount())
        );
    }
    let _ = writeln!(out, "{rule}");

    let totals = document.totals();
    let _ = writeln!(out, "{:>50} {:>13}", "Subtotal:", money(totals.subtotal));
    if totals.discount != 0.0 {
        let _ = writeln!(out, "{:>50} {:>13}", "Discount:", format!("-{}", money(totals.discount)));
    }
    let _ = writeln!(out, "{:>50} {:>13}", "Tax:", format!("{}%", totals.tax_percent));
    let _ = writeln!(out, "{:>50} {:>13}", "Total:", money(totals.final_total));
    let _ = writeln!(out, "{:>50} {:>13}", "Amount due:", money(document.amount_due()));

    if let Some(notes) = &document.payment.notes {
        let _ = writeln!(out, "\nNotes: {}", notes);
    }
    if let Some(testimonial) = &document.testimonial {
        let _ = writeln!(out, "\nTestimonial: \"{}\"", testimonial);
    }

    let acknowledgment = &document.acknowledgment;
    let _ = writeln!(out);
    match (acknowledgment.accepted, acknowledgment.signed_at) {
        (true, Some(signed_at)) => {
            let _ = writeln!(out, "Signed on {}", signed_at.format("%b %-d, %Y %H:%M UTC"));
        }
        (true, None) => {
            let _ = writeln!(out, "Signed");
        }
        (false, _) => {
            let _ = writeln!(out, "Not yet signed");
        }
    }
    if let Some(signature) = &acknowledgment.signature {
        let _ = writeln!(out, "Signature on file ({})", signature.mime_type());
    }

    if let Some(url) = &document.media_folder_url {
        let _ = writeln!(out, "Photos: {}", url);
    }

    out
}
