use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use invoice_portal::config::AppConfig;
use invoice_portal::flows::{AcknowledgmentFlow, FlowState, OtpGate, VerifiedAccess};
use invoice_portal::models::otp::{OtpState, SubjectToken};
use invoice_portal::models::payment::PaymentStatus;
use invoice_portal::models::testimonial::TestimonialTheme;
use invoice_portal::preview::render_preview;
use invoice_portal::services::portal_api::HttpPortalApi;

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    let raw_token = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PORTAL_DOCUMENT_TOKEN").ok())
        .context("Usage: invoice-portal <document-token>")?;
    let token = SubjectToken::parse(&raw_token)?;

    tracing::info!("Using API at {}", config.api_base_url);
    let api = Arc::new(HttpPortalApi::new(&config)?);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let Some(access) = unlock(api.clone(), token, &mut input).await? else {
        return Ok(());
    };
    review_and_sign(api, access, &config, &mut input).await
}

/// Prints a prompt and reads one trimmed line. `None` on end of input.
async fn ask(input: &mut Input, prompt: &str) -> anyhow::Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|line| line.trim().to_string()))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn unlock(
    api: Arc<HttpPortalApi>,
    token: SubjectToken,
    input: &mut Input,
) -> anyhow::Result<Option<VerifiedAccess>> {
    let mut gate = OtpGate::new(api, token);
    let sent = gate.request_otp().await;
    println!("{}", gate.session().message());
    if sent.is_err() {
        return Ok(None);
    }
    println!("Enter the PIN ({} left), or 'quit'.", gate.session().formatted_remaining());

    loop {
        tokio::select! {
            state = gate.next_tick() => {
                let session = gate.session();
                match state {
                    OtpState::Expired => {
                        println!("\n{}", session.message());
                        println!("Type 'resend' for a new PIN.");
                    }
                    OtpState::Pending { .. } if session.seconds_remaining() % 30 == 0 => {
                        println!("\nPIN expires in {}", session.formatted_remaining());
                    }
                    _ => {}
                }
            }
            line = input.next_line() => {
                let Some(line) = line? else {
                    return Ok(None);
                };
                let line = line.trim();
                if line.eq_ignore_ascii_case("quit") {
                    return Ok(None);
                }
                if line.eq_ignore_ascii_case("resend") {
                    if gate.resend().await.is_ok() {
                        println!("{} ({} left)", gate.session().message(), gate.session().formatted_remaining());
                    } else {
                        println!("{}", gate.session().message());
                    }
                    continue;
                }
                match gate.submit_pin(line).await {
                    Ok(access) => {
                        println!("{}", gate.session().message());
                        return Ok(Some(access));
                    }
                    Err(_) => println!("{}", gate.session().message()),
                }
            }
        }
    }
}

async fn review_and_sign(
    api: Arc<HttpPortalApi>,
    access: VerifiedAccess,
    config: &AppConfig,
    input: &mut Input,
) -> anyhow::Result<()> {
    let mut flow = AcknowledgmentFlow::new(api, access);
    let document = flow.load_document().await.context("Failed to load document")?;
    println!("\n{}", render_preview(document));
    let label = document.kind.label().to_lowercase();

    while flow.state() == FlowState::Loaded {
        let Some(answer) = ask(input, &format!("Do you agree to the terms of this {label}? [y/N] ")).await? else {
            return Ok(());
        };
        flow.set_agreed(is_yes(&answer))?;

        let signed = flow
            .document()
            .is_some_and(|d| d.is_accepted() && d.acknowledgment.signature.is_some());
        if signed {
            println!("Signature on file. The original signature is kept.");
        } else {
            let prompt = if flow.form().signature.is_empty() {
                "Path to your signature image (PNG or JPEG): "
            } else {
                "Press enter to keep the current signature, or give a path to a new image: "
            };
            let Some(path) = ask(input, prompt).await? else {
                return Ok(());
            };
            if !path.is_empty() {
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        println!("Could not read {path}: {e}");
                        continue;
                    }
                };
                if let Err(e) = flow.draw_signature(&bytes) {
                    println!("{e}");
                    continue;
                }
            }
        }

        let themes = TestimonialTheme::ALL.map(|t| t.as_str()).join(", ");
        let current = flow.form().testimonial.clone();
        let Some(testimonial) = ask(
            input,
            &format!("Testimonial (optional, enter to keep, or 'suggest <{themes}>'): "),
        )
        .await?
        else {
            return Ok(());
        };
        if let Some(theme) = testimonial.strip_prefix("suggest") {
            match theme.trim().parse::<TestimonialTheme>() {
                Ok(theme) => match flow.suggest_testimonial(theme).await {
                    Ok(text) => println!("Suggested: \"{text}\""),
                    Err(e) => println!("{e}"),
                },
                Err(e) => println!("{e}"),
            }
        } else if !testimonial.is_empty() || current.is_empty() {
            flow.set_testimonial(testimonial)?;
        }

        match flow.submit().await {
            Ok(()) => println!("Thank you. Your acknowledgment was recorded."),
            Err(e) => {
                println!("{e}");
                let Some(again) = ask(input, "Try again? [y/N] ").await? else {
                    return Ok(());
                };
                if !is_yes(&again) {
                    return Ok(());
                }
            }
        }
    }

    if config.staff_token.is_some() && flow.document().is_some_and(|d| !d.is_paid()) {
        let Some(answer) = ask(input, "Mark this document as paid? [y/N] ").await? else {
            return Ok(());
        };
        if is_yes(&answer) {
            flow.set_payment_status(PaymentStatus::Paid)?;
            match flow.record_payment().await {
                Ok(()) => println!("Payment recorded."),
                Err(e) => println!("{e}"),
            }
        }
    }

    Ok(())
}
