// src/errors.rs
use thiserror::Error;

/// Items the viewer still has to provide before an acknowledgment can be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingItem {
    Terms,
    Signature,
}

impl std::fmt::Display for MissingItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingItem::Terms => write!(f, "terms"),
            MissingItem::Signature => write!(f, "signature"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{detail}")]
    Api { status: u16, detail: String },

    #[error("Invalid or expired PIN. Please try again.")]
    InvalidPin,

    #[error("Your PIN expired. Request a new PIN to try again.")]
    OtpExpired,

    #[error("Please agree to the terms and sign before submitting (missing: {})", join_missing(.0))]
    MissingAcknowledgment(Vec<MissingItem>),

    #[error("This document was already signed. You cannot change the original signature.")]
    SignatureLocked,

    #[error("Invalid document link")]
    InvalidToken,

    #[error("Invalid image format")]
    InvalidImageFormat,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Action not available: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_missing(items: &[MissingItem]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ValidationError(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AppError::InvalidState(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }

    pub fn api(status: u16, detail: impl Into<String>) -> Self {
        AppError::Api {
            status,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
