// config.rs
use std::env;
use std::time::Duration;

use validator::Validate;

use crate::errors::{AppError, Result};

pub const PRODUCTION_API_URL: &str = "https://api.invoice.zuperhandy.com";
const DEFAULT_API_HOST: &str = "192.168.1.187";
const DEFAULT_API_PORT: &str = "8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    #[validate(url(message = "API base URL must be a valid URL"))]
    pub api_base_url: String,
    pub staff_token: Option<String>,
    pub request_timeout: Duration,
    pub log_level: tracing::Level,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_base_url = match non_empty_var("PORTAL_API_BASE_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let hostname = non_empty_var("PORTAL_HOSTNAME");
                let api_host = non_empty_var("PORTAL_API_HOST")
                    .unwrap_or_else(|| DEFAULT_API_HOST.to_string());
                let api_port = non_empty_var("PORTAL_API_PORT")
                    .unwrap_or_else(|| DEFAULT_API_PORT.to_string());
                resolve_base_url(hostname.as_deref(), &api_host, &api_port)
            }
        };

        let request_timeout = match non_empty_var("PORTAL_HTTP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                AppError::configuration(format!("PORTAL_HTTP_TIMEOUT_SECS must be a number, got {raw}"))
            })?),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let log_level = match non_empty_var("PORTAL_LOG_LEVEL") {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::configuration(format!("Unknown log level: {raw}")))?,
            None => tracing::Level::INFO,
        };

        let config = AppConfig {
            api_base_url,
            staff_token: non_empty_var("PORTAL_STAFF_TOKEN"),
            request_timeout,
            log_level,
        };
        config
            .validate()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        Ok(config)
    }

    /// Config pointing at a fixed base URL, as used against local or test servers.
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        AppConfig {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            staff_token: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_level: tracing::Level::INFO,
        }
    }

    pub fn with_staff_token(mut self, token: impl Into<String>) -> Self {
        self.staff_token = Some(token.into());
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Local hosts talk to the API on the LAN, everything else goes to production.
pub fn is_local_hostname(hostname: &str) -> bool {
    hostname == "localhost"
        || hostname == "127.0.0.1"
        || hostname.starts_with("192.168.")
        || hostname.ends_with(".local")
}

pub fn resolve_base_url(hostname: Option<&str>, api_host: &str, api_port: &str) -> String {
    match hostname {
        Some(host) if is_local_hostname(host) => {
            if api_port == "443" {
                format!("https://{}", api_host)
            } else {
                format!("https://{}:{}", api_host, api_port)
            }
        }
        _ => PRODUCTION_API_URL.to_string(),
    }
}
