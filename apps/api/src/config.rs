use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub webdriver_url: String,
    pub browser_headless: bool,
    /// Comma-separated `platform=url` pairs, one per job board.
    pub search_api_url: Option<String>,
    pub email: Option<EmailConfig>,
    pub auto_apply_cron: String,
    pub scheduler_enabled: bool,
    pub retry_backoff_ms: u64,
    /// JSON platform registry; the built-in one is used when unset.
    pub platforms_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let email = match optional_env("EMAIL_API_URL") {
            Some(api_url) => Some(EmailConfig {
                api_url,
                api_key: require_env("EMAIL_API_KEY")?,
                from: require_env("EMAIL_FROM")?,
            }),
            None => None,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            webdriver_url: std::env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9515".to_string()),
            browser_headless: parse_bool("BROWSER_HEADLESS", true)?,
            search_api_url: optional_env("SEARCH_API_URL"),
            email,
            auto_apply_cron: std::env::var("AUTO_APPLY_CRON")
                .unwrap_or_else(|_| "0 0 */4 * * *".to_string()),
            scheduler_enabled: parse_bool("AUTO_APPLY_SCHEDULER_ENABLED", true)?,
            retry_backoff_ms: std::env::var("AUTO_APPLY_RETRY_BACKOFF_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse::<u64>()
                .context("AUTO_APPLY_RETRY_BACKOFF_MS must be a number of milliseconds")?,
            platforms_file: optional_env("PLATFORMS_FILE").map(PathBuf::from),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match optional_env(key) {
        None => Ok(default),
        Some(v) => parse_flag(&v).with_context(|| format!("{key} must be true or false, got '{v}'")),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
