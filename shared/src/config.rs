use std::env;
use thiserror::Error;

use doeklus_atoms::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is not a valid number: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Deployment settings, read once at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub bucket_name: String,
    pub public_base_url: String,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub retry: RetryPolicy,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bucket_name = env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "doeklus-media".to_string());
        let public_base_url = env::var("S3_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("https://{}.s3.amazonaws.com", bucket_name));

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: number("RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_backoff_ms: number("RETRY_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms)?,
            max_backoff_ms: number("RETRY_MAX_BACKOFF_MS", defaults.max_backoff_ms)?,
            ..defaults
        };

        Ok(Self {
            table_name: env::var("TABLE_NAME").unwrap_or_else(|_| "doeklus".to_string()),
            bucket_name,
            public_base_url,
            cognito_client_id: required("COGNITO_CLIENT_ID")?,
            cognito_client_secret: required("COGNITO_CLIENT_SECRET")?,
            retry,
        })
    }
}
