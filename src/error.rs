use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn invalid(field: &str, value: impl ToString) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Failures of the X API reads.
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Rate limit exceeded (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient network error: {reason}")]
    Transient { reason: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },
}

impl FeedError {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Auth { .. } => "auth",
            FeedError::NotFound { .. } => "not_found",
            FeedError::RateLimited { .. } => "rate_limited",
            FeedError::Transient { .. } => "transient",
            FeedError::InvalidResponse { .. } => "invalid_response",
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    #[error("Channel {channel_id} not found")]
    NotFound { channel_id: u64 },

    #[error("Channel {channel_id} is not text-based")]
    NotTextCapable { channel_id: u64 },

    #[error("Failed to send message: {reason}")]
    Send { reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("State I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
