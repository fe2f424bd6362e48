use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded or was rejected.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file passed with `--config` does not exist.
    #[error("configuration file {0} does not exist")]
    FileNotFound(PathBuf),

    /// The file extension names no format enabled in this build.
    #[error("configuration file {0} has an unsupported or disabled format")]
    UnsupportedFormat(PathBuf),

    /// A source could not be read or did not fit [`GatewayConfig`](super::GatewayConfig).
    #[error("failed to extract configuration: {0}")]
    Extract(Box<figment::Error>),

    #[error("invalid configuration: {message}")]
    ValidationError { message: String },

    #[error("missing required configuration field `{field}`")]
    MissingField { field: String },

    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
