//! Configuration module for the Kestrel runtime.
//!
//! Layered figment-based loading of [`GatewayConfig`] and its validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CommandsConfig, DispatchConfig, ErrorReportConfig, GatewayConfig, LogFormat, LogLevel,
    LogOutput, LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
