//! Kestrel Runtime - lifecycle layer for the Kestrel gateway.
//!
//! This crate provides:
//! - Layered configuration loading ([`ConfigLoader`], [`GatewayConfig`])
//! - Logging setup ([`LoggingBuilder`])
//! - The raw callback registry ([`EventRegistry`])
//! - Event sources ([`JsonLinesSource`], [`ChannelSource`])
//! - The [`Module`] trait and the [`GatewayRuntime`] that drives them
//!
//! ```rust,ignore
//! use kestrel_runtime::{GatewayRuntime, JsonLinesSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = GatewayRuntime::builder()
//!         .session(session)
//!         .build()?;
//!     runtime.register_module(&my_module)?;
//!
//!     // Runs until stdin closes, Ctrl+C, or a restart request
//!     let reason = runtime.run(JsonLinesSource::stdin()).await?;
//!     std::process::exit(reason.exit_code());
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod module;
pub mod registry;
pub mod runtime;
pub mod source;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, GatewayConfig, Profile, load_config,
    load_config_from_file, validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use module::Module;
pub use registry::EventRegistry;
pub use runtime::{ExitReason, GatewayRuntime, RuntimeBuilder, ShutdownHandle};
pub use source::{ChannelSource, EventSource, JsonLinesSource};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
