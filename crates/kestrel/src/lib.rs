//! # Kestrel
//!
//! A chat-platform bot gateway built on composable event pipelines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌────────────────────────────────────────┐
//! │ EventSource │────▶│ EventRegistry │────▶│ Pipeline "debug:commands/ping"  (task) │──▶ Session
//! │ (JSON lines)│     │  (per kind)   │────▶│ Pipeline "ledger:events/..."    (task) │──▶ Session
//! └─────────────┘     └───────────────┘────▶│ Pipeline ...                    (task) │──▶ Session
//!                                           └────────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, the event loop and shutdown
//! - **Registry**: raw callbacks per payload kind, one task per delivery
//! - **Pipelines**: a base handler wrapped in middlewares, outermost first
//! - **Modules**: units of domain glue that register pipelines and commands
//! - **Session**: the outbound platform capability handlers talk to
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kestrel::prelude::*;
//!
//! async fn ping(req: EventRequest<InteractionCreate>) -> EventResult {
//!     let embed = Embed::new().title("Pong").color(colors::INFO);
//!     req.session
//!         .respond(&req.event.id, InteractionResponse::message(ResponseData::embed(embed)))
//!         .await?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = GatewayRuntime::builder()
//!         .session(Arc::new(MemorySession::default()))
//!         .build()?;
//!
//!     let id = Identifier::from_static("demo", "commands/ping");
//!     runtime.registry_mut().handle(
//!         Pipeline::new(id.clone(), EventFunc::new(ping))
//!             .with(error_wrap(id))
//!             .with(for_command("ping"))
//!             .build(),
//!     );
//!
//!     let reason = runtime.run(JsonLinesSource::stdin()).await?;
//!     std::process::exit(reason.exit_code());
//! }
//! ```
//!
//! ## Features
//!
//! - `modules`: the bundled debug, extra, whitelist and ledger modules (default)
//! - `toml-config`: TOML configuration files (default)
//! - `json-config`: JSON configuration files
//! - `json-log`: JSON log output

pub use kestrel_core as core;
pub use kestrel_framework as framework;
#[cfg(feature = "modules")]
pub use kestrel_modules as modules;
pub use kestrel_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use kestrel::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use kestrel_runtime::{
        EventRegistry, ExitReason, GatewayConfig, GatewayRuntime, JsonLinesSource, Module,
        ShutdownHandle,
    };

    // Pipelines and middlewares
    pub use kestrel_framework::{
        ContextKey, EventContext, EventFunc, EventRequest, EventResult, Middleware, Pipeline,
        compose, error_wrap, feature_enabled, for_autocomplete, for_command, inject,
        module_enabled, performance,
    };

    // Feature flags
    pub use kestrel_framework::{Feature, FeatureStore, InMemoryFeatureStore};

    // Model and outbound capability
    pub use kestrel_core::{
        CommandOption, CommandSchema, Embed, Event, GatewayEvent, Identifier, InteractionCreate,
        InteractionResponse, MemorySession, MessageCreate, MessageSend, OptionKind, OptionsExt,
        ResponseData, ResponseEdit, Session, SessionHandle, colors,
    };
}
