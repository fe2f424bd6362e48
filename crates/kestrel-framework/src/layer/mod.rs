//! Built-in middlewares.
//!
//! Each middleware is a tower [`Layer`](tower::Layer)/[`Service`](tower::Service)
//! pair. The functions in this module wrap them as [`Middleware`] values for
//! use with [`compose`](crate::compose) and [`Pipeline`](crate::Pipeline);
//! the layer types themselves can be stacked on a `ServiceBuilder` directly.
//!
//! | Constructor | Event | Effect |
//! |-------------|-------|--------|
//! | [`performance`] | any | logs elapsed time |
//! | [`error_wrap`] | `InteractionCreate` | converts failures and panics into error reports |
//! | [`for_command`] / [`for_autocomplete`] | `InteractionCreate` | command-match guard |
//! | [`feature_enabled`] | guild-scoped | feature-flag gate |
//! | [`module_enabled`] | guild-scoped | module toggle gate |
//! | [`inject`] | any | context injection |
//!
//! A typical command pipeline:
//!
//! ```rust,ignore
//! let ping = Pipeline::new(id.clone(), ping_handler)
//!     .with(performance(id.clone()))
//!     .with(error_wrap(id.clone()))
//!     .with(for_command("ping"))
//!     .build();
//! ```

mod command;
mod error_wrap;
mod feature;
mod inject;
mod performance;

use std::sync::Arc;

use kestrel_core::{Event, Identifier, InteractionCreate, InteractionKind};

use crate::context::ContextKey;
use crate::feature::{FeatureStore, ModuleStore};
use crate::middleware::Middleware;

pub use command::{CommandLayer, CommandService};
pub use error_wrap::{DEFERRED_WINDOW, ErrorWrapLayer, ErrorWrapService};
pub use feature::{FeatureLayer, FeatureService, ModuleLayer, ModuleService};
pub use inject::{InjectLayer, InjectService};
pub use performance::{PerformanceLayer, PerformanceService};

/// Logs the execution time of everything inside it.
pub fn performance<E: Event>(tag: Identifier) -> Middleware<E> {
    Middleware::from_layer(PerformanceLayer::new(tag))
}

/// Reports failures of interaction pipelines back to the user.
///
/// Use [`ErrorWrapLayer`] with [`Middleware::from_layer`] to set the contact
/// line or enable stack-trace attachments.
pub fn error_wrap(tag: Identifier) -> Middleware<InteractionCreate> {
    Middleware::from_layer(ErrorWrapLayer::new(tag))
}

/// Forwards only regular invocations of the command `name`.
pub fn for_command(name: impl Into<String>) -> Middleware<InteractionCreate> {
    Middleware::from_layer(CommandLayer::new(name, InteractionKind::Command))
}

/// Forwards only autocomplete requests for the command `name`.
pub fn for_autocomplete(name: impl Into<String>) -> Middleware<InteractionCreate> {
    Middleware::from_layer(CommandLayer::new(name, InteractionKind::Autocomplete))
}

/// Forwards only when `feature` is enabled in the event's guild.
pub fn feature_enabled<E: Event>(feature: Identifier, store: Arc<dyn FeatureStore>) -> Middleware<E> {
    Middleware::from_layer(FeatureLayer::new(feature, store))
}

/// Forwards only when `module` is enabled in the event's guild.
pub fn module_enabled<E: Event>(module: impl Into<String>, store: Arc<dyn ModuleStore>) -> Middleware<E> {
    Middleware::from_layer(ModuleLayer::new(module, store))
}

/// Makes `value` available under `key` to everything inside this middleware.
pub fn inject<E, T>(key: ContextKey<T>, value: Arc<T>) -> Middleware<E>
where
    E: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    Middleware::from_layer(InjectLayer::new(key, value))
}
