//! Feature modules.
//!
//! A module is a unit of domain glue: it builds its pipelines, subscribes
//! them to the [`EventRegistry`] and declares the slash commands they serve.
//! The runtime collects the commands of every module and registers them on
//! `Ready`.

use kestrel_core::CommandSchema;

use crate::registry::EventRegistry;

/// A set of handlers and the commands they serve.
///
/// ```rust,ignore
/// struct Greeter;
///
/// impl Module for Greeter {
///     fn name(&self) -> &str {
///         "greeter"
///     }
///
///     fn register(&self, registry: &mut EventRegistry) {
///         registry.handle(compose(greet, [for_command("greet")]));
///     }
///
///     fn commands(&self) -> Vec<CommandSchema> {
///         vec![CommandSchema::new("greet", "Say hello")]
///     }
/// }
/// ```
pub trait Module: Send + Sync {
    /// Module name, also the key of [`module_enabled`] gates.
    ///
    /// [`module_enabled`]: kestrel_framework::module_enabled
    fn name(&self) -> &str;

    /// Subscribes the module's pipelines.
    fn register(&self, registry: &mut EventRegistry);

    /// Slash commands served by this module.
    fn commands(&self) -> Vec<CommandSchema> {
        Vec::new()
    }
}
