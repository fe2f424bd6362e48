//! Gateway lifecycle.
//!
//! The runtime owns the configuration, the platform session and the callback
//! registry. [`GatewayRuntime::run`] pulls events from an [`EventSource`] and
//! dispatches each one until a stop condition is reached:
//!
//! ```text
//!             ┌──────────── Ctrl+C / SIGTERM ─────────┐
//!             │                                       ▼
//! source ──▶ dispatch loop ──── source exhausted ──▶ drain in-flight
//!             │                                       │
//!             └── ShutdownHandle::{shutdown,restart} ─┤
//!                                                     ▼
//!                                       unregister commands (best effort)
//!                                                     │
//!                                                     ▼
//!                                                ExitReason
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kestrel_runtime::{GatewayRuntime, JsonLinesSource};
//!
//! let mut runtime = GatewayRuntime::builder()
//!     .config_file("kestrel.toml")
//!     .session(session)
//!     .build()?;
//! runtime.register_module(&DebugModule::new(/* ... */))?;
//!
//! let reason = runtime.run(JsonLinesSource::stdin()).await?;
//! std::process::exit(reason.exit_code());
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kestrel_core::{CommandSchema, CommandScope, GatewayEvent, SessionHandle};
use kestrel_framework::CommandRegistry;

use crate::config::{ConfigLoader, GatewayConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::module::Module;
use crate::registry::EventRegistry;
use crate::source::EventSource;

// =============================================================================
// Exit and shutdown
// =============================================================================

/// Why [`GatewayRuntime::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Ctrl+C or SIGTERM.
    Signal,
    /// The event source was exhausted.
    SourceClosed,
    /// [`ShutdownHandle::shutdown`] was called.
    Shutdown,
    /// [`ShutdownHandle::restart`] was called.
    Restart,
}

impl ExitReason {
    /// Process exit code. A restart exits non-zero so a supervisor brings the
    /// process back up.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Restart => 1,
            Self::Signal | Self::SourceClosed | Self::Shutdown => 0,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Signal => "signal",
            Self::SourceClosed => "source closed",
            Self::Shutdown => "shutdown requested",
            Self::Restart => "restart requested",
        })
    }
}

/// Requests the runtime to stop. Cheap to clone; the first request wins.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<Option<ExitReason>>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Stops the runtime with exit code 0.
    pub fn shutdown(&self) {
        self.trigger(ExitReason::Shutdown);
    }

    /// Stops the runtime with exit code 1.
    pub fn restart(&self) {
        self.trigger(ExitReason::Restart);
    }

    /// The pending request, if any.
    pub fn requested(&self) -> Option<ExitReason> {
        *self.tx.borrow()
    }

    fn trigger(&self, reason: ExitReason) {
        let accepted = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if accepted {
            info!(reason = %reason, "shutdown requested");
        }
    }

    /// Resolves once a request has been made.
    pub async fn wait(&self) -> ExitReason {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ExitReason::Shutdown),
            Err(_) => ExitReason::Shutdown,
        }
    }
}

// =============================================================================
// GatewayRuntime
// =============================================================================

/// The gateway runtime.
pub struct GatewayRuntime {
    config: GatewayConfig,
    session: SessionHandle,
    registry: EventRegistry,
    commands: CommandRegistry,
    modules: Vec<String>,
    shutdown: ShutdownHandle,
    handle_signals: bool,
}

impl fmt::Debug for GatewayRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayRuntime")
            .field("modules", &self.modules)
            .field("registry", &self.registry)
            .field("commands", &self.commands.commands().len())
            .finish_non_exhaustive()
    }
}

impl GatewayRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// A handle that stops [`run`](Self::run) from anywhere, including from
    /// inside a handler.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// The raw callback registry, for subscriptions outside any module.
    pub fn registry_mut(&mut self) -> &mut EventRegistry {
        &mut self.registry
    }

    /// Commands collected from every registered module.
    pub fn commands(&self) -> &[CommandSchema] {
        self.commands.commands()
    }

    /// Names of the registered modules, in registration order.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Subscribes a module's pipelines and collects its commands.
    ///
    /// Fails without registering anything if one of its commands is invalid.
    pub fn register_module(&mut self, module: &dyn Module) -> RuntimeResult<()> {
        let name = module.name().to_string();
        let mut commands = self.commands.clone();
        commands
            .extend(module.commands())
            .map_err(|err| RuntimeError::invalid_command(&name, err))?;

        module.register(&mut self.registry);
        self.commands = commands;
        info!(module = %name, callbacks = self.registry.len(), "registered module");
        self.modules.push(name);
        Ok(())
    }

    /// Dispatches events from `source` until a stop condition, then drains
    /// in-flight handlers and deregisters commands.
    ///
    /// Commands are always removed before a restart; on any other stop only
    /// when `commands.unregister_on_shutdown` is set.
    pub async fn run<S: EventSource>(self, mut source: S) -> RuntimeResult<ExitReason> {
        let commands = Arc::new(self.commands);
        let scope = self.config.commands.scope();
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        info!(
            modules = ?self.modules,
            callbacks = self.registry.len(),
            commands = commands.commands().len(),
            "gateway running"
        );

        let signal = shutdown_signal(self.handle_signals);
        tokio::pin!(signal);

        let reason = loop {
            tokio::select! {
                biased;
                reason = self.shutdown.wait() => break reason,
                () = &mut signal => break ExitReason::Signal,
                next = source.next_event() => {
                    let Some(event) = next else {
                        break ExitReason::SourceClosed;
                    };
                    debug!(event = event.event_name(), "received event");

                    if let GatewayEvent::Ready(ready) = &event {
                        info!(user = %ready.user.username, guilds = ready.guilds.len(), "session ready");
                        in_flight.push(spawn_registration(
                            Arc::clone(&commands),
                            Arc::clone(&self.session),
                            scope.clone(),
                        ));
                    }
                    in_flight.retain(|handle| !handle.is_finished());
                    in_flight.extend(self.registry.dispatch(Arc::clone(&self.session), &event));
                }
            }
        };

        info!(reason = %reason, in_flight = in_flight.len(), "stopping gateway");
        let grace = self.config.dispatch.event_timeout();
        if tokio::time::timeout(grace, join_all(in_flight)).await.is_err() {
            warn!(grace_ms = grace.as_millis() as u64, "in-flight handlers did not finish in time");
        }

        if reason == ExitReason::Restart || self.config.commands.unregister_on_shutdown {
            CommandRegistry::unregister_all(&*self.session).await;
        }

        info!(reason = %reason, exit_code = reason.exit_code(), "gateway stopped");
        Ok(reason)
    }
}

fn spawn_registration(
    commands: Arc<CommandRegistry>,
    session: SessionHandle,
    scope: CommandScope,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if commands.is_empty() {
            return;
        }
        if let Err(err) = commands.register_for(&*session, &scope).await {
            error!(scope = %scope, error = %err, "failed to register commands");
        }
    })
}

/// Resolves on Ctrl+C or SIGTERM. Never resolves when `enabled` is false.
async fn shutdown_signal(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }

    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler, listening for Ctrl+C only");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`GatewayRuntime`].
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    config: Option<GatewayConfig>,
    session: Option<SessionHandle>,
    init_logging: bool,
    handle_signals: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Searches the current directory and the user config directory.
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new().with_current_dir().with_user_config_dir(),
            config: None,
            session: None,
            init_logging: true,
            handle_signals: true,
        }
    }

    /// Loads this file instead of searching.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.file(path.into());
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.search_path(path.into());
        self
    }

    /// Ignores `KESTREL_*` environment variables.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges `config` over everything else.
    pub fn merge(mut self, config: GatewayConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Uses an already loaded configuration, skipping the loader.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    /// Install the global subscriber from the logging config (default: `true`).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Stop on Ctrl+C and SIGTERM (default: `true`).
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Loads and validates the configuration, then initializes logging.
    pub fn build(self) -> RuntimeResult<GatewayRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.loader.load()?,
        };
        validate_config(&config)?;
        let session = self.session.ok_or(RuntimeError::MissingSession)?;

        if self.init_logging {
            logging::init_from_config(&config.effective_logging());
        }
        info!(
            log_level = %config.effective_logging().level,
            scope = %config.commands.scope(),
            "runtime initialized from configuration"
        );

        Ok(GatewayRuntime {
            registry: EventRegistry::with_dispatch(config.dispatch.clone()),
            config,
            session,
            commands: CommandRegistry::new(),
            modules: Vec::new(),
            shutdown: ShutdownHandle::new(),
            handle_signals: self.handle_signals,
        })
    }
}
