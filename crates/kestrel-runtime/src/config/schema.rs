//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kestrel_core::{CommandScope, GuildId, Identifier, UserId};
use kestrel_framework::layer::ErrorWrapLayer;

/// Root configuration structure.
///
/// The flat `token`/`debug`/`database_url` keys keep older `config.json`
/// files loadable unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Platform bot token.
    #[serde(default)]
    pub token: String,

    /// Forces debug-level logging.
    #[serde(default)]
    pub debug: bool,

    /// Connection string of the persistent store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Users allowed to run operator commands.
    #[serde(default)]
    pub owners: Vec<UserId>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub errors: ErrorReportConfig,
}

impl GatewayConfig {
    /// Returns `true` if `user` is a configured owner.
    pub fn is_owner(&self, user: &UserId) -> bool {
        self.owners.contains(user)
    }

    /// Logging settings with the `debug` flag applied.
    pub fn effective_logging(&self) -> LoggingConfig {
        let mut logging = self.logging.clone();
        if self.debug {
            logging.level = LogLevel::Debug;
        }
        logging
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Per-dispatch deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Deadline for interaction pipelines, in milliseconds.
    #[serde(default = "default_interaction_timeout_ms")]
    pub interaction_timeout_ms: u64,

    /// Deadline for every other event, in milliseconds.
    #[serde(default = "default_event_timeout_ms")]
    pub event_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interaction_timeout_ms: default_interaction_timeout_ms(),
            event_timeout_ms: default_event_timeout_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_millis(self.interaction_timeout_ms)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }
}

fn default_interaction_timeout_ms() -> u64 {
    3000
}

fn default_event_timeout_ms() -> u64 {
    30000
}

// =============================================================================
// Commands
// =============================================================================

/// Slash-command registration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Register into this guild instead of globally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild: Option<GuildId>,

    /// Remove every registered command on shutdown.
    #[serde(default = "default_true")]
    pub unregister_on_shutdown: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            guild: None,
            unregister_on_shutdown: true,
        }
    }
}

impl CommandsConfig {
    /// Scope commands are registered into.
    pub fn scope(&self) -> CommandScope {
        match &self.guild {
            Some(guild) => CommandScope::Guild(guild.clone()),
            None => CommandScope::Global,
        }
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Error reports
// =============================================================================

/// Settings of the user-visible error reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorReportConfig {
    /// Attach fatal-fault backtraces as a file.
    #[serde(default)]
    pub attach_stack_trace: bool,

    /// Who users should contact about recurring errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl ErrorReportConfig {
    /// Builds an error-wrap layer for the pipeline tagged `tag`.
    pub fn layer(&self, tag: Identifier) -> ErrorWrapLayer {
        let layer = ErrorWrapLayer::new(tag).attach_stack_trace(self.attach_stack_trace);
        match &self.contact {
            Some(contact) => layer.contact(contact.clone()),
            None => layer,
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` otherwise.
    Json,
}

/// Output destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,

    /// Target file when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `kestrel_framework = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            filters: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_json_layout_deserializes() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"token": "abc", "debug": true, "database_url": "postgres://localhost/bot"}"#,
        )
        .unwrap();
        assert_eq!(config.token, "abc");
        assert!(config.debug);
        assert_eq!(config.dispatch.interaction_timeout_ms, 3000);
        assert!(config.commands.unregister_on_shutdown);
    }

    #[test]
    fn test_debug_flag_forces_debug_level() {
        let config = GatewayConfig {
            debug: true,
            ..Default::default()
        };
        assert_eq!(config.effective_logging().level, LogLevel::Debug);
        assert_eq!(GatewayConfig::default().effective_logging().level, LogLevel::Info);
    }

    #[test]
    fn test_command_scope() {
        let mut commands = CommandsConfig::default();
        assert_eq!(commands.scope(), CommandScope::Global);
        commands.guild = Some(GuildId::new("123"));
        assert_eq!(commands.scope(), CommandScope::Guild(GuildId::new("123")));
    }
}
