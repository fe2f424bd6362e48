//! Command registration.
//!
//! [`CommandRegistry`] holds validated command schemas and pushes them to the
//! platform per scope. Registration is idempotent: commands whose remote
//! schema already matches are left alone, the rest are upserted by name.
//! Remote commands the registry does not know about are never touched, so
//! several modules can register into the same scope independently.
//!
//! [`CommandRegistry::unregister_all`] is the shutdown sweep: it removes every
//! global and per-guild command with a small pool of concurrent workers.

use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use kestrel_core::{
    CommandId, CommandSchema, CommandScope, SchemaError, Session, SessionResult,
};

/// Concurrent delete requests issued by [`CommandRegistry::unregister_all`].
pub const UNREGISTER_WORKERS: usize = 5;

/// Outcome of [`CommandRegistry::register_for`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Commands that did not exist remotely.
    pub created: Vec<String>,
    /// Commands whose remote schema differed.
    pub updated: Vec<String>,
    /// Commands already up to date.
    pub unchanged: Vec<String>,
}

impl RegistrationReport {
    /// Returns `true` if nothing was sent to the platform.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }
}

/// Outcome of [`CommandRegistry::unregister_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnregisterReport {
    pub deleted: usize,
    pub failed: usize,
}

/// A set of validated command schemas.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<CommandSchema>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and adds `schema`, replacing a schema with the same name.
    pub fn add(&mut self, schema: CommandSchema) -> Result<&mut Self, SchemaError> {
        schema.validate()?;
        match self.commands.iter_mut().find(|c| c.name == schema.name) {
            Some(existing) => *existing = schema,
            None => self.commands.push(schema),
        }
        Ok(self)
    }

    /// Adds every schema, stopping at the first invalid one.
    pub fn extend<I>(&mut self, schemas: I) -> Result<&mut Self, SchemaError>
    where
        I: IntoIterator<Item = CommandSchema>,
    {
        for schema in schemas {
            self.add(schema)?;
        }
        Ok(self)
    }

    /// Returns the registered schemas in insertion order.
    pub fn commands(&self) -> &[CommandSchema] {
        &self.commands
    }

    /// Looks up a schema by command name.
    pub fn get(&self, name: &str) -> Option<&CommandSchema> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Pushes every schema to `scope`, skipping the ones already up to date.
    pub async fn register_for(
        &self,
        session: &dyn Session,
        scope: &CommandScope,
    ) -> SessionResult<RegistrationReport> {
        let existing = session.list_commands(scope).await?;
        let mut report = RegistrationReport::default();

        for schema in &self.commands {
            let remote = existing.iter().find(|c| c.schema.name == schema.name);
            match remote {
                Some(remote) if remote.schema == *schema => {
                    report.unchanged.push(schema.name.clone());
                    continue;
                }
                Some(_) => report.updated.push(schema.name.clone()),
                None => report.created.push(schema.name.clone()),
            }
            session.create_command(scope, schema).await?;
            debug!(scope = %scope, command = %schema.name, "command registered");
        }

        info!(
            scope = %scope,
            created = report.created.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            "commands registered"
        );
        Ok(report)
    }

    /// Removes every global and per-guild command.
    ///
    /// Listing or deleting failures are logged and the sweep continues.
    pub async fn unregister_all(session: &dyn Session) -> UnregisterReport {
        let mut scopes = vec![CommandScope::Global];
        match session.guilds().await {
            Ok(guilds) => scopes.extend(guilds.into_iter().map(|g| CommandScope::Guild(g.id))),
            Err(err) => warn!(error = %err, "failed to list guilds, only removing global commands"),
        }

        let mut targets: Vec<(CommandScope, CommandId, String)> = Vec::new();
        for scope in scopes {
            match session.list_commands(&scope).await {
                Ok(commands) => targets.extend(
                    commands
                        .into_iter()
                        .map(|c| (scope.clone(), c.id, c.schema.name)),
                ),
                Err(err) => warn!(scope = %scope, error = %err, "failed to list commands"),
            }
        }

        let results: Vec<bool> = stream::iter(targets)
            .map(|(scope, id, name)| async move {
                match session.delete_command(&scope, &id).await {
                    Ok(()) => {
                        debug!(scope = %scope, command = %name, "command removed");
                        true
                    }
                    Err(err) => {
                        warn!(scope = %scope, command = %name, error = %err, "failed to remove command");
                        false
                    }
                }
            })
            .buffer_unordered(UNREGISTER_WORKERS)
            .collect()
            .await;

        let deleted = results.iter().filter(|ok| **ok).count();
        let report = UnregisterReport {
            deleted,
            failed: results.len() - deleted,
        };
        info!(deleted = report.deleted, failed = report.failed, "commands unregistered");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kestrel_core::{
        CommandOption, Guild, GuildId, MemorySession, OptionKind, SessionError, SessionOp,
    };

    fn ping() -> CommandSchema {
        CommandSchema::new("ping", "Check that the bot is alive")
    }

    fn say() -> CommandSchema {
        CommandSchema::new("say", "Repeat a message").option(
            CommandOption::new(OptionKind::String, "message", "What to say").required(),
        )
    }

    fn session() -> MemorySession {
        MemorySession::default()
            .with_guild(
                Guild {
                    id: GuildId::new("g1"),
                    name: "one".into(),
                },
                vec![],
            )
            .with_guild(
                Guild {
                    id: GuildId::new("g2"),
                    name: "two".into(),
                },
                vec![],
            )
    }

    #[test]
    fn test_add_rejects_invalid_schema() {
        let mut registry = CommandRegistry::new();
        assert!(registry.add(CommandSchema::new("Ping", "bad name")).is_err());
        assert!(registry.is_empty());

        registry.add(ping()).unwrap();
        registry
            .add(CommandSchema::new("ping", "Replaced"))
            .unwrap();
        assert_eq!(registry.commands().len(), 1);
        assert_eq!(registry.get("ping").unwrap().description, "Replaced");
    }

    #[tokio::test]
    async fn test_register_twice_is_noop() {
        let session = session();
        let mut registry = CommandRegistry::new();
        registry.extend([ping(), say()]).unwrap();

        let first = registry
            .register_for(&session, &CommandScope::Global)
            .await
            .unwrap();
        assert_eq!(first.created, vec!["ping", "say"]);

        let second = registry
            .register_for(&session, &CommandScope::Global)
            .await
            .unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged.len(), 2);
        assert_eq!(session.count(SessionOp::CreateCommand), 2);
    }

    #[tokio::test]
    async fn test_changed_schema_is_updated_in_place() {
        let session = session();
        let scope = CommandScope::Guild(GuildId::new("g1"));
        let mut registry = CommandRegistry::new();
        registry.add(ping()).unwrap();
        registry.register_for(&session, &scope).await.unwrap();
        let id = session.commands(&scope)[0].id.clone();

        registry
            .add(CommandSchema::new("ping", "Ping, but nicer"))
            .unwrap();
        let report = registry.register_for(&session, &scope).await.unwrap();
        assert_eq!(report.updated, vec!["ping"]);
        assert_eq!(session.commands(&scope)[0].id, id);
    }

    #[tokio::test]
    async fn test_unregister_all_continues_after_failure() {
        let session = session();
        let mut registry = CommandRegistry::new();
        registry.extend([ping(), say()]).unwrap();
        for scope in [
            CommandScope::Global,
            CommandScope::Guild(GuildId::new("g1")),
            CommandScope::Guild(GuildId::new("g2")),
        ] {
            registry.register_for(&session, &scope).await.unwrap();
        }

        session.fail_next_with(
            SessionOp::DeleteCommand,
            SessionError::Forbidden("missing access".into()),
        );
        let report = CommandRegistry::unregister_all(&session).await;
        assert_eq!(report, UnregisterReport { deleted: 5, failed: 1 });
        assert_eq!(session.count(SessionOp::DeleteCommand), 6);
    }
}
