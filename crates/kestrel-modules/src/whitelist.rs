//! Whitelist module: only listed users may stay in a guild.
//!
//! When the whitelist is enabled for a guild, every non-bot member that joins
//! is checked against it. Unlisted users get a DM explaining why and are
//! kicked; listed users receive the guild's default role, if one is set.
//! Banned users can optionally be dropped from the list.
//!
//! Persistence goes through [`WhitelistStore`]; [`InMemoryWhitelistStore`]
//! is the bundled implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

use kestrel_core::{
    CommandOption, CommandSchema, Embed, GuildBanAdd, GuildId, GuildMemberAdd, Identifier,
    InteractionCreate, MessageSend, OptionKind, OptionsExt, RoleId, SessionError, SessionHandle,
    User, UserId, colors,
};
use kestrel_framework::{
    ContextKey, EventContext, EventFunc, EventRequest, EventResult, Pipeline, for_command,
    inject, performance,
};
use kestrel_runtime::config::ErrorReportConfig;
use kestrel_runtime::{EventRegistry, GatewayConfig, Module};

use crate::util::{ADMINISTRATOR, defer, edit, reporting, require_guild, state_word};

const NAMESPACE: &str = "whitelist";

const KICK_REASON: &str = "Not whitelisted";

/// Mentions shown by `/whitelist list` before the rest is summarised.
const LIST_PREVIEW: usize = 50;

/// Where the whitelist store is injected.
pub fn whitelist_store_key() -> ContextKey<dyn WhitelistStore> {
    ContextKey::new(Identifier::from_static(NAMESPACE, "services/store"))
}

// =============================================================================
// Store
// =============================================================================

/// Errors returned by a [`WhitelistStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WhitelistError {
    #[error("user {0} is already whitelisted")]
    AlreadyWhitelisted(UserId),

    #[error("user {0} is not whitelisted")]
    NotWhitelisted(UserId),

    #[error("whitelist lookup cancelled")]
    Cancelled,

    #[error("whitelist store error: {0}")]
    Store(String),
}

pub type WhitelistResult<T> = Result<T, WhitelistError>;

/// Per-guild whitelist settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistSettings {
    /// Kick unlisted users on join.
    pub enabled: bool,
    /// Role granted to listed users on join.
    pub default_role: Option<RoleId>,
    /// Drop banned users from the list.
    pub remove_on_ban: bool,
}

/// Guild-scoped whitelist persistence.
#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// Adds `user`; fails with [`WhitelistError::AlreadyWhitelisted`] if present.
    async fn whitelist(&self, ctx: &EventContext, guild: &GuildId, user: &UserId)
    -> WhitelistResult<()>;

    /// Removes `user`; fails with [`WhitelistError::NotWhitelisted`] if absent.
    async fn unwhitelist(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        user: &UserId,
    ) -> WhitelistResult<()>;

    async fn is_whitelisted(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        user: &UserId,
    ) -> WhitelistResult<bool>;

    async fn list(&self, ctx: &EventContext, guild: &GuildId) -> WhitelistResult<Vec<UserId>>;

    async fn clear(&self, ctx: &EventContext, guild: &GuildId) -> WhitelistResult<()>;

    async fn settings(&self, ctx: &EventContext, guild: &GuildId)
    -> WhitelistResult<WhitelistSettings>;

    async fn set_default_role(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        role: Option<RoleId>,
    ) -> WhitelistResult<()>;

    async fn set_enabled(&self, ctx: &EventContext, guild: &GuildId, enabled: bool)
    -> WhitelistResult<()>;

    async fn set_remove_on_ban(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        remove: bool,
    ) -> WhitelistResult<()>;
}

#[derive(Debug, Default)]
struct GuildWhitelist {
    users: BTreeSet<UserId>,
    settings: WhitelistSettings,
}

/// A [`WhitelistStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryWhitelistStore {
    guilds: RwLock<HashMap<GuildId, GuildWhitelist>>,
}

impl InMemoryWhitelistStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        f: impl FnOnce(&mut GuildWhitelist) -> WhitelistResult<T>,
    ) -> WhitelistResult<T> {
        check(ctx)?;
        f(self.guilds.write().entry(guild.clone()).or_default())
    }

    fn read<T>(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        f: impl FnOnce(Option<&GuildWhitelist>) -> T,
    ) -> WhitelistResult<T> {
        check(ctx)?;
        Ok(f(self.guilds.read().get(guild)))
    }
}

fn check(ctx: &EventContext) -> WhitelistResult<()> {
    if ctx.is_cancelled() {
        Err(WhitelistError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl WhitelistStore for InMemoryWhitelistStore {
    async fn whitelist(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        user: &UserId,
    ) -> WhitelistResult<()> {
        self.update(ctx, guild, |g| {
            if g.users.insert(user.clone()) {
                Ok(())
            } else {
                Err(WhitelistError::AlreadyWhitelisted(user.clone()))
            }
        })
    }

    async fn unwhitelist(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        user: &UserId,
    ) -> WhitelistResult<()> {
        self.update(ctx, guild, |g| {
            if g.users.remove(user) {
                Ok(())
            } else {
                Err(WhitelistError::NotWhitelisted(user.clone()))
            }
        })
    }

    async fn is_whitelisted(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        user: &UserId,
    ) -> WhitelistResult<bool> {
        self.read(ctx, guild, |g| g.is_some_and(|g| g.users.contains(user)))
    }

    async fn list(&self, ctx: &EventContext, guild: &GuildId) -> WhitelistResult<Vec<UserId>> {
        self.read(ctx, guild, |g| {
            g.map(|g| g.users.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn clear(&self, ctx: &EventContext, guild: &GuildId) -> WhitelistResult<()> {
        self.update(ctx, guild, |g| {
            g.users.clear();
            Ok(())
        })
    }

    async fn settings(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
    ) -> WhitelistResult<WhitelistSettings> {
        self.read(ctx, guild, |g| g.map(|g| g.settings.clone()).unwrap_or_default())
    }

    async fn set_default_role(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        role: Option<RoleId>,
    ) -> WhitelistResult<()> {
        self.update(ctx, guild, |g| {
            g.settings.default_role = role;
            Ok(())
        })
    }

    async fn set_enabled(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        enabled: bool,
    ) -> WhitelistResult<()> {
        self.update(ctx, guild, |g| {
            g.settings.enabled = enabled;
            Ok(())
        })
    }

    async fn set_remove_on_ban(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        remove: bool,
    ) -> WhitelistResult<()> {
        self.update(ctx, guild, |g| {
            g.settings.remove_on_ban = remove;
            Ok(())
        })
    }
}

// =============================================================================
// Module
// =============================================================================

/// The whitelist module.
pub struct WhitelistModule {
    errors: ErrorReportConfig,
    store: Arc<dyn WhitelistStore>,
}

impl WhitelistModule {
    pub fn new(config: &GatewayConfig, store: Arc<dyn WhitelistStore>) -> Self {
        Self {
            errors: config.errors.clone(),
            store,
        }
    }
}

impl Module for WhitelistModule {
    fn name(&self) -> &str {
        NAMESPACE
    }

    fn register(&self, registry: &mut EventRegistry) {
        let join = Identifier::from_static(NAMESPACE, "events/join");
        registry.handle(
            Pipeline::new(join.clone(), EventFunc::new(handle_join))
                .with(performance(join))
                .with(inject(whitelist_store_key(), self.store.clone()))
                .build(),
        );

        let ban = Identifier::from_static(NAMESPACE, "events/ban");
        registry.handle(
            Pipeline::new(ban.clone(), EventFunc::new(handle_ban))
                .with(performance(ban))
                .with(inject(whitelist_store_key(), self.store.clone()))
                .build(),
        );

        let command = Identifier::from_static(NAMESPACE, "commands/whitelist");
        registry.handle(
            Pipeline::new(command.clone(), EventFunc::new(handle_whitelist_command))
                .with(performance(command.clone()))
                .with(reporting(&self.errors, command))
                .with(for_command("whitelist"))
                .with(inject(whitelist_store_key(), self.store.clone()))
                .build(),
        );
    }

    fn commands(&self) -> Vec<CommandSchema> {
        let user_id = |what: &str| {
            CommandOption::new(
                OptionKind::String,
                "user-id",
                format!("The id of the user to {what} the whitelist."),
            )
            .required()
        };

        let config = CommandOption::group("config", "Configure the whitelist.")
            .option(CommandOption::subcommand("enable", "Enable the whitelist."))
            .option(CommandOption::subcommand("disable", "Disable the whitelist."))
            .option(CommandOption::subcommand(
                "status",
                "Check the status of the whitelist.",
            ))
            .option(
                CommandOption::subcommand("set-role", "Set the default role for the whitelist.")
                    .option(
                        CommandOption::new(
                            OptionKind::Role,
                            "role",
                            "The role to set as the default role.",
                        )
                        .required(),
                    ),
            )
            .option(CommandOption::subcommand(
                "clear-role",
                "Clear the default role for the whitelist.",
            ))
            .option(
                CommandOption::subcommand(
                    "set-remove-on-ban",
                    "Remove users from the whitelist when they are banned.",
                )
                .option(
                    CommandOption::new(
                        OptionKind::Boolean,
                        "enabled",
                        "Whether or not to remove users from the whitelist when they are banned.",
                    )
                    .required(),
                ),
            );

        vec![
            CommandSchema::new("whitelist", "Manage the whitelist for the bot.")
                .default_member_permissions(ADMINISTRATOR)
                .dm_permission(false)
                .option(
                    CommandOption::subcommand("add", "Add a user to the whitelist.")
                        .option(user_id("add to")),
                )
                .option(
                    CommandOption::subcommand("remove", "Remove a user from the whitelist.")
                        .option(user_id("remove from")),
                )
                .option(CommandOption::subcommand("list", "List all users on the whitelist."))
                .option(CommandOption::subcommand("clear", "Clear the whitelist."))
                .option(CommandOption::subcommand(
                    "add-all",
                    "Adds all the users in the guild to the whitelist.",
                ))
                .option(config),
        ]
    }
}

// =============================================================================
// Events
// =============================================================================

fn kick_embed(guild_name: &str, user: &UserId) -> Embed {
    Embed::new()
        .title("Sorry! :(")
        .description(format!(
            "You have been kicked from the server `{guild_name}` because you are not whitelisted.\n\
             If this is an error please contact a server administrator and give them your user ID."
        ))
        .color(colors::ERROR)
        .field("User ID", format!("Your user ID is: `{user}`"), false)
}

/// Tells `user` why they are about to be kicked. Failures are only logged.
async fn send_kick_notice(session: &SessionHandle, guild: &GuildId, user: &User) {
    let notice = async {
        let guild_name = match session.guild(guild).await {
            Ok(guild) => guild.name,
            Err(_) => guild.to_string(),
        };
        let dm = session.create_dm(&user.id).await?;
        session
            .send_message(&dm, MessageSend::embed(kick_embed(&guild_name, &user.id)))
            .await?;
        Ok::<_, SessionError>(())
    };
    if let Err(err) = notice.await {
        warn!(user = %user.id, guild = %guild, error = %err, "failed to send kick notice");
    }
}

async fn handle_join(req: EventRequest<GuildMemberAdd>) -> EventResult {
    let store = req.ctx.fetch(&whitelist_store_key())?;
    let GuildMemberAdd { guild_id, user } = &*req.event;
    if user.bot {
        return Ok(());
    }

    let settings = store.settings(&req.ctx, guild_id).await?;
    if !settings.enabled {
        return Ok(());
    }

    if !store.is_whitelisted(&req.ctx, guild_id, &user.id).await? {
        warn!(
            user = %user.username,
            id = %user.id,
            guild = %guild_id,
            "user joined but is not whitelisted, kicking"
        );
        send_kick_notice(&req.session, guild_id, user).await;
        req.session
            .kick_member(guild_id, &user.id, KICK_REASON)
            .await?;
        return Ok(());
    }

    if let Some(role) = &settings.default_role {
        req.session.add_role(guild_id, &user.id, role).await?;
    }
    Ok(())
}

async fn handle_ban(req: EventRequest<GuildBanAdd>) -> EventResult {
    let store = req.ctx.fetch(&whitelist_store_key())?;
    let GuildBanAdd { guild_id, user } = &*req.event;
    if user.bot {
        return Ok(());
    }

    if !store.settings(&req.ctx, guild_id).await?.remove_on_ban {
        return Ok(());
    }
    if store.is_whitelisted(&req.ctx, guild_id, &user.id).await? {
        warn!(user = %user.id, guild = %guild_id, "user was banned, removing from the whitelist");
        store.unwhitelist(&req.ctx, guild_id, &user.id).await?;
    }
    Ok(())
}

// =============================================================================
// Command
// =============================================================================

fn result(title: &str, description: impl Into<String>) -> Embed {
    Embed::new()
        .title(title)
        .description(description)
        .color(colors::RESULT)
}

async fn handle_whitelist_command(req: EventRequest<InteractionCreate>) -> EventResult {
    defer(&req, true).await?;

    let store = req.ctx.fetch(&whitelist_store_key())?;
    let guild = require_guild(&req)?;
    let ctx = &req.ctx;
    let (path, options) = req.event.data.route();

    let embed = match path.as_slice() {
        ["add"] => {
            let user = UserId::new(options.string("user-id")?);
            store.whitelist(ctx, &guild, &user).await?;
            info!(user = %user, guild = %guild, "user whitelisted");
            result(
                "User Whitelisted",
                format!("The user <@{user}> has been added to the whitelist."),
            )
        }
        ["remove"] => {
            let user = UserId::new(options.string("user-id")?);
            store.unwhitelist(ctx, &guild, &user).await?;
            info!(user = %user, guild = %guild, "user removed from whitelist");
            result(
                "User Removed from Whitelist",
                format!("The user <@{user}> has been removed from the whitelist."),
            )
        }
        ["list"] => {
            let users = store.list(ctx, &guild).await?;
            let mut embed = result(
                "Whitelist",
                format!("There are {} users on the whitelist.", users.len()),
            );
            if !users.is_empty() {
                let mut mentions: Vec<String> =
                    users.iter().take(LIST_PREVIEW).map(|u| format!("<@{u}>")).collect();
                if users.len() > LIST_PREVIEW {
                    mentions.push(format!("and {} more", users.len() - LIST_PREVIEW));
                }
                embed = embed.field("Users", mentions.join(" "), false);
            }
            embed
        }
        ["clear"] => {
            store.clear(ctx, &guild).await?;
            result("Whitelist Cleared", "The whitelist has been cleared.")
        }
        ["add-all"] => {
            let members = req.session.guild_members(&guild).await?;
            let mut added = 0;
            for member in members.iter().filter(|m| !m.user.bot) {
                match store.whitelist(ctx, &guild, &member.user.id).await {
                    Ok(()) => added += 1,
                    Err(WhitelistError::AlreadyWhitelisted(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            info!(guild = %guild, added, "guild members whitelisted");
            result(
                "All Users Whitelisted",
                format!("{added} users in the guild have been added to the whitelist."),
            )
        }
        ["config", "enable"] => {
            store.set_enabled(ctx, &guild, true).await?;
            result("Whitelist Enabled", "The whitelist has been enabled.")
        }
        ["config", "disable"] => {
            store.set_enabled(ctx, &guild, false).await?;
            result("Whitelist Disabled", "The whitelist has been disabled.")
        }
        ["config", "status"] => {
            let settings = store.settings(ctx, &guild).await?;
            let role = settings
                .default_role
                .as_ref()
                .map_or_else(|| "None".to_string(), |r| format!("<@&{r}>"));
            result(
                "Whitelist Status",
                format!("The whitelist is currently {}.", state_word(settings.enabled)),
            )
            .field("Default Role", role, true)
            .field("Remove on Ban", settings.remove_on_ban.to_string(), true)
        }
        ["config", "set-role"] => {
            let role = options.role("role")?.clone();
            store.set_default_role(ctx, &guild, Some(role.clone())).await?;
            result(
                "Default Role Set",
                format!("The default role has been set to <@&{role}>."),
            )
        }
        ["config", "clear-role"] => {
            store.set_default_role(ctx, &guild, None).await?;
            result("Default Role Cleared", "The default role has been cleared.")
        }
        ["config", "set-remove-on-ban"] => {
            let remove = options.boolean("enabled")?;
            store.set_remove_on_ban(ctx, &guild, remove).await?;
            let will = if remove { "now" } else { "no longer" };
            result(
                "Remove on Ban Set",
                format!("Users will {will} be removed from the whitelist when they are banned."),
            )
        }
        other => return Err(format!("unknown subcommand `{}`", other.join(" ")).into()),
    };

    edit(&req, embed).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{
        ChannelKind, Guild, InteractionId, Member, MemorySession, OptionValue, SessionCall,
        SessionOp,
    };
    use tokio_test::assert_ok;

    use crate::util::testing::{command, deliver, group, opt, sub, user};

    fn guild() -> GuildId {
        GuildId::new("g1")
    }

    fn member(id: &str, bot: bool) -> Member {
        Member {
            user: user(id, bot),
            roles: vec![],
        }
    }

    fn setup() -> (Arc<MemorySession>, Arc<InMemoryWhitelistStore>, EventRegistry) {
        let store = Arc::new(InMemoryWhitelistStore::new());
        let module = WhitelistModule::new(&GatewayConfig::default(), store.clone());
        let mut registry = EventRegistry::new();
        module.register(&mut registry);

        let session = MemorySession::default().with_guild(
            Guild {
                id: guild(),
                name: "Test Guild".into(),
            },
            vec![member("u1", false), member("u2", false), member("b1", true)],
        );
        (Arc::new(session), store, registry)
    }

    fn join(id: &str, bot: bool) -> GuildMemberAdd {
        GuildMemberAdd {
            guild_id: guild(),
            user: user(id, bot),
        }
    }

    #[tokio::test]
    async fn test_store_membership_errors() {
        let store = InMemoryWhitelistStore::new();
        let ctx = EventContext::new();
        let u = UserId::new("u1");

        assert_ok!(store.whitelist(&ctx, &guild(), &u).await);
        assert_eq!(
            store.whitelist(&ctx, &guild(), &u).await,
            Err(WhitelistError::AlreadyWhitelisted(u.clone()))
        );
        assert!(assert_ok!(store.is_whitelisted(&ctx, &guild(), &u).await));
        assert!(!assert_ok!(store.is_whitelisted(&ctx, &GuildId::new("g2"), &u).await));

        assert_ok!(store.unwhitelist(&ctx, &guild(), &u).await);
        assert_eq!(
            store.unwhitelist(&ctx, &guild(), &u).await,
            Err(WhitelistError::NotWhitelisted(u))
        );
    }

    #[tokio::test]
    async fn test_store_refuses_cancelled_context() {
        let store = InMemoryWhitelistStore::new();
        let ctx = EventContext::new();
        ctx.cancellation_token().cancel();
        assert_eq!(
            store.list(&ctx, &guild()).await,
            Err(WhitelistError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_join_ignored_while_disabled() {
        let (session, _, registry) = setup();
        deliver(&registry, &session, join("u1", false)).await;
        assert_eq!(session.count(SessionOp::KickMember), 0);
    }

    #[tokio::test]
    async fn test_join_kicks_unlisted_user_after_notice() {
        let (session, store, registry) = setup();
        store
            .set_enabled(&EventContext::new(), &guild(), true)
            .await
            .unwrap();

        deliver(&registry, &session, join("u2", false)).await;

        let sent = session.sent_messages();
        assert_eq!(sent.len(), 1);
        let embed = &sent[0].1.embeds[0];
        assert_eq!(embed.title.as_deref(), Some("Sorry! :("));
        assert!(embed.description.as_deref().unwrap().contains("`Test Guild`"));
        assert_eq!(embed.field_value("User ID"), Some("Your user ID is: `u2`"));

        let dm = session
            .channels()
            .into_iter()
            .find(|c| c.id == sent[0].0)
            .unwrap();
        assert_eq!(dm.kind, ChannelKind::Dm);

        assert!(session.calls().contains(&SessionCall::KickMember {
            guild: guild(),
            user: UserId::new("u2"),
            reason: KICK_REASON.into(),
        }));
        assert!(session.members(&guild()).iter().all(|m| m.user.id.as_str() != "u2"));
    }

    #[tokio::test]
    async fn test_join_kicks_even_if_notice_fails() {
        let (session, store, registry) = setup();
        store
            .set_enabled(&EventContext::new(), &guild(), true)
            .await
            .unwrap();
        session.fail_next(SessionOp::CreateDm);

        deliver(&registry, &session, join("u2", false)).await;

        assert!(session.sent_messages().is_empty());
        assert_eq!(session.count(SessionOp::KickMember), 1);
    }

    #[tokio::test]
    async fn test_join_grants_default_role_and_skips_bots() {
        let (session, store, registry) = setup();
        let ctx = EventContext::new();
        store.set_enabled(&ctx, &guild(), true).await.unwrap();
        store
            .set_default_role(&ctx, &guild(), Some(RoleId::new("r1")))
            .await
            .unwrap();
        store.whitelist(&ctx, &guild(), &UserId::new("u1")).await.unwrap();

        deliver(&registry, &session, join("u1", false)).await;
        deliver(&registry, &session, join("b1", true)).await;

        let members = session.members(&guild());
        let u1 = members.iter().find(|m| m.user.id.as_str() == "u1").unwrap();
        assert_eq!(u1.roles, vec![RoleId::new("r1")]);
        assert_eq!(session.count(SessionOp::KickMember), 0);
    }

    #[tokio::test]
    async fn test_ban_removes_only_with_remove_on_ban() {
        let (session, store, registry) = setup();
        let ctx = EventContext::new();
        let u1 = UserId::new("u1");
        store.whitelist(&ctx, &guild(), &u1).await.unwrap();
        let ban = GuildBanAdd {
            guild_id: guild(),
            user: user("u1", false),
        };

        deliver(&registry, &session, ban.clone()).await;
        assert!(store.is_whitelisted(&ctx, &guild(), &u1).await.unwrap());

        store.set_remove_on_ban(&ctx, &guild(), true).await.unwrap();
        deliver(&registry, &session, ban).await;
        assert!(!store.is_whitelisted(&ctx, &guild(), &u1).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_then_duplicate_add_reports_error() {
        let (session, store, registry) = setup();
        let add = || {
            command(
                "whitelist",
                vec![sub("add", vec![opt("user-id", OptionValue::String("u9".into()))])],
            )
        };

        deliver(&registry, &session, add()).await;
        let response = session.response(&InteractionId::new("i-whitelist")).unwrap();
        assert_eq!(response.embeds[0].title.as_deref(), Some("User Whitelisted"));
        assert_eq!(store.list(&EventContext::new(), &guild()).await.unwrap().len(), 1);

        let mut again = add();
        again.0.id = InteractionId::new("i-whitelist-2");
        deliver(&registry, &session, again).await;
        let response = session.response(&InteractionId::new("i-whitelist-2")).unwrap();
        let message = response.embeds[0].field_value("Error Message").unwrap();
        assert!(message.contains("already whitelisted"));
    }

    #[tokio::test]
    async fn test_add_all_skips_bots_and_listed_users() {
        let (session, store, registry) = setup();
        let ctx = EventContext::new();
        store.whitelist(&ctx, &guild(), &UserId::new("u1")).await.unwrap();

        deliver(&registry, &session, command("whitelist", vec![sub("add-all", vec![])])).await;

        let listed = store.list(&ctx, &guild()).await.unwrap();
        assert_eq!(listed, vec![UserId::new("u1"), UserId::new("u2")]);
        let response = session.response(&InteractionId::new("i-whitelist")).unwrap();
        assert_eq!(
            response.embeds[0].description.as_deref(),
            Some("1 users in the guild have been added to the whitelist.")
        );
    }

    #[tokio::test]
    async fn test_config_set_role_then_status() {
        let (session, store, registry) = setup();
        let set_role = command(
            "whitelist",
            vec![group(
                "config",
                vec![sub("set-role", vec![opt("role", OptionValue::Role(RoleId::new("r7")))])],
            )],
        );
        deliver(&registry, &session, set_role).await;
        let settings = store.settings(&EventContext::new(), &guild()).await.unwrap();
        assert_eq!(settings.default_role, Some(RoleId::new("r7")));

        let mut status = command("whitelist", vec![group("config", vec![sub("status", vec![])])]);
        status.0.id = InteractionId::new("i-status");
        deliver(&registry, &session, status).await;
        let response = session.response(&InteractionId::new("i-status")).unwrap();
        let embed = &response.embeds[0];
        assert_eq!(embed.description.as_deref(), Some("The whitelist is currently disabled."));
        assert_eq!(embed.field_value("Default Role"), Some("<@&r7>"));
    }
}
