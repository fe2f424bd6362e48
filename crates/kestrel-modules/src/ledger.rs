//! Ledger module: audit log of edited and deleted messages.
//!
//! Message contents are cached as they are created so that edits and
//! deletions can be reported with what the message used to say. Reports go
//! to a per-guild log channel configured with `/ledger enable <channel>`.
//!
//! Nothing is reported for bot authors, direct messages, guilds with the
//! ledger disabled, or guilds without a log channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

use kestrel_core::{
    ChannelId, CommandOption, CommandSchema, Embed, Event, GuildId, Identifier, InteractionCreate,
    Message, MessageCreate, MessageDelete, MessageId, MessageSend, MessageUpdate, OptionKind,
    OptionsExt, User, colors,
};
use kestrel_framework::{
    ContextKey, EventContext, EventFunc, EventRequest, EventResult, Pipeline, for_command,
    inject, performance,
};
use kestrel_runtime::config::ErrorReportConfig;
use kestrel_runtime::{EventRegistry, GatewayConfig, Module};

use crate::util::{ADMINISTRATOR, defer, edit, guild_only, reporting, require_guild};

const NAMESPACE: &str = "ledger";

/// Messages kept by [`InMemoryLedgerStore::new`].
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Where the ledger store is injected.
pub fn ledger_store_key() -> ContextKey<dyn LedgerStore> {
    ContextKey::new(Identifier::from_static(NAMESPACE, "services/store"))
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger lookup cancelled")]
    Cancelled,

    #[error("ledger store error: {0}")]
    Store(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Per-guild ledger settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSettings {
    pub enabled: bool,
    pub log_channel: Option<ChannelId>,
}

/// What the cache remembers about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub author: User,
    pub content: String,
}

/// Ledger settings and message cache.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn settings(&self, ctx: &EventContext, guild: &GuildId) -> LedgerResult<LedgerSettings>;

    async fn set_enabled(&self, ctx: &EventContext, guild: &GuildId, enabled: bool)
    -> LedgerResult<()>;

    async fn set_log_channel(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        channel: Option<ChannelId>,
    ) -> LedgerResult<()>;

    /// Remembers (or refreshes) the content of `message`.
    async fn cache_message(&self, ctx: &EventContext, message: &Message) -> LedgerResult<()>;

    async fn cached_message(
        &self,
        ctx: &EventContext,
        id: &MessageId,
    ) -> LedgerResult<Option<CachedMessage>>;

    /// Drops a message from the cache, returning what was known about it.
    async fn forget_message(
        &self,
        ctx: &EventContext,
        id: &MessageId,
    ) -> LedgerResult<Option<CachedMessage>>;
}

#[derive(Debug, Default)]
struct MessageCache {
    entries: HashMap<MessageId, CachedMessage>,
    /// Insertion order, oldest first.
    order: VecDeque<MessageId>,
}

/// A [`LedgerStore`] kept in process memory.
///
/// The message cache is bounded; once full, the oldest message is evicted.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    settings: RwLock<HashMap<GuildId, LedgerSettings>>,
    cache: Mutex<MessageCache>,
    capacity: usize,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            settings: RwLock::new(HashMap::new()),
            cache: Mutex::new(MessageCache::default()),
            capacity: capacity.max(1),
        }
    }

    /// Number of cached messages.
    pub fn cached(&self) -> usize {
        self.cache.lock().entries.len()
    }
}

fn check(ctx: &EventContext) -> LedgerResult<()> {
    if ctx.is_cancelled() {
        Err(LedgerError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn settings(&self, ctx: &EventContext, guild: &GuildId) -> LedgerResult<LedgerSettings> {
        check(ctx)?;
        Ok(self.settings.read().get(guild).cloned().unwrap_or_default())
    }

    async fn set_enabled(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        enabled: bool,
    ) -> LedgerResult<()> {
        check(ctx)?;
        self.settings.write().entry(guild.clone()).or_default().enabled = enabled;
        Ok(())
    }

    async fn set_log_channel(
        &self,
        ctx: &EventContext,
        guild: &GuildId,
        channel: Option<ChannelId>,
    ) -> LedgerResult<()> {
        check(ctx)?;
        self.settings.write().entry(guild.clone()).or_default().log_channel = channel;
        Ok(())
    }

    async fn cache_message(&self, ctx: &EventContext, message: &Message) -> LedgerResult<()> {
        check(ctx)?;
        let mut cache = self.cache.lock();
        let entry = CachedMessage {
            author: message.author.clone(),
            content: message.content.clone(),
        };
        if cache.entries.insert(message.id.clone(), entry).is_none() {
            cache.order.push_back(message.id.clone());
        }
        while cache.entries.len() > self.capacity {
            let Some(oldest) = cache.order.pop_front() else {
                break;
            };
            cache.entries.remove(&oldest);
        }
        Ok(())
    }

    async fn cached_message(
        &self,
        ctx: &EventContext,
        id: &MessageId,
    ) -> LedgerResult<Option<CachedMessage>> {
        check(ctx)?;
        Ok(self.cache.lock().entries.get(id).cloned())
    }

    async fn forget_message(
        &self,
        ctx: &EventContext,
        id: &MessageId,
    ) -> LedgerResult<Option<CachedMessage>> {
        check(ctx)?;
        let mut cache = self.cache.lock();
        let removed = cache.entries.remove(id);
        if removed.is_some() {
            cache.order.retain(|m| m != id);
        }
        Ok(removed)
    }
}

// =============================================================================
// Module
// =============================================================================

/// The ledger module.
pub struct LedgerModule {
    errors: ErrorReportConfig,
    store: Arc<dyn LedgerStore>,
}

impl LedgerModule {
    pub fn new(config: &GatewayConfig, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            errors: config.errors.clone(),
            store,
        }
    }

    fn message_pipeline<E: Event>(
        &self,
        id: &'static str,
        handler: EventFunc<E>,
    ) -> EventFunc<E> {
        let id = Identifier::from_static(NAMESPACE, id);
        Pipeline::new(id.clone(), handler)
            .with(performance(id))
            .with(guild_only())
            .with(inject(ledger_store_key(), self.store.clone()))
            .build()
    }
}

impl Module for LedgerModule {
    fn name(&self) -> &str {
        NAMESPACE
    }

    fn register(&self, registry: &mut EventRegistry) {
        registry
            .handle(self.message_pipeline("events/message-create", EventFunc::new(handle_create)))
            .handle(self.message_pipeline("events/message-update", EventFunc::new(handle_update)))
            .handle(self.message_pipeline("events/message-delete", EventFunc::new(handle_delete)));

        let command = Identifier::from_static(NAMESPACE, "commands/ledger");
        registry.handle(
            Pipeline::new(command.clone(), EventFunc::new(handle_ledger_command))
                .with(performance(command.clone()))
                .with(reporting(&self.errors, command))
                .with(for_command("ledger"))
                .with(inject(ledger_store_key(), self.store.clone()))
                .build(),
        );
    }

    fn commands(&self) -> Vec<CommandSchema> {
        vec![
            CommandSchema::new("ledger", "Manage the ledger module")
                .default_member_permissions(ADMINISTRATOR)
                .dm_permission(false)
                .option(
                    CommandOption::subcommand("enable", "Enable the ledger module").option(
                        CommandOption::new(
                            OptionKind::Channel,
                            "channel",
                            "The channel to log messages to",
                        )
                        .required(),
                    ),
                )
                .option(CommandOption::subcommand("disable", "Disable the ledger module")),
        ]
    }
}

// =============================================================================
// Events
// =============================================================================

/// Returns the log channel if the guild wants reports.
async fn log_channel(
    store: &dyn LedgerStore,
    ctx: &EventContext,
    guild: &GuildId,
) -> LedgerResult<Option<ChannelId>> {
    let settings = store.settings(ctx, guild).await?;
    if !settings.enabled {
        return Ok(None);
    }
    if settings.log_channel.is_none() {
        debug!(guild = %guild, "ledger enabled without a log channel");
    }
    Ok(settings.log_channel)
}

fn or_placeholder(content: &str) -> &str {
    if content.is_empty() { "*empty*" } else { content }
}

async fn handle_create(req: EventRequest<MessageCreate>) -> EventResult {
    if req.event.author.bot {
        return Ok(());
    }
    let store = req.ctx.fetch(&ledger_store_key())?;
    store.cache_message(&req.ctx, &req.event).await?;
    Ok(())
}

async fn handle_update(req: EventRequest<MessageUpdate>) -> EventResult {
    let MessageUpdate { message, before } = &*req.event;
    let Some(guild) = &message.guild_id else {
        return Ok(());
    };
    if message.author.bot {
        return Ok(());
    }

    let store = req.ctx.fetch(&ledger_store_key())?;
    let old = match store.cached_message(&req.ctx, &message.id).await? {
        Some(cached) => Some(cached.content),
        None => before.as_ref().map(|b| b.content.clone()),
    };
    store.cache_message(&req.ctx, message).await?;

    // embed unfurls also arrive as updates
    if old.as_deref() == Some(message.content.as_str()) {
        return Ok(());
    }
    let Some(channel) = log_channel(store.as_ref(), &req.ctx, guild).await? else {
        return Ok(());
    };

    let embed = Embed::new()
        .title("Message Edited")
        .color(colors::ERROR)
        .field(
            "Old Content",
            old.as_deref().map_or("*not cached*", or_placeholder),
            false,
        )
        .field("New Content", or_placeholder(&message.content), false)
        .field("Author", message.author.mention(), true)
        .field("Channel", format!("<#{}>", message.channel_id), true)
        .timestamp(message.timestamp);
    req.session
        .send_message(&channel, MessageSend::embed(embed))
        .await?;
    Ok(())
}

async fn handle_delete(req: EventRequest<MessageDelete>) -> EventResult {
    let event = &req.event;
    let Some(guild) = &event.guild_id else {
        return Ok(());
    };

    let store = req.ctx.fetch(&ledger_store_key())?;
    let known = match store.forget_message(&req.ctx, &event.id).await? {
        Some(cached) => Some(cached),
        None => event.before.as_ref().map(|b| CachedMessage {
            author: b.author.clone(),
            content: b.content.clone(),
        }),
    };
    if known.as_ref().is_some_and(|m| m.author.bot) {
        return Ok(());
    }
    let Some(channel) = log_channel(store.as_ref(), &req.ctx, guild).await? else {
        return Ok(());
    };

    let (content, author) = match &known {
        Some(m) => (or_placeholder(&m.content), m.author.mention()),
        None => ("*not cached*", "Unknown".to_string()),
    };
    let embed = Embed::new()
        .title("Message Deleted")
        .color(colors::INFO)
        .field("Content", content, false)
        .field("Author", author, true)
        .field("Channel", format!("<#{}>", event.channel_id), true);
    req.session
        .send_message(&channel, MessageSend::embed(embed))
        .await?;
    Ok(())
}

// =============================================================================
// Command
// =============================================================================

async fn handle_ledger_command(req: EventRequest<InteractionCreate>) -> EventResult {
    defer(&req, true).await?;

    let store = req.ctx.fetch(&ledger_store_key())?;
    let guild = require_guild(&req)?;
    let (path, options) = req.event.data.route();

    let embed = match path.as_slice() {
        ["enable"] => {
            let channel = options.channel("channel")?.clone();
            store
                .set_log_channel(&req.ctx, &guild, Some(channel.clone()))
                .await?;
            store.set_enabled(&req.ctx, &guild, true).await?;
            Embed::new()
                .title("Ledger enabled")
                .color(colors::INFO)
                .description(format!(
                    "The ledger module has been enabled and messages will now be logged to <#{channel}>"
                ))
        }
        ["disable"] => {
            store.set_enabled(&req.ctx, &guild, false).await?;
            Embed::new()
                .title("Ledger disabled")
                .color(colors::INFO)
                .description(
                    "The ledger module has been disabled and messages will no longer be logged",
                )
        }
        other => return Err(format!("unknown subcommand `{}`", other.join(" ")).into()),
    };
    edit(&req, embed).await
}
