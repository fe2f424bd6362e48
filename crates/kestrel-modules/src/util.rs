//! Glue shared by the bundled modules.

use kestrel_core::{
    Embed, Event, GuildId, Identifier, InteractionCreate, InteractionResponse, ResponseData,
    ResponseEdit,
};
use kestrel_framework::{EventFunc, EventRequest, EventResult, FrameworkError, Middleware};
use kestrel_runtime::config::ErrorReportConfig;

/// The platform's administrator permission bit.
pub(crate) const ADMINISTRATOR: u64 = 1 << 3;

/// Error reporting configured from `[errors]`.
pub(crate) fn reporting(errors: &ErrorReportConfig, tag: Identifier) -> Middleware<InteractionCreate> {
    Middleware::from_layer(errors.layer(tag))
}

/// Drops events without a guild scope.
///
/// Unlike the feature gate, which treats a missing guild as a failure, this
/// silently skips direct messages.
pub(crate) fn guild_only<E: Event>() -> Middleware<E> {
    Middleware::new(|next: EventFunc<E>| {
        EventFunc::new(move |req: EventRequest<E>| {
            let next = next.clone();
            async move {
                if req.guild_id().is_none() {
                    return Ok(());
                }
                next.call(req).await
            }
        })
    })
}

pub(crate) fn require_guild(req: &EventRequest<InteractionCreate>) -> Result<GuildId, FrameworkError> {
    req.event
        .guild_id
        .clone()
        .ok_or(FrameworkError::MissingGuild {
            event: InteractionCreate::NAME,
        })
}

pub(crate) async fn reply(
    req: &EventRequest<InteractionCreate>,
    embed: Embed,
    ephemeral: bool,
) -> EventResult {
    let response = InteractionResponse::message(ResponseData::embed(embed).ephemeral(ephemeral));
    req.session.respond(&req.event.id, response).await?;
    Ok(())
}

pub(crate) async fn defer(req: &EventRequest<InteractionCreate>, ephemeral: bool) -> EventResult {
    req.session
        .respond(&req.event.id, InteractionResponse::deferred(ephemeral))
        .await?;
    Ok(())
}

/// Replaces the (usually deferred) response with `embed`.
pub(crate) async fn edit(req: &EventRequest<InteractionCreate>, embed: Embed) -> EventResult {
    req.session
        .edit_response(&req.event.id, ResponseEdit::embeds(vec![embed]))
        .await?;
    Ok(())
}

pub(crate) fn state_word(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;
    use kestrel_core::{
        ChannelId, CommandData, CommandOptionValue, GatewayEvent, GuildId, Interaction,
        InteractionCreate, InteractionId, InteractionKind, MemorySession, Message, MessageId,
        OptionValue, User, UserId,
    };
    use kestrel_runtime::EventRegistry;

    pub fn user(id: &str, bot: bool) -> User {
        User {
            id: UserId::new(id),
            username: format!("user-{id}"),
            bot,
        }
    }

    pub fn opt(name: &str, value: OptionValue) -> CommandOptionValue {
        CommandOptionValue {
            name: name.into(),
            value,
            focused: false,
        }
    }

    pub fn sub(name: &str, options: Vec<CommandOptionValue>) -> CommandOptionValue {
        opt(name, OptionValue::SubCommand(options))
    }

    pub fn group(name: &str, options: Vec<CommandOptionValue>) -> CommandOptionValue {
        opt(name, OptionValue::SubCommandGroup(options))
    }

    /// A command invocation by `u1` in guild `g1`, channel `c1`.
    pub fn command(name: &str, options: Vec<CommandOptionValue>) -> InteractionCreate {
        InteractionCreate(Interaction {
            id: InteractionId::new(format!("i-{name}")),
            kind: InteractionKind::Command,
            guild_id: Some(GuildId::new("g1")),
            channel_id: ChannelId::new("c1"),
            user: user("u1", false),
            data: CommandData {
                name: name.into(),
                options,
            },
        })
    }

    pub fn message(id: &str, author: User, content: &str) -> Message {
        Message {
            id: MessageId::new(id),
            channel_id: ChannelId::new("c1"),
            guild_id: Some(GuildId::new("g1")),
            author,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Dispatches `event` and waits for every callback to finish.
    pub async fn deliver(
        registry: &EventRegistry,
        session: &Arc<MemorySession>,
        event: impl Into<GatewayEvent>,
    ) {
        let event = event.into();
        for handle in registry.dispatch(session.clone(), &event) {
            handle.await.unwrap();
        }
    }
}
