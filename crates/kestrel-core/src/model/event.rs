//! Gateway event payloads.
//!
//! The gateway delivers one of a small closed set of payloads. Each payload
//! type implements [`Event`], which is what the dispatch core is generic
//! over; [`GatewayEvent`] is the tagged union used on the wire and by the raw
//! callback registry.
//!
//! ```text
//! GatewayEvent
//! ├── Ready              startup, carries the bot user
//! ├── MessageCreate      ─┐
//! ├── MessageUpdate       ├─ guild scope: message.guild_id
//! ├── MessageDelete      ─┘
//! ├── InteractionCreate  guild scope: interaction.guild_id
//! ├── GuildMemberAdd     ─┬─ guild scope: guild_id
//! └── GuildBanAdd        ─┘
//! ```

use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::interaction::Interaction;
use super::{ChannelId, GuildId, Message, MessageId, User};

/// Common behaviour of every gateway payload.
///
/// `guild_id` is the polymorphic guild-scope accessor: each payload exposes
/// its guild through a different field, and payloads without one (startup,
/// direct messages) return `None`.
pub trait Event: Debug + Send + Sync + 'static {
    /// Stable snake_case name of the payload kind.
    const NAME: &'static str;

    /// Returns the payload's name.
    fn event_name(&self) -> &'static str {
        Self::NAME
    }

    /// Returns the guild this event originated from, if any.
    fn guild_id(&self) -> Option<&GuildId> {
        None
    }

    /// Extracts this payload type from a gateway event.
    fn from_gateway(event: &GatewayEvent) -> Option<Arc<Self>>
    where
        Self: Sized;
}

// =============================================================================
// Payloads
// =============================================================================

/// Fired once the session is established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    /// The bot's own user.
    pub user: User,
    /// Guilds available at startup.
    #[serde(default)]
    pub guilds: Vec<GuildId>,
}

/// A message was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageCreate(pub Message);

/// A message was edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    /// The message after the edit.
    pub message: Message,
    /// The message before the edit, when the platform had it cached.
    #[serde(default)]
    pub before: Option<Message>,
}

/// A message was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelete {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// The deleted message, when the platform had it cached.
    #[serde(default)]
    pub before: Option<Message>,
}

/// A user triggered an interaction (slash command, autocomplete, component).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionCreate(pub Interaction);

/// A user joined a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMemberAdd {
    pub guild_id: GuildId,
    pub user: User,
}

/// A user was banned from a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildBanAdd {
    pub guild_id: GuildId,
    pub user: User,
}

impl Deref for MessageCreate {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.0
    }
}

impl Deref for InteractionCreate {
    type Target = Interaction;

    fn deref(&self) -> &Interaction {
        &self.0
    }
}

// =============================================================================
// GatewayEvent
// =============================================================================

/// Tagged union of every payload the gateway delivers.
///
/// On the wire this is `{"type": "<name>", "data": { ... }}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    Ready(Arc<Ready>),
    MessageCreate(Arc<MessageCreate>),
    MessageUpdate(Arc<MessageUpdate>),
    MessageDelete(Arc<MessageDelete>),
    InteractionCreate(Arc<InteractionCreate>),
    GuildMemberAdd(Arc<GuildMemberAdd>),
    GuildBanAdd(Arc<GuildBanAdd>),
}

impl GatewayEvent {
    /// Returns the payload's name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Ready(e) => e.event_name(),
            Self::MessageCreate(e) => e.event_name(),
            Self::MessageUpdate(e) => e.event_name(),
            Self::MessageDelete(e) => e.event_name(),
            Self::InteractionCreate(e) => e.event_name(),
            Self::GuildMemberAdd(e) => e.event_name(),
            Self::GuildBanAdd(e) => e.event_name(),
        }
    }

    /// Returns the guild scope of the payload, if any.
    pub fn guild_id(&self) -> Option<&GuildId> {
        match self {
            Self::Ready(e) => e.guild_id(),
            Self::MessageCreate(e) => e.guild_id(),
            Self::MessageUpdate(e) => e.guild_id(),
            Self::MessageDelete(e) => e.guild_id(),
            Self::InteractionCreate(e) => e.guild_id(),
            Self::GuildMemberAdd(e) => e.guild_id(),
            Self::GuildBanAdd(e) => e.guild_id(),
        }
    }
}

macro_rules! impl_event {
    ($ty:ident, $name:literal, |$e:ident| $guild:expr) => {
        impl Event for $ty {
            const NAME: &'static str = $name;

            fn guild_id(&self) -> Option<&GuildId> {
                let $e = self;
                $guild
            }

            fn from_gateway(event: &GatewayEvent) -> Option<Arc<Self>> {
                match event {
                    GatewayEvent::$ty(inner) => Some(Arc::clone(inner)),
                    _ => None,
                }
            }
        }

        impl From<$ty> for GatewayEvent {
            fn from(payload: $ty) -> Self {
                GatewayEvent::$ty(Arc::new(payload))
            }
        }
    };
}

impl_event!(Ready, "ready", |_e| None);
impl_event!(MessageCreate, "message_create", |e| e.0.guild_id.as_ref());
impl_event!(MessageUpdate, "message_update", |e| e.message.guild_id.as_ref());
impl_event!(MessageDelete, "message_delete", |e| e.guild_id.as_ref());
impl_event!(InteractionCreate, "interaction_create", |e| e.0.guild_id.as_ref());
impl_event!(GuildMemberAdd, "guild_member_add", |e| Some(&e.guild_id));
impl_event!(GuildBanAdd, "guild_ban_add", |e| Some(&e.guild_id));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;

    fn user() -> User {
        User {
            id: UserId::new("42"),
            username: "tester".into(),
            bot: false,
        }
    }

    #[test]
    fn test_guild_scope_per_payload() {
        let join = GuildMemberAdd {
            guild_id: GuildId::new("g1"),
            user: user(),
        };
        assert_eq!(join.guild_id().map(GuildId::as_str), Some("g1"));

        let ready = Ready {
            user: user(),
            guilds: vec![],
        };
        assert!(ready.guild_id().is_none());

        let delete = MessageDelete {
            id: MessageId::new("m"),
            channel_id: ChannelId::new("c"),
            guild_id: None,
            before: None,
        };
        assert!(delete.guild_id().is_none());
    }

    #[test]
    fn test_gateway_event_wire_format() {
        let json = r#"{
            "type": "guild_ban_add",
            "data": { "guild_id": "g9", "user": { "id": "7", "username": "spam" } }
        }"#;
        let event: GatewayEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_name(), "guild_ban_add");
        assert_eq!(event.guild_id().map(GuildId::as_str), Some("g9"));

        let ban = GuildBanAdd::from_gateway(&event).unwrap();
        assert_eq!(ban.user.username, "spam");
        assert!(Ready::from_gateway(&event).is_none());
    }

    #[test]
    fn test_message_create_is_transparent() {
        let json = r#"{
            "type": "message_create",
            "data": {
                "id": "m1", "channel_id": "c1", "guild_id": "g1",
                "author": { "id": "1", "username": "a" },
                "content": "!ping"
            }
        }"#;
        let event: GatewayEvent = serde_json::from_str(json).unwrap();
        let msg = MessageCreate::from_gateway(&event).unwrap();
        assert_eq!(msg.content, "!ping");
        assert_eq!(msg.guild_id().map(GuildId::as_str), Some("g1"));
    }
}
