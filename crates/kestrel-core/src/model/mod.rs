//! Platform data model.
//!
//! These are the payload shapes the gateway delivers and the entities they
//! reference. The model is deliberately small: only the fields the dispatch
//! core and the bundled modules read are represented.

pub mod event;
pub mod interaction;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use event::{
    Event, GatewayEvent, GuildBanAdd, GuildMemberAdd, InteractionCreate, MessageCreate,
    MessageDelete, MessageUpdate, Ready,
};
pub use interaction::{
    CommandData, CommandOptionValue, Interaction, InteractionKind, OptionValue, OptionsExt,
};

macro_rules! id_types {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub String);

            impl $name {
                /// Creates the id from anything string-like.
                pub fn new(id: impl Into<String>) -> Self {
                    Self(id.into())
                }

                /// Returns the raw id.
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(s: &str) -> Self {
                    Self(s.to_string())
                }
            }

            impl From<String> for $name {
                fn from(s: String) -> Self {
                    Self(s)
                }
            }
        )*
    };
}

id_types! {
    /// A guild (server) id.
    GuildId,
    /// A channel id.
    ChannelId,
    /// A user id.
    UserId,
    /// A role id.
    RoleId,
    /// A message id.
    MessageId,
    /// An interaction id.
    InteractionId,
    /// A remotely registered command id.
    CommandId,
}

/// A platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// Returns the mention markup for this user.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A guild member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

/// A guild the bot is a member of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
}

/// Kinds of channel the bot may create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Forum,
    Dm,
}

/// A channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub name: String,
    pub kind: ChannelKind,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub author: User,
    #[serde(default)]
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}
