//! # Kestrel Core
//!
//! Foundation types for the Kestrel chat-platform gateway.
//!
//! This crate has no knowledge of pipelines or runtimes. It defines the
//! vocabulary the other crates share:
//!
//! - **Identifiers**: validated `namespace:id` keys ([`Identifier`])
//! - **Model**: the closed set of gateway payloads ([`GatewayEvent`]) and the
//!   entities they reference
//! - **Session**: the outbound platform capability ([`Session`]) and an
//!   in-memory implementation ([`MemorySession`])
//! - **Commands**: slash-command schema values ([`CommandSchema`])
//! - **Messages**: embeds and interaction responses ([`Embed`],
//!   [`InteractionResponse`])
//!
//! ## Event flow
//!
//! ```text
//! ┌──────────┐  GatewayEvent  ┌──────────────┐  Arc<E: Event>  ┌──────────┐
//! │  Source  │───────────────▶│   Registry   │────────────────▶│ Pipeline │
//! └──────────┘                └──────────────┘                 └────┬─────┘
//!                                                                   │
//!                                      SessionHandle ◀──────────────┘
//! ```

pub mod command;
pub mod error;
pub mod identifier;
pub mod message;
pub mod model;
pub mod session;

pub use command::{CommandOption, CommandSchema, CommandScope, OptionKind, RegisteredCommand};
pub use error::{
    IdentifierError, OptionError, OptionResult, SchemaError, SessionError, SessionResult,
};
pub use identifier::Identifier;
pub use message::{
    Attachment, AutocompleteChoice, Embed, EmbedField, Followup, InteractionResponse,
    MessageFlags, MessageSend, ResponseData, ResponseEdit, ResponseMessage, colors,
};
pub use model::{
    Channel, ChannelId, ChannelKind, CommandData, CommandId, CommandOptionValue, Event,
    GatewayEvent, Guild, GuildBanAdd, GuildId, GuildMemberAdd, Interaction, InteractionCreate,
    InteractionId, InteractionKind, Member, Message, MessageCreate, MessageDelete, MessageId,
    MessageUpdate, OptionValue, OptionsExt, Ready, RoleId, User, UserId,
};
pub use session::{MemorySession, Session, SessionCall, SessionHandle, SessionOp};
