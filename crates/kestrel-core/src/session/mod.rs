//! The outbound platform capability.
//!
//! Handlers never talk to the platform directly; they call through a
//! [`Session`] handed to them with every event. The trait is object safe and
//! shared as [`SessionHandle`], so a real SDK client and the in-memory
//! [`MemorySession`] are interchangeable.
//!
//! Retry and backoff are the implementation's business. Every method
//! either succeeds or returns a [`SessionError`] describing why the platform
//! refused.

mod memory;

pub use memory::{MemorySession, SessionCall, SessionOp};

use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{CommandSchema, CommandScope, RegisteredCommand};
use crate::error::SessionResult;
use crate::message::{Followup, InteractionResponse, MessageSend, ResponseEdit, ResponseMessage};
use crate::model::{
    Channel, ChannelId, ChannelKind, CommandId, Guild, GuildId, InteractionId, Member, MessageId,
    RoleId, User, UserId,
};

/// Shared handle to a session.
pub type SessionHandle = Arc<dyn Session>;

/// Calls the bot can make against the chat platform.
#[async_trait]
pub trait Session: Send + Sync {
    // ---- identity ---------------------------------------------------------

    /// Returns the bot's own user.
    async fn current_user(&self) -> SessionResult<User>;

    /// Lists the guilds the bot is a member of.
    async fn guilds(&self) -> SessionResult<Vec<Guild>>;

    /// Fetches one guild.
    async fn guild(&self, id: &GuildId) -> SessionResult<Guild>;

    // ---- command registration ---------------------------------------------

    /// Lists the commands registered in `scope`.
    async fn list_commands(&self, scope: &CommandScope) -> SessionResult<Vec<RegisteredCommand>>;

    /// Creates a command, replacing any existing command with the same name.
    async fn create_command(
        &self,
        scope: &CommandScope,
        schema: &CommandSchema,
    ) -> SessionResult<RegisteredCommand>;

    /// Deletes a registered command.
    async fn delete_command(&self, scope: &CommandScope, id: &CommandId) -> SessionResult<()>;

    // ---- interaction responses --------------------------------------------

    /// Sends the initial response. Fails with
    /// [`AlreadyAcknowledged`](crate::SessionError::AlreadyAcknowledged) if
    /// one was already sent.
    async fn respond(
        &self,
        interaction: &InteractionId,
        response: InteractionResponse,
    ) -> SessionResult<()>;

    /// Reads back the initial response.
    async fn original_response(&self, interaction: &InteractionId) -> SessionResult<ResponseMessage>;

    /// Edits the initial response.
    async fn edit_response(
        &self,
        interaction: &InteractionId,
        edit: ResponseEdit,
    ) -> SessionResult<ResponseMessage>;

    /// Sends a follow-up message after the initial response.
    async fn send_followup(
        &self,
        interaction: &InteractionId,
        followup: Followup,
    ) -> SessionResult<MessageId>;

    // ---- messaging ----------------------------------------------------------

    /// Posts a message to a channel.
    async fn send_message(&self, channel: &ChannelId, message: MessageSend)
    -> SessionResult<MessageId>;

    /// Opens (or reuses) a direct-message channel with a user.
    async fn create_dm(&self, user: &UserId) -> SessionResult<ChannelId>;

    // ---- moderation -------------------------------------------------------

    /// Removes a member from a guild.
    async fn kick_member(&self, guild: &GuildId, user: &UserId, reason: &str) -> SessionResult<()>;

    /// Grants a role to a member.
    async fn add_role(&self, guild: &GuildId, user: &UserId, role: &RoleId) -> SessionResult<()>;

    /// Lists a guild's members.
    async fn guild_members(&self, guild: &GuildId) -> SessionResult<Vec<Member>>;

    /// Creates a channel in a guild.
    async fn create_channel(
        &self,
        guild: &GuildId,
        name: &str,
        kind: ChannelKind,
    ) -> SessionResult<Channel>;
}
