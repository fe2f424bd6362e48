//! In-memory [`Session`] implementation.
//!
//! `MemorySession` behaves like a single-process platform: it keeps guilds,
//! members, channels and registered commands in memory and enforces the
//! interaction response lifecycle:
//!
//! ```text
//! Unanswered ──respond(Message)──▶ Answered
//!      │
//!      └──respond(Deferred)──▶ Answered { loading } ──edit──▶ Answered
//! ```
//!
//! Every call is recorded before it is evaluated, so tests can assert on the
//! exact sequence of outbound requests, including failed ones.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::Session;
use crate::command::{CommandSchema, CommandScope, RegisteredCommand};
use crate::error::{SessionError, SessionResult};
use crate::message::{
    Followup, InteractionResponse, MessageFlags, MessageSend, ResponseEdit, ResponseMessage,
};
use crate::model::{
    Channel, ChannelId, ChannelKind, CommandId, Guild, GuildId, InteractionId, Member, MessageId,
    RoleId, User, UserId,
};

/// The kind of a session call, used for failure injection and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOp {
    CurrentUser,
    Guilds,
    Guild,
    ListCommands,
    CreateCommand,
    DeleteCommand,
    Respond,
    OriginalResponse,
    EditResponse,
    SendFollowup,
    SendMessage,
    CreateDm,
    KickMember,
    AddRole,
    GuildMembers,
    CreateChannel,
}

/// A recorded session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    CurrentUser,
    Guilds,
    Guild(GuildId),
    ListCommands(CommandScope),
    CreateCommand { scope: CommandScope, name: String },
    DeleteCommand { scope: CommandScope, id: CommandId },
    Respond { interaction: InteractionId, response: InteractionResponse },
    OriginalResponse(InteractionId),
    EditResponse { interaction: InteractionId, edit: ResponseEdit },
    SendFollowup { interaction: InteractionId, followup: Followup },
    SendMessage { channel: ChannelId, message: MessageSend },
    CreateDm(UserId),
    KickMember { guild: GuildId, user: UserId, reason: String },
    AddRole { guild: GuildId, user: UserId, role: RoleId },
    GuildMembers(GuildId),
    CreateChannel { guild: GuildId, name: String, kind: ChannelKind },
}

impl SessionCall {
    /// Returns the kind of this call.
    pub fn op(&self) -> SessionOp {
        match self {
            Self::CurrentUser => SessionOp::CurrentUser,
            Self::Guilds => SessionOp::Guilds,
            Self::Guild(_) => SessionOp::Guild,
            Self::ListCommands(_) => SessionOp::ListCommands,
            Self::CreateCommand { .. } => SessionOp::CreateCommand,
            Self::DeleteCommand { .. } => SessionOp::DeleteCommand,
            Self::Respond { .. } => SessionOp::Respond,
            Self::OriginalResponse(_) => SessionOp::OriginalResponse,
            Self::EditResponse { .. } => SessionOp::EditResponse,
            Self::SendFollowup { .. } => SessionOp::SendFollowup,
            Self::SendMessage { .. } => SessionOp::SendMessage,
            Self::CreateDm(_) => SessionOp::CreateDm,
            Self::KickMember { .. } => SessionOp::KickMember,
            Self::AddRole { .. } => SessionOp::AddRole,
            Self::GuildMembers(_) => SessionOp::GuildMembers,
            Self::CreateChannel { .. } => SessionOp::CreateChannel,
        }
    }
}

#[derive(Default)]
struct State {
    guilds: Vec<Guild>,
    members: HashMap<GuildId, Vec<Member>>,
    channels: HashMap<ChannelId, Channel>,
    dm_channels: HashMap<UserId, ChannelId>,
    commands: HashMap<CommandScope, Vec<RegisteredCommand>>,
    responses: HashMap<InteractionId, ResponseMessage>,
    followups: HashMap<InteractionId, Vec<Followup>>,
    messages: Vec<(ChannelId, MessageSend)>,
    failures: HashMap<SessionOp, VecDeque<SessionError>>,
    calls: Vec<SessionCall>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Records the call and pops an injected failure for it, if any.
    fn enter(&mut self, call: SessionCall) -> SessionResult<()> {
        debug!(call = ?call, "session call");
        let op = call.op();
        self.calls.push(call);
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn member_mut(&mut self, guild: &GuildId, user: &UserId) -> SessionResult<&mut Member> {
        self.members
            .get_mut(guild)
            .ok_or_else(|| SessionError::not_found("guild", guild))?
            .iter_mut()
            .find(|m| &m.user.id == user)
            .ok_or_else(|| SessionError::not_found("member", user))
    }
}

/// A [`Session`] backed entirely by process memory.
pub struct MemorySession {
    user: User,
    state: Mutex<State>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new(User {
            id: UserId::new("0"),
            username: "kestrel".into(),
            bot: true,
        })
    }
}

impl MemorySession {
    /// Creates an empty session acting as `user`.
    pub fn new(user: User) -> Self {
        Self {
            user,
            state: Mutex::new(State::default()),
        }
    }

    /// Adds a guild with its initial members.
    pub fn with_guild(self, guild: Guild, members: Vec<Member>) -> Self {
        {
            let mut state = self.state.lock();
            state.members.insert(guild.id.clone(), members);
            state.guilds.push(guild);
        }
        self
    }

    /// Makes the next call of kind `op` fail with a request error.
    pub fn fail_next(&self, op: SessionOp) {
        self.fail_next_with(op, SessionError::request("injected failure"));
    }

    /// Makes the next call of kind `op` fail with `error`.
    pub fn fail_next_with(&self, op: SessionOp, error: SessionError) {
        self.state.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> Vec<SessionCall> {
        self.state.lock().calls.clone()
    }

    /// Counts the calls of kind `op`.
    pub fn count(&self, op: SessionOp) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Forgets the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Returns the current initial response of an interaction.
    pub fn response(&self, interaction: &InteractionId) -> Option<ResponseMessage> {
        self.state.lock().responses.get(interaction).cloned()
    }

    /// Returns the follow-ups sent for an interaction.
    pub fn followups(&self, interaction: &InteractionId) -> Vec<Followup> {
        self.state
            .lock()
            .followups
            .get(interaction)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every channel message sent, in order.
    pub fn sent_messages(&self) -> Vec<(ChannelId, MessageSend)> {
        self.state.lock().messages.clone()
    }

    /// Returns the commands registered in `scope`.
    pub fn commands(&self, scope: &CommandScope) -> Vec<RegisteredCommand> {
        self.state
            .lock()
            .commands
            .get(scope)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the current members of a guild.
    pub fn members(&self, guild: &GuildId) -> Vec<Member> {
        self.state
            .lock()
            .members
            .get(guild)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the channels created so far, including DM channels.
    pub fn channels(&self) -> Vec<Channel> {
        self.state.lock().channels.values().cloned().collect()
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn current_user(&self) -> SessionResult<User> {
        self.state.lock().enter(SessionCall::CurrentUser)?;
        Ok(self.user.clone())
    }

    async fn guilds(&self) -> SessionResult<Vec<Guild>> {
        let mut state = self.state.lock();
        state.enter(SessionCall::Guilds)?;
        Ok(state.guilds.clone())
    }

    async fn guild(&self, id: &GuildId) -> SessionResult<Guild> {
        let mut state = self.state.lock();
        state.enter(SessionCall::Guild(id.clone()))?;
        state
            .guilds
            .iter()
            .find(|g| &g.id == id)
            .cloned()
            .ok_or_else(|| SessionError::not_found("guild", id))
    }

    async fn list_commands(&self, scope: &CommandScope) -> SessionResult<Vec<RegisteredCommand>> {
        let mut state = self.state.lock();
        state.enter(SessionCall::ListCommands(scope.clone()))?;
        Ok(state.commands.get(scope).cloned().unwrap_or_default())
    }

    async fn create_command(
        &self,
        scope: &CommandScope,
        schema: &CommandSchema,
    ) -> SessionResult<RegisteredCommand> {
        let mut state = self.state.lock();
        state.enter(SessionCall::CreateCommand {
            scope: scope.clone(),
            name: schema.name.clone(),
        })?;
        schema
            .validate()
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))?;

        let fresh_id = CommandId::new(state.next_id("cmd"));
        let registered = state.commands.entry(scope.clone()).or_default();
        if let Some(existing) = registered.iter_mut().find(|c| c.schema.name == schema.name) {
            existing.schema = schema.clone();
            return Ok(existing.clone());
        }
        let command = RegisteredCommand {
            id: fresh_id,
            scope: scope.clone(),
            schema: schema.clone(),
        };
        registered.push(command.clone());
        Ok(command)
    }

    async fn delete_command(&self, scope: &CommandScope, id: &CommandId) -> SessionResult<()> {
        let mut state = self.state.lock();
        state.enter(SessionCall::DeleteCommand {
            scope: scope.clone(),
            id: id.clone(),
        })?;
        let registered = state
            .commands
            .get_mut(scope)
            .ok_or_else(|| SessionError::not_found("command", id))?;
        let before = registered.len();
        registered.retain(|c| &c.id != id);
        if registered.len() == before {
            return Err(SessionError::not_found("command", id));
        }
        Ok(())
    }

    async fn respond(
        &self,
        interaction: &InteractionId,
        response: InteractionResponse,
    ) -> SessionResult<()> {
        let mut state = self.state.lock();
        state.enter(SessionCall::Respond {
            interaction: interaction.clone(),
            response: response.clone(),
        })?;
        if state.responses.contains_key(interaction) {
            return Err(SessionError::AlreadyAcknowledged(interaction.to_string()));
        }
        let message = match response {
            InteractionResponse::Message(data) => ResponseMessage {
                content: data.content,
                embeds: data.embeds,
                flags: MessageFlags {
                    ephemeral: data.ephemeral,
                    loading: false,
                },
            },
            InteractionResponse::Deferred { ephemeral } => ResponseMessage {
                flags: MessageFlags {
                    ephemeral,
                    loading: true,
                },
                ..ResponseMessage::default()
            },
            InteractionResponse::Autocomplete(_) => ResponseMessage::default(),
        };
        state.responses.insert(interaction.clone(), message);
        Ok(())
    }

    async fn original_response(&self, interaction: &InteractionId) -> SessionResult<ResponseMessage> {
        let mut state = self.state.lock();
        state.enter(SessionCall::OriginalResponse(interaction.clone()))?;
        state
            .responses
            .get(interaction)
            .cloned()
            .ok_or_else(|| SessionError::UnknownInteraction(interaction.to_string()))
    }

    async fn edit_response(
        &self,
        interaction: &InteractionId,
        edit: ResponseEdit,
    ) -> SessionResult<ResponseMessage> {
        let mut state = self.state.lock();
        state.enter(SessionCall::EditResponse {
            interaction: interaction.clone(),
            edit: edit.clone(),
        })?;
        let message = state
            .responses
            .get_mut(interaction)
            .ok_or_else(|| SessionError::UnknownInteraction(interaction.to_string()))?;
        if let Some(content) = edit.content {
            message.content = content;
        }
        if let Some(embeds) = edit.embeds {
            message.embeds = embeds;
        }
        message.flags.loading = false;
        Ok(message.clone())
    }

    async fn send_followup(
        &self,
        interaction: &InteractionId,
        followup: Followup,
    ) -> SessionResult<MessageId> {
        let mut state = self.state.lock();
        state.enter(SessionCall::SendFollowup {
            interaction: interaction.clone(),
            followup: followup.clone(),
        })?;
        if !state.responses.contains_key(interaction) {
            return Err(SessionError::UnknownInteraction(interaction.to_string()));
        }
        let id = MessageId::new(state.next_id("msg"));
        state
            .followups
            .entry(interaction.clone())
            .or_default()
            .push(followup);
        Ok(id)
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        message: MessageSend,
    ) -> SessionResult<MessageId> {
        let mut state = self.state.lock();
        state.enter(SessionCall::SendMessage {
            channel: channel.clone(),
            message: message.clone(),
        })?;
        let id = MessageId::new(state.next_id("msg"));
        state.messages.push((channel.clone(), message));
        Ok(id)
    }

    async fn create_dm(&self, user: &UserId) -> SessionResult<ChannelId> {
        let mut state = self.state.lock();
        state.enter(SessionCall::CreateDm(user.clone()))?;
        if let Some(existing) = state.dm_channels.get(user) {
            return Ok(existing.clone());
        }
        let id = ChannelId::new(state.next_id("dm"));
        state.channels.insert(
            id.clone(),
            Channel {
                id: id.clone(),
                guild_id: None,
                name: format!("dm-{user}"),
                kind: ChannelKind::Dm,
            },
        );
        state.dm_channels.insert(user.clone(), id.clone());
        Ok(id)
    }

    async fn kick_member(&self, guild: &GuildId, user: &UserId, reason: &str) -> SessionResult<()> {
        let mut state = self.state.lock();
        state.enter(SessionCall::KickMember {
            guild: guild.clone(),
            user: user.clone(),
            reason: reason.to_string(),
        })?;
        state.member_mut(guild, user)?;
        if let Some(members) = state.members.get_mut(guild) {
            members.retain(|m| &m.user.id != user);
        }
        Ok(())
    }

    async fn add_role(&self, guild: &GuildId, user: &UserId, role: &RoleId) -> SessionResult<()> {
        let mut state = self.state.lock();
        state.enter(SessionCall::AddRole {
            guild: guild.clone(),
            user: user.clone(),
            role: role.clone(),
        })?;
        let member = state.member_mut(guild, user)?;
        if !member.roles.contains(role) {
            member.roles.push(role.clone());
        }
        Ok(())
    }

    async fn guild_members(&self, guild: &GuildId) -> SessionResult<Vec<Member>> {
        let mut state = self.state.lock();
        state.enter(SessionCall::GuildMembers(guild.clone()))?;
        state
            .members
            .get(guild)
            .cloned()
            .ok_or_else(|| SessionError::not_found("guild", guild))
    }

    async fn create_channel(
        &self,
        guild: &GuildId,
        name: &str,
        kind: ChannelKind,
    ) -> SessionResult<Channel> {
        let mut state = self.state.lock();
        state.enter(SessionCall::CreateChannel {
            guild: guild.clone(),
            name: name.to_string(),
            kind,
        })?;
        if !state.guilds.iter().any(|g| &g.id == guild) {
            return Err(SessionError::not_found("guild", guild));
        }
        let taken: HashSet<&str> = state
            .channels
            .values()
            .filter(|c| c.guild_id.as_ref() == Some(guild))
            .map(|c| c.name.as_str())
            .collect();
        if taken.contains(name) {
            return Err(SessionError::InvalidRequest(format!(
                "channel {name:?} already exists"
            )));
        }
        let channel = Channel {
            id: ChannelId::new(state.next_id("chan")),
            guild_id: Some(guild.clone()),
            name: name.to_string(),
            kind,
        };
        state.channels.insert(channel.id.clone(), channel.clone());
        Ok(channel)
    }
}
