//! Interaction payloads and option extraction.

use serde::{Deserialize, Serialize};

use super::{ChannelId, GuildId, InteractionId, RoleId, User, UserId};
use crate::error::{OptionError, OptionResult};

/// How an interaction was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// A regular slash-command invocation.
    Command,
    /// An autocomplete request while the user is typing an option.
    Autocomplete,
    /// A message component (button, select menu).
    Component,
}

/// A user-triggered interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: InteractionId,
    pub kind: InteractionKind,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub user: User,
    #[serde(default)]
    pub data: CommandData,
}

/// The invoked command and its option tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOptionValue>,
}

/// One supplied option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOptionValue {
    pub name: String,
    #[serde(flatten)]
    pub value: OptionValue,
    /// Set on the option the user is typing during autocomplete.
    #[serde(default)]
    pub focused: bool,
}

/// The value carried by an option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    User(UserId),
    Channel(ChannelId),
    Role(RoleId),
    Mentionable(String),
    SubCommand(Vec<CommandOptionValue>),
    SubCommandGroup(Vec<CommandOptionValue>),
}

impl OptionValue {
    /// Name of the value kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::User(_) => "user",
            Self::Channel(_) => "channel",
            Self::Role(_) => "role",
            Self::Mentionable(_) => "mentionable",
            Self::SubCommand(_) => "sub_command",
            Self::SubCommandGroup(_) => "sub_command_group",
        }
    }
}

impl CommandData {
    /// Creates command data with no options.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    /// Returns the invoked subcommand path and the options of the leaf.
    ///
    /// `/whitelist config set-role role:@x` yields
    /// `(["config", "set-role"], [role])`.
    pub fn route(&self) -> (Vec<&str>, &[CommandOptionValue]) {
        let mut path = Vec::new();
        let mut options = self.options.as_slice();
        while let Some(first) = options.first() {
            match &first.value {
                OptionValue::SubCommand(inner) | OptionValue::SubCommandGroup(inner) => {
                    path.push(first.name.as_str());
                    options = inner.as_slice();
                }
                _ => break,
            }
        }
        (path, options)
    }

    /// Returns the invoked subcommand, looking through a group if present.
    pub fn subcommand(&self) -> Option<&str> {
        let first = self.options.first()?;
        match &first.value {
            OptionValue::SubCommand(_) => Some(&first.name),
            OptionValue::SubCommandGroup(inner) => inner
                .first()
                .filter(|o| matches!(o.value, OptionValue::SubCommand(_)))
                .map(|o| o.name.as_str()),
            _ => None,
        }
    }

    /// Returns the invoked subcommand group, if any.
    pub fn subcommand_group(&self) -> Option<&str> {
        self.options
            .first()
            .filter(|o| matches!(o.value, OptionValue::SubCommandGroup(_)))
            .map(|o| o.name.as_str())
    }

    /// Returns the option the user is currently typing, if any.
    pub fn focused(&self) -> Option<&CommandOptionValue> {
        self.route().1.iter().find(|o| o.focused)
    }
}

/// Typed accessors over a list of options.
///
/// Implemented for `[CommandOptionValue]`, so it works on
/// `data.options` as well as on the leaf options returned by
/// [`CommandData::route`].
pub trait OptionsExt {
    /// Looks up an option by name.
    fn get(&self, name: &str) -> OptionResult<&OptionValue>;

    fn string(&self, name: &str) -> OptionResult<&str> {
        match self.get(name)? {
            OptionValue::String(s) => Ok(s),
            other => Err(unexpected(name, "string", other)),
        }
    }

    fn integer(&self, name: &str) -> OptionResult<i64> {
        match self.get(name)? {
            OptionValue::Integer(i) => Ok(*i),
            other => Err(unexpected(name, "integer", other)),
        }
    }

    fn number(&self, name: &str) -> OptionResult<f64> {
        match self.get(name)? {
            OptionValue::Number(n) => Ok(*n),
            other => Err(unexpected(name, "number", other)),
        }
    }

    fn boolean(&self, name: &str) -> OptionResult<bool> {
        match self.get(name)? {
            OptionValue::Boolean(b) => Ok(*b),
            other => Err(unexpected(name, "boolean", other)),
        }
    }

    fn user(&self, name: &str) -> OptionResult<&UserId> {
        match self.get(name)? {
            OptionValue::User(u) => Ok(u),
            other => Err(unexpected(name, "user", other)),
        }
    }

    fn channel(&self, name: &str) -> OptionResult<&ChannelId> {
        match self.get(name)? {
            OptionValue::Channel(c) => Ok(c),
            other => Err(unexpected(name, "channel", other)),
        }
    }

    fn role(&self, name: &str) -> OptionResult<&RoleId> {
        match self.get(name)? {
            OptionValue::Role(r) => Ok(r),
            other => Err(unexpected(name, "role", other)),
        }
    }

    fn mentionable(&self, name: &str) -> OptionResult<&str> {
        match self.get(name)? {
            OptionValue::Mentionable(m) => Ok(m),
            other => Err(unexpected(name, "mentionable", other)),
        }
    }

    fn string_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.string(name).unwrap_or(default)
    }

    fn integer_or(&self, name: &str, default: i64) -> i64 {
        self.integer(name).unwrap_or(default)
    }

    fn number_or(&self, name: &str, default: f64) -> f64 {
        self.number(name).unwrap_or(default)
    }

    fn boolean_or(&self, name: &str, default: bool) -> bool {
        self.boolean(name).unwrap_or(default)
    }
}

impl OptionsExt for [CommandOptionValue] {
    fn get(&self, name: &str) -> OptionResult<&OptionValue> {
        self.iter()
            .find(|o| o.name == name)
            .map(|o| &o.value)
            .ok_or_else(|| OptionError::NotFound(name.to_string()))
    }
}

fn unexpected(name: &str, expected: &'static str, got: &OptionValue) -> OptionError {
    OptionError::UnexpectedType {
        name: name.to_string(),
        expected,
        got: got.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(name: &str, value: OptionValue) -> CommandOptionValue {
        CommandOptionValue {
            name: name.into(),
            value,
            focused: false,
        }
    }

    #[test]
    fn test_typed_extraction() {
        let options = vec![
            opt("message", OptionValue::String("hi".into())),
            opt("count", OptionValue::Integer(3)),
        ];
        assert_eq!(options.string("message"), Ok("hi"));
        assert_eq!(options.integer("count"), Ok(3));
        assert_eq!(
            options.integer("missing"),
            Err(OptionError::NotFound("missing".into()))
        );
        assert!(matches!(
            options.boolean("message"),
            Err(OptionError::UnexpectedType { expected: "boolean", got: "string", .. })
        ));
        assert!(options.boolean_or("ephemeral", true));
    }

    #[test]
    fn test_route_walks_groups_and_subcommands() {
        let data = CommandData {
            name: "whitelist".into(),
            options: vec![opt(
                "config",
                OptionValue::SubCommandGroup(vec![opt(
                    "set-role",
                    OptionValue::SubCommand(vec![opt("role", OptionValue::Role(RoleId::new("r1")))]),
                )]),
            )],
        };
        let (path, leaf) = data.route();
        assert_eq!(path, vec!["config", "set-role"]);
        assert_eq!(leaf.role("role").map(RoleId::as_str), Ok("r1"));
        assert_eq!(data.subcommand_group(), Some("config"));
        assert_eq!(data.subcommand(), Some("set-role"));
    }

    #[test]
    fn test_option_wire_format() {
        let json = r#"{ "name": "feature", "options": [
            { "name": "get", "type": "sub_command", "value": [
                { "name": "feature", "type": "string", "value": "debug:x", "focused": true }
            ]}
        ]}"#;
        let data: CommandData = serde_json::from_str(json).unwrap();
        assert_eq!(data.subcommand(), Some("get"));
        assert_eq!(data.subcommand_group(), None);
        assert_eq!(data.focused().map(|o| o.name.as_str()), Some("feature"));
    }
}
