//! Slash-command schema values.
//!
//! A command schema is plain nested data: a tree of
//! `{name, description, kind, required, children}` nodes. The builders below
//! only make literals shorter; the one piece of behaviour is
//! [`CommandSchema::validate`], which checks the tree against the platform's
//! shape rules before anything is pushed remotely.
//!
//! ```rust,ignore
//! use kestrel_core::command::{CommandOption, CommandSchema, OptionKind};
//!
//! let say = CommandSchema::new("say", "Repeat a message")
//!     .option(CommandOption::new(OptionKind::String, "message", "What to say").required());
//! say.validate()?;
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::identifier::is_valid_namespace;
use crate::model::{CommandId, GuildId};

/// Maximum description length accepted by the platform.
pub const MAX_DESCRIPTION_LEN: usize = 100;

/// Maximum number of options on a single node.
pub const MAX_OPTIONS: usize = 25;

/// Kind of a command option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
}

impl OptionKind {
    /// Returns `true` for subcommands and groups.
    pub fn is_container(self) -> bool {
        matches!(self, Self::SubCommand | Self::SubCommandGroup)
    }

    /// Returns `true` if the platform can autocomplete this kind.
    pub fn supports_autocomplete(self) -> bool {
        matches!(self, Self::String | Self::Integer | Self::Number)
    }
}

/// One node of the option tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOption {
    pub kind: OptionKind,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub autocomplete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

impl CommandOption {
    pub fn new(kind: OptionKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            required: false,
            autocomplete: false,
            options: Vec::new(),
        }
    }

    /// Shorthand for a subcommand node.
    pub fn subcommand(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(OptionKind::SubCommand, name, description)
    }

    /// Shorthand for a subcommand group node.
    pub fn group(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(OptionKind::SubCommandGroup, name, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn autocomplete(mut self) -> Self {
        self.autocomplete = true;
        self
    }

    /// Appends a child option.
    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }
}

/// A top-level slash command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    /// Permission bitset required by default, `None` for everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_member_permissions: Option<u64>,
    /// Whether the command is usable in direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dm_permission: Option<bool>,
}

impl CommandSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            default_member_permissions: None,
            dm_permission: None,
        }
    }

    /// Appends a top-level option.
    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn default_member_permissions(mut self, permissions: u64) -> Self {
        self.default_member_permissions = Some(permissions);
        self
    }

    pub fn dm_permission(mut self, allowed: bool) -> Self {
        self.dm_permission = Some(allowed);
        self
    }

    /// Checks the tree against the platform's shape rules.
    ///
    /// Returns the first violation found, walking depth-first.
    pub fn validate(&self) -> Result<(), SchemaError> {
        check_node(&self.name, &self.name, &self.description)?;
        check_children(&self.name, &self.options, Level::Root)
    }
}

/// Where in the tree a list of options sits.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Root,
    Group,
    SubCommand,
}

fn check_node(path: &str, name: &str, description: &str) -> Result<(), SchemaError> {
    if !is_valid_namespace(name) {
        return Err(SchemaError::InvalidName {
            path: path.to_string(),
            name: name.to_string(),
        });
    }
    let len = description.chars().count();
    if len == 0 || len > MAX_DESCRIPTION_LEN {
        return Err(SchemaError::InvalidDescription {
            path: path.to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }
    Ok(())
}

fn check_children(path: &str, options: &[CommandOption], level: Level) -> Result<(), SchemaError> {
    if options.len() > MAX_OPTIONS {
        return Err(SchemaError::TooManyOptions {
            path: path.to_string(),
            count: options.len(),
            max: MAX_OPTIONS,
        });
    }

    let mut seen = HashSet::new();
    let mut optional_seen = false;
    let containers = options.iter().filter(|o| o.kind.is_container()).count();
    if containers != 0 && containers != options.len() {
        return Err(SchemaError::InvalidNesting {
            path: path.to_string(),
            reason: "subcommands cannot be mixed with value options",
        });
    }

    for option in options {
        let child_path = format!("{path} {}", option.name);
        check_node(&child_path, &option.name, &option.description)?;

        if !seen.insert(option.name.as_str()) {
            return Err(SchemaError::DuplicateOption {
                path: path.to_string(),
                name: option.name.clone(),
            });
        }

        match option.kind {
            OptionKind::SubCommandGroup => {
                if level != Level::Root {
                    return Err(SchemaError::InvalidNesting {
                        path: child_path,
                        reason: "groups are only allowed at the top level",
                    });
                }
                if option.options.iter().any(|o| o.kind != OptionKind::SubCommand) {
                    return Err(SchemaError::InvalidNesting {
                        path: child_path,
                        reason: "groups may only contain subcommands",
                    });
                }
                check_children(&child_path, &option.options, Level::Group)?;
            }
            OptionKind::SubCommand => {
                if level == Level::SubCommand {
                    return Err(SchemaError::InvalidNesting {
                        path: child_path,
                        reason: "subcommands only nest under groups",
                    });
                }
                check_children(&child_path, &option.options, Level::SubCommand)?;
            }
            kind => {
                if level == Level::Group {
                    return Err(SchemaError::InvalidNesting {
                        path: child_path,
                        reason: "groups may only contain subcommands",
                    });
                }
                if !option.options.is_empty() {
                    return Err(SchemaError::InvalidNesting {
                        path: child_path,
                        reason: "value options cannot have children",
                    });
                }
                if option.autocomplete && !kind.supports_autocomplete() {
                    return Err(SchemaError::InvalidNesting {
                        path: child_path,
                        reason: "autocomplete requires a string, integer or number option",
                    });
                }
                if option.required && optional_seen {
                    return Err(SchemaError::RequiredAfterOptional {
                        path: path.to_string(),
                        name: option.name.clone(),
                    });
                }
                optional_seen |= !option.required;
            }
        }
    }
    Ok(())
}

/// Where a command is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandScope {
    Global,
    Guild(GuildId),
}

impl std::fmt::Display for CommandScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Guild(id) => write!(f, "guild:{id}"),
        }
    }
}

/// A command as it exists on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredCommand {
    pub id: CommandId,
    pub scope: CommandScope,
    pub schema: CommandSchema,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist() -> CommandSchema {
        CommandSchema::new("whitelist", "Manage the whitelist")
            .option(
                CommandOption::subcommand("add", "Whitelist a user")
                    .option(CommandOption::new(OptionKind::User, "user", "The user").required()),
            )
            .option(
                CommandOption::group("config", "Configure the whitelist").option(
                    CommandOption::subcommand("set-role", "Set the default role")
                        .option(CommandOption::new(OptionKind::Role, "role", "The role").required()),
                ),
            )
    }

    #[test]
    fn test_valid_tree_passes() {
        assert_eq!(whitelist().validate(), Ok(()));
    }

    #[test]
    fn test_rejects_bad_names_and_descriptions() {
        let upper = CommandSchema::new("Ping", "Ping");
        assert!(matches!(upper.validate(), Err(SchemaError::InvalidName { .. })));

        let empty = CommandSchema::new("ping", "");
        assert!(matches!(empty.validate(), Err(SchemaError::InvalidDescription { .. })));

        let long = CommandSchema::new("ping", "x".repeat(101));
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_required_must_precede_optional() {
        let schema = CommandSchema::new("say", "Say")
            .option(CommandOption::new(OptionKind::Boolean, "ephemeral", "Hide"))
            .option(CommandOption::new(OptionKind::String, "message", "Text").required());
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::RequiredAfterOptional { name, .. }) if name == "message"
        ));
    }

    #[test]
    fn test_subcommand_cannot_nest_in_subcommand() {
        let schema = CommandSchema::new("a", "A").option(
            CommandOption::subcommand("b", "B").option(CommandOption::subcommand("c", "C")),
        );
        assert!(matches!(schema.validate(), Err(SchemaError::InvalidNesting { .. })));
    }

    #[test]
    fn test_duplicate_and_too_many_options() {
        let dup = CommandSchema::new("a", "A")
            .option(CommandOption::new(OptionKind::String, "x", "X"))
            .option(CommandOption::new(OptionKind::String, "x", "X"));
        assert!(matches!(dup.validate(), Err(SchemaError::DuplicateOption { .. })));

        let mut many = CommandSchema::new("a", "A");
        for i in 0..26 {
            many = many.option(CommandOption::new(OptionKind::String, format!("o{i}"), "O"));
        }
        assert!(matches!(many.validate(), Err(SchemaError::TooManyOptions { count: 26, .. })));
    }

    #[test]
    fn test_autocomplete_only_on_completable_kinds() {
        let ok = CommandSchema::new("feature", "F")
            .option(CommandOption::new(OptionKind::String, "feature", "F").autocomplete());
        assert!(ok.validate().is_ok());

        let bad = CommandSchema::new("feature", "F")
            .option(CommandOption::new(OptionKind::Boolean, "state", "S").autocomplete());
        assert!(bad.validate().is_err());
    }
}
