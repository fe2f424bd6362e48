//! Debug module: liveness, error-path and feature-flag tooling.
//!
//! | Command        | Behaviour                                              |
//! |----------------|--------------------------------------------------------|
//! | `/ping`        | ephemeral embed with the server time                   |
//! | `/error-test`  | walks one branch of the error-report chain             |
//! | `/feature`     | reads or flips a feature flag for the current guild    |
//! | `/restart`     | owner-only; asks the runtime for a restart             |
//!
//! It also logs the `Ready` payload and answers `!ping` messages when the
//! `debug:features/message-ping` feature is enabled.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use kestrel_core::{
    AutocompleteChoice, CommandOption, CommandSchema, Embed, Identifier, InteractionCreate,
    InteractionResponse, MessageCreate, MessageSend, OptionKind, OptionValue, OptionsExt, Ready,
    UserId, colors,
};
use kestrel_framework::{
    ContextKey, EventFunc, EventRequest, EventResult, Feature, FeatureError, FeatureStore,
    Pipeline, feature_enabled, for_autocomplete, for_command, inject, performance,
};
use kestrel_runtime::{EventRegistry, GatewayConfig, Module, ShutdownHandle};
use kestrel_runtime::config::ErrorReportConfig;

use crate::util::{ADMINISTRATOR, defer, edit, guild_only, reply, reporting, require_guild, state_word};

const NAMESPACE: &str = "debug";

/// Most choices a platform accepts in one autocomplete response.
const MAX_CHOICES: usize = 25;

/// Gates the `!ping` message handler.
pub fn message_ping_feature() -> Identifier {
    Identifier::from_static(NAMESPACE, "features/message-ping")
}

/// Where the feature store is injected for `/feature`.
pub fn feature_store_key() -> ContextKey<dyn FeatureStore> {
    ContextKey::new(Identifier::from_static(NAMESPACE, "services/features"))
}

#[derive(Debug, Error)]
enum DebugError {
    #[error("this is a made up error")]
    MadeUp,

    #[error("you are not authorized to use this command")]
    NotOwner,
}

/// The debug module.
pub struct DebugModule {
    owners: Arc<Vec<UserId>>,
    errors: ErrorReportConfig,
    features: Arc<dyn FeatureStore>,
    shutdown: ShutdownHandle,
}

impl DebugModule {
    pub fn new(
        config: &GatewayConfig,
        features: Arc<dyn FeatureStore>,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            owners: Arc::new(config.owners.clone()),
            errors: config.errors.clone(),
            features,
            shutdown,
        }
    }

    /// Features this module consults; register them with the feature store.
    pub fn features() -> Vec<Feature> {
        vec![Feature::new(
            message_ping_feature(),
            "Reply \"pong\" to messages containing !ping",
        )]
    }

    fn command(&self, name: &'static str, handler: EventFunc<InteractionCreate>) -> EventFunc<InteractionCreate> {
        let id = Identifier::from_static(NAMESPACE, name);
        let command = name.trim_start_matches("commands/");
        Pipeline::new(id.clone(), handler)
            .with(performance(id.clone()))
            .with(reporting(&self.errors, id))
            .with(for_command(command))
            .build()
    }
}

impl Module for DebugModule {
    fn name(&self) -> &str {
        NAMESPACE
    }

    fn register(&self, registry: &mut EventRegistry) {
        let setup = Identifier::from_static(NAMESPACE, "events/setup");
        registry.handle(
            Pipeline::new(setup.clone(), EventFunc::new(handle_ready))
                .with(performance(setup))
                .build(),
        );

        registry.handle(self.command("commands/ping", EventFunc::new(handle_ping)));
        registry.handle(self.command("commands/error-test", EventFunc::new(handle_error_test)));

        let feature = Identifier::from_static(NAMESPACE, "commands/feature");
        registry.handle(
            Pipeline::new(feature.clone(), EventFunc::new(handle_feature))
                .with(performance(feature.clone()))
                .with(reporting(&self.errors, feature))
                .with(for_command("feature"))
                .with(inject(feature_store_key(), self.features.clone()))
                .build(),
        );

        let complete = Identifier::from_static(NAMESPACE, "autocomplete/feature");
        registry.handle(
            Pipeline::new(complete.clone(), EventFunc::new(handle_feature_autocomplete))
                .with(performance(complete.clone()))
                .with(reporting(&self.errors, complete))
                .with(for_autocomplete("feature"))
                .with(inject(feature_store_key(), self.features.clone()))
                .build(),
        );

        registry.handle(self.command(
            "commands/restart",
            restart_handler(self.owners.clone(), self.shutdown.clone()),
        ));

        let ping = Identifier::from_static(NAMESPACE, "events/message-ping");
        registry.handle(
            Pipeline::new(ping.clone(), EventFunc::new(handle_message_ping))
                .with(performance(ping))
                .with(guild_only())
                .with(feature_enabled(message_ping_feature(), self.features.clone()))
                .build(),
        );
    }

    fn commands(&self) -> Vec<CommandSchema> {
        let ephemeral = |what: &str| {
            CommandOption::new(
                OptionKind::Boolean,
                "ephemeral",
                format!("Whether or not the {what} should be ephemeral."),
            )
        };
        let feature = |what: &str| {
            CommandOption::new(OptionKind::String, "feature", format!("The feature to {what}."))
                .required()
                .autocomplete()
        };

        vec![
            CommandSchema::new("ping", "Ping the bot to see if it's alive!"),
            CommandSchema::new("error-test", "Development command for testing error handling")
                .default_member_permissions(ADMINISTRATOR)
                .option(CommandOption::subcommand(
                    "no-reply",
                    "Throws error before sending a reply.",
                ))
                .option(
                    CommandOption::subcommand("reply", "Throws error after replying to interaction.")
                        .option(ephemeral("reply")),
                )
                .option(
                    CommandOption::subcommand("defered", "Defer a response before throwing an error.")
                        .option(ephemeral("defer")),
                )
                .option(CommandOption::subcommand(
                    "panic",
                    "Panics inside the handler; the report comes from the fault path.",
                )),
            CommandSchema::new("feature", "Manage features for the bot.")
                .default_member_permissions(ADMINISTRATOR)
                .dm_permission(false)
                .option(
                    CommandOption::subcommand("get", "Get the state of a feature.")
                        .option(feature("get the state of")),
                )
                .option(
                    CommandOption::subcommand("set", "Set the state of a feature.")
                        .option(feature("set the state of"))
                        .option(
                            CommandOption::new(
                                OptionKind::Boolean,
                                "state",
                                "The state to set the feature to.",
                            )
                            .required(),
                        ),
                ),
            CommandSchema::new("restart", "Restarts the bot."),
        ]
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_ready(req: EventRequest<Ready>) -> EventResult {
    let ready = &req.event;
    info!(
        user = %ready.user.username,
        id = %ready.user.id,
        guilds = ready.guilds.len(),
        "logged in"
    );
    for guild in &ready.guilds {
        debug!(guild = %guild, "guild available");
    }
    Ok(())
}

async fn handle_ping(req: EventRequest<InteractionCreate>) -> EventResult {
    let embed = Embed::new()
        .title("Pong! :3")
        .color(colors::INFO)
        .description(format!(
            "I am alive and well! Server time is <t:{}:f>.",
            Utc::now().timestamp()
        ));
    reply(&req, embed, true).await
}

async fn handle_error_test(req: EventRequest<InteractionCreate>) -> EventResult {
    let (path, options) = req.event.data.route();
    match path.first().copied() {
        Some("reply") => {
            let embed = Embed::new()
                .title("Meow! :3")
                .color(colors::RESULT)
                .description(
                    "This is a funny & quirky response! An error is about to occur after this, \
                     depending on the handling something might or not happen.",
                );
            reply(&req, embed, options.boolean_or("ephemeral", true)).await?;
        }
        Some("defered") => defer(&req, options.boolean_or("ephemeral", true)).await?,
        Some("panic") => {
            defer(&req, true).await?;
            let embed = Embed::new()
                .title("Welp this hurts!")
                .color(colors::RESULT)
                .description("A panic is going to happen in my runtime in the next instants.");
            edit(&req, embed).await?;
            panic!("This is a fake panic! Coming from error test command.");
        }
        _ => {}
    }
    Err(DebugError::MadeUp.into())
}

async fn handle_feature(req: EventRequest<InteractionCreate>) -> EventResult {
    let store = req.ctx.fetch(&feature_store_key())?;
    let guild = require_guild(&req)?;
    let (path, options) = req.event.data.route();
    let name = options.string("feature")?;
    let feature = Identifier::parse(name)?;

    let outcome = match path.first().copied() {
        Some("get") => store
            .get(&req.ctx, &feature, &guild)
            .await
            .map(|enabled| {
                Embed::new()
                    .title("Feature state")
                    .color(colors::INFO)
                    .description(format!(
                        "The feature `{name}` is currently {}.",
                        state_word(enabled)
                    ))
            }),
        Some("set") => {
            let state = options.boolean("state")?;
            store
                .set(&req.ctx, &feature, &guild, state)
                .await
                .map(|()| {
                    info!(feature = %feature, guild = %guild, enabled = state, "feature updated");
                    Embed::new()
                        .title("Feature state updated!")
                        .color(colors::SUCCESS)
                        .description(format!("The feature `{name}` is now {}.", state_word(state)))
                })
        }
        _ => return Ok(()),
    };

    let embed = match outcome {
        Ok(embed) => embed,
        Err(FeatureError::NotRegistered(_)) => Embed::new()
            .title("Feature not registered!")
            .color(colors::ERROR)
            .description(format!(
                "The feature `{name}` is not registered for this guild."
            )),
        Err(err) => return Err(err.into()),
    };
    reply(&req, embed, true).await
}

async fn handle_feature_autocomplete(req: EventRequest<InteractionCreate>) -> EventResult {
    let store = req.ctx.fetch(&feature_store_key())?;
    let typed = match req.event.data.focused().map(|o| &o.value) {
        Some(OptionValue::String(typed)) => typed.as_str(),
        _ => "",
    };

    let mut names: Vec<String> = store
        .list(&req.ctx)
        .await?
        .into_iter()
        .map(|feature| feature.identifier.to_string())
        .filter(|name| name.contains(typed))
        .collect();
    names.sort();

    let choices = names
        .into_iter()
        .take(MAX_CHOICES)
        .map(|name| AutocompleteChoice::new(name.clone(), name))
        .collect();
    req.session
        .respond(&req.event.id, InteractionResponse::Autocomplete(choices))
        .await?;
    Ok(())
}

fn restart_handler(
    owners: Arc<Vec<UserId>>,
    shutdown: ShutdownHandle,
) -> EventFunc<InteractionCreate> {
    EventFunc::new(move |req: EventRequest<InteractionCreate>| {
        let owners = owners.clone();
        let shutdown = shutdown.clone();
        async move {
            if !owners.contains(&req.event.user.id) {
                return Err(DebugError::NotOwner.into());
            }

            let embed = Embed::new()
                .title("Restarting...")
                .color(colors::INFO)
                .description("The bot is now restarting. Please wait a moment.");
            reply(&req, embed, true).await?;

            info!(user = %req.event.user.id, "restart command received");
            shutdown.restart();
            Ok(())
        }
    })
}

async fn handle_message_ping(req: EventRequest<MessageCreate>) -> EventResult {
    let message = &req.event;
    if message.author.bot || !message.content.contains("!ping") {
        return Ok(());
    }
    req.session
        .send_message(
            &message.channel_id,
            MessageSend::content("pong").reply_to(message.id.clone()),
        )
        .await?;
    Ok(())
}
