//! Extra module: small conveniences for guild admins.
//!
//! - `/say <message>` posts a message as the bot in the current channel.
//! - `/create-forum <name>` creates a forum channel.
//! - Twitter/X status links in messages are answered with `vxtwitter.com`
//!   links that embed properly, when `extra:features/link-fixer` is enabled.

use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use regex_lite::Regex;

use kestrel_core::{
    ChannelKind, CommandOption, CommandSchema, Embed, Identifier, InteractionCreate,
    MessageCreate, MessageSend, OptionKind, OptionsExt, colors,
};
use kestrel_framework::{
    EventFunc, EventRequest, EventResult, Feature, FeatureStore, Pipeline, feature_enabled,
    for_command, performance,
};
use kestrel_runtime::config::ErrorReportConfig;
use kestrel_runtime::{EventRegistry, GatewayConfig, Module};

use crate::util::{ADMINISTRATOR, defer, edit, guild_only, reporting, require_guild};

const NAMESPACE: &str = "extra";

const FIXED_LINKS_HEADER: &str = "I have fixed the Twitter embeds for you ;3";

/// Capture group 4 is the `<user>/status/<id>` path.
static STATUS_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://)?(www\.)?(twitter|x)\.com/([a-zA-Z0-9_]+/status/[0-9]+)")
        .expect("status link pattern compiles")
});

/// Gates the link fixer.
pub fn link_fixer_feature() -> Identifier {
    Identifier::from_static(NAMESPACE, "features/link-fixer")
}

/// The extra module.
pub struct ExtraModule {
    errors: ErrorReportConfig,
    features: Arc<dyn FeatureStore>,
}

impl ExtraModule {
    pub fn new(config: &GatewayConfig, features: Arc<dyn FeatureStore>) -> Self {
        Self {
            errors: config.errors.clone(),
            features,
        }
    }

    /// Features this module consults.
    pub fn features() -> Vec<Feature> {
        vec![Feature::new(
            link_fixer_feature(),
            "Answer Twitter/X status links with embeddable links",
        )]
    }
}

impl Module for ExtraModule {
    fn name(&self) -> &str {
        NAMESPACE
    }

    fn register(&self, registry: &mut EventRegistry) {
        let commands: [(&'static str, &str, EventFunc<InteractionCreate>); 2] = [
            ("commands/say", "say", EventFunc::new(handle_say)),
            (
                "commands/create-forum",
                "create-forum",
                EventFunc::new(handle_create_forum),
            ),
        ];
        for (id, name, handler) in commands {
            let id = Identifier::from_static(NAMESPACE, id);
            registry.handle(
                Pipeline::new(id.clone(), handler)
                    .with(performance(id.clone()))
                    .with(reporting(&self.errors, id))
                    .with(for_command(name))
                    .build(),
            );
        }

        let fixer = Identifier::from_static(NAMESPACE, "events/link-fixer");
        registry.handle(
            Pipeline::new(fixer.clone(), EventFunc::new(handle_status_links))
                .with(performance(fixer))
                .with(guild_only())
                .with(feature_enabled(link_fixer_feature(), self.features.clone()))
                .build(),
        );
    }

    fn commands(&self) -> Vec<CommandSchema> {
        vec![
            CommandSchema::new("say", "Say something as the bot!")
                .default_member_permissions(ADMINISTRATOR)
                .dm_permission(false)
                .option(
                    CommandOption::new(OptionKind::String, "message", "The message to say.")
                        .required(),
                ),
            CommandSchema::new("create-forum", "Creates a forum channel.")
                .default_member_permissions(ADMINISTRATOR)
                .dm_permission(false)
                .option(
                    CommandOption::new(OptionKind::String, "name", "The name of the forum.")
                        .required(),
                ),
        ]
    }
}

async fn handle_say(req: EventRequest<InteractionCreate>) -> EventResult {
    defer(&req, true).await?;

    let content = req.event.data.options.string("message")?;
    req.session
        .send_message(&req.event.channel_id, MessageSend::content(content))
        .await?;

    let embed = Embed::new()
        .title("Message Sent")
        .description(content)
        .color(colors::SUCCESS);
    edit(&req, embed).await
}

async fn handle_create_forum(req: EventRequest<InteractionCreate>) -> EventResult {
    let guild = require_guild(&req)?;
    defer(&req, true).await?;

    let name = req.event.data.options.string("name")?;
    let channel = req
        .session
        .create_channel(&guild, name, ChannelKind::Forum)
        .await?;

    let embed = Embed::new()
        .title("Forum Created")
        .description(format!("Forum created at <#{}>.", channel.id))
        .color(colors::SUCCESS);
    edit(&req, embed).await
}

/// Returns the `<user>/status/<id>` path of every status link in `content`.
fn status_paths(content: &str) -> Vec<&str> {
    STATUS_LINK
        .captures_iter(content)
        .filter_map(|caps| caps.get(4))
        .map(|m| m.as_str())
        .collect()
}

async fn handle_status_links(req: EventRequest<MessageCreate>) -> EventResult {
    let message = &req.event;
    if message.author.bot {
        return Ok(());
    }

    let paths = status_paths(&message.content);
    if paths.is_empty() {
        return Ok(());
    }

    let mut content = format!("{FIXED_LINKS_HEADER}\n");
    for path in paths {
        let _ = writeln!(content, "https://vxtwitter.com/{path}");
    }
    req.session
        .send_message(
            &message.channel_id,
            MessageSend::content(content).reply_to(message.id.clone()),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{
        Guild, GuildId, InteractionId, MemorySession, OptionValue, SessionOp,
    };
    use kestrel_framework::{EventContext, InMemoryFeatureStore};

    use crate::util::testing::{command, deliver, message, opt, user};

    fn setup() -> (Arc<MemorySession>, Arc<InMemoryFeatureStore>, EventRegistry) {
        let features = Arc::new(InMemoryFeatureStore::new());
        for feature in ExtraModule::features() {
            features.register(feature);
        }
        let module = ExtraModule::new(&GatewayConfig::default(), features.clone());
        let mut registry = EventRegistry::new();
        module.register(&mut registry);

        let guild = Guild {
            id: GuildId::new("g1"),
            name: "Test Guild".into(),
        };
        let session = MemorySession::default().with_guild(guild, vec![]);
        (Arc::new(session), features, registry)
    }

    #[test]
    fn test_status_paths() {
        let content = "look https://x.com/someone/status/123 and \
                       twitter.com/other_one/status/456?s=20 but not x.com/home";
        assert_eq!(
            status_paths(content),
            vec!["someone/status/123", "other_one/status/456"]
        );
        assert!(status_paths("https://example.com/a/status/1").is_empty());
    }

    #[tokio::test]
    async fn test_say_defers_sends_and_edits() {
        let (session, _, registry) = setup();
        let event = command(
            "say",
            vec![opt("message", OptionValue::String("hello there".into()))],
        );
        deliver(&registry, &session, event).await;

        let sent = session.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.as_str(), "c1");
        assert_eq!(sent[0].1.content, "hello there");

        let response = session.response(&InteractionId::new("i-say")).unwrap();
        assert!(response.flags.ephemeral);
        assert!(!response.flags.loading);
        assert_eq!(response.embeds[0].title.as_deref(), Some("Message Sent"));
        assert_eq!(response.embeds[0].description.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn test_create_forum() {
        let (session, _, registry) = setup();
        let event = command(
            "create-forum",
            vec![opt("name", OptionValue::String("ideas".into()))],
        );
        deliver(&registry, &session, event).await;

        let channel = session
            .channels()
            .into_iter()
            .find(|c| c.name == "ideas")
            .unwrap();
        assert_eq!(channel.kind, ChannelKind::Forum);

        let response = session.response(&InteractionId::new("i-create-forum")).unwrap();
        let description = response.embeds[0].description.clone().unwrap();
        assert_eq!(description, format!("Forum created at <#{}>.", channel.id));
    }

    #[tokio::test]
    async fn test_create_forum_failure_is_reported() {
        let (session, _, registry) = setup();
        session.fail_next(SessionOp::CreateChannel);
        let event = command(
            "create-forum",
            vec![opt("name", OptionValue::String("ideas".into()))],
        );
        deliver(&registry, &session, event).await;

        let response = session.response(&InteractionId::new("i-create-forum")).unwrap();
        assert!(response.embeds[0].field_value("Error Message").is_some());
    }

    #[tokio::test]
    async fn test_link_fixer_gated_and_replies() {
        let (session, features, registry) = setup();
        let post = MessageCreate(message(
            "m1",
            user("u2", false),
            "https://twitter.com/someone/status/42",
        ));

        deliver(&registry, &session, post.clone()).await;
        assert!(session.sent_messages().is_empty());

        features
            .set(&EventContext::new(), &link_fixer_feature(), &GuildId::new("g1"), true)
            .await
            .unwrap();
        deliver(&registry, &session, post).await;

        let sent = session.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1.content,
            format!("{FIXED_LINKS_HEADER}\nhttps://vxtwitter.com/someone/status/42\n")
        );
        assert_eq!(sent[0].1.reply_to.as_ref().map(|m| m.as_str()), Some("m1"));
    }

    #[tokio::test]
    async fn test_link_fixer_skips_direct_messages() {
        let (session, _, registry) = setup();
        let mut dm = message("m1", user("u2", false), "x.com/someone/status/42");
        dm.guild_id = None;
        deliver(&registry, &session, MessageCreate(dm)).await;

        assert!(session.calls().is_empty());
    }
}
