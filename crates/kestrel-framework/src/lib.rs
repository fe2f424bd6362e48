//! # Kestrel Framework
//!
//! Event pipelines for the Kestrel gateway.
//!
//! This layer provides:
//! - [`EventFunc`], the type-erased handler over one payload type
//! - [`Middleware`] and [`compose`], nesting handlers outermost-first
//! - [`DispatchAdapter`], the failure-containment boundary between a pipeline
//!   and the raw event registry
//! - built-in middlewares in [`layer`]: timing, error reporting, command
//!   routing, feature and module gates, context injection
//! - [`CommandRegistry`] for idempotent slash-command registration
//! - the feature-flag contract ([`FeatureStore`]) with in-memory stores
//!
//! ```rust,ignore
//! let id = Identifier::from_static("debug", "commands/ping");
//! let pipeline = Pipeline::new(id.clone(), ping)
//!     .with(performance(id.clone()))
//!     .with(error_wrap(id.clone()))
//!     .with(for_command("ping"))
//!     .build();
//!
//! registry.add::<InteractionCreate>(handle_event(pipeline));
//! ```

pub mod command;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod fault;
pub mod feature;
pub mod handler;
pub mod layer;
pub mod middleware;

#[cfg(test)]
pub(crate) mod test_support;

pub use command::{CommandRegistry, RegistrationReport, UNREGISTER_WORKERS, UnregisterReport};
pub use context::{ContextKey, EventContext, EventRequest};
pub use dispatch::{DispatchAdapter, DispatchOutcome, RawCallback, handle_event};
pub use error::{EventResult, FrameworkError, FrameworkResult};
pub use fault::{Fault, catch_fault};
pub use feature::{
    Feature, FeatureError, FeatureResult, FeatureStore, GuildToggles, InMemoryFeatureStore,
    ModuleStore,
};
pub use handler::EventFunc;
pub use layer::{
    error_wrap, feature_enabled, for_autocomplete, for_command, inject, module_enabled,
    performance,
};
pub use middleware::{Middleware, Pipeline, ServiceBuilderExt, compose};

pub use tower::BoxError;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kestrel_core::{
        ChannelId, CommandData, Embed, GuildId, Identifier, Interaction, InteractionCreate,
        InteractionId, InteractionKind, InteractionResponse, MemorySession, ResponseData,
        SessionOp, User, UserId, colors,
    };

    use super::*;

    fn interaction(name: &str) -> Arc<InteractionCreate> {
        Arc::new(InteractionCreate(Interaction {
            id: InteractionId::new(format!("i-{name}")),
            kind: InteractionKind::Command,
            guild_id: Some(GuildId::new("g1")),
            channel_id: ChannelId::new("c1"),
            user: User {
                id: UserId::new("u1"),
                username: "tester".into(),
                bot: false,
            },
            data: CommandData {
                name: name.into(),
                options: vec![],
            },
        }))
    }

    fn ping_handler() -> EventFunc<InteractionCreate> {
        EventFunc::new(|req: EventRequest<InteractionCreate>| async move {
            let embed = Embed::new().title("Pong").color(colors::INFO);
            req.session
                .respond(
                    &req.event.id,
                    InteractionResponse::message(ResponseData::embed(embed).ephemeral(true)),
                )
                .await?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_ping_pong_end_to_end() {
        let id = Identifier::from_static("debug", "commands/ping");
        let pipeline = compose(ping_handler(), [for_command("ping"), error_wrap(id)]);
        let session = Arc::new(MemorySession::default());
        let adapter = DispatchAdapter::new(pipeline);

        let outcome = adapter.run(session.clone(), interaction("pong")).await;
        assert_eq!(outcome, DispatchOutcome::Completed);
        assert!(session.calls().is_empty());

        let outcome = adapter.run(session.clone(), interaction("ping")).await;
        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(session.count(SessionOp::Respond), 1);
        let response = session.response(&InteractionId::new("i-ping")).unwrap();
        assert_eq!(response.embeds[0].title.as_deref(), Some("Pong"));
    }

    #[tokio::test]
    async fn test_commands_share_one_subscription() {
        let say = EventFunc::new(|req: EventRequest<InteractionCreate>| async move {
            req.session
                .respond(
                    &req.event.id,
                    InteractionResponse::message(ResponseData::content("said")),
                )
                .await?;
            Ok(())
        });
        let callbacks = [
            handle_event(compose(ping_handler(), [for_command("ping")])),
            handle_event(compose(say, [for_command("say")])),
        ];
        let session = Arc::new(MemorySession::default());
        let event = interaction("say");

        for callback in &callbacks {
            callback(session.clone(), event.clone()).await;
        }
        assert_eq!(session.count(SessionOp::Respond), 1);
        let response = session.response(&event.id).unwrap();
        assert_eq!(response.content, "said");
    }

    #[tokio::test]
    async fn test_error_wrap_outermost_reports_guard_failures() {
        let store: Arc<dyn FeatureStore> = Arc::new(InMemoryFeatureStore::new());
        let id = Identifier::from_static("extra", "commands/say");
        let mut event = (*interaction("say")).clone();
        event.0.guild_id = None;

        let pipeline = Pipeline::new(id.clone(), EventFunc::noop())
            .with(error_wrap(id.clone()))
            .with(for_command("say"))
            .with(feature_enabled(
                Identifier::from_static("extra", "features/say"),
                store,
            ))
            .build();
        let session = Arc::new(MemorySession::default());
        let outcome = DispatchAdapter::new(pipeline)
            .run(session.clone(), Arc::new(event))
            .await;

        assert_eq!(outcome, DispatchOutcome::Completed);
        let response = session.response(&InteractionId::new("i-say")).unwrap();
        let message = response.embeds[0].field_value("Error Message").unwrap();
        assert!(message.contains("no guild scope"));
    }
}
