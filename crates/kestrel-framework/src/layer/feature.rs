use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::{debug, warn};

use kestrel_core::{Event, Identifier};

use crate::context::EventRequest;
use crate::error::FrameworkError;
use crate::feature::{FeatureStore, ModuleStore};

// =============================================================================
// Feature gate
// =============================================================================

/// Forwards only when a feature flag is enabled for the event's guild.
///
/// Events without a guild scope fail with [`FrameworkError::MissingGuild`].
/// A store failure is treated as "off": the event is skipped and the failure
/// logged.
#[derive(Clone)]
pub struct FeatureLayer {
    feature: Identifier,
    store: Arc<dyn FeatureStore>,
}

impl FeatureLayer {
    pub fn new(feature: Identifier, store: Arc<dyn FeatureStore>) -> Self {
        Self { feature, store }
    }
}

impl<S> Layer<S> for FeatureLayer {
    type Service = FeatureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FeatureService {
            feature: self.feature.clone(),
            store: Arc::clone(&self.store),
            inner,
        }
    }
}

/// The [`Service`] produced by [`FeatureLayer`].
#[derive(Clone)]
pub struct FeatureService<S> {
    feature: Identifier,
    store: Arc<dyn FeatureStore>,
    inner: S,
}

impl<E, S> Service<EventRequest<E>> for FeatureService<S>
where
    E: Event,
    S: Service<EventRequest<E>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EventRequest<E>) -> Self::Future {
        let feature = self.feature.clone();
        let store = Arc::clone(&self.store);
        let mut inner = self.inner.clone();

        async move {
            let Some(guild) = req.guild_id().cloned() else {
                return Err(FrameworkError::MissingGuild { event: E::NAME }.into());
            };
            match store.get(&req.ctx, &feature, &guild).await {
                Ok(true) => inner.call(req).await,
                Ok(false) => {
                    debug!(feature = %feature, guild_id = %guild, "feature disabled, skipping");
                    Ok(())
                }
                Err(err) => {
                    warn!(feature = %feature, guild_id = %guild, error = %err, "feature lookup failed, treating as disabled");
                    Ok(())
                }
            }
        }
        .boxed()
    }
}

// =============================================================================
// Module gate
// =============================================================================

/// Forwards only when a module is enabled for the event's guild.
///
/// Same failure policy as [`FeatureLayer`].
#[derive(Clone)]
pub struct ModuleLayer {
    module: String,
    store: Arc<dyn ModuleStore>,
}

impl ModuleLayer {
    pub fn new(module: impl Into<String>, store: Arc<dyn ModuleStore>) -> Self {
        Self {
            module: module.into(),
            store,
        }
    }
}

impl<S> Layer<S> for ModuleLayer {
    type Service = ModuleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ModuleService {
            module: self.module.clone(),
            store: Arc::clone(&self.store),
            inner,
        }
    }
}

/// The [`Service`] produced by [`ModuleLayer`].
#[derive(Clone)]
pub struct ModuleService<S> {
    module: String,
    store: Arc<dyn ModuleStore>,
    inner: S,
}

impl<E, S> Service<EventRequest<E>> for ModuleService<S>
where
    E: Event,
    S: Service<EventRequest<E>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EventRequest<E>) -> Self::Future {
        let module = self.module.clone();
        let store = Arc::clone(&self.store);
        let mut inner = self.inner.clone();

        async move {
            let Some(guild) = req.guild_id().cloned() else {
                return Err(FrameworkError::MissingGuild { event: E::NAME }.into());
            };
            match store.is_module_enabled(&req.ctx, &module, &guild).await {
                Ok(true) => inner.call(req).await,
                Ok(false) => {
                    debug!(module = %module, guild_id = %guild, "module disabled, skipping");
                    Ok(())
                }
                Err(err) => {
                    warn!(module = %module, guild_id = %guild, error = %err, "module lookup failed, treating as disabled");
                    Ok(())
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kestrel_core::{
        ChannelId, GuildId, MemorySession, Message, MessageCreate, MessageId, User, UserId,
    };

    use crate::context::EventContext;
    use crate::feature::{Feature, GuildToggles, InMemoryFeatureStore};
    use crate::handler::EventFunc;
    use crate::layer::{feature_enabled, module_enabled};
    use crate::middleware::compose;

    use super::*;

    fn message(guild: Option<&str>) -> EventRequest<MessageCreate> {
        EventRequest::new(
            Arc::new(MemorySession::default()),
            Arc::new(MessageCreate(Message {
                id: MessageId::new("m1"),
                channel_id: ChannelId::new("c1"),
                guild_id: guild.map(GuildId::new),
                author: User {
                    id: UserId::new("u1"),
                    username: "u".into(),
                    bot: false,
                },
                content: "!ping".into(),
                timestamp: chrono::Utc::now(),
            })),
        )
    }

    fn counting(count: Arc<AtomicUsize>) -> EventFunc<MessageCreate> {
        EventFunc::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
    }

    fn flag() -> Identifier {
        Identifier::from_static("debug", "features/message-ping")
    }

    #[tokio::test]
    async fn test_feature_gate_per_guild() {
        let store = Arc::new(InMemoryFeatureStore::new().with_feature(Feature::new(flag(), "ping")));
        store
            .set(&EventContext::new(), &flag(), &GuildId::new("g1"), true)
            .await
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let gated = compose(
            counting(count.clone()),
            [feature_enabled(flag(), store.clone())],
        );

        gated.call(message(Some("g1"))).await.unwrap();
        gated.call(message(Some("g2"))).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_feature_gate_requires_guild() {
        let store = Arc::new(InMemoryFeatureStore::new().with_feature(Feature::new(flag(), "ping")));
        let gated = compose(EventFunc::noop(), [feature_enabled(flag(), store)]);

        let err = gated.call(message(None)).await.unwrap_err();
        let err = err.downcast_ref::<FrameworkError>().unwrap();
        assert!(matches!(err, FrameworkError::MissingGuild { event } if *event == MessageCreate::NAME));
    }

    #[tokio::test]
    async fn test_unregistered_feature_fails_closed() {
        let count = Arc::new(AtomicUsize::new(0));
        let gated = compose(
            counting(count.clone()),
            [feature_enabled(flag(), Arc::new(InMemoryFeatureStore::new()))],
        );
        assert!(gated.call(message(Some("g1"))).await.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_module_gate() {
        let toggles = Arc::new(GuildToggles::new());
        toggles
            .set_module_enabled(&EventContext::new(), "ledger", &GuildId::new("g1"), true)
            .await
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let gated = compose(counting(count.clone()), [module_enabled("ledger", toggles)]);
        gated.call(message(Some("g1"))).await.unwrap();
        gated.call(message(Some("g2"))).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
