use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::trace;

use kestrel_core::{InteractionCreate, InteractionKind};

use crate::context::EventRequest;

/// Forwards only interactions for one command name and invocation kind.
///
/// Anything else is skipped with `Ok(())`, so many command pipelines can
/// share one `InteractionCreate` subscription.
#[derive(Debug, Clone)]
pub struct CommandLayer {
    name: String,
    kind: InteractionKind,
}

impl CommandLayer {
    pub fn new(name: impl Into<String>, kind: InteractionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl<S> Layer<S> for CommandLayer {
    type Service = CommandService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CommandService {
            name: self.name.clone(),
            kind: self.kind,
            inner,
        }
    }
}

/// The [`Service`] produced by [`CommandLayer`].
#[derive(Debug, Clone)]
pub struct CommandService<S> {
    name: String,
    kind: InteractionKind,
    inner: S,
}

impl<S> Service<EventRequest<InteractionCreate>> for CommandService<S>
where
    S: Service<EventRequest<InteractionCreate>, Response = (), Error = BoxError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EventRequest<InteractionCreate>) -> Self::Future {
        if req.event.kind != self.kind || req.event.data.name != self.name {
            trace!(command = %req.event.data.name, "skipping interaction for another command");
            return async { Ok(()) }.boxed();
        }
        let mut inner = self.inner.clone();
        async move { inner.call(req).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kestrel_core::{
        ChannelId, CommandData, Interaction, InteractionId, MemorySession, User, UserId,
    };

    use crate::handler::EventFunc;
    use crate::layer::{for_autocomplete, for_command};
    use crate::middleware::compose;

    use super::*;

    fn request(name: &str, kind: InteractionKind) -> EventRequest<InteractionCreate> {
        EventRequest::new(
            Arc::new(MemorySession::default()),
            Arc::new(InteractionCreate(Interaction {
                id: InteractionId::new("i1"),
                kind,
                guild_id: None,
                channel_id: ChannelId::new("c1"),
                user: User {
                    id: UserId::new("u1"),
                    username: "u".into(),
                    bot: false,
                },
                data: CommandData {
                    name: name.into(),
                    options: vec![],
                },
            })),
        )
    }

    fn counting(count: Arc<AtomicUsize>) -> EventFunc<InteractionCreate> {
        EventFunc::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
    }

    #[tokio::test]
    async fn test_only_matching_command_reaches_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let ping = compose(counting(count.clone()), [for_command("ping")]);

        assert!(ping.call(request("say", InteractionKind::Command)).await.is_ok());
        assert!(ping.call(request("ping", InteractionKind::Autocomplete)).await.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert!(ping.call(request("ping", InteractionKind::Command)).await.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_autocomplete_guard_ignores_invocations() {
        let count = Arc::new(AtomicUsize::new(0));
        let complete = compose(counting(count.clone()), [for_autocomplete("feature")]);

        complete.call(request("feature", InteractionKind::Command)).await.unwrap();
        complete.call(request("feature", InteractionKind::Autocomplete)).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
