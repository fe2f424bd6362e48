use std::task::{Context, Poll};
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};
use tracing::info;

use kestrel_core::Identifier;

use crate::context::EventRequest;

/// Logs how long the wrapped pipeline took, whatever its outcome.
#[derive(Debug, Clone)]
pub struct PerformanceLayer {
    tag: Identifier,
}

impl PerformanceLayer {
    pub fn new(tag: Identifier) -> Self {
        Self { tag }
    }
}

impl<S> Layer<S> for PerformanceLayer {
    type Service = PerformanceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PerformanceService {
            tag: self.tag.clone(),
            inner,
        }
    }
}

/// The [`Service`] produced by [`PerformanceLayer`].
#[derive(Debug, Clone)]
pub struct PerformanceService<S> {
    tag: Identifier,
    inner: S,
}

impl<E, S> Service<EventRequest<E>> for PerformanceService<S>
where
    E: Send + Sync + 'static,
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
        let tag = self.tag.clone();
        let mut inner = self.inner.clone();

        async move {
            let started = Instant::now();
            let result = inner.call(req).await;
            let elapsed = started.elapsed();
            info!(
                identifier = %tag,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                ok = result.is_ok(),
                "finished event execution for {tag}, took {elapsed:?}"
            );
            result
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kestrel_core::{GuildBanAdd, GuildId, MemorySession, User, UserId};

    use crate::handler::EventFunc;
    use crate::middleware::compose;
    use crate::layer::performance;

    fn request() -> EventRequest<GuildBanAdd> {
        EventRequest::new(
            Arc::new(MemorySession::default()),
            Arc::new(GuildBanAdd {
                guild_id: GuildId::new("g1"),
                user: User {
                    id: UserId::new("u1"),
                    username: "troll".into(),
                    bot: false,
                },
            }),
        )
    }

    #[tokio::test]
    async fn test_result_is_returned_unchanged() {
        let tag = Identifier::from_static("test", "perf");
        let ok = compose(EventFunc::noop(), [performance(tag.clone())]);
        assert!(ok.call(request()).await.is_ok());

        let failing = EventFunc::<GuildBanAdd>::new(|_| async { Err("slow and wrong".into()) });
        let err = compose(failing, [performance(tag)])
            .call(request())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "slow and wrong");
    }
}
