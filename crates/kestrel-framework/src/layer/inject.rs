use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Layer, Service};

use crate::context::{ContextKey, EventRequest};

/// Stores a shared value in the request context before calling inward.
///
/// The injected value is visible to every middleware and handler inside this
/// one, and to nothing outside it.
pub struct InjectLayer<T: ?Sized> {
    key: ContextKey<T>,
    value: Arc<T>,
}

impl<T: ?Sized> InjectLayer<T> {
    pub fn new(key: ContextKey<T>, value: Arc<T>) -> Self {
        Self { key, value }
    }
}

impl<T: ?Sized> Clone for InjectLayer<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: ?Sized, S> Layer<S> for InjectLayer<T> {
    type Service = InjectService<T, S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectService {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            inner,
        }
    }
}

/// The [`Service`] produced by [`InjectLayer`].
pub struct InjectService<T: ?Sized, S> {
    key: ContextKey<T>,
    value: Arc<T>,
    inner: S,
}

impl<T: ?Sized, S: Clone> Clone for InjectService<T, S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            inner: self.inner.clone(),
        }
    }
}

impl<E, T, S> Service<EventRequest<E>> for InjectService<T, S>
where
    E: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
    S: Service<EventRequest<E>, Response = (), Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: EventRequest<E>) -> Self::Future {
        req.ctx = req.ctx.with(&self.key, Arc::clone(&self.value));
        let mut inner = self.inner.clone();
        async move { inner.call(req).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use kestrel_core::{GuildId, GuildMemberAdd, Identifier, MemorySession, User, UserId};
    use parking_lot::Mutex;

    use crate::handler::EventFunc;
    use crate::layer::inject;
    use crate::middleware::{Middleware, compose};

    use super::*;

    trait Greeting: Send + Sync {
        fn text(&self) -> String;
    }

    struct Welcome;

    impl Greeting for Welcome {
        fn text(&self) -> String {
            "welcome".into()
        }
    }

    fn request() -> EventRequest<GuildMemberAdd> {
        EventRequest::new(
            Arc::new(MemorySession::default()),
            Arc::new(GuildMemberAdd {
                guild_id: GuildId::new("g1"),
                user: User {
                    id: UserId::new("u1"),
                    username: "newcomer".into(),
                    bot: false,
                },
            }),
        )
    }

    #[tokio::test]
    async fn test_injected_value_visible_inside_only() {
        let key: ContextKey<dyn Greeting> =
            ContextKey::new(Identifier::from_static("test", "service/greeting"));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let probe = |label: &'static str, seen: Arc<Mutex<Vec<String>>>| {
            let lookup = ContextKey::<dyn Greeting>::new(Identifier::from_static(
                "test",
                "service/greeting",
            ));
            Middleware::new(move |next: EventFunc<GuildMemberAdd>| {
                let seen = seen.clone();
                let lookup = lookup.clone();
                EventFunc::new(move |req| {
                    let found = req.ctx.get(&lookup).map(|g| g.text());
                    seen.lock().push(format!("{label}:{}", found.unwrap_or_default()));
                    next.call(req)
                })
            })
        };

        let greeting: Arc<dyn Greeting> = Arc::new(Welcome);
        let pipeline = compose(
            EventFunc::noop(),
            [
                probe("outer", seen.clone()),
                inject(key, greeting),
                probe("inner", seen.clone()),
            ],
        );
        pipeline.call(request()).await.unwrap();
        assert_eq!(*seen.lock(), vec!["outer:", "inner:welcome"]);
    }
}
