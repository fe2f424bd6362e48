//! Middleware and pipeline composition.
//!
//! A [`Middleware<E>`] transforms one [`EventFunc<E>`] into another. Given a
//! base handler `H` and middlewares `[A, B]`, [`compose`] produces
//! `A(B(H))`: **A is the outermost wrapper**. It sees the request first and
//! gets the final say over the result.
//!
//! ```text
//!   request ──▶ A ──▶ B ──▶ H
//!   result  ◀── A ◀── B ◀── H
//! ```
//!
//! Composing with no middlewares returns the base handler itself.
//!
//! Pipelines can be written either as a list, or as a tower
//! [`ServiceBuilder`] whose first `.layer()` is likewise the outermost:
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new(id.clone(), ping)
//!     .with(error_wrap(id.clone()))
//!     .with(for_command("ping"))
//!     .build();
//!
//! let same_shape = ServiceBuilder::new()
//!     .layer(error_wrap(id.clone()))
//!     .layer(for_command("ping"))
//!     .event_func(ping);
//! ```

use std::fmt;
use std::sync::Arc;

use tower::{BoxError, Layer, Service, ServiceBuilder};
use tracing::{Instrument, info_span};

use kestrel_core::Identifier;

use crate::context::EventRequest;
use crate::handler::EventFunc;

type BoxedTransform<E> = dyn Fn(EventFunc<E>) -> EventFunc<E> + Send + Sync;

/// A transform from one handler to another over the same event type.
pub struct Middleware<E> {
    transform: Arc<BoxedTransform<E>>,
}

impl<E> Clone for Middleware<E> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<E> fmt::Debug for Middleware<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("event", &std::any::type_name::<E>())
            .finish_non_exhaustive()
    }
}

impl<E: Send + Sync + 'static> Middleware<E> {
    /// Creates a middleware from a transform function.
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(EventFunc<E>) -> EventFunc<E> + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
        }
    }

    /// Adapts a tower [`Layer`].
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<EventFunc<E>> + Send + Sync + 'static,
        L::Service: Service<EventRequest<E>, Response = (), Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<EventRequest<E>>>::Future: Send + 'static,
    {
        Self::new(move |next| EventFunc::from_service(layer.layer(next)))
    }

    /// Wraps `next` with this middleware.
    pub fn apply(&self, next: EventFunc<E>) -> EventFunc<E> {
        (self.transform)(next)
    }
}

impl<E: Send + Sync + 'static> Layer<EventFunc<E>> for Middleware<E> {
    type Service = EventFunc<E>;

    fn layer(&self, inner: EventFunc<E>) -> Self::Service {
        self.apply(inner)
    }
}

/// Composes `base` with `middlewares`, the first listed being outermost.
pub fn compose<E, I>(base: EventFunc<E>, middlewares: I) -> EventFunc<E>
where
    E: Send + Sync + 'static,
    I: IntoIterator<Item = Middleware<E>>,
    I::IntoIter: DoubleEndedIterator,
{
    middlewares
        .into_iter()
        .rev()
        .fold(base, |next, middleware| middleware.apply(next))
}

// =============================================================================
// Pipeline
// =============================================================================

/// A named pipeline under construction.
///
/// [`build`](Pipeline::build) composes the middlewares and runs every call
/// inside a `pipeline` span carrying the identifier.
pub struct Pipeline<E> {
    id: Identifier,
    base: EventFunc<E>,
    middlewares: Vec<Middleware<E>>,
}

impl<E: Send + Sync + 'static> Pipeline<E> {
    pub fn new(id: Identifier, base: EventFunc<E>) -> Self {
        Self {
            id,
            base,
            middlewares: Vec::new(),
        }
    }

    /// Appends a middleware inside the ones already added.
    pub fn with(mut self, middleware: Middleware<E>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Returns the pipeline's identifier.
    pub fn identifier(&self) -> &Identifier {
        &self.id
    }

    /// Composes the pipeline into a single handler.
    pub fn build(self) -> EventFunc<E> {
        let composed = compose(self.base, self.middlewares);
        let id = self.id;
        EventFunc::new(move |req| {
            let span = info_span!("pipeline", identifier = %id);
            composed.call(req).instrument(span)
        })
    }
}

impl<E> fmt::Debug for Pipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

// =============================================================================
// ServiceBuilderExt
// =============================================================================

/// Extension trait for [`tower::ServiceBuilder`] that finishes a stack of
/// layers with a base handler and erases the result.
pub trait ServiceBuilderExt<L> {
    /// Applies every stacked layer to `handler`, outermost first, and erases
    /// the composed service into an [`EventFunc`].
    fn event_func<E>(self, handler: EventFunc<E>) -> EventFunc<E>
    where
        E: Send + Sync + 'static,
        L: Layer<EventFunc<E>>,
        L::Service: Service<EventRequest<E>, Response = (), Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<EventRequest<E>>>::Future: Send + 'static;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn event_func<E>(self, handler: EventFunc<E>) -> EventFunc<E>
    where
        E: Send + Sync + 'static,
        L: Layer<EventFunc<E>>,
        L::Service: Service<EventRequest<E>, Response = (), Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<EventRequest<E>>>::Future: Send + 'static,
    {
        EventFunc::from_service(self.service(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{
        ChannelId, Guild, GuildId, MemorySession, Message, MessageCreate, MessageId, User, UserId,
    };
    use parking_lot::Mutex;
    use tokio_test::assert_ok;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(name: &'static str, log: Log) -> Middleware<MessageCreate> {
        Middleware::new(move |next: EventFunc<MessageCreate>| {
            let log = log.clone();
            EventFunc::new(move |req| {
                let next = next.clone();
                let log = log.clone();
                async move {
                    log.lock().push(format!("{name}:in"));
                    let result = next.call(req).await;
                    log.lock().push(format!("{name}:out"));
                    result
                }
            })
        })
    }

    fn base(log: Log) -> EventFunc<MessageCreate> {
        EventFunc::new(move |_req| {
            let log = log.clone();
            async move {
                log.lock().push("H".into());
                Ok(())
            }
        })
    }

    fn request() -> EventRequest<MessageCreate> {
        let session = Arc::new(MemorySession::default().with_guild(
            Guild {
                id: GuildId::new("g1"),
                name: "g".into(),
            },
            vec![],
        ));
        let event = MessageCreate(Message {
            id: MessageId::new("m1"),
            channel_id: ChannelId::new("c1"),
            guild_id: Some(GuildId::new("g1")),
            author: User {
                id: UserId::new("u1"),
                username: "u".into(),
                bot: false,
            },
            content: "hi".into(),
            timestamp: chrono::Utc::now(),
        });
        EventRequest::new(session, Arc::new(event))
    }

    #[tokio::test]
    async fn test_first_middleware_is_outermost() {
        let log = Log::default();
        let pipeline = compose(
            base(log.clone()),
            [recording("A", log.clone()), recording("B", log.clone())],
        );
        assert_ok!(pipeline.call(request()).await);
        assert_eq!(
            *log.lock(),
            vec!["A:in", "B:in", "H", "B:out", "A:out"]
        );
    }

    #[tokio::test]
    async fn test_compose_without_middlewares_is_identity() {
        let log = Log::default();
        let h = base(log.clone());
        let composed = compose(h.clone(), Vec::new());
        assert!(composed.ptr_eq(&h));
        assert_ok!(composed.call(request()).await);
        assert_eq!(*log.lock(), vec!["H"]);
    }

    #[tokio::test]
    async fn test_result_passes_back_through_every_layer() {
        let log = Log::default();
        let failing = EventFunc::<MessageCreate>::new(|_| async { Err("boom".into()) });
        let pipeline = compose(failing, [recording("A", log.clone())]);
        let err = pipeline.call(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*log.lock(), vec!["A:in", "A:out"]);
    }

    #[tokio::test]
    async fn test_service_builder_matches_compose_order() {
        let log = Log::default();
        let pipeline = ServiceBuilder::new()
            .layer(recording("A", log.clone()))
            .layer(recording("B", log.clone()))
            .event_func(base(log.clone()));
        assert_ok!(pipeline.call(request()).await);
        assert_eq!(
            *log.lock(),
            vec!["A:in", "B:in", "H", "B:out", "A:out"]
        );
    }

    #[tokio::test]
    async fn test_pipeline_builder_composes_in_order() {
        let log = Log::default();
        let pipeline = Pipeline::new(Identifier::from_static("test", "order"), base(log.clone()))
            .with(recording("A", log.clone()))
            .with(recording("B", log.clone()))
            .build();
        assert_ok!(pipeline.call(request()).await);
        assert_eq!(log.lock().first().map(String::as_str), Some("A:in"));
        assert_eq!(log.lock().len(), 5);
    }
}
