//! The canonical handler shape.
//!
//! An [`EventFunc<E>`] is a cheaply clonable, type-erased async function from
//! an [`EventRequest<E>`] to an [`EventResult`]. It is also a tower
//! [`Service`], so any tower layer can wrap it and any service over
//! `EventRequest<E>` can be erased back into one with
//! [`EventFunc::from_service`].
//!
//! ```rust,ignore
//! let ping = EventFunc::new(|req: EventRequest<InteractionCreate>| async move {
//!     req.session
//!         .respond(&req.event.id, InteractionResponse::message(ResponseData::content("pong")))
//!         .await?;
//!     Ok(())
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::{BoxError, Service, ServiceExt};

use crate::context::EventRequest;
use crate::error::EventResult;

type BoxedFn<E> = dyn Fn(EventRequest<E>) -> BoxFuture<'static, EventResult> + Send + Sync;

/// A handler over one concrete event payload type.
pub struct EventFunc<E> {
    inner: Arc<BoxedFn<E>>,
}

impl<E> Clone for EventFunc<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Send + Sync + 'static> EventFunc<E> {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(EventRequest<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EventResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |req| f(req).boxed()),
        }
    }

    /// A handler that does nothing and succeeds.
    pub fn noop() -> Self {
        Self::new(|_| async { Ok(()) })
    }

    /// Erases any tower service over `EventRequest<E>`.
    ///
    /// The service is cloned per call, so readiness is driven for each
    /// request independently.
    pub fn from_service<S>(service: S) -> Self
    where
        S: Service<EventRequest<E>, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Self::new(move |req| service.clone().oneshot(req))
    }

    /// Invokes the handler.
    pub fn call(&self, req: EventRequest<E>) -> BoxFuture<'static, EventResult> {
        (self.inner)(req)
    }

    /// Returns `true` if both handles point at the same function.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E> fmt::Debug for EventFunc<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFunc")
            .field("event", &std::any::type_name::<E>())
            .finish_non_exhaustive()
    }
}

impl<E: Send + Sync + 'static> Service<EventRequest<E>> for EventFunc<E> {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, EventResult>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EventRequest<E>) -> Self::Future {
        EventFunc::call(self, req)
    }
}
