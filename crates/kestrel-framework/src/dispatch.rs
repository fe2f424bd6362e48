//! The Dispatch Adapter.
//!
//! Converts a composed [`EventFunc`] into the raw callback shape the event
//! registry stores: `(session, event) -> future<()>`. The adapter is the
//! outermost failure-containment boundary. For every invocation it
//!
//! 1. creates a fresh background [`EventContext`], optionally with a deadline,
//! 2. runs the pipeline inside [`catch_fault`],
//! 3. logs a returned error as *unhandled* (a well-formed pipeline converts
//!    its failures into user-visible reports before they get here),
//! 4. logs a recovered fault with its backtrace and swallows it.
//!
//! The context deadline is soft: layers inside the pipeline observe it and
//! wrap up on their own. The adapter only drops the pipeline once the
//! [`backstop`](DispatchAdapter::backstop) passes, which defaults to the
//! deadline itself.
//!
//! Nothing escapes: the adapter is reusable after any failure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{Instrument, debug, debug_span, error};

use kestrel_core::{Event, SessionHandle};

use crate::context::{EventContext, EventRequest};
use crate::error::FrameworkError;
use crate::fault::catch_fault;
use crate::handler::EventFunc;

/// The callback shape stored by the raw event registry.
pub type RawCallback<E> = Arc<dyn Fn(SessionHandle, Arc<E>) -> BoxFuture<'static, ()> + Send + Sync>;

/// How a single dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The pipeline returned `Ok`.
    Completed,
    /// The pipeline returned an error nobody handled.
    Unhandled,
    /// The pipeline panicked.
    Faulted,
    /// The pipeline ran past its deadline and was cancelled.
    TimedOut,
}

/// Wraps a pipeline for the raw event registry.
pub struct DispatchAdapter<E> {
    func: EventFunc<E>,
    timeout: Option<Duration>,
    backstop: Option<Duration>,
}

impl<E> Clone for DispatchAdapter<E> {
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
            timeout: self.timeout,
            backstop: self.backstop,
        }
    }
}

impl<E> fmt::Debug for DispatchAdapter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchAdapter")
            .field("event", &std::any::type_name::<E>())
            .field("timeout", &self.timeout)
            .field("backstop", &self.backstop)
            .finish()
    }
}

impl<E: Event> DispatchAdapter<E> {
    pub fn new(func: EventFunc<E>) -> Self {
        Self {
            func,
            timeout: None,
            backstop: None,
        }
    }

    /// Sets the per-dispatch deadline carried by the [`EventContext`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how long the pipeline may run before it is dropped.
    ///
    /// Never shorter than the [`timeout`](Self::timeout).
    pub fn backstop(mut self, backstop: Duration) -> Self {
        self.backstop = Some(backstop);
        self
    }

    fn hard_limit(&self) -> Option<Duration> {
        match (self.timeout, self.backstop) {
            (Some(timeout), Some(backstop)) => Some(timeout.max(backstop)),
            (timeout, backstop) => backstop.or(timeout),
        }
    }

    /// Runs one dispatch to completion. Never panics, never fails.
    pub async fn run(&self, session: SessionHandle, event: Arc<E>) -> DispatchOutcome {
        let span = debug_span!(
            "dispatch",
            event = E::NAME,
            guild_id = event.guild_id().map(|g| g.as_str()).unwrap_or("-")
        );
        self.run_inner(session, event).instrument(span).await
    }

    async fn run_inner(&self, session: SessionHandle, event: Arc<E>) -> DispatchOutcome {
        let mut ctx = EventContext::new();
        if let Some(timeout) = self.timeout {
            ctx = ctx.with_timeout(timeout);
        }
        let request = EventRequest {
            ctx: ctx.clone(),
            session,
            event,
        };
        let call = catch_fault(self.func.call(request));

        let outcome = match self.hard_limit() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    ctx.cancellation_token().cancel();
                    let err = FrameworkError::DeadlineExceeded {
                        timeout_ms: limit.as_millis() as u64,
                    };
                    error!(error = %err, "unhandled error while executing event");
                    return DispatchOutcome::TimedOut;
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(())) => {
                debug!("event handled");
                DispatchOutcome::Completed
            }
            Ok(Err(err)) => {
                error!(error = %err, "unhandled error while executing event");
                DispatchOutcome::Unhandled
            }
            Err(fault) => {
                error!(
                    panic = %fault.message,
                    location = fault.location.as_deref().unwrap_or("unknown"),
                    backtrace = %fault.backtrace,
                    "recovered from fatal fault while executing event"
                );
                DispatchOutcome::Faulted
            }
        }
    }

    /// Erases the adapter into a raw callback.
    pub fn into_callback(self) -> RawCallback<E> {
        let adapter = Arc::new(self);
        Arc::new(move |session, event| {
            let adapter = Arc::clone(&adapter);
            async move {
                adapter.run(session, event).await;
            }
            .boxed()
        })
    }
}

/// Wraps `func` into a raw callback with no deadline.
pub fn handle_event<E: Event>(func: EventFunc<E>) -> RawCallback<E> {
    DispatchAdapter::new(func).into_callback()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kestrel_core::{GuildId, GuildMemberAdd, MemorySession, User, UserId};

    fn event() -> Arc<GuildMemberAdd> {
        Arc::new(GuildMemberAdd {
            guild_id: GuildId::new("g1"),
            user: User {
                id: UserId::new("u1"),
                username: "newcomer".into(),
                bot: false,
            },
        })
    }

    fn session() -> SessionHandle {
        Arc::new(MemorySession::default())
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_adapter_reusable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let func = EventFunc::<GuildMemberAdd>::new(move |req| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    panic!("first call explodes: {}", req.event.user.username);
                }
                Ok(())
            }
        });
        let adapter = DispatchAdapter::new(func);

        assert_eq!(adapter.run(session(), event()).await, DispatchOutcome::Faulted);
        assert_eq!(adapter.run(session(), event()).await, DispatchOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unhandled_error_is_swallowed() {
        let func = EventFunc::<GuildMemberAdd>::new(|_| async { Err("nobody caught this".into()) });
        let adapter = DispatchAdapter::new(func);
        assert_eq!(adapter.run(session(), event()).await, DispatchOutcome::Unhandled);
    }

    #[tokio::test]
    async fn test_deadline_cancels_context() {
        let seen = Arc::new(parking_lot::Mutex::new(None::<EventContext>));
        let slot = seen.clone();
        let func = EventFunc::<GuildMemberAdd>::new(move |req| {
            let slot = slot.clone();
            async move {
                *slot.lock() = Some(req.ctx.clone());
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        });
        let adapter = DispatchAdapter::new(func).timeout(Duration::from_millis(20));
        assert_eq!(adapter.run(session(), event()).await, DispatchOutcome::TimedOut);

        let ctx = seen.lock().clone().unwrap();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_backstop_lets_pipeline_finish_past_deadline() {
        let func = EventFunc::<GuildMemberAdd>::new(|req| async move {
            let remaining = req.ctx.remaining().unwrap_or_default();
            tokio::time::sleep(remaining + Duration::from_millis(30)).await;
            req.ctx.check_cancelled()?;
            Ok(())
        });
        let adapter = DispatchAdapter::new(func)
            .timeout(Duration::from_millis(20))
            .backstop(Duration::from_secs(5));
        assert_eq!(adapter.run(session(), event()).await, DispatchOutcome::Completed);
    }

    #[tokio::test]
    async fn test_backstop_still_drops_stuck_pipeline() {
        let func = EventFunc::<GuildMemberAdd>::new(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let adapter = DispatchAdapter::new(func)
            .timeout(Duration::from_millis(10))
            .backstop(Duration::from_millis(40));
        assert_eq!(adapter.run(session(), event()).await, DispatchOutcome::TimedOut);
    }

    #[test]
    fn test_backstop_never_undercuts_deadline() {
        let adapter = DispatchAdapter::new(EventFunc::<GuildMemberAdd>::noop())
            .timeout(Duration::from_secs(3))
            .backstop(Duration::from_secs(1));
        assert_eq!(adapter.hard_limit(), Some(Duration::from_secs(3)));
        let adapter = DispatchAdapter::new(EventFunc::<GuildMemberAdd>::noop());
        assert_eq!(adapter.hard_limit(), None);
    }

    #[tokio::test]
    async fn test_fault_log_carries_backtrace_at_error_level() {
        let (logs, _guard) = crate::test_support::capture_logs();
        let func = EventFunc::<GuildMemberAdd>::new(|_| async {
            let members: Vec<&str> = Vec::new();
            let _ = members[1];
            Ok(())
        });
        let outcome = DispatchAdapter::new(func).run(session(), event()).await;
        assert_eq!(outcome, DispatchOutcome::Faulted);

        let errors = logs.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field("panic").unwrap().contains("index out of bounds"));
        assert!(!errors[0].field("backtrace").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_callback_runs_pipeline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback = handle_event(EventFunc::<GuildMemberAdd>::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }));
        callback(session(), event()).await;
        callback(session(), event()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
