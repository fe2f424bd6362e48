//! Fault isolation for handler futures.
//!
//! [`catch_fault`] runs a future inside a fault-isolation region: a panic
//! raised while the future is being polled stops that future only, and comes
//! back as an ordinary [`Fault`] value instead of unwinding into the caller.
//!
//! The process panic hook is extended once, on first use. While a guarded
//! poll is running on the current thread, the hook records the panic location
//! and a backtrace for the `Fault`; any other panic is forwarded to the hook
//! that was installed before.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};

use futures::FutureExt;

thread_local! {
    static IN_GUARD: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

static HOOK: OnceLock<()> = OnceLock::new();

struct Captured {
    location: Option<String>,
    backtrace: String,
}

/// A panic converted into a value.
#[derive(Debug, Clone)]
pub struct Fault {
    /// The panic message, or a placeholder for non-string payloads.
    pub message: String,
    /// `file:line:column` of the panic, when known.
    pub location: Option<String>,
    /// Backtrace captured at the panic site.
    pub backtrace: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "panicked at {location}: {}", self.message),
            None => write!(f, "panicked: {}", self.message),
        }
    }
}

impl std::error::Error for Fault {}

impl Fault {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        let captured = CAPTURED.with(|slot| slot.borrow_mut().take());
        let (location, backtrace) = match captured {
            Some(c) => (c.location, c.backtrace),
            None => (None, String::new()),
        };
        Self {
            message,
            location,
            backtrace,
        }
    }
}

fn install_hook() {
    HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_GUARD.with(Cell::get) {
                let captured = Captured {
                    location: info.location().map(ToString::to_string),
                    backtrace: Backtrace::force_capture().to_string(),
                };
                CAPTURED.with(|slot| *slot.borrow_mut() = Some(captured));
            } else {
                previous(info);
            }
        }));
    });
}

/// Restores the previous guard flag when a poll ends, normally or not.
struct GuardFlag(bool);

impl GuardFlag {
    fn enter() -> Self {
        Self(IN_GUARD.with(|flag| flag.replace(true)))
    }
}

impl Drop for GuardFlag {
    fn drop(&mut self) {
        let previous = self.0;
        IN_GUARD.with(|flag| flag.set(previous));
    }
}

/// Marks every poll of the inner future as guarded.
struct Guarded<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for Guarded<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _flag = GuardFlag::enter();
        self.inner.as_mut().poll(cx)
    }
}

/// Runs `future`, converting a panic during any of its polls into a [`Fault`].
pub async fn catch_fault<F>(future: F) -> Result<F::Output, Fault>
where
    F: Future,
{
    install_hook();
    let guarded = Guarded {
        inner: Box::pin(future),
    };
    AssertUnwindSafe(guarded)
        .catch_unwind()
        .await
        .map_err(Fault::from_payload)
}
