//! Raw callback registry.
//!
//! The registry maps each payload kind to the callbacks subscribed to it.
//! Dispatching a [`GatewayEvent`] spawns one task per matching callback;
//! callbacks never wait on each other, and two deliveries of the same event
//! kind may run at the same time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use kestrel_core::{Event, GatewayEvent, InteractionCreate, SessionHandle};
use kestrel_framework::layer::DEFERRED_WINDOW;
use kestrel_framework::{DispatchAdapter, EventFunc, RawCallback};

use crate::config::DispatchConfig;

/// Time an interaction pipeline gets after its deferred window to deliver an
/// error report.
const REPORT_GRACE: Duration = Duration::from_secs(10);

type ErasedCallback =
    Arc<dyn Fn(SessionHandle, &GatewayEvent) -> Option<BoxFuture<'static, ()>> + Send + Sync>;

/// Registry of raw event callbacks, keyed by payload name.
#[derive(Clone, Default)]
pub struct EventRegistry {
    callbacks: HashMap<&'static str, Vec<ErasedCallback>>,
    dispatch: DispatchConfig,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.callbacks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventRegistry")
            .field("callbacks", &counts)
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl EventRegistry {
    /// Creates an empty registry with default deadlines.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry whose [`handle`](Self::handle) deadlines
    /// come from `dispatch`.
    pub fn with_dispatch(dispatch: DispatchConfig) -> Self {
        Self {
            callbacks: HashMap::new(),
            dispatch,
        }
    }

    /// Subscribes a raw callback to payload type `E`.
    pub fn add<E: Event>(&mut self, callback: RawCallback<E>) -> &mut Self {
        let erased: ErasedCallback = Arc::new(move |session, event| {
            E::from_gateway(event).map(|payload| callback(session, payload))
        });
        self.callbacks.entry(E::NAME).or_default().push(erased);
        debug!(event = E::NAME, "registered raw callback");
        self
    }

    /// Wraps `func` in a [`DispatchAdapter`] with the configured deadline and
    /// subscribes it.
    ///
    /// Interactions get `interaction_timeout_ms`, every other payload
    /// `event_timeout_ms`. An interaction pipeline is only dropped once the
    /// deferred window and a grace period for the error report have passed
    /// as well; enforcing the deadline before that is up to its error-wrap
    /// layer.
    pub fn handle<E: Event>(&mut self, func: EventFunc<E>) -> &mut Self {
        let adapter = DispatchAdapter::new(func)
            .timeout(self.timeout_for::<E>())
            .backstop(self.backstop_for::<E>());
        self.add::<E>(adapter.into_callback())
    }

    fn timeout_for<E: Event>(&self) -> Duration {
        if E::NAME == InteractionCreate::NAME {
            self.dispatch.interaction_timeout()
        } else {
            self.dispatch.event_timeout()
        }
    }

    fn backstop_for<E: Event>(&self) -> Duration {
        if E::NAME == InteractionCreate::NAME {
            self.dispatch.interaction_timeout() + DEFERRED_WINDOW + REPORT_GRACE
        } else {
            self.dispatch.event_timeout()
        }
    }

    /// Spawns one task per callback subscribed to the event's kind.
    pub fn dispatch(&self, session: SessionHandle, event: &GatewayEvent) -> Vec<JoinHandle<()>> {
        let Some(callbacks) = self.callbacks.get(event.event_name()) else {
            trace!(event = event.event_name(), "no callbacks subscribed");
            return Vec::new();
        };

        callbacks
            .iter()
            .filter_map(|callback| callback(Arc::clone(&session), event))
            .map(tokio::spawn)
            .collect()
    }

    /// Number of callbacks subscribed to `event_name`.
    pub fn count(&self, event_name: &str) -> usize {
        self.callbacks.get(event_name).map_or(0, Vec::len)
    }

    /// Total number of callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
