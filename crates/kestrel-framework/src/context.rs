//! Per-dispatch execution context.
//!
//! Every dispatch gets a fresh [`EventContext`]. It is immutable: injecting a
//! value returns a new context and leaves the old one untouched, so a
//! middleware can only affect what runs *inside* it.
//!
//! Values are keyed by the canonical string of an [`Identifier`], never by
//! object identity, so two separately constructed keys with equal content
//! address the same slot. [`ContextKey`] adds a type to the key so lookups
//! don't repeat the value type at every call site:
//!
//! ```rust,ignore
//! let key: ContextKey<dyn FeatureStore> =
//!     ContextKey::new(Identifier::from_static("debug", "service/features"));
//!
//! let ctx = EventContext::new().with(&key, store);
//! let store = ctx.get(&key).expect("injected above");
//! ```
//!
//! The context also carries the dispatch's cancellation token and optional
//! deadline so stores and session calls can observe them.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use kestrel_core::{Event, GuildId, Identifier, SessionHandle};

use crate::error::FrameworkError;

type ValueMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

// =============================================================================
// EventContext
// =============================================================================

/// Immutable, persistent execution context for one dispatch.
#[derive(Clone)]
pub struct EventContext {
    values: Arc<ValueMap>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EventContext {
    /// Creates an empty background context with its own cancellation token.
    pub fn new() -> Self {
        Self {
            values: Arc::new(HashMap::new()),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Returns a copy of this context with `value` stored under `key`.
    ///
    /// `T` may be unsized, so trait objects can be injected directly.
    pub fn with_value<T>(&self, key: &Identifier, value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut values = ValueMap::clone(&self.values);
        values.insert(key.to_string(), Arc::new(value));
        Self {
            values: Arc::new(values),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }

    /// Looks up a value by key.
    ///
    /// Returns `None` if nothing was stored under `key` or the stored value
    /// has a different type.
    pub fn value<T>(&self, key: &Identifier) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.values
            .get(&key.to_string())
            .and_then(|v| v.downcast_ref::<Arc<T>>())
            .cloned()
    }

    /// Like [`value`](Self::value), but a miss is an error.
    pub fn require<T>(&self, key: &Identifier) -> Result<Arc<T>, FrameworkError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.value(key)
            .ok_or_else(|| FrameworkError::missing_value(key.to_string()))
    }

    /// Typed variant of [`with_value`](Self::with_value).
    pub fn with<T>(&self, key: &ContextKey<T>, value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.with_value(&key.id, value)
    }

    /// Typed variant of [`value`](Self::value).
    pub fn get<T>(&self, key: &ContextKey<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.value(&key.id)
    }

    /// Typed variant of [`require`](Self::require).
    pub fn fetch<T>(&self, key: &ContextKey<T>) -> Result<Arc<T>, FrameworkError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.require(&key.id)
    }

    /// Returns a copy of this context that expires after `timeout`.
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            values: Arc::clone(&self.values),
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns the dispatch's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns `true` once the dispatch was cancelled or timed out.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns an error if the dispatch was cancelled.
    ///
    /// Stores call this before doing work on behalf of a handler.
    pub fn check_cancelled(&self) -> Result<(), FrameworkError> {
        if self.is_cancelled() {
            Err(FrameworkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("EventContext")
            .field("values", &keys)
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

// =============================================================================
// ContextKey
// =============================================================================

/// A typed context key.
///
/// Equality of the underlying identifier is all that matters for lookups;
/// the type parameter only saves callers from naming the type twice.
pub struct ContextKey<T: ?Sized> {
    id: Identifier,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> ContextKey<T> {
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the identifier backing this key.
    pub fn identifier(&self) -> &Identifier {
        &self.id
    }
}

impl<T: ?Sized> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<T: ?Sized> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextKey({})", self.id)
    }
}

// =============================================================================
// EventRequest
// =============================================================================

/// The argument every [`EventFunc`](crate::EventFunc) receives.
pub struct EventRequest<E> {
    /// Execution context for this dispatch.
    pub ctx: EventContext,
    /// Outbound platform capability.
    pub session: SessionHandle,
    /// The typed event payload.
    pub event: Arc<E>,
}

impl<E> Clone for EventRequest<E> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            session: Arc::clone(&self.session),
            event: Arc::clone(&self.event),
        }
    }
}

impl<E: Event> EventRequest<E> {
    /// Creates a request with a fresh background context.
    pub fn new(session: SessionHandle, event: Arc<E>) -> Self {
        Self {
            ctx: EventContext::new(),
            session,
            event,
        }
    }

    /// Replaces the context, keeping session and event.
    pub fn with_ctx(self, ctx: EventContext) -> Self {
        Self { ctx, ..self }
    }

    /// Returns the event's guild scope.
    pub fn guild_id(&self) -> Option<&GuildId> {
        self.event.guild_id()
    }
}

impl<E: fmt::Debug> fmt::Debug for EventRequest<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRequest")
            .field("ctx", &self.ctx)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn test_injection_is_persistent() {
        let key = Identifier::from_static("test", "counter");
        let base = EventContext::new();
        let with = base.with_value(&key, Arc::new(5usize));

        assert!(base.value::<usize>(&key).is_none());
        assert_eq!(with.value::<usize>(&key).as_deref(), Some(&5));
    }

    #[test]
    fn test_lookup_by_equal_content() {
        let inject_key = Identifier::new("debug", "service/features").unwrap();
        let lookup_key = Identifier::parse("debug:service/features").unwrap();
        let ctx = EventContext::new().with_value(&inject_key, Arc::new("store".to_string()));
        assert_eq!(ctx.value::<String>(&lookup_key).as_deref().map(String::as_str), Some("store"));
    }

    #[test]
    fn test_trait_objects_and_typed_keys() {
        let key: ContextKey<dyn Greeter> = ContextKey::new(Identifier::from_static("test", "greeter"));
        let greeter: Arc<dyn Greeter> = Arc::new(Hello);
        let ctx = EventContext::new().with(&key, greeter);
        assert_eq!(ctx.get(&key).map(|g| g.greet()), Some("hello"));
    }

    #[test]
    fn test_require_reports_missing_key() {
        let key = Identifier::from_static("test", "absent");
        let err = EventContext::new().require::<u8>(&key).unwrap_err();
        assert!(matches!(err, FrameworkError::MissingContextValue { key } if key == "test:absent"));
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let key = Identifier::from_static("test", "typed");
        let ctx = EventContext::new().with_value(&key, Arc::new(1u32));
        assert!(ctx.value::<u64>(&key).is_none());
    }

    #[tokio::test]
    async fn test_timeout_keeps_earlier_deadline() {
        let ctx = EventContext::new().with_timeout(Duration::from_millis(10));
        let later = ctx.with_timeout(Duration::from_secs(10));
        assert_eq!(ctx.deadline(), later.deadline());
        assert!(later.remaining().is_some());
    }
}
