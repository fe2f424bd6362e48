//! Namespaced identifiers.
//!
//! An [`Identifier`] tags handlers, features and context values with a
//! human-readable `namespace:id` key. Both halves are validated on
//! construction:
//!
//! - namespace: `[a-z0-9-]{1,32}`
//! - id: one or more `/`-separated segments, each `[a-z0-9-]{1,32}`
//!
//! ```rust,ignore
//! use kestrel_core::Identifier;
//!
//! let ping = Identifier::new("debug", "commands/ping")?;
//! assert_eq!(ping.to_string(), "debug:commands/ping");
//!
//! // Literals known at compile time
//! let setup = Identifier::from_static("debug", "events/setup");
//! ```
//!
//! Identifiers compare, hash and order by value, so two separately
//! constructed identifiers with the same content are the same key.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdentifierError;

/// Maximum length of a single identifier segment.
pub const MAX_SEGMENT_LEN: usize = 32;

/// A validated `namespace:id` key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    inner: Arc<Inner>,
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Inner {
    namespace: String,
    id: String,
}

impl Identifier {
    /// Creates an identifier, validating both halves.
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Result<Self, IdentifierError> {
        let namespace = namespace.into();
        let id = id.into();

        if !is_valid_namespace(&namespace) {
            return Err(IdentifierError::InvalidNamespace(namespace));
        }
        if !is_valid_id(&id) {
            return Err(IdentifierError::InvalidId(id));
        }

        Ok(Self {
            inner: Arc::new(Inner { namespace, id }),
        })
    }

    /// Creates an identifier from compile-time literals.
    ///
    /// # Panics
    ///
    /// Panics if either half is invalid. Use [`Identifier::new`] for values
    /// that come from user input.
    pub fn from_static(namespace: &'static str, id: &'static str) -> Self {
        match Self::new(namespace, id) {
            Ok(identifier) => identifier,
            Err(e) => panic!("invalid identifier literal `{namespace}:{id}`: {e}"),
        }
    }

    /// Parses the canonical `namespace:id` form.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let (namespace, id) = s
            .split_once(':')
            .ok_or_else(|| IdentifierError::Malformed(s.to_string()))?;
        Self::new(namespace, id)
    }

    /// Returns the namespace half.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Returns the id half.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Returns the id segments (`commands/ping` yields `["commands", "ping"]`).
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.id.split('/')
    }
}

/// Returns `true` if `s` is a single valid segment.
fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_SEGMENT_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Returns `true` if `namespace` matches `[a-z0-9-]{1,32}`.
pub fn is_valid_namespace(namespace: &str) -> bool {
    is_valid_segment(namespace)
}

/// Returns `true` if `id` matches `[a-z0-9-]{1,32}(/[a-z0-9-]{1,32})*`.
pub fn is_valid_id(id: &str) -> bool {
    id.split('/').all(is_valid_segment)
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.inner.namespace, self.inner.id)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
