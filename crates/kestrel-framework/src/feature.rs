//! Guild-scoped feature flags and module toggles.
//!
//! A feature flag maps `(identifier, guild)` to a boolean. A feature must be
//! *registered* before it can be consulted; asking about an unregistered
//! feature is [`FeatureError::NotRegistered`], never an implicit `false`.
//!
//! Two implementations of the same [`FeatureStore`] contract ship here:
//!
//! - [`InMemoryFeatureStore`]: features are declared up front with a default
//!   state; unset guilds see the default.
//! - [`GuildToggles`]: a lazily populated per-guild map of enabled modules
//!   and features that also implements [`ModuleStore`]. Every known feature
//!   defaults to off.
//!
//! Both take the dispatch [`EventContext`] so they can refuse work once the
//! dispatch was cancelled.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kestrel_core::{GuildId, Identifier};

use crate::context::EventContext;

/// Errors returned by feature and module stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// The feature was never registered.
    #[error("feature `{0}` is not registered")]
    NotRegistered(Identifier),

    /// The dispatch was cancelled before the lookup ran.
    #[error("feature lookup cancelled")]
    Cancelled,

    /// The backing store failed.
    #[error("feature store error: {0}")]
    Store(String),
}

impl FeatureError {
    /// Creates a store failure.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

/// Result type for feature store operations.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// A registered feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub identifier: Identifier,
    pub description: String,
    /// State for guilds that never set the flag.
    #[serde(default)]
    pub default: bool,
}

impl Feature {
    pub fn new(identifier: Identifier, description: impl Into<String>) -> Self {
        Self {
            identifier,
            description: description.into(),
            default: false,
        }
    }

    /// Sets the default state.
    pub fn enabled_by_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }
}

/// The feature-flag contract consumed by the feature gate and admin commands.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Returns the flag for `guild`.
    async fn get(&self, ctx: &EventContext, feature: &Identifier, guild: &GuildId)
    -> FeatureResult<bool>;

    /// Sets the flag for `guild`.
    async fn set(
        &self,
        ctx: &EventContext,
        feature: &Identifier,
        guild: &GuildId,
        enabled: bool,
    ) -> FeatureResult<()>;

    /// Lists the registered features.
    async fn list(&self, ctx: &EventContext) -> FeatureResult<Vec<Feature>>;
}

/// Per-guild module toggles consumed by the module gate.
#[async_trait]
pub trait ModuleStore: Send + Sync {
    /// Returns `true` if `module` is enabled in `guild`.
    async fn is_module_enabled(
        &self,
        ctx: &EventContext,
        module: &str,
        guild: &GuildId,
    ) -> FeatureResult<bool>;

    /// Enables or disables `module` in `guild`.
    async fn set_module_enabled(
        &self,
        ctx: &EventContext,
        module: &str,
        guild: &GuildId,
        enabled: bool,
    ) -> FeatureResult<()>;
}

fn check(ctx: &EventContext) -> FeatureResult<()> {
    if ctx.is_cancelled() {
        Err(FeatureError::Cancelled)
    } else {
        Ok(())
    }
}

// =============================================================================
// InMemoryFeatureStore
// =============================================================================

/// Declared features with defaults and per-guild overrides.
#[derive(Debug, Default)]
pub struct InMemoryFeatureStore {
    declared: RwLock<BTreeMap<Identifier, Feature>>,
    states: RwLock<HashMap<(Identifier, GuildId), bool>>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feature. Re-registering replaces the description and
    /// default but keeps recorded states.
    pub fn register(&self, feature: Feature) {
        self.declared
            .write()
            .insert(feature.identifier.clone(), feature);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_feature(self, feature: Feature) -> Self {
        self.register(feature);
        self
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn get(
        &self,
        ctx: &EventContext,
        feature: &Identifier,
        guild: &GuildId,
    ) -> FeatureResult<bool> {
        check(ctx)?;
        let default = self
            .declared
            .read()
            .get(feature)
            .map(|f| f.default)
            .ok_or_else(|| FeatureError::NotRegistered(feature.clone()))?;
        let state = self
            .states
            .read()
            .get(&(feature.clone(), guild.clone()))
            .copied();
        Ok(state.unwrap_or(default))
    }

    async fn set(
        &self,
        ctx: &EventContext,
        feature: &Identifier,
        guild: &GuildId,
        enabled: bool,
    ) -> FeatureResult<()> {
        check(ctx)?;
        if !self.declared.read().contains_key(feature) {
            return Err(FeatureError::NotRegistered(feature.clone()));
        }
        self.states
            .write()
            .insert((feature.clone(), guild.clone()), enabled);
        Ok(())
    }

    async fn list(&self, ctx: &EventContext) -> FeatureResult<Vec<Feature>> {
        check(ctx)?;
        Ok(self.declared.read().values().cloned().collect())
    }
}

// =============================================================================
// GuildToggles
// =============================================================================

#[derive(Debug, Default)]
struct GuildData {
    modules: HashMap<String, bool>,
    features: HashMap<Identifier, bool>,
}

/// Lazily created per-guild toggle map.
///
/// Guild entries are created on first access and live for the process
/// lifetime. Features must still be registered; modules need not be.
#[derive(Debug, Default)]
pub struct GuildToggles {
    known: RwLock<BTreeMap<Identifier, Feature>>,
    guilds: RwLock<HashMap<GuildId, GuildData>>,
}

impl GuildToggles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a feature. Its default is ignored: toggles start off.
    pub fn register(&self, feature: Feature) {
        self.known.write().insert(feature.identifier.clone(), feature);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_feature(self, feature: Feature) -> Self {
        self.register(feature);
        self
    }

    /// Returns the guilds that have an entry so far.
    pub fn guilds(&self) -> HashSet<GuildId> {
        self.guilds.read().keys().cloned().collect()
    }

    fn with_guild<R>(&self, guild: &GuildId, f: impl FnOnce(&mut GuildData) -> R) -> R {
        let mut guilds = self.guilds.write();
        f(guilds.entry(guild.clone()).or_default())
    }
}

#[async_trait]
impl FeatureStore for GuildToggles {
    async fn get(
        &self,
        ctx: &EventContext,
        feature: &Identifier,
        guild: &GuildId,
    ) -> FeatureResult<bool> {
        check(ctx)?;
        if !self.known.read().contains_key(feature) {
            return Err(FeatureError::NotRegistered(feature.clone()));
        }
        Ok(self.with_guild(guild, |data| {
            data.features.get(feature).copied().unwrap_or(false)
        }))
    }

    async fn set(
        &self,
        ctx: &EventContext,
        feature: &Identifier,
        guild: &GuildId,
        enabled: bool,
    ) -> FeatureResult<()> {
        check(ctx)?;
        if !self.known.read().contains_key(feature) {
            return Err(FeatureError::NotRegistered(feature.clone()));
        }
        self.with_guild(guild, |data| {
            data.features.insert(feature.clone(), enabled);
        });
        Ok(())
    }

    async fn list(&self, ctx: &EventContext) -> FeatureResult<Vec<Feature>> {
        check(ctx)?;
        Ok(self.known.read().values().cloned().collect())
    }
}

#[async_trait]
impl ModuleStore for GuildToggles {
    async fn is_module_enabled(
        &self,
        ctx: &EventContext,
        module: &str,
        guild: &GuildId,
    ) -> FeatureResult<bool> {
        check(ctx)?;
        Ok(self.with_guild(guild, |data| {
            data.modules.get(module).copied().unwrap_or(false)
        }))
    }

    async fn set_module_enabled(
        &self,
        ctx: &EventContext,
        module: &str,
        guild: &GuildId,
        enabled: bool,
    ) -> FeatureResult<()> {
        check(ctx)?;
        self.with_guild(guild, |data| {
            data.modules.insert(module.to_string(), enabled);
        });
        Ok(())
    }
}
