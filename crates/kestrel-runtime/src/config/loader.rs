//! Layered configuration loading.
//!
//! Sources are merged with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `kestrel.{profile}.toml` next to the main file
//! 3. The main file (`kestrel.toml`, `config.toml`, `kestrel.json`, `config.json`)
//! 4. `KESTREL_*` environment variables
//! 5. Programmatic merges
//!
//! TOML files need the `toml-config` feature and JSON files the
//! `json-config` feature; both are on by default.
//!
//! Nested keys use `__` in environment variables:
//!
//! - `KESTREL_TOKEN=xxx` → `token = "xxx"`
//! - `KESTREL_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `KESTREL_COMMANDS__GUILD=123` → `commands.guild = "123"`
//!
//! ```rust,ignore
//! use kestrel_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/kestrel.toml")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "json-config"))]
use figment::providers::Format;
#[cfg(feature = "json-config")]
use figment::providers::Json;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::GatewayConfig;

const ENV_PREFIX: &str = "KESTREL_";
const PROFILE_VAR: &str = "KESTREL_PROFILE";
const CONFIG_DIR: &str = "kestrel";

// =============================================================================
// Profile
// =============================================================================

/// Deployment profile selecting the `kestrel.{profile}.*` overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting the short forms `dev` and `prod`.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" | "" => Self::Development,
            _ => Self::Custom(name),
        }
    }

    /// Reads `KESTREL_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        match std::env::var(PROFILE_VAR) {
            Ok(name) => Self::parse(&name),
            Err(_) => Self::Development,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// File formats
// =============================================================================

/// A configuration file format compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "json-config")]
    Json,
}

impl FileFormat {
    /// Formats in search order.
    const ENABLED: &'static [FileFormat] = &[
        #[cfg(feature = "toml-config")]
        FileFormat::Toml,
        #[cfg(feature = "json-config")]
        FileFormat::Json,
    ];

    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ENABLED
            .iter()
            .copied()
            .find(|format| format.extension() == ext)
    }

    fn extension(self) -> &'static str {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => "toml",
            #[cfg(feature = "json-config")]
            Self::Json => "json",
        }
    }

    /// Main file names probed in each search directory.
    fn stems() -> [&'static str; 2] {
        ["kestrel", "config"]
    }

    #[allow(unused_variables)]
    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "json-config")]
            Self::Json => figment.merge(Json::file(path)),
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Builds a [`GatewayConfig`] from files, the environment and merges.
#[derive(Debug)]
pub struct ConfigLoader {
    profile: Profile,
    search_paths: Vec<PathBuf>,
    /// Skips the search when set.
    explicit_file: Option<PathBuf>,
    use_env: bool,
    merges: Vec<GatewayConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader for the profile named by `KESTREL_PROFILE`.
    ///
    /// Without explicit search paths the current directory and the user
    /// config directory are searched.
    pub fn new() -> Self {
        Self {
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            explicit_file: None,
            use_env: true,
            merges: Vec::new(),
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Searches `<config_dir>/kestrel`, e.g. `~/.config/kestrel` on Linux.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join(CONFIG_DIR)),
            None => self,
        }
    }

    /// Loads exactly this file. A missing file is an error.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Merges `config` over every other source. Later merges win.
    pub fn merge(mut self, config: GatewayConfig) -> Self {
        self.merges.push(config);
        self
    }

    pub fn load(self) -> ConfigResult<GatewayConfig> {
        let profile = self.profile.clone();
        let config: GatewayConfig = self.figment()?.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            debug = config.debug,
            "configuration loaded"
        );
        Ok(config)
    }

    fn figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(GatewayConfig::default()));

        figment = match &self.explicit_file {
            Some(path) => self.merge_explicit(figment, path)?,
            None => self.merge_discovered(figment),
        };

        if self.use_env {
            trace!(prefix = ENV_PREFIX, "merging environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["PROFILE"]).split("__"));
        }

        for config in self.merges {
            figment = figment.merge(Serialized::defaults(config));
        }
        Ok(figment)
    }

    fn merge_explicit(&self, figment: Figment, path: &Path) -> ConfigResult<Figment> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let format = FileFormat::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

        info!(path = %path.display(), "loading configuration file");
        Ok(self.merge_with_profile(figment, format, path))
    }

    /// Merges the first main file found, searching directories in order and
    /// each format within a directory.
    fn merge_discovered(&self, figment: Figment) -> Figment {
        for dir in self.directories() {
            for &format in FileFormat::ENABLED {
                for stem in FileFormat::stems() {
                    let path = dir.join(format!("{stem}.{}", format.extension()));
                    if path.is_file() {
                        info!(path = %path.display(), "loading configuration file");
                        return self.merge_with_profile(figment, format, &path);
                    }
                }
            }
        }
        warn!("no configuration file found, using defaults");
        figment
    }

    /// Merges the `{stem}.{profile}.{ext}` overlay, then `path` over it.
    fn merge_with_profile(&self, mut figment: Figment, format: FileFormat, path: &Path) -> Figment {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            let overlay = path.with_file_name(format!(
                "{stem}.{}.{}",
                self.profile,
                format.extension()
            ));
            if overlay.is_file() {
                debug!(path = %overlay.display(), "loading profile overlay");
                figment = format.merge(figment, &overlay);
            }
        }
        format.merge(figment, path)
    }

    fn directories(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut dirs = Vec::with_capacity(2);
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            dirs.push(config_dir.join(CONFIG_DIR));
        }
        dirs
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load()
}

/// Loads `path` plus the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
