//! Configuration management for the tabs engine.
//!
//! Parses `tabs.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! Host-level settings can be applied during load via [`ConfigOverrides`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `cache.namespace`
//! - `cache.dir`
//! - `security.csrf_secret`

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Host settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override cache TTL in seconds.
    pub cache_ttl_secs: Option<u64>,
    /// Override routing integration flag.
    pub routable: Option<bool>,
    /// Override remembered-tab flag.
    pub remember_tab: Option<bool>,
    /// Override rate limiting enabled flag.
    pub rate_limit_enabled: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "tabs.toml";

/// Maximum tab identifier length accepted at the URL boundary.
const MAX_TAB_ID_LEN: usize = 50;

/// Upper bound for cache lifetimes and rate-limit windows (one year).
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content cache configuration.
    pub cache: CacheConfig,
    /// Preloading and debouncing.
    pub performance: PerformanceConfig,
    /// Routing integration and active tab defaults.
    pub navigation: NavigationConfig,
    /// Authorization, rate limiting, CSRF and content protection.
    pub security: SecurityConfig,
    /// Global event dispatch and hook tracing.
    pub hooks: HooksConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Storage backend behind the content cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process store with tag support.
    #[default]
    Memory,
    /// File-based store without tag support.
    File,
    /// Never stores anything.
    None,
}

/// Content cache configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether content caching is enabled.
    pub enabled: bool,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
    /// Namespace prefix for keys and the global tag.
    pub namespace: String,
    /// Use tag-based invalidation when the backend supports it.
    pub tags: bool,
    /// Key entries by subject as well as by tab.
    pub per_subject: bool,
    /// Storage backend.
    pub backend: CacheBackend,
    /// Root directory for the file backend (relative to the config file).
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 3600,
            namespace: "naptab".to_owned(),
            tags: true,
            per_subject: true,
            backend: CacheBackend::Memory,
            dir: PathBuf::from(".naptab/cache"),
        }
    }
}

impl CacheConfig {
    /// Entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Preloading and switch debouncing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Preload the neighbours of the active tab after a switch.
    pub preload_adjacent: bool,
    /// Suppress repeated switches to the same tab within this window (0 disables).
    pub debounce_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            preload_adjacent: true,
            debounce_ms: 150,
        }
    }
}

impl PerformanceConfig {
    /// Debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Where the active tab id is encoded in the location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlStrategy {
    /// Last path segment (`/settings/profile`).
    #[default]
    Path,
    /// Named query parameter (`/settings?tab=profile`).
    Query,
}

/// How a URL update is requested from the router.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    /// History push without leaving the page.
    #[default]
    Spa,
    /// Client-side navigation.
    Navigate,
    /// Full page load.
    Reload,
}

/// Fallback active tab when no other source yields one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum DefaultTab {
    /// First visible tab.
    #[default]
    First,
    /// Last visible tab.
    Last,
    /// Explicitly configured tab id.
    Id(String),
}

impl From<String> for DefaultTab {
    fn from(value: String) -> Self {
        match value.as_str() {
            "first" => Self::First,
            "last" => Self::Last,
            _ => Self::Id(value),
        }
    }
}

/// Routing integration configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Whether the active tab is reflected in the location.
    pub routable: bool,
    /// Where the tab id lives in the location.
    pub url_strategy: UrlStrategy,
    /// Query parameter name for [`UrlStrategy::Query`].
    pub query_param: String,
    /// How URL updates are requested.
    pub mode: NavigationMode,
    /// Persist the active tab per UI instance.
    pub remember_tab: bool,
    /// Fallback tab.
    pub default_tab: DefaultTab,
    /// Push URL updates into browser history.
    pub browser_history: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            routable: false,
            url_strategy: UrlStrategy::Path,
            query_param: "tab".to_owned(),
            mode: NavigationMode::Spa,
            remember_tab: false,
            default_tab: DefaultTab::First,
            browser_history: true,
        }
    }
}

/// Caller identity used to bucket rate-limit counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitKey {
    /// Network address.
    #[default]
    Ip,
    /// Session id.
    Session,
    /// Authenticated subject (falls back to the network address).
    Subject,
}

/// Rate limiting configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether switch attempts are rate limited.
    pub enabled: bool,
    /// Attempts allowed per window.
    pub attempts: u32,
    /// Window length in seconds.
    pub decay_secs: u64,
    /// Caller key kind.
    pub key: RateLimitKey,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            attempts: 60,
            decay_secs: 60,
            key: RateLimitKey::Ip,
        }
    }
}

impl RateLimitConfig {
    /// Window length.
    #[must_use]
    pub fn decay(&self) -> Duration {
        Duration::from_secs(self.decay_secs)
    }
}

/// Security configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Run global checks and tab permissions (the disabled flag is always enforced).
    pub authorization: bool,
    /// Global authorization check names (`auth`, `guest`, or custom).
    pub checks: Vec<String>,
    /// Whether CSRF tokens are issued and verified.
    pub csrf: bool,
    /// Server-side secret bound into CSRF tokens.
    pub csrf_secret: String,
    /// Sanitize produced content.
    pub sanitize_html: bool,
    /// Escape content instead of stripping dangerous markup.
    pub escape_content: bool,
    /// Emit XSS protection headers.
    pub xss_protection: bool,
    /// Rate limiting.
    pub rate_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            authorization: true,
            checks: Vec::new(),
            csrf: false,
            csrf_secret: String::new(),
            sanitize_html: false,
            escape_content: false,
            xss_protection: true,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Hook and event configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Dispatch global lifecycle events (init, before/after load).
    pub dispatch_events: bool,
    /// Trace every hook execution.
    pub debug: bool,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`security.csrf_secret`").
        field: String,
        /// Error message (e.g., "${`TABS_SECRET`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a numeric field to be at most `max`.
fn require_at_most(value: u64, max: u64, field: &str) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::Validation(format!(
            "{field} must be at most {max}"
        )));
    }
    Ok(())
}

/// Require a numeric field to be positive.
fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional overrides.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `tabs.toml` in current directory and parents.
    ///
    /// Overrides are applied after loading and path resolution and are
    /// validated together with the file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(overrides) = overrides {
            config.apply_overrides(overrides);
            config.validate()?;
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string without touching the filesystem.
    ///
    /// Relative paths are resolved against `base`.
    ///
    /// # Errors
    ///
    /// Returns error if parsing, expansion or validation fails.
    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides to the configuration.
    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = enabled;
        }
        if let Some(ttl) = overrides.cache_ttl_secs {
            self.cache.ttl_secs = ttl;
        }
        if let Some(routable) = overrides.routable {
            self.navigation.routable = routable;
        }
        if let Some(remember) = overrides.remember_tab {
            self.navigation.remember_tab = remember;
        }
        if let Some(enabled) = overrides.rate_limit_enabled {
            self.security.rate_limit.enabled = enabled;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::discover_from(current)
    }

    /// Search for config file starting at `start` and walking up.
    fn discover_from(mut current: PathBuf) -> Option<PathBuf> {
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    #[must_use]
    pub fn default_with_base(base: &Path) -> Self {
        let mut config = Self::default();
        config.resolve_paths(base);
        config
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml_str(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_cache()?;
        self.validate_navigation()?;
        self.validate_security()?;
        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        require_positive(self.cache.ttl_secs, "cache.ttl_secs")?;
        require_at_most(self.cache.ttl_secs, MAX_WINDOW_SECS, "cache.ttl_secs")?;
        require_non_empty(&self.cache.namespace, "cache.namespace")?;
        Ok(())
    }

    fn validate_navigation(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.navigation.query_param, "navigation.query_param")?;

        if let DefaultTab::Id(ref id) = self.navigation.default_tab {
            let valid = !id.is_empty()
                && id.len() <= MAX_TAB_ID_LEN
                && id
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
            if !valid {
                return Err(ConfigError::Validation(format!(
                    "navigation.default_tab '{id}' is not a valid tab identifier"
                )));
            }
        }

        Ok(())
    }

    fn validate_security(&self) -> Result<(), ConfigError> {
        let rate_limit = &self.security.rate_limit;
        require_positive(u64::from(rate_limit.attempts), "security.rate_limit.attempts")?;
        require_positive(rate_limit.decay_secs, "security.rate_limit.decay_secs")?;
        require_at_most(
            rate_limit.decay_secs,
            MAX_WINDOW_SECS,
            "security.rate_limit.decay_secs",
        )?;

        if self.security.csrf && self.security.csrf_secret.is_empty() {
            return Err(ConfigError::Validation(
                "security.csrf_secret cannot be empty when csrf is enabled".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.cache.namespace = expand::expand_env(&self.cache.namespace, "cache.namespace")?;

        let dir = self.cache.dir.to_string_lossy();
        let expanded = expand::expand_env(&dir, "cache.dir")?;
        self.cache.dir = PathBuf::from(expanded);

        self.security.csrf_secret =
            expand::expand_env(&self.security.csrf_secret, "security.csrf_secret")?;

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        if self.cache.dir.is_relative() {
            self.cache.dir = config_dir.join(&self.cache.dir);
        }
    }
}
