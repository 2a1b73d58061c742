//! Configuration loading for routeward.
//!
//! Configuration is loaded from TOML files with the following resolution
//! order:
//! 1. `--config <path>` (explicit, caller-supplied)
//! 2. `~/.routeward/config.toml` (user)
//! 3. `/etc/routeward/config.toml` (system)
//!
//! Every value may then be overridden by an environment variable, applied
//! on top of the parsed file via
//! [`Config::apply_env_overlay`].
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.routeward/secrets.toml` (user, must be 0600)
//! 2. `/etc/routeward/secrets.toml` (system, must be 0600)

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limit::RateLimiterConfig;
use crate::registry::{CatalogSource, ModelOverride, RegistryConfig};
use crate::{Result, RouterError};

/// Top-level, immutable configuration value.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    #[serde(default)]
    pub registry: RegistryTomlConfig,
    #[serde(default)]
    pub state_backend: StateBackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: ProvidersConfig::default(),
            routing: RoutingConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            registry: RegistryTomlConfig::default(),
            state_backend: StateBackendConfig::default(),
        }
    }
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Routing parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_max_model_switches")]
    pub max_model_switches: u32,
    #[serde(default = "default_max_same_model_retries")]
    pub max_same_model_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub fallback_enabled: bool,
    #[serde(default)]
    pub fallback_provider: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_model_switches: default_max_model_switches(),
            max_same_model_retries: default_max_same_model_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            fallback_enabled: false,
            fallback_provider: None,
            fallback_model: None,
        }
    }
}

fn default_max_model_switches() -> u32 {
    3
}

fn default_max_same_model_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    60
}

/// Upstream provider configurations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openrouter: Option<ProviderEndpointConfig>,
    #[serde(default)]
    pub deepseek: Option<ProviderEndpointConfig>,
}

/// One upstream provider's endpoint configuration. The API key itself lives
/// in [`Secrets`], never here.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpointConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Registry/catalog source configuration (TOML section).
///
/// ```toml
/// [registry]
/// path = "/etc/routeward/models.yaml"
/// # or
/// url = "https://example.com/catalog.yaml"
/// cache_path = "~/.cache/routeward/catalog.yaml"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryTomlConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(default)]
    pub overrides: Vec<ModelOverride>,
}

impl RegistryTomlConfig {
    pub fn into_registry_config(self) -> Result<RegistryConfig> {
        let source = match (self.path, self.url) {
            (Some(path), _) => CatalogSource::Path(path),
            (None, Some(url)) => CatalogSource::Url {
                url,
                cache_path: self
                    .cache_path
                    .unwrap_or_else(crate::registry::fetch::default_cache_path),
            },
            (None, None) => {
                return Err(RouterError::Configuration(
                    "registry section requires either `path` or `url`".to_string(),
                ));
            }
        };
        Ok(RegistryConfig { source, overrides: self.overrides })
    }
}

/// Which [`crate::state::StateStore`] backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    Memory,
    Tcp,
    Http,
}

impl Default for StateBackendKind {
    fn default() -> Self {
        StateBackendKind::Memory
    }
}

/// State store backend selection, mirroring the `REDIS_TYPE`/`REDIS_URL`
/// environment variables — named after those variables even
/// though the TCP backend need not be Redis specifically, because that is
/// the deployed reality of every pack repo using a shared state backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateBackendConfig {
    #[serde(default)]
    pub kind: StateBackendKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Secrets configuration (API keys), loaded from a permission-checked file
/// separate from the main config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub openrouter: Option<ApiKeySecret>,
    #[serde(default)]
    pub deepseek: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] =
    &[("openrouter", "OPENROUTER_API_KEY"), ("deepseek", "DEEPSEEK_API_KEY")];

impl Config {
    /// Load configuration from the standard locations, then apply the
    /// environment-variable overlay.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path) {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    RouterError::Configuration(format!("failed to read config file {path:?}: {e}"))
                })?;
                toml::from_str(&content).map_err(|e| {
                    RouterError::Configuration(format!("failed to parse config file {path:?}: {e}"))
                })?
            }
            None if explicit_path.is_some() => {
                return Err(RouterError::Configuration(format!(
                    "config file not found: {:?}",
                    explicit_path.unwrap()
                )));
            }
            None => Config::default(),
        };
        config.apply_env_overlay();
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return path.exists().then(|| path.to_path_buf());
        }
        if let Ok(env_path) = std::env::var("ROUTER_CONFIG_PATH") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Some(path);
            }
        }
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".routeward").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }
        let system_config = PathBuf::from("/etc/routeward/config.toml");
        system_config.exists().then_some(system_config)
    }

    /// Apply every recognized environment variable on top of
    /// whatever the TOML file (or defaults) produced. Malformed numeric/JSON
    /// values are ignored with a warning rather than failing startup.
    pub fn apply_env_overlay(&mut self) {
        use std::env::var;

        if let Ok(v) = var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = parsed_env("PORT") {
            self.server.port = v;
        }

        overlay_provider(&mut self.providers.openrouter, "OPENROUTER");
        overlay_provider(&mut self.providers.deepseek, "DEEPSEEK");

        if let Some(v) = parsed_env("ROUTING_MAX_MODEL_SWITCHES") {
            self.routing.max_model_switches = v;
        }
        if let Some(v) = parsed_env("ROUTING_MAX_SAME_MODEL_RETRIES") {
            self.routing.max_same_model_retries = v;
        }
        if let Some(v) = parsed_env("ROUTING_RETRY_DELAY") {
            self.routing.retry_delay_ms = v;
        }
        if let Some(v) = parsed_env("ROUTING_TIMEOUT_SECS") {
            self.routing.timeout_secs = v;
        }
        if let Some(v) = parsed_env("ROUTING_FALLBACK_ENABLED") {
            self.routing.fallback_enabled = v;
        }
        if let Ok(v) = var("ROUTING_FALLBACK_PROVIDER") {
            self.routing.fallback_provider = Some(v);
        }
        if let Ok(v) = var("ROUTING_FALLBACK_MODEL") {
            self.routing.fallback_model = Some(v);
        }

        if let Some(v) = parsed_env("CB_FAILURE_THRESHOLD") {
            self.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = parsed_env("CB_COOLDOWN_PERIOD_MINS") {
            self.circuit_breaker.cooldown_period_mins = v;
        }
        if let Some(v) = parsed_env("CB_SUCCESS_THRESHOLD") {
            self.circuit_breaker.success_threshold = v;
        }
        if let Some(v) = parsed_env("CB_STATS_WINDOW_SIZE_MINS") {
            self.circuit_breaker.stats_window_size_mins = v;
        }

        if let Ok(v) = var("ROUTER_MODEL_REQUESTS_PER_MINUTE") {
            self.rate_limiter.model_requests_per_minute = v.parse().ok();
        }
        if let Ok(v) = var("ROUTER_MODEL_OVERRIDES") {
            match serde_json::from_str::<Vec<ModelOverride>>(&v) {
                Ok(overrides) => self.registry.overrides.extend(overrides),
                Err(e) => {
                    tracing::warn!(error = %e, "ROUTER_MODEL_OVERRIDES is not valid JSON, ignoring");
                }
            }
        }

        if let Ok(v) = var("REDIS_TYPE") {
            match v.to_ascii_lowercase().as_str() {
                "memory" => self.state_backend.kind = StateBackendKind::Memory,
                "tcp" => self.state_backend.kind = StateBackendKind::Tcp,
                "http" => self.state_backend.kind = StateBackendKind::Http,
                other => tracing::warn!(value = other, "unrecognized REDIS_TYPE, ignoring"),
            }
        }
        if let Ok(v) = var("REDIS_URL") {
            self.state_backend.url = Some(v);
        }
        if let Ok(v) = var("REDIS_TOKEN") {
            self.state_backend.token = Some(v);
        }
    }
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| match v.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(name, value = %v, "failed to parse environment variable, ignoring");
            None
        }
    })
}

fn overlay_provider(slot: &mut Option<ProviderEndpointConfig>, prefix: &str) {
    let enabled = parsed_env::<bool>(&format!("{prefix}_ENABLED"));
    let base_url = std::env::var(format!("{prefix}_BASE_URL")).ok();
    if enabled.is_none() && base_url.is_none() {
        return;
    }
    let entry = slot.get_or_insert_with(|| ProviderEndpointConfig { enabled: true, base_url: None });
    if let Some(enabled) = enabled {
        entry.enabled = enabled;
    }
    if let Some(base_url) = base_url {
        entry.base_url = Some(base_url);
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists — providers then fall back to
    /// `{PROVIDER}_API_KEY` environment variables via [`Secrets::api_key`].
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".routeward").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/routeward/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RouterError::Configuration(format!("failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            RouterError::Configuration(format!("failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            RouterError::Configuration(format!("failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(RouterError::Configuration(format!(
                "secrets file {path:?} has insecure permissions {:o}, must be 0600 or 0400",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Get the API key for a provider, falling back to its environment
    /// variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let from_file = match provider {
            "openrouter" => self.openrouter.as_ref(),
            "deepseek" => self.deepseek.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.routing.max_model_switches, 3);
        assert_eq!(config.routing.max_same_model_retries, 2);
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 9000
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.routing.max_model_switches, 3);
    }

    #[test]
    fn parse_full_routing_and_breaker_config() {
        let toml = r#"
            [routing]
            max_model_switches = 5
            max_same_model_retries = 1
            retry_delay_ms = 250
            timeout_secs = 30
            fallback_enabled = true
            fallback_provider = "openrouter"
            fallback_model = "gpt-fast"

            [circuit_breaker]
            failure_threshold = 5
            cooldown_period_mins = 1
            success_threshold = 3
            stats_window_size_mins = 15
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.routing.max_model_switches, 5);
        assert!(config.routing.fallback_enabled);
        assert_eq!(config.routing.fallback_model.as_deref(), Some("gpt-fast"));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.stats_window_size_mins, 15);
    }

    #[test]
    fn registry_requires_path_or_url() {
        let registry = RegistryTomlConfig::default();
        assert!(registry.into_registry_config().is_err());
    }

    #[test]
    fn registry_path_source_converts() {
        let registry = RegistryTomlConfig {
            path: Some(PathBuf::from("/etc/routeward/models.yaml")),
            ..Default::default()
        };
        let config = registry.into_registry_config().unwrap();
        assert!(matches!(config.source, CatalogSource::Path(_)));
    }

    #[test]
    fn registry_url_source_uses_default_cache_path_when_unset() {
        let registry = RegistryTomlConfig {
            url: Some("https://example.com/catalog.yaml".to_string()),
            ..Default::default()
        };
        let config = registry.into_registry_config().unwrap();
        assert!(matches!(config.source, CatalogSource::Url { .. }));
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [openrouter]
            api_key = "sk-or-test-key"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.openrouter.as_ref().unwrap().api_key, "sk-or-test-key");
        assert!(secrets.deepseek.is_none());
    }

    #[test]
    fn api_key_from_secrets_file_wins_over_env() {
        let secrets =
            Secrets { openrouter: Some(ApiKeySecret { api_key: "from-file".to_string() }), ..Default::default() };
        assert_eq!(secrets.api_key("openrouter"), Some("from-file".to_string()));
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    // These exercise `apply_env_overlay` together, in one test function, so
    // that parallel test execution within this module never has two tests
    // racing on the same process-global environment variables.
    #[test]
    fn env_overlay_applies_and_validates_every_variable() {
        std::env::set_var("PORT", "1234");
        std::env::set_var("ROUTING_MAX_MODEL_SWITCHES", "9");
        std::env::set_var("ROUTER_MODEL_OVERRIDES", r#"[{"name":"gpt-fast","weight":80}]"#);
        std::env::set_var("REDIS_TYPE", "tcp");
        std::env::set_var("REDIS_URL", "redis://localhost:6379");

        let mut config = Config::default();
        config.apply_env_overlay();

        assert_eq!(config.server.port, 1234);
        assert_eq!(config.routing.max_model_switches, 9);
        assert_eq!(config.registry.overrides.len(), 1);
        assert_eq!(config.registry.overrides[0].name, "gpt-fast");
        assert_eq!(config.state_backend.kind, StateBackendKind::Tcp);
        assert_eq!(config.state_backend.url.as_deref(), Some("redis://localhost:6379"));

        std::env::remove_var("PORT");
        std::env::remove_var("ROUTING_MAX_MODEL_SWITCHES");
        std::env::remove_var("ROUTER_MODEL_OVERRIDES");
        std::env::remove_var("REDIS_TYPE");
        std::env::remove_var("REDIS_URL");

        std::env::set_var("PORT", "not-a-number");
        let mut config = Config::default();
        config.apply_env_overlay();
        assert_eq!(config.server.port, 8080);
        std::env::remove_var("PORT");
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
    }
}
