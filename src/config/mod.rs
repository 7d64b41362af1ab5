//! Configuration management.
//!
//! Settings are layered: serde defaults, then an optional TOML file, then
//! environment variables prefixed with `CITATION_AUDITOR_` (nested keys are
//! separated by `__`, e.g. `CITATION_AUDITOR_CACHE__TTL_SECONDS=600`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "CITATION_AUDITOR";
const CONFIG_FILE_NAME: &str = "citation-auditor.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeys,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Lookup result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached lookups
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,

    /// Time-to-live for cached lookups, in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn default_cache_entries() -> u64 {
    1000
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Minimum spacing between calls to the same service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Delay for services missing from `min_delay_secs`
    #[serde(default = "default_delay")]
    pub default_delay_secs: f64,

    /// Per-service minimum delay in seconds. Zero disables limiting.
    #[serde(default = "default_min_delays")]
    pub min_delay_secs: HashMap<String, f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay_secs: default_delay(),
            min_delay_secs: default_min_delays(),
        }
    }
}

impl RateLimitConfig {
    /// Minimum delay for a service. Zero or negative disables limiting; a
    /// NaN or unrepresentable value falls back to the built-in default.
    pub fn delay_for(&self, service: &str) -> Duration {
        let secs = self
            .min_delay_secs
            .get(service)
            .copied()
            .unwrap_or(self.default_delay_secs);
        if secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
            tracing::warn!("Invalid rate limit delay {} for {}, using default", secs, service);
            Duration::from_secs_f64(default_delay())
        })
    }
}

fn default_delay() -> f64 {
    1.0
}

fn default_min_delays() -> HashMap<String, f64> {
    [
        ("crossref", 1.0),
        ("pubmed", 0.34),
        ("arxiv", 3.0),
        ("semantic_scholar", 1.0),
        ("openalex", 0.1),
        ("web", 5.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Acceptance thresholds for each tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Confidence assigned to identifier matches
    #[serde(default = "default_identifier_confidence")]
    pub identifier: f64,

    /// Minimum similarity for a search match
    #[serde(default = "default_search_threshold")]
    pub search: f64,

    /// Minimum similarity for a fallback match
    #[serde(default = "default_fallback_threshold")]
    pub fallback: f64,

    /// Search threshold overrides keyed by service
    #[serde(default)]
    pub per_service: HashMap<String, f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            identifier: default_identifier_confidence(),
            search: default_search_threshold(),
            fallback: default_fallback_threshold(),
            per_service: HashMap::new(),
        }
    }
}

impl ThresholdConfig {
    /// Search threshold for a service, honoring overrides
    pub fn search_threshold(&self, service: &str) -> f64 {
        self.per_service
            .get(service)
            .copied()
            .unwrap_or(self.search)
    }
}

fn default_identifier_confidence() -> f64 {
    0.95
}

fn default_search_threshold() -> f64 {
    0.65
}

fn default_fallback_threshold() -> f64 {
    0.5
}

/// Orchestrator behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Run the fallback tier when stricter tiers fail
    #[serde(default = "default_true")]
    pub enable_fallbacks: bool,

    /// Candidates requested per search call
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Maximum relaxed title variants tried in the fallback tier
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,

    /// Overall deadline for one lookup, in seconds
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            enable_fallbacks: true,
            max_results: default_max_results(),
            max_variants: default_max_variants(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> usize {
    5
}

fn default_max_variants() -> usize {
    5
}

fn default_lookup_timeout() -> u64 {
    120
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Contact address for polite API pools (CrossRef, OpenAlex)
    #[serde(default)]
    pub mailto: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: None,
            mailto: None,
        }
    }
}

fn default_http_timeout() -> u64 {
    15
}

fn default_connect_timeout() -> u64 {
    10
}

/// Which adapters are registered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Source IDs that are never registered
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Register the scraping web-search adapter (fallback tier only)
    #[serde(default = "default_true")]
    pub web_search_enabled: bool,

    /// Base URL overrides keyed by source ID
    #[serde(default)]
    pub base_urls: HashMap<String, String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            web_search_enabled: true,
            base_urls: HashMap::new(),
        }
    }
}

impl SourcesConfig {
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.iter().any(|d| d.eq_ignore_ascii_case(id))
    }

    pub fn base_url(&self, id: &str) -> Option<&str> {
        self.base_urls.get(id).map(|s| s.as_str())
    }
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Semantic Scholar API key (optional, for higher rate limits)
    #[serde(default)]
    pub semantic_scholar: Option<String>,

    /// NCBI E-utilities key (optional)
    #[serde(default)]
    pub ncbi: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            semantic_scholar: std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
            ncbi: std::env::var("NCBI_API_KEY").ok(),
        }
    }
}

/// Audit pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Citations looked up concurrently
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// File receiving one JSON record per outbound API call.
    /// Records go to stderr when unset.
    #[serde(default = "default_api_log_path")]
    pub api_log_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            api_log_path: default_api_log_path(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_log_path() -> Option<PathBuf> {
    Some(PathBuf::from("logs/api_calls.log"))
}

/// Load configuration from a file, with environment overrides
pub fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    build(Some(path))
}

/// Load configuration from environment variables and defaults only
pub fn get_config() -> Result<Config, config::ConfigError> {
    build(None)
}

fn build(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

/// Find a configuration file in the default locations
///
/// Checks `./citation-auditor.toml`, then the platform config directory
/// (`~/.config/citation-auditor/config.toml` on Linux).
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("citation-auditor").join("config.toml"))
        .filter(|p| p.is_file())
}
