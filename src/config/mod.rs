//! Configuration management.
//!
//! The process carries one [`MemoryConfig`] snapshot. It is read from a JSON
//! file through [`ConfigStore`], then environment overrides are applied.
//!
//! ```json
//! {
//!   "root_dir": "/var/lib/agentmem",
//!   "journal": { "enabled": true, "buffer_size": 256 },
//!   "distiller": {
//!     "base_url": "https://api.openai.com/v1",
//!     "model": "gpt-4o-mini",
//!     "api_key": "${OPENAI_API_KEY}"
//!   }
//! }
//! ```

mod env;
mod store;

pub use env::expand_env_vars;
pub use store::ConfigStore;

use crate::observability::LoggingConfig;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default journal buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Default checkpoint window.
pub const DEFAULT_MAX_EVENTS: usize = 250;

/// Default staleness threshold in days.
pub const DEFAULT_STALE_DAYS: i64 = 45;

/// Main configuration for agentmem.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Root under which per-agent directories live.
    pub root_dir: PathBuf,
    /// Journal settings.
    pub journal: JournalConfig,
    /// Embedding endpoint.
    pub embeddings: EndpointConfig,
    /// Distillation endpoint.
    pub distiller: EndpointConfig,
    /// Default checkpoint window.
    pub checkpoint_max_events: usize,
    /// Default maintenance staleness threshold.
    pub maintenance_stale_days: i64,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Journal settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalConfig {
    /// When false, every journal operation is a no-op.
    pub enabled: bool,
    /// Bounded buffer between producers and the writer.
    pub buffer_size: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// A remote model endpoint (distiller or embedder).
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Whether the endpoint is used at all.
    pub enabled: bool,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Resolved API key.
    pub api_key: Option<SecretString>,
    /// The `${VAR}` reference the key came from, kept for saving.
    pub api_key_ref: Option<String>,
    /// Headers added to every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Response body cap in bytes.
    pub max_response_bytes: usize,
    /// Completion token budget (distiller only).
    pub max_tokens: u32,
}

impl EndpointConfig {
    /// Defaults for the embedding endpoint.
    #[must_use]
    pub fn embeddings() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            api_key_ref: None,
            extra_headers: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            max_response_bytes: 1024 * 1024,
            max_tokens: 0,
        }
    }

    /// Defaults for the distillation endpoint.
    #[must_use]
    pub fn distiller() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_ref: None,
            extra_headers: BTreeMap::new(),
            timeout: Duration::from_secs(45),
            max_response_bytes: 2 * 1024 * 1024,
            max_tokens: 1600,
        }
    }

    /// Returns true if the endpoint is enabled, has a base URL and model,
    /// and either carries an API key or points at a loopback host.
    ///
    /// Journal content is never sent to a remote endpoint without credentials.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.enabled
            && !self.base_url.trim().is_empty()
            && !self.model.trim().is_empty()
            && (self.api_key.is_some() || self.is_loopback())
    }

    /// Returns true if the base URL's host is `localhost` or a loopback address.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        let Ok(url) = reqwest::Url::parse(self.base_url.trim()) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        if host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
    }

    /// Sets the API key from a raw or `${VAR}` value.
    pub fn set_api_key(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() {
            self.api_key = None;
            self.api_key_ref = None;
            return;
        }
        self.api_key_ref = env::is_reference(raw).then(|| raw.to_string());
        let resolved = expand_env_vars(raw);
        self.api_key = (!resolved.is_empty()).then(|| SecretString::from(resolved));
    }

    fn merge(&mut self, file: ConfigFileEndpoint) {
        if let Some(v) = file.enabled {
            self.enabled = v;
        }
        if let Some(v) = file.base_url {
            self.base_url = expand_env_vars(&v);
        }
        if let Some(v) = file.model {
            self.model = expand_env_vars(&v);
        }
        if let Some(v) = file.api_key {
            self.set_api_key(&v);
        }
        if let Some(headers) = file.extra_headers {
            self.extra_headers = headers
                .into_iter()
                .map(|(k, v)| (k, expand_env_vars(&v)))
                .collect();
        }
        if let Some(ms) = file.timeout_ms {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(v) = file.max_response_bytes {
            self.max_response_bytes = v;
        }
        if let Some(v) = file.max_tokens {
            self.max_tokens = v;
        }
    }

    fn to_file(&self) -> ConfigFileEndpoint {
        ConfigFileEndpoint {
            enabled: Some(self.enabled),
            base_url: Some(self.base_url.clone()),
            model: Some(self.model.clone()),
            api_key: self.api_key_ref.clone(),
            extra_headers: Some(self.extra_headers.clone()),
            timeout_ms: Some(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)),
            max_response_bytes: Some(self.max_response_bytes),
            max_tokens: (self.max_tokens > 0).then_some(self.max_tokens),
        }
    }
}

/// Configuration file structure (JSON).
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Root directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<String>,
    /// Journal section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<ConfigFileJournal>,
    /// Embeddings section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<ConfigFileEndpoint>,
    /// Distiller section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distiller: Option<ConfigFileEndpoint>,
    /// Checkpoint section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<ConfigFileCheckpoint>,
    /// Maintenance section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<ConfigFileMaintenance>,
    /// Logging section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Journal section in config file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFileJournal {
    /// Enabled flag.
    pub enabled: Option<bool>,
    /// Buffer size.
    pub buffer_size: Option<usize>,
}

/// Endpoint section in config file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFileEndpoint {
    /// Enabled flag.
    pub enabled: Option<bool>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Model.
    pub model: Option<String>,
    /// API key; a `${VAR}` reference is expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Extra headers.
    pub extra_headers: Option<BTreeMap<String, String>>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Response body cap.
    pub max_response_bytes: Option<usize>,
    /// Completion token budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Checkpoint section in config file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFileCheckpoint {
    /// Default window.
    pub default_max_events: Option<usize>,
}

/// Maintenance section in config file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFileMaintenance {
    /// Default staleness threshold.
    pub default_stale_days: Option<i64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            journal: JournalConfig::default(),
            embeddings: EndpointConfig::embeddings(),
            distiller: EndpointConfig::distiller(),
            checkpoint_max_events: DEFAULT_MAX_EVENTS,
            maintenance_stale_days: DEFAULT_STALE_DAYS,
            logging: LoggingConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root directory.
    #[must_use]
    pub fn with_root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_dir = path.into();
        self
    }

    /// Disables the distiller so checkpoints use the deterministic fallback.
    #[must_use]
    pub fn without_distiller(mut self) -> Self {
        self.distiller.enabled = false;
        self
    }

    /// Converts a `ConfigFile` to `MemoryConfig`.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(root) = file.root_dir {
            config.root_dir = PathBuf::from(expand_env_vars(&root));
        }
        if let Some(journal) = file.journal {
            if let Some(v) = journal.enabled {
                config.journal.enabled = v;
            }
            if let Some(v) = journal.buffer_size {
                config.journal.buffer_size = v.max(1);
            }
        }
        if let Some(embeddings) = file.embeddings {
            config.embeddings.merge(embeddings);
        }
        if let Some(distiller) = file.distiller {
            config.distiller.merge(distiller);
        }
        if let Some(v) = file.checkpoint.and_then(|c| c.default_max_events) {
            config.checkpoint_max_events = v.max(1);
        }
        if let Some(v) = file.maintenance.and_then(|m| m.default_stale_days) {
            config.maintenance_stale_days = v;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        config
    }

    /// Converts back to the file form. Resolved keys are never written;
    /// only their `${VAR}` reference survives.
    #[must_use]
    pub fn to_config_file(&self) -> ConfigFile {
        ConfigFile {
            root_dir: Some(self.root_dir.display().to_string()),
            journal: Some(ConfigFileJournal {
                enabled: Some(self.journal.enabled),
                buffer_size: Some(self.journal.buffer_size),
            }),
            embeddings: Some(self.embeddings.to_file()),
            distiller: Some(self.distiller.to_file()),
            checkpoint: Some(ConfigFileCheckpoint {
                default_max_events: Some(self.checkpoint_max_events),
            }),
            maintenance: Some(ConfigFileMaintenance {
                default_stale_days: Some(self.maintenance_stale_days),
            }),
            logging: Some(self.logging.clone()),
        }
    }

    /// Applies `AGENTMEM_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup (the environment in
    /// production).
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("AGENTMEM_ROOT") {
            self.root_dir = PathBuf::from(v);
        }
        if let Some(n) = get("AGENTMEM_JOURNAL_BUFFER").and_then(|v| v.parse::<usize>().ok()) {
            self.journal.buffer_size = n.max(1);
        }
        if let Some(v) = get("AGENTMEM_EMBEDDINGS_ENABLED") {
            self.embeddings.enabled = parse_bool(&v);
        }
        if let Some(v) = get("AGENTMEM_LLM_BASE_URL") {
            self.distiller.base_url = v;
        }
        if let Some(v) = get("AGENTMEM_LLM_MODEL") {
            self.distiller.model = v;
        }
        if let Some(v) = get("AGENTMEM_LLM_API_KEY") {
            self.distiller.set_api_key(&v);
        }
        if let Some(v) = get("AGENTMEM_EMBED_BASE_URL") {
            self.embeddings.base_url = v;
        }
        if let Some(v) = get("AGENTMEM_EMBED_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = get("AGENTMEM_EMBED_API_KEY") {
            self.embeddings.set_api_key(&v);
        }
        self
    }

    /// Loads configuration from the default location, falling back to
    /// defaults when no file exists or it cannot be read.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default().with_env_overrides();
        };
        ConfigStore::load(&path)
            .unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Falling back to default config");
                Self::default()
            })
            .with_env_overrides()
    }
}

/// Platform data directory for agent roots (`<data_dir>/agentmem`).
#[must_use]
pub fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "agentmem")
        .map_or_else(|| PathBuf::from(".agentmem"), |dirs| dirs.data_dir().to_path_buf())
}

/// Platform config file path (`<config_dir>/agentmem/config.json`).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agentmem")
        .map(|dirs| dirs.config_dir().join("config.json"))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
