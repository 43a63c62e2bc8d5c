use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// InternetDB lookup endpoint. Keys are appended directly after the slash.
pub const DEFAULT_ENDPOINT: &str = "https://internetdb.shodan.io/";

/// TTL used when neither the call nor the configuration supplies one.
pub const FALLBACK_TTL: Duration = Duration::from_secs(6 * 60 * 60);

pub const DEFAULT_USER_AGENT: &str = concat!("ipqs-client/", env!("CARGO_PKG_VERSION"));

/// Configuration for a reputation lookup client
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL the lookup key is appended to.
    pub endpoint: String,

    /// Optional proxy URL (http, https or socks5). Empty means direct dialing.
    pub proxy: Option<String>,

    /// TTL in seconds for new cache entries. Zero or absent falls back to six hours.
    pub default_ttl_secs: Option<u64>,

    /// When false every lookup performs a fresh round trip.
    pub cache_enabled: bool,

    /// Optional transport-level timeout applied by the HTTP client.
    pub request_timeout_secs: Option<u64>,

    /// User agent used by tools that do not supply one per call.
    pub user_agent: String,

    /// Optional log filter (e.g., "info", "ipqs_client=debug").
    pub log_level: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            proxy: None,
            default_ttl_secs: None,
            cache_enabled: true,
            request_timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log_level: None,
        }
    }
}

impl ClientConfig {
    /// Load client configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        tracing::debug!("Loading client config from: {:?}", path_ref);
        let text = fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read client config file at {:?}: {}", path_ref, e))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Failed to parse client config from TOML at {:?}: {}", path_ref, e))?;
        Ok(config)
    }

    /// Overlays `IPQS_*` environment variables onto this configuration.
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides(|name| env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("IPQS_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(proxy) = lookup("IPQS_PROXY") {
            self.proxy = Some(proxy);
        }
        if let Some(ttl) = lookup("IPQS_TTL_SECS") {
            let secs = ttl
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("IPQS_TTL_SECS must be a number of seconds: {}", e))?;
            self.default_ttl_secs = Some(secs);
        }
        if let Some(enabled) = lookup("IPQS_CACHE_ENABLED") {
            self.cache_enabled = parse_flag(&enabled)
                .ok_or_else(|| anyhow::anyhow!("IPQS_CACHE_ENABLED must be true or false, got '{}'", enabled))?;
        }
        if let Some(timeout) = lookup("IPQS_TIMEOUT_SECS") {
            let secs = timeout
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("IPQS_TIMEOUT_SECS must be a number of seconds: {}", e))?;
            self.request_timeout_secs = Some(secs);
        }
        if let Some(user_agent) = lookup("IPQS_USER_AGENT") {
            self.user_agent = user_agent;
        }
        Ok(self)
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
