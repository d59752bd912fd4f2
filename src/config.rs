use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;
use crate::error::DatasetError;

pub const DEFAULT_CONFIG_FILE: &str = "chatbi-ds.json";
pub const BASE_URL_ENV: &str = "CHATBI_API_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_poll_rounds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub page_size: usize,
    pub poll_interval: Duration,
    pub max_poll_rounds: u32,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: DEFAULT_TTL,
            request_timeout: Duration::from_secs(30),
            page_size: 100,
            poll_interval: Duration::from_millis(2000),
            max_poll_rounds: 150,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `chatbi-ds.json` when no path is given. Only the
    /// default file may be missing, in which case defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, DatasetError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| DatasetError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| DatasetError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, std::env::var(BASE_URL_ENV).ok())
    }

    /// `base_url_override` wins over the file's `base_url` when non-empty.
    pub fn resolve_config(
        config: Config,
        base_url_override: Option<String>,
    ) -> Result<ResolvedConfig, DatasetError> {
        let defaults = ResolvedConfig::default();

        let base_url = base_url_override
            .filter(|url| !url.trim().is_empty())
            .or(config.base_url)
            .unwrap_or(defaults.base_url);
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(DatasetError::InvalidConfig(format!(
                "base_url must be an http(s) URL: {base_url}"
            )));
        }

        let page_size = config.page_size.unwrap_or(defaults.page_size);
        if page_size == 0 {
            return Err(DatasetError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        let request_timeout = config
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        if request_timeout.is_zero() {
            return Err(DatasetError::InvalidConfig(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            base_url,
            cache_ttl: config
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            request_timeout,
            page_size,
            poll_interval: config
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_poll_rounds: config.max_poll_rounds.unwrap_or(defaults.max_poll_rounds),
        })
    }
}
