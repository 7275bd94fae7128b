use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::errors::Result;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_STORAGE_PATH: &str = ".laundry/storage.json";

#[derive(Debug, Clone)]
pub struct Config {
    /// REST base, e.g. `https://app.example.com/api`.
    pub api_url: String,
    /// Explicit push endpoint; derived from `api_url` when unset.
    pub socket_url: Option<String>,
    /// JSON file standing in for the browser's persisted client storage.
    pub storage_path: PathBuf,
    /// Period of the fallback polling loop.
    pub poll_interval: Duration,
    /// Polling starts if push has not connected this long after `start()`.
    pub fallback_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Page size for the initial notifications fetch.
    pub page_size: u32,
    /// Delay between a permission/role change event and the claims refresh.
    pub claims_refresh_delay: Duration,
    /// Backoff schedule used to re-establish a dropped push connection.
    pub reconnect_backoff: Vec<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: None,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            poll_interval: Duration::from_secs(10),
            fallback_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            page_size: 20,
            claims_refresh_delay: Duration::from_millis(1500),
            reconnect_backoff: [1, 2, 5, 10, 10]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}

impl Config {
    /// Parsed REST base URL, always ending in `/` so `Url::join` appends.
    pub fn api_base(&self) -> Result<Url> {
        let trimmed = self.api_url.trim_end_matches('/');
        Ok(Url::parse(&format!("{}/", trimmed))?)
    }

    /// Push endpoint: the API host with any `/api` suffix stripped,
    /// switched to the websocket scheme.
    pub fn socket_url(&self) -> Result<Url> {
        if let Some(explicit) = &self.socket_url {
            return Ok(Url::parse(explicit)?);
        }
        let base = self.api_url.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        Ok(Url::parse(&format!("{}/socket", base))?)
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    let config = Config {
        api_url: std::env::var("LAUNDRY_API_URL").unwrap_or(defaults.api_url),
        socket_url: std::env::var("LAUNDRY_SOCKET_URL").ok(),
        storage_path: std::env::var("LAUNDRY_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_path),
        poll_interval: env_secs("LAUNDRY_POLL_INTERVAL_SECS", defaults.poll_interval),
        fallback_delay: env_secs("LAUNDRY_FALLBACK_DELAY_SECS", defaults.fallback_delay),
        connect_timeout: env_secs("LAUNDRY_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
        request_timeout: env_secs("LAUNDRY_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
        page_size: std::env::var("LAUNDRY_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.page_size),
        claims_refresh_delay: std::env::var("LAUNDRY_CLAIMS_REFRESH_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.claims_refresh_delay),
        reconnect_backoff: defaults.reconnect_backoff,
    };

    if config.poll_interval.is_zero() {
        anyhow::bail!("LAUNDRY_POLL_INTERVAL_SECS must be greater than zero");
    }

    Ok(config)
}
