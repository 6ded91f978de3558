use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "coopmarket.toml",
    "config/coopmarket.toml",
    "crates/config/coopmarket.toml",
    "../coopmarket.toml",
    "../config/coopmarket.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub realtime: RealtimeConfig,
}

/// Connection settings for the hosted data service.
///
/// ```
/// use coopmarket_config::RemoteConfig;
///
/// let remote = RemoteConfig::default();
/// assert_eq!(remote.url, "http://127.0.0.1:54321");
/// assert_eq!(remote.request_timeout_seconds, 30);
/// assert!(remote.anon_key.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default = "RemoteConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl RemoteConfig {
    fn default_url() -> String {
        "http://127.0.0.1:54321".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Websocket endpoint of the change-notification channel.
    pub fn realtime_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/realtime/v1/websocket")
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            anon_key: String::new(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "RealtimeConfig::default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    #[serde(default = "RealtimeConfig::default_event_buffer")]
    pub event_buffer: usize,
}

impl RealtimeConfig {
    const fn default_heartbeat_interval() -> u64 {
        30
    }

    const fn default_event_buffer() -> usize {
        64
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: Self::default_heartbeat_interval(),
            event_buffer: Self::default_event_buffer(),
        }
    }
}

/// Load the client configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use coopmarket_config::load;
///
/// std::env::remove_var("COOPMARKET_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.remote.url.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let timeout = i64::try_from(defaults.remote.request_timeout_seconds).unwrap_or(i64::MAX);
    let heartbeat =
        i64::try_from(defaults.realtime.heartbeat_interval_seconds).unwrap_or(i64::MAX);
    let buffer = i64::try_from(defaults.realtime.event_buffer).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("remote.url", defaults.remote.url.clone())?
        .set_default("remote.anon_key", defaults.remote.anon_key.clone())?
        .set_default("remote.request_timeout_seconds", timeout)?
        .set_default("realtime.heartbeat_interval_seconds", heartbeat)?
        .set_default("realtime.event_buffer", buffer)?;

    let environment_overrides = config::Environment::with_prefix("COOPMARKET").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("COOPMARKET_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via COOPMARKET_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.realtime.event_buffer == 0 {
        config.realtime.event_buffer = 1;
    }

    debug!(url = %config.remote.url, "loaded client configuration");
    Ok(config)
}
