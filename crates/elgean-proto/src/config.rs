use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Settings for the same-origin proxy server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL of the upstream like/data API.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// Now-playing JSON published next to the HLS stream.
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
    /// Directory served for every path not matched by an API route.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Settings for the listener front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Base URL of the proxy server (same-origin for every listener call).
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Where the composite listener id is kept between sessions.
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_station_name")]
    pub station_name: String,
    #[serde(default = "default_stream_url")]
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            upstream_url: default_upstream_url(),
            metadata_url: default_metadata_url(),
            static_dir: default_static_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            identity_file: default_identity_file(),
        }
    }
}

impl ServerConfig {
    /// Upstream request timeout, never below one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl ListenerConfig {
    /// Like and metadata request timeout, never below one second.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            station_name: default_station_name(),
            url: default_stream_url(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_upstream_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_metadata_url() -> String {
    "https://d3d4yli4hf5bmh.cloudfront.net/metadatav2.json".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_server_url() -> String {
    format!("http://{}:{}", default_bind_address(), default_port())
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_identity_file() -> PathBuf {
    platform::identity_path()
}

fn default_station_name() -> String {
    "Radio Elgean".to_string()
}

fn default_stream_url() -> String {
    "https://d3d4yli4hf5bmh.cloudfront.net/hls/live.m3u8".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let mut config = if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            config
        } else {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Apply `PORT`, `ELGEAN_API_URL` and `ELGEAN_SERVER_URL` on top of the
    /// file values. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!("ignoring invalid PORT override {:?}", port),
            }
        }
        if let Some(url) = lookup("ELGEAN_API_URL").filter(|u| !u.trim().is_empty()) {
            self.server.upstream_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("ELGEAN_SERVER_URL").filter(|u| !u.trim().is_empty()) {
            self.listener.server_url = url.trim().trim_end_matches('/').to_string();
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            listener: ListenerConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}
