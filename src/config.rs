use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::objects::ObjectsBackend;

pub const MAX_PART_URL_TTL_SECS: u64 = 3600;
pub const MAX_CONCURRENCY: usize = 16;
/// Smallest part an S3-compatible backend accepts for every part but the last.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Only required by `serve`; the upload client never talks to the backend's control API.
    pub objects: Option<ObjectsBackend>,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut s = String::new();
        file.read_to_string(&mut s)?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(s)?;
        config.server.validate()?;
        config.client.validate()?;
        Ok(config)
    }
}

fn default_listen_address() -> String {
    String::from("0.0.0.0:8080")
}

fn default_key_prefix() -> String {
    String::from("videos")
}

fn default_part_url_ttl_secs() -> u64 {
    900
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Directory-like prefix under which uploaded objects are stored.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_part_url_ttl_secs")]
    pub part_url_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            key_prefix: default_key_prefix(),
            part_url_ttl_secs: default_part_url_ttl_secs(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=MAX_PART_URL_TTL_SECS).contains(&self.part_url_ttl_secs) {
            return Err(Error::InvalidInput(format!(
                "server.part_url_ttl_secs must be within 1..={MAX_PART_URL_TTL_SECS}, got {}",
                self.part_url_ttl_secs
            )));
        }
        Ok(())
    }
}

fn default_server_url() -> String {
    String::from("http://127.0.0.1:8080")
}

fn default_part_size() -> u64 {
    MIN_PART_SIZE
}

fn default_concurrency() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_control_timeout_secs() -> u64 {
    60
}

fn default_part_timeout_secs() -> u64 {
    300
}

fn default_abort_on_failure() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    /// Parts in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts per part, each with a freshly issued URL.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_control_timeout_secs")]
    pub control_timeout_secs: u64,
    #[serde(default = "default_part_timeout_secs")]
    pub part_timeout_secs: u64,
    #[serde(default = "default_abort_on_failure")]
    pub abort_on_failure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            part_size: default_part_size(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            control_timeout_secs: default_control_timeout_secs(),
            part_timeout_secs: default_part_timeout_secs(),
            abort_on_failure: default_abort_on_failure(),
        }
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        if self.part_size < MIN_PART_SIZE {
            return Err(Error::InvalidInput(format!(
                "client.part_size must be at least {MIN_PART_SIZE} bytes, got {}",
                self.part_size
            )));
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(Error::InvalidInput(format!(
                "client.concurrency must be within 1..={MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidInput(String::from(
                "client.max_attempts must be at least 1",
            )));
        }
        Ok(())
    }
}
