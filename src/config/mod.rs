//! Process configuration, read from flags with environment fallbacks.
//!
//! Every setting can come from a command-line flag or an environment
//! variable; flags win. [`Config::validate`] rejects values that parse but
//! cannot work.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::cache::CachePolicy;
use crate::origin::OriginOptions;
use crate::pipeline::Limits;

pub const DEFAULT_SYMBOL_SERVER: &str = "https://msdl.microsoft.com/download/symbols";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("symbol server must be an http(s) URL, got {0:?}")]
    SymbolServer(String),

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Where cached artifacts live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// In-process map, lost on restart.
    Memory,
    /// Files under `--cache-dir`.
    Disk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "symproxy", version, about = "Read-through caching proxy for a symbol server", long_about = None)]
pub struct Config {
    /// Address to accept client connections on
    #[arg(long, env = "SYMPROXY_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Upstream symbol server base URL
    #[arg(long, env = "SYMBOL_SERVER", default_value = DEFAULT_SYMBOL_SERVER)]
    pub symbol_server: String,

    /// Lifetime of cached 200 responses, in seconds
    #[arg(long, env = "CACHE_TTL", default_value_t = 31_536_000, value_name = "SECS")]
    pub cache_ttl: u64,

    /// Lifetime of cached 404 responses, in seconds
    #[arg(long, env = "NOT_FOUND_TTL", default_value_t = 3_600, value_name = "SECS")]
    pub not_found_ttl: u64,

    /// Largest artifact, in bytes, that will be cached
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 26_214_400, value_name = "BYTES")]
    pub max_file_size: u64,

    /// Chunks the client and cache copies of a body may drift apart by
    #[arg(long, env = "SYMPROXY_SPLIT_WINDOW", default_value_t = 16, value_name = "CHUNKS")]
    pub split_window: usize,

    #[arg(long, env = "SYMPROXY_STORE", value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// How often the memory store sweeps out expired entries, in seconds
    #[arg(long, env = "SYMPROXY_PURGE_INTERVAL", default_value_t = 60, value_name = "SECS")]
    pub purge_interval: u64,

    /// Root directory for the disk store
    #[arg(long, env = "SYMPROXY_CACHE_DIR", default_value = "./symbol-cache", value_name = "PATH")]
    pub cache_dir: PathBuf,

    /// Whole-request upstream timeout, in seconds
    #[arg(long, env = "SYMPROXY_UPSTREAM_TIMEOUT", default_value_t = 60, value_name = "SECS")]
    pub upstream_timeout: u64,

    /// Upstream connect timeout, in seconds
    #[arg(long, env = "SYMPROXY_CONNECT_TIMEOUT", default_value_t = 10, value_name = "SECS")]
    pub connect_timeout: u64,

    #[arg(long, env = "SYMPROXY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// # Errors
    ///
    /// Returns the first setting that cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.symbol_server.trim();
        let has_host = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(ConfigError::SymbolServer(self.symbol_server.clone()));
        }

        let positive = [
            ("cache-ttl", self.cache_ttl),
            ("not-found-ttl", self.not_found_ttl),
            ("max-file-size", self.max_file_size),
            ("split-window", self.split_window as u64),
            ("purge-interval", self.purge_interval),
            ("upstream-timeout", self.upstream_timeout),
            ("connect-timeout", self.connect_timeout),
        ];
        if let Some(&(name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero { name });
        }
        Ok(())
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::new(
            Duration::from_secs(self.cache_ttl),
            Duration::from_secs(self.not_found_ttl),
        )
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_artifact_size: self.max_file_size,
            split_window: self.split_window,
        }
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval)
    }

    pub fn origin_options(&self) -> OriginOptions {
        OriginOptions {
            timeout: Duration::from_secs(self.upstream_timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            ..OriginOptions::default()
        }
    }
}
