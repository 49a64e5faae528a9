//! News Engine: a pluggable news crawler feeding a queue-routed pipeline
//!
//! Sources are crawled page by page through per-source extraction plugins,
//! and the extracted articles move through three stages (crawl, process,
//! index), each bound to its own queue and tolerant of at-least-once delivery.

pub mod config;
pub mod crawler;
pub mod pipeline;
pub mod plugins;
pub mod processing;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for News Engine operations
#[derive(Debug, Error)]
pub enum NewsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Task registry error: {0}")]
    Registry(#[from] pipeline::RegistryError),

    #[error("Broker error: {0}")]
    Broker(#[from] pipeline::BrokerError),

    #[error("Task error: {0}")]
    Task(#[from] pipeline::TaskError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] plugins::PluginError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown plugin '{plugin}' for source '{source_id}'")]
    UnknownPlugin { source_id: String, plugin: String },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for News Engine operations
pub type Result<T> = std::result::Result<T, NewsError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, CrawlResult};
pub use plugins::{ExtractedArticle, PluginRegistry, SourcePlugin};
pub use url::{extract_domain, normalize_url, same_host};
