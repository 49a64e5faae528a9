//! Configuration module for News Engine
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use news_engine::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("news.toml")).unwrap();
//! println!("Crawls stop after {} pages", config.crawler.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, PipelineConfig, ScheduleConfig, SourceEntry, StorageConfig,
    WorkerConfig, DEFAULT_USER_AGENTS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
