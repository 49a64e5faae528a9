use crate::storage::{Source, SourceKind};
use serde::Deserialize;
use std::time::Duration;

/// User agents rotated across crawl sessions when none are configured
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Main configuration structure for News Engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,
}

/// Fetch and crawl-loop behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Delay applied after every successful fetch, and the backoff base (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first failed attempt
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound on pages visited in one crawl session
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Pool the session user agent is picked from
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Proxy applied to every request of a session
    #[serde(default)]
    pub proxy: Option<String>,
}

impl CrawlerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_pages: default_max_pages(),
            user_agents: default_user_agents(),
            proxy: None,
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Consumers started per queue
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Task bodies allowed to run at once across all queues
    #[serde(rename = "max-in-flight", default = "default_max_in_flight")]
    pub max_in_flight: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Stage hand-off behavior
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Articles per process/index task dispatched by a sweep
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Whether a finished stage dispatches the next one directly
    #[serde(rename = "chain-stages", default = "default_true")]
    pub chain_stages: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chain_stages: true,
        }
    }
}

/// Periodic sweep cadence
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(rename = "crawl-interval-secs", default = "default_crawl_interval")]
    pub crawl_interval_secs: u64,

    #[serde(rename = "process-interval-secs", default = "default_process_interval")]
    pub process_interval_secs: u64,

    #[serde(rename = "index-interval-secs", default = "default_index_interval")]
    pub index_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            crawl_interval_secs: default_crawl_interval(),
            process_interval_secs: default_process_interval(),
            index_interval_secs: default_index_interval(),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file; in-memory storage when absent
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,
}

/// A source registered from the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default = "default_kind")]
    pub kind: SourceKind,
    pub plugin: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(rename = "crawl-interval-secs", default = "default_source_interval")]
    pub crawl_interval_secs: u64,
}

impl SourceEntry {
    /// Converts the entry into a source record with no crawl history
    pub fn to_source(&self) -> Source {
        Source {
            id: self.id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            kind: self.kind,
            plugin: self.plugin.clone(),
            active: self.active,
            crawl_interval_secs: self.crawl_interval_secs,
            last_crawl_at: None,
        }
    }
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_pages() -> u32 {
    10
}

fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
}

fn default_concurrency() -> u32 {
    2
}

fn default_max_in_flight() -> u32 {
    8
}

fn default_batch_size() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_crawl_interval() -> u64 {
    3600
}

fn default_process_interval() -> u64 {
    1800
}

fn default_index_interval() -> u64 {
    900
}

fn default_kind() -> SourceKind {
    SourceKind::Website
}

fn default_source_interval() -> u64 {
    300
}
