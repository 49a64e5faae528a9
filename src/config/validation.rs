use crate::config::types::{
    Config, CrawlerConfig, PipelineConfig, ScheduleConfig, SourceEntry, WorkerConfig,
};
use crate::plugins::PluginRegistry;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_worker_config(&config.worker)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_schedule_config(&config.schedule)?;
    validate_sources(&config.sources)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.user_agents.is_empty() || config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one non-empty entry".to_string(),
        ));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "worker concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.max_in_flight < 1 {
        return Err(ConfigError::Validation(format!(
            "max-in-flight must be >= 1, got {}",
            config.max_in_flight
        )));
    }

    Ok(())
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("crawl-interval-secs", config.crawl_interval_secs),
        ("process-interval-secs", config.process_interval_secs),
        ("index-interval-secs", config.index_interval_secs),
    ] {
        if value < 1 {
            return Err(ConfigError::Validation(format!("{} must be >= 1", name)));
        }
    }
    Ok(())
}

fn validate_sources(sources: &[SourceEntry]) -> Result<(), ConfigError> {
    let plugins = PluginRegistry::with_defaults();
    let mut seen = HashSet::new();

    for entry in sources {
        if entry.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate source id '{}'",
                entry.id
            )));
        }

        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "source '{}' must have a name",
                entry.id
            )));
        }

        let url = Url::parse(&entry.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid URL for source '{}': {}", entry.id, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "source '{}' URL must use http or https",
                entry.id
            )));
        }

        if !plugins.contains(&entry.plugin) {
            return Err(ConfigError::UnknownPlugin {
                source_id: entry.id.clone(),
                plugin: entry.plugin.clone(),
            });
        }

        if entry.crawl_interval_secs < 1 {
            return Err(ConfigError::Validation(format!(
                "source '{}' crawl-interval-secs must be >= 1",
                entry.id
            )));
        }
    }

    Ok(())
}
