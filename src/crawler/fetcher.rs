//! HTTP fetch session
//!
//! One `FetchSession` is opened per crawl. It owns the HTTP client and its
//! connection pool, the user agent picked for the session, the throttle
//! delay and the retry budget. Fetches never fail with `Err`: every outcome,
//! including exhausted retries, comes back as a `FetchAttempt`.

use crate::config::{CrawlerConfig, DEFAULT_USER_AGENTS};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Proxy};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    /// HTTP status code
    pub status: u16,
    /// Response body decoded as text
    pub body: String,
}

/// A fetch that gave up after exhausting its retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub error: String,
    /// Retries performed after the first attempt
    pub retries: u32,
}

/// Everything that happened while fetching one URL
#[derive(Debug)]
pub struct FetchAttempt {
    pub url: Url,
    /// Requests sent, including the first one
    pub attempts: u32,
    /// Total backoff slept between attempts
    pub backoff: Duration,
    pub outcome: Result<FetchedPage, FetchFailure>,
}

/// Request counters of a fetch session
#[derive(Debug, Default)]
pub struct FetchStats {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of `FetchStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

impl FetchStats {
    pub fn snapshot(&self) -> FetchStatsSnapshot {
        FetchStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Per-crawl HTTP session
pub struct FetchSession {
    client: Client,
    user_agent: String,
    delay: Duration,
    max_retries: u32,
    stats: FetchStats,
}

impl FetchSession {
    /// Opens a session configured from the crawler settings
    ///
    /// # Arguments
    ///
    /// * `config` - Crawler settings (timeout, proxy, user agent pool, delays)
    ///
    /// # Returns
    ///
    /// * `Ok(FetchSession)` - Session ready to fetch
    /// * `Err(reqwest::Error)` - The proxy URL was rejected or the client failed to build
    pub fn new(config: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        let user_agent = pick_user_agent(&config.user_agents);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );

        let mut builder = Client::builder()
            .user_agent(user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }

        Ok(Self {
            client: builder.build()?,
            user_agent,
            delay: config.delay(),
            max_retries: config.max_retries,
            stats: FetchStats::default(),
        })
    }

    /// The user agent sent with every request of this session
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn stats(&self) -> FetchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Fetches a URL, retrying failures with linear backoff
    ///
    /// # Retry Logic
    ///
    /// | Outcome | Action |
    /// |---------|--------|
    /// | 2xx | Sleep the throttle delay, return the page |
    /// | Network error or non-2xx | Sleep `delay * (retry + 1)`, try again |
    /// | `max_retries` retries spent | Return a `FetchFailure` |
    pub async fn fetch(&self, url: &Url) -> FetchAttempt {
        let mut retries = 0u32;
        let mut backoff = Duration::ZERO;

        loop {
            self.stats.requests.fetch_add(1, Ordering::Relaxed);

            match self.request(url).await {
                Ok(page) => {
                    self.stats.successes.fetch_add(1, Ordering::Relaxed);
                    debug!(url = %url, status = page.status, retries, "Fetched page");
                    tokio::time::sleep(self.delay).await;
                    return FetchAttempt {
                        url: url.clone(),
                        attempts: retries + 1,
                        backoff,
                        outcome: Ok(page),
                    };
                }
                Err(error) if retries >= self.max_retries => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(url = %url, retries, error = %error, "Giving up on page");
                    return FetchAttempt {
                        url: url.clone(),
                        attempts: retries + 1,
                        backoff,
                        outcome: Err(FetchFailure {
                            url: url.to_string(),
                            error,
                            retries,
                        }),
                    };
                }
                Err(error) => {
                    let wait = self.delay * (retries + 1);
                    debug!(url = %url, attempt = retries + 1, error = %error, ?wait, "Fetch failed, retrying");
                    tokio::time::sleep(wait).await;
                    backoff += wait;
                    retries += 1;
                }
            }
        }
    }

    async fn request(&self, url: &Url) -> Result<FetchedPage, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| describe_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| describe_error(&e))?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }

    /// Releases the session and its connections
    pub fn close(self) -> FetchStatsSnapshot {
        let stats = self.stats.snapshot();
        info!(
            requests = stats.requests,
            successes = stats.successes,
            failures = stats.failures,
            "Fetch session closed"
        );
        stats
    }
}

fn pick_user_agent(pool: &[String]) -> String {
    if pool.is_empty() {
        return DEFAULT_USER_AGENTS[0].to_string();
    }
    pool[rand::random_range(0..pool.len())].clone()
}

fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> CrawlerConfig {
        CrawlerConfig {
            delay_ms: 0,
            max_retries: 2,
            ..CrawlerConfig::default()
        }
    }

    #[test]
    fn test_user_agent_comes_from_pool() {
        let config = CrawlerConfig {
            user_agents: vec!["AgentA".to_string(), "AgentB".to_string()],
            ..test_config()
        };
        let session = FetchSession::new(&config).unwrap();
        assert!(config.user_agents.iter().any(|ua| ua == session.user_agent()));
    }

    #[test]
    fn test_session_with_proxy_builds() {
        let config = CrawlerConfig {
            proxy: Some("http://127.0.0.1:3128".to_string()),
            ..test_config()
        };
        assert!(FetchSession::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success_sends_session_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("user-agent", "OnlyAgent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let config = CrawlerConfig {
            user_agents: vec!["OnlyAgent".to_string()],
            ..test_config()
        };
        let session = FetchSession::new(&config).unwrap();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let attempt = session.fetch(&url).await;

        assert_eq!(attempt.attempts, 1);
        let page = attempt.outcome.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<html></html>");

        let stats = session.close();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.successes, 1);
    }

    #[tokio::test]
    async fn test_fetch_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let session = FetchSession::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/down", server.uri())).unwrap();
        let attempt = session.fetch(&url).await;

        assert_eq!(attempt.attempts, 3);
        let failure = attempt.outcome.unwrap_err();
        assert_eq!(failure.retries, 2);
        assert_eq!(failure.url, url.to_string());
        assert!(failure.error.contains("503"));
        assert_eq!(session.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_fetch_recovers_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let session = FetchSession::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        let attempt = session.fetch(&url).await;

        assert_eq!(attempt.attempts, 2);
        assert_eq!(attempt.outcome.unwrap().body, "ok");
    }

    #[tokio::test]
    async fn test_backoff_is_linear() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = CrawlerConfig {
            delay_ms: 5,
            ..test_config()
        };
        let session = FetchSession::new(&config).unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let attempt = session.fetch(&url).await;

        // 5ms after the first failure, 10ms after the second
        assert_eq!(attempt.backoff, Duration::from_millis(15));
        assert!(attempt.outcome.is_err());
    }
}
