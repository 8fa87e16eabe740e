use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::CheckerError;
use crate::retry::RetryPolicy;

/// External echo endpoint used as the liveness probe target.
const PROBE_URL: &str = "https://api.ipify.org";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One raw proxy specification as read from the proxy list file.
#[derive(Debug, Clone)]
pub struct ProxySpec {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ProxySpec {
    /// Parses a `host:port:username:password` line.
    pub fn parse(line: &str) -> Result<Self, CheckerError> {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 4 {
            return Err(CheckerError::InvalidProxy(line.to_string()));
        }
        let port = parts[1]
            .parse()
            .map_err(|_| CheckerError::InvalidProxy(line.to_string()))?;
        Ok(Self {
            host: parts[0].to_string(),
            port,
            username: parts[2].to_string(),
            password: parts[3].to_string(),
        })
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds an HTTP client routed through this proxy with basic auth.
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(format!("http://{}:{}", self.host, self.port))?
            .basic_auth(&self.username, &self.password);
        reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .proxy(proxy)
            .build()
    }
}

/// Parses proxy lines, skipping malformed entries with a diagnostic.
pub fn parse_specs(lines: &[String]) -> Vec<ProxySpec> {
    let mut specs = Vec::new();
    for line in lines {
        match ProxySpec::parse(line) {
            Ok(spec) => specs.push(spec),
            Err(e) => warn!("{}", e),
        }
    }
    specs
}

/// A validated egress route: the proxy identity plus its pre-built client.
#[derive(Clone)]
pub struct ProxyEndpoint {
    pub label: String,
    pub client: reqwest::Client,
}

/// A single resolved route for one request. `label` is `None` for the
/// direct (unproxied) connection.
#[derive(Clone)]
pub struct ProxyRoute {
    pub label: Option<String>,
    pub client: reqwest::Client,
}

impl ProxyRoute {
    pub fn describe(&self) -> &str {
        self.label.as_deref().unwrap_or("direct")
    }
}

/// Rotating pool of validated proxies. An empty pool serves the direct
/// connection instead of failing; proxying is an optimization layer, not a
/// correctness requirement.
pub struct ProxyPool {
    endpoints: Vec<ProxyEndpoint>,
    direct: reqwest::Client,
}

impl ProxyPool {
    pub fn from_endpoints(endpoints: Vec<ProxyEndpoint>) -> Self {
        let direct = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("Failed to create direct HTTP client");
        Self { endpoints, direct }
    }

    pub fn unproxied() -> Self {
        Self::from_endpoints(Vec::new())
    }

    /// Probes every candidate in parallel (bounded by `max_workers`) and keeps
    /// the reachable ones. Returns the pool plus rejected labels for
    /// diagnostics. Candidates are never re-validated mid-run.
    pub async fn validate(
        specs: Vec<ProxySpec>,
        policy: &RetryPolicy,
        max_workers: usize,
        progress: Option<ProgressBar>,
    ) -> (Self, Vec<String>) {
        let attempts = policy.max_retries;
        let backoff = policy.backoff;
        let results: Vec<(ProxySpec, Option<ProxyEndpoint>)> = stream::iter(specs)
            .map(|spec| {
                let progress = progress.clone();
                async move {
                    let endpoint = probe_candidate(&spec, attempts, backoff).await;
                    if let Some(bar) = &progress {
                        bar.inc(1);
                    }
                    (spec, endpoint)
                }
            })
            .buffer_unordered(max_workers.max(1))
            .collect()
            .await;

        let mut endpoints = Vec::new();
        let mut rejected = Vec::new();
        for (spec, endpoint) in results {
            match endpoint {
                Some(endpoint) => endpoints.push(endpoint),
                None => rejected.push(spec.label()),
            }
        }
        (Self::from_endpoints(endpoints), rejected)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Selects `pool[index mod len]`, or the direct route when the pool is
    /// empty.
    pub fn route(&self, index: usize) -> ProxyRoute {
        if self.endpoints.is_empty() {
            return ProxyRoute {
                label: None,
                client: self.direct.clone(),
            };
        }
        let endpoint = &self.endpoints[index % self.endpoints.len()];
        ProxyRoute {
            label: Some(endpoint.label.clone()),
            client: endpoint.client.clone(),
        }
    }

    /// Full rotation starting at `start`: every proxy once, or just the direct
    /// route for an empty pool.
    pub fn routes(&self, start: usize) -> Vec<ProxyRoute> {
        if self.endpoints.is_empty() {
            return vec![self.route(0)];
        }
        (0..self.endpoints.len())
            .map(|offset| self.route(start + offset))
            .collect()
    }
}

async fn probe_candidate(
    spec: &ProxySpec,
    attempts: u32,
    backoff: Duration,
) -> Option<ProxyEndpoint> {
    let label = spec.label();
    let client = match spec.build_client() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build client for proxy {}: {}", label, e);
            return None;
        }
    };
    for attempt in 1..=attempts {
        let result = client
            .get(PROBE_URL)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(_) => {
                info!("Proxy {} is reachable", label);
                return Some(ProxyEndpoint {
                    label: label.clone(),
                    client,
                });
            }
            Err(e) => {
                warn!(
                    "Proxy {} probe failed (attempt {}/{}): {}",
                    label, attempt, attempts, e
                );
                if attempt < attempts {
                    sleep(backoff).await;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(labels: &[&str]) -> ProxyPool {
        let endpoints = labels
            .iter()
            .map(|label| ProxyEndpoint {
                label: label.to_string(),
                client: reqwest::Client::new(),
            })
            .collect();
        ProxyPool::from_endpoints(endpoints)
    }

    #[test]
    fn parses_valid_line() {
        let spec = ProxySpec::parse("10.0.0.1:8080:alice:s3cret").unwrap();
        assert_eq!(spec.host, "10.0.0.1");
        assert_eq!(spec.port, 8080);
        assert_eq!(spec.username, "alice");
        assert_eq!(spec.password, "s3cret");
        assert_eq!(spec.label(), "10.0.0.1:8080");
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(ProxySpec::parse("10.0.0.1:8080").is_err());
        assert!(ProxySpec::parse("10.0.0.1:notaport:u:p").is_err());
        assert!(ProxySpec::parse("").is_err());
    }

    #[test]
    fn parse_specs_skips_bad_entries() {
        let lines = vec![
            "10.0.0.1:8080:u:p".to_string(),
            "garbage".to_string(),
            "10.0.0.2:9090:u:p".to_string(),
        ];
        let specs = parse_specs(&lines);
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn rotation_wraps_modulo_pool_size() {
        let pool = pool_with(&["a:1", "b:2"]);
        assert_eq!(pool.route(0).label.as_deref(), Some("a:1"));
        assert_eq!(pool.route(1).label.as_deref(), Some("b:2"));
        assert_eq!(pool.route(2).label.as_deref(), Some("a:1"));
        assert_eq!(pool.route(5).label.as_deref(), Some("b:2"));
    }

    #[test]
    fn empty_pool_serves_direct_route() {
        let pool = ProxyPool::unproxied();
        assert!(pool.is_empty());
        let routes = pool.routes(7);
        assert_eq!(routes.len(), 1);
        assert!(routes[0].label.is_none());
        assert_eq!(routes[0].describe(), "direct");
    }

    #[test]
    fn routes_start_at_rotation_index() {
        let pool = pool_with(&["a:1", "b:2", "c:3"]);
        let labels: Vec<_> = pool
            .routes(1)
            .into_iter()
            .map(|route| route.label.unwrap())
            .collect();
        assert_eq!(labels, vec!["b:2", "c:3", "a:1"]);
    }
}
