//! HTTP clients for the external load engine (Locust) and metrics backend (Prometheus).
//!
//! Every call is a single attempt. Transport errors, non-success statuses and
//! undecodable bodies all surface as `EngineUnavailable`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use swarmboard_core::{
    CoreError, CoreResult, LoadEngine, MetricsBackend, RunConfig, StatsSnapshot,
};
use tracing::debug;

/// Builds the shared HTTP client with the configured timeouts.
pub fn build_http_client(connect_timeout: Duration, timeout: Duration) -> CoreResult<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| CoreError::engine_unavailable(format!("failed to build HTTP client: {e}")))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Client for Locust's web control API.
#[derive(Debug, Clone)]
pub struct LocustClient {
    client: Client,
    base_url: String,
}

impl LocustClient {
    pub fn new(client: Client, base_url: impl AsRef<str>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url.as_ref()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Form fields of the swarm request.
    fn swarm_form(config: &RunConfig) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("user_count", config.users.to_string()),
            ("spawn_rate", config.spawn_rate.to_string()),
            ("host", config.target_url.clone()),
        ];
        if config.duration_secs > 0 {
            form.push(("run_time", format!("{}s", config.duration_secs)));
        }
        form
    }
}

#[async_trait]
impl LoadEngine for LocustClient {
    async fn launch(&self, config: &RunConfig) -> CoreResult<()> {
        let url = format!("{}/swarm", self.base_url);
        debug!(%url, users = config.users, spawn_rate = config.spawn_rate, "launching swarm");

        self.client
            .post(&url)
            .form(&Self::swarm_form(config))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| CoreError::engine_unavailable(format!("swarm request failed: {e}")))?;
        Ok(())
    }

    async fn halt(&self) -> CoreResult<Option<StatsSnapshot>> {
        let url = format!("{}/stop", self.base_url);
        debug!(%url, "halting swarm");

        self.client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| CoreError::engine_unavailable(format!("stop request failed: {e}")))?;
        // Locust acknowledges the stop without stats.
        Ok(None)
    }

    async fn snapshot(&self) -> CoreResult<StatsSnapshot> {
        let url = format!("{}/stats/requests", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| CoreError::engine_unavailable(format!("stats request failed: {e}")))?;

        response
            .json::<StatsSnapshot>()
            .await
            .map_err(|e| CoreError::engine_unavailable(format!("invalid stats payload: {e}")))
    }
}

/// Client for Prometheus' instant-query endpoint.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(client: Client, base_url: impl AsRef<str>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url.as_ref()),
        }
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query(&self, params: &[(String, String)]) -> CoreResult<Value> {
        let url = format!("{}/api/v1/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| CoreError::engine_unavailable(format!("metrics query failed: {e}")))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| CoreError::engine_unavailable(format!("invalid metrics payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(duration_secs: u64) -> RunConfig {
        RunConfig {
            name: "smoke".to_string(),
            target_url: "http://x".to_string(),
            users: 10,
            spawn_rate: 2.0,
            duration_secs,
        }
    }

    #[test]
    fn swarm_form_omits_run_time_without_duration() {
        let form = LocustClient::swarm_form(&config(0));
        assert_eq!(
            form,
            vec![
                ("user_count", "10".to_string()),
                ("spawn_rate", "2".to_string()),
                ("host", "http://x".to_string()),
            ]
        );
    }

    #[test]
    fn swarm_form_includes_run_time() {
        let form = LocustClient::swarm_form(&config(90));
        assert_eq!(form.last(), Some(&("run_time", "90s".to_string())));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = LocustClient::new(Client::new(), "http://localhost:8089/");
        assert_eq!(client.base_url(), "http://localhost:8089");
    }
}
