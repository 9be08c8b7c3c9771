/// DefiLlama yields API client (tertiary source)
///
/// Endpoint: `GET {base}/chart/{pool}` — APY and TVL history only. Snapshots
/// from this source carry no balances or volume and a nominal virtual price;
/// they mainly backfill the yield column when the richer sources are down.
use crate::apis::client::{HttpClient, RateLimiter, RetryPolicy};
use crate::apis::{ensure_enabled, value_to_f64, SourceAdapter};
use crate::catalog::PoolDescriptor;
use crate::config::CollectorConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::logger::{self, LogTag};
use crate::series::{Provenance, Snapshot, TimeSeries};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

const DEFILLAMA_BASE_URL: &str = "https://yields.llama.fi";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    data: Vec<ChartPoint>,
}

#[derive(Debug, Deserialize)]
struct ChartPoint {
    timestamp: serde_json::Value,
    #[serde(default)]
    apy: serde_json::Value,
    #[serde(rename = "tvlUsd", default)]
    tvl_usd: serde_json::Value,
}

pub struct DefiLlamaClient {
    http: HttpClient,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    base_url: String,
    enabled: bool,
}

impl DefiLlamaClient {
    pub fn from_config(config: &CollectorConfig) -> Result<Self, String> {
        Ok(Self {
            http: HttpClient::new(config.request_timeout_secs, config.accept_invalid_certs)?,
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
            retry: RetryPolicy::new(config.retry_attempts, config.retry_base_delay()),
            base_url: DEFILLAMA_BASE_URL.to_string(),
            enabled: config.sources.defillama,
        })
    }

    async fn fetch_chart(&self, pool: &PoolDescriptor) -> AdapterResult<ChartResponse> {
        let url = format!("{}/chart/{}", self.base_url, pool.address.to_lowercase());

        self.rate_limiter.throttle().await;

        let response = self
            .http
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|e| self.http.classify(e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AdapterError::NotFound(pool.id.clone()));
        }
        if !status.is_success() {
            return Err(AdapterError::Transport(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        response
            .json::<ChartResponse>()
            .await
            .map_err(|e| AdapterError::Schema(e.to_string()))
    }

    /// Chart timestamps arrive as RFC 3339 strings or unix seconds depending
    /// on endpoint version
    fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
        if let Some(s) = value.as_str() {
            return DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
        value_to_f64(value).and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
    }

    fn parse_points(points: &[ChartPoint], cutoff: DateTime<Utc>) -> Vec<Snapshot> {
        points
            .iter()
            .filter_map(|point| {
                let timestamp = Self::parse_timestamp(&point.timestamp)?;
                if timestamp < cutoff {
                    return None;
                }
                let apy = value_to_f64(&point.apy).unwrap_or(0.0) / 100.0;
                if !apy.is_finite() {
                    return None;
                }
                Some(Snapshot {
                    timestamp,
                    virtual_price: 1.0,
                    tvl: value_to_f64(&point.tvl_usd).unwrap_or(0.0),
                    volume_24h: 0.0,
                    apy,
                    balances: BTreeMap::new(),
                    provenance: Provenance::DefiLlama,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for DefiLlamaClient {
    fn name(&self) -> &'static str {
        "defillama"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch(&self, pool: &PoolDescriptor, days: u32) -> AdapterResult<TimeSeries> {
        ensure_enabled(self.enabled)?;

        let chart = self.retry.run(|| self.fetch_chart(pool)).await?;
        if chart.data.is_empty() {
            return Err(AdapterError::NotFound(pool.id.clone()));
        }

        let cutoff = Utc::now() - Duration::days(days as i64);
        let snapshots = Self::parse_points(&chart.data, cutoff);
        if snapshots.is_empty() {
            return Err(AdapterError::NotFound(pool.id.clone()));
        }

        logger::debug(
            LogTag::Api,
            &format!(
                "defillama: {} apy points for {} within {}d window",
                snapshots.len(),
                pool.id,
                days
            ),
        );

        Ok(TimeSeries::from_snapshots(&pool.id, snapshots))
    }
}
