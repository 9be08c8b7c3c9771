/// Graph-protocol subgraph client (secondary source)
///
/// Queries `dailyPoolSnapshots` from the messari Curve subgraph. The hosted
/// endpoint has been retired before; keep `sources.subgraph = false` in that
/// case and this adapter returns immediately without touching the network.
use crate::apis::client::{HttpClient, RateLimiter, RetryPolicy};
use crate::apis::{ensure_enabled, value_to_f64, SourceAdapter};
use crate::catalog::PoolDescriptor;
use crate::config::CollectorConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::logger::{self, LogTag};
use crate::series::{Provenance, Snapshot, TimeSeries};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;

const SUBGRAPH_URL: &str =
    "https://api.thegraph.com/subgraphs/name/messari/curve-finance-ethereum";

const WAD: f64 = 1e18;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Option<GraphData>,
    #[serde(default)]
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct GraphData {
    pool: Option<GraphPool>,
}

#[derive(Debug, Deserialize)]
struct GraphPool {
    #[serde(default)]
    coins: Vec<GraphCoin>,
    #[serde(rename = "dailyPoolSnapshots", default)]
    daily_pool_snapshots: Vec<GraphSnapshot>,
}

#[derive(Debug, Deserialize)]
struct GraphCoin {
    symbol: String,
    #[serde(default)]
    decimals: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphSnapshot {
    timestamp: serde_json::Value,
    #[serde(rename = "totalValueLockedUSD", default)]
    total_value_locked_usd: serde_json::Value,
    #[serde(rename = "dailyVolumeUSD", default)]
    daily_volume_usd: serde_json::Value,
    #[serde(rename = "virtualPrice", default)]
    virtual_price: serde_json::Value,
    #[serde(default)]
    balances: Vec<serde_json::Value>,
}

pub struct SubgraphClient {
    http: HttpClient,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    url: String,
    enabled: bool,
}

impl SubgraphClient {
    pub fn from_config(config: &CollectorConfig) -> Result<Self, String> {
        Ok(Self {
            http: HttpClient::new(config.request_timeout_secs, config.accept_invalid_certs)?,
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
            retry: RetryPolicy::new(config.retry_attempts, config.retry_base_delay()),
            url: SUBGRAPH_URL.to_string(),
            enabled: config.sources.subgraph,
        })
    }

    fn query_for(pool: &PoolDescriptor, days: u32) -> serde_json::Value {
        let query = format!(
            "{{ pool(id: \"{}\") {{ name coins {{ symbol decimals }} \
             dailyPoolSnapshots(first: {}, orderBy: timestamp, orderDirection: desc) \
             {{ timestamp totalValueLockedUSD dailyVolumeUSD balances virtualPrice }} }} }}",
            pool.address.to_lowercase(),
            days
        );
        json!({ "query": query })
    }

    async fn post_query(&self, body: &serde_json::Value) -> AdapterResult<GraphResponse> {
        self.rate_limiter.throttle().await;

        let response = self
            .http
            .client()
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.http.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Transport(format!(
                "HTTP {} from subgraph",
                status
            )));
        }

        response
            .json::<GraphResponse>()
            .await
            .map_err(|e| AdapterError::Schema(e.to_string()))
    }

    fn parse_snapshot(
        snapshot: &GraphSnapshot,
        coins: &[GraphCoin],
    ) -> AdapterResult<Snapshot> {
        let ts_secs = value_to_f64(&snapshot.timestamp)
            .ok_or_else(|| AdapterError::Schema("snapshot missing timestamp".to_string()))?
            as i64;
        let timestamp: DateTime<Utc> = DateTime::from_timestamp(ts_secs, 0)
            .ok_or_else(|| AdapterError::Schema(format!("invalid timestamp {}", ts_secs)))?;

        let virtual_price = match value_to_f64(&snapshot.virtual_price) {
            Some(raw_vp) if raw_vp > 0.0 => raw_vp / WAD,
            _ => 1.0,
        };

        let mut balances = BTreeMap::new();
        for (i, coin) in coins.iter().enumerate() {
            if let Some(raw_balance) = snapshot.balances.get(i).and_then(value_to_f64) {
                let decimals = value_to_f64(&coin.decimals).unwrap_or(18.0);
                balances.insert(
                    coin.symbol.to_lowercase(),
                    raw_balance / 10f64.powf(decimals),
                );
            }
        }

        Ok(Snapshot {
            timestamp,
            virtual_price,
            tvl: value_to_f64(&snapshot.total_value_locked_usd).unwrap_or(0.0),
            volume_24h: value_to_f64(&snapshot.daily_volume_usd).unwrap_or(0.0),
            // The subgraph carries no yield figure
            apy: 0.0,
            balances,
            provenance: Provenance::Subgraph,
        })
    }
}

#[async_trait]
impl SourceAdapter for SubgraphClient {
    fn name(&self) -> &'static str {
        "subgraph"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch(&self, pool: &PoolDescriptor, days: u32) -> AdapterResult<TimeSeries> {
        ensure_enabled(self.enabled)?;

        let body = Self::query_for(pool, days);
        let response = self.retry.run(|| self.post_query(&body)).await?;

        if let Some(errors) = response.errors {
            if !errors.is_empty() {
                return Err(AdapterError::Schema(format!(
                    "GraphQL errors: {}",
                    serde_json::Value::Array(errors)
                )));
            }
        }

        let graph_pool = response
            .data
            .and_then(|d| d.pool)
            .ok_or_else(|| AdapterError::NotFound(pool.id.clone()))?;

        let mut snapshots = Vec::with_capacity(graph_pool.daily_pool_snapshots.len());
        for raw in &graph_pool.daily_pool_snapshots {
            snapshots.push(Self::parse_snapshot(raw, &graph_pool.coins)?);
        }

        if snapshots.is_empty() {
            return Err(AdapterError::NotFound(pool.id.clone()));
        }

        logger::debug(
            LogTag::Api,
            &format!(
                "subgraph: {} daily snapshots for {}",
                snapshots.len(),
                pool.id
            ),
        );

        Ok(TimeSeries::from_snapshots(&pool.id, snapshots))
    }
}
