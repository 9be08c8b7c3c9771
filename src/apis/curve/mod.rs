/// Curve official API client (primary source)
///
/// Endpoint: `GET {base}/api/getPools/ethereum/main`
///
/// The API only exposes the *current* state of every pool, so a fetch yields
/// exactly one snapshot regardless of the requested window. The orchestrator
/// decides whether that density is acceptable.
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
use std::collections::BTreeMap;

const CURVE_API_BASE_URL: &str = "https://api.curve.fi";

/// Raw balances and virtual price arrive as 1e18-scaled integers
const WAD: f64 = 1e18;

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    data: PoolsData,
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    #[serde(rename = "poolData")]
    pool_data: Vec<RawPool>,
}

#[derive(Debug, Deserialize)]
struct RawPool {
    address: String,
    #[serde(default)]
    coins: Vec<RawCoin>,
    #[serde(rename = "virtualPrice", default)]
    virtual_price: serde_json::Value,
    #[serde(rename = "usdTotal", default)]
    usd_total: serde_json::Value,
    #[serde(rename = "volumeUSD", default)]
    volume_usd: serde_json::Value,
    #[serde(rename = "latestDailyApy", default)]
    latest_daily_apy: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawCoin {
    symbol: String,
    #[serde(default)]
    decimals: serde_json::Value,
    #[serde(rename = "poolBalance", default)]
    pool_balance: serde_json::Value,
}

pub struct CurveApiClient {
    http: HttpClient,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    base_url: String,
    enabled: bool,
}

impl CurveApiClient {
    pub fn from_config(config: &CollectorConfig) -> Result<Self, String> {
        Ok(Self {
            http: HttpClient::new(config.request_timeout_secs, config.accept_invalid_certs)?,
            rate_limiter: RateLimiter::new(config.rate_limit_per_minute),
            retry: RetryPolicy::new(config.retry_attempts, config.retry_base_delay()),
            base_url: CURVE_API_BASE_URL.to_string(),
            enabled: config.sources.curve_api,
        })
    }

    async fn fetch_pool_listing(&self) -> AdapterResult<PoolsResponse> {
        let url = format!("{}/api/getPools/ethereum/main", self.base_url);

        self.rate_limiter.throttle().await;

        let response = self
            .http
            .client()
            .get(&url)
            .send()
            .await
            .map_err(|e| self.http.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Transport(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        response
            .json::<PoolsResponse>()
            .await
            .map_err(|e| AdapterError::Schema(e.to_string()))
    }

    /// Convert one raw listing entry into a current-state snapshot
    fn snapshot_from_raw(
        &self,
        pool: &PoolDescriptor,
        raw: &RawPool,
        now: DateTime<Utc>,
    ) -> AdapterResult<Snapshot> {
        let mut balances = BTreeMap::new();
        for coin in &raw.coins {
            let decimals = value_to_f64(&coin.decimals).unwrap_or(18.0);
            if let Some(raw_balance) = value_to_f64(&coin.pool_balance) {
                balances.insert(
                    coin.symbol.to_lowercase(),
                    raw_balance / 10f64.powf(decimals),
                );
            }
        }

        let virtual_price = match value_to_f64(&raw.virtual_price) {
            Some(raw_vp) if raw_vp > 0.0 => raw_vp / WAD,
            Some(raw_vp) => {
                return Err(AdapterError::Schema(format!(
                    "non-positive virtual price {} for pool {}",
                    raw_vp, pool.id
                )))
            }
            None => 1.0,
        };

        Ok(Snapshot {
            timestamp: now,
            virtual_price,
            tvl: value_to_f64(&raw.usd_total).unwrap_or(0.0),
            volume_24h: value_to_f64(&raw.volume_usd).unwrap_or(0.0),
            apy: value_to_f64(&raw.latest_daily_apy).unwrap_or(0.0) / 100.0,
            balances,
            provenance: Provenance::CurveApi,
        })
    }
}

#[async_trait]
impl SourceAdapter for CurveApiClient {
    fn name(&self) -> &'static str {
        "curve_api"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch(&self, pool: &PoolDescriptor, _days: u32) -> AdapterResult<TimeSeries> {
        ensure_enabled(self.enabled)?;

        let listing = self.retry.run(|| self.fetch_pool_listing()).await?;

        let raw = listing
            .data
            .pool_data
            .iter()
            .find(|p| p.address.eq_ignore_ascii_case(&pool.address))
            .ok_or_else(|| AdapterError::NotFound(pool.id.clone()))?;

        let snapshot = self.snapshot_from_raw(pool, raw, Utc::now())?;

        logger::debug(
            LogTag::Api,
            &format!(
                "curve_api: current snapshot for {} (vp={:.6})",
                pool.id, snapshot.virtual_price
            ),
        );

        Ok(TimeSeries::from_snapshots(&pool.id, vec![snapshot]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PoolCatalog;
    use serde_json::json;

    fn client() -> CurveApiClient {
        CurveApiClient::from_config(&CollectorConfig::default()).expect("client")
    }

    fn three_pool() -> PoolDescriptor {
        PoolCatalog::builtin().get("3pool").expect("3pool").clone()
    }

    fn raw_pool() -> RawPool {
        serde_json::from_value(json!({
            "address": "0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7",
            "coins": [
                {"symbol": "USDC", "decimals": "6", "poolBalance": "150000000000000"},
                {"symbol": "DAI", "decimals": 18, "poolBalance": "120000000000000000000000000"}
            ],
            "virtualPrice": "1020000000000000000",
            "usdTotal": 270000000.0,
            "volumeUSD": "55000000",
            "latestDailyApy": "2.5"
        }))
        .expect("raw pool")
    }

    #[test]
    fn snapshot_scales_decimals_and_wad_fields() {
        let snapshot = client()
            .snapshot_from_raw(&three_pool(), &raw_pool(), Utc::now())
            .expect("snapshot");

        assert!((snapshot.virtual_price - 1.02).abs() < 1e-9);
        assert!((snapshot.balances["usdc"] - 150_000_000.0).abs() < 1e-3);
        assert!((snapshot.balances["dai"] - 120_000_000.0).abs() < 1e-3);
        assert!((snapshot.apy - 0.025).abs() < 1e-12);
        assert_eq!(snapshot.provenance, Provenance::CurveApi);
    }

    #[test]
    fn missing_virtual_price_defaults_to_baseline() {
        let raw: RawPool = serde_json::from_value(json!({
            "address": "0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7",
            "coins": []
        }))
        .expect("raw pool");

        let snapshot = client()
            .snapshot_from_raw(&three_pool(), &raw, Utc::now())
            .expect("snapshot");
        assert_eq!(snapshot.virtual_price, 1.0);
    }

    #[test]
    fn non_positive_virtual_price_is_a_schema_error() {
        let raw: RawPool = serde_json::from_value(json!({
            "address": "0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7",
            "coins": [],
            "virtualPrice": "0"
        }))
        .expect("raw pool");

        let result = client().snapshot_from_raw(&three_pool(), &raw, Utc::now());
        assert!(matches!(result, Err(AdapterError::Schema(_))));
    }

    #[tokio::test]
    async fn disabled_client_skips_io() {
        let config = CollectorConfig {
            sources: crate::config::SourceToggles {
                curve_api: false,
                ..Default::default()
            },
            ..CollectorConfig::default()
        };
        let client = CurveApiClient::from_config(&config).expect("client");

        let result = client.fetch(&three_pool(), 7).await;
        assert!(matches!(result, Err(AdapterError::Disabled)));
    }
}
