/// Immutable collector configuration
///
/// One value owns every tunable of the pipeline and is passed into the
/// scheduler and orchestrator at call time. Nothing here is global or
/// mutable after startup.
use crate::errors::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Enable/disable flags per remote source plus the synthetic fallback
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceToggles {
    pub curve_api: bool,
    /// The subgraph endpoint has been retired in the past; turning this off
    /// makes the adapter return immediately without any I/O.
    pub subgraph: bool,
    pub defillama: bool,
    pub synthetic: bool,
}

impl Default for SourceToggles {
    fn default() -> Self {
        Self {
            curve_api: true,
            subgraph: true,
            defillama: true,
            synthetic: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub sources: SourceToggles,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
    /// Hard ceiling on attempts per request; 1 means no retries
    pub retry_attempts: u32,
    /// Backoff grows linearly from this base between attempts
    pub retry_base_delay_ms: u64,
    /// Tolerate misconfigured certificate chains in constrained environments
    pub accept_invalid_certs: bool,
    /// Outbound request pacing per adapter
    pub rate_limit_per_minute: usize,

    /// Synthetic series resolution
    pub points_per_day: u32,
    /// Multiplier on the density floor `max(days / 10, 5)`
    pub density_multiplier: f64,
    /// Gaussian noise magnitude for synthetic data (0.02 = ±2%)
    pub noise_sigma: f64,
    /// Fixed seed for reproducible synthetic output; None draws from entropy
    pub synthetic_seed: Option<u64>,

    pub cache_dir: PathBuf,
    /// Entries older than this are removed by `evict`; latest files are kept
    pub cache_retention_days: i64,

    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            sources: SourceToggles::default(),
            request_timeout_secs: 10,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            accept_invalid_certs: false,
            rate_limit_per_minute: 30,
            points_per_day: 24,
            density_multiplier: 1.0,
            noise_sigma: 0.02,
            synthetic_seed: None,
            cache_dir: PathBuf::from("pool_cache"),
            cache_retention_days: 7,
            batch_size: 3,
            inter_batch_delay_ms: 1_000,
        }
    }
}

impl CollectorConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: CollectorConfig =
            toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        if config.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if config.points_per_day == 0 {
            return Err(ConfigError::Invalid(
                "points_per_day must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    /// Minimum count of real snapshots before the synthetic fallback kicks in
    pub fn min_required(&self, days: u32) -> usize {
        let scaled = (days as f64 / 10.0) * self.density_multiplier;
        (scaled.ceil() as usize).max(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_floor_has_minimum_of_five() {
        let config = CollectorConfig::default();
        assert_eq!(config.min_required(1), 5);
        assert_eq!(config.min_required(30), 5);
        assert_eq!(config.min_required(100), 10);
        assert_eq!(config.min_required(365), 37);
    }

    #[test]
    fn density_multiplier_scales_floor() {
        let config = CollectorConfig {
            density_multiplier: 2.0,
            ..CollectorConfig::default()
        };
        assert_eq!(config.min_required(100), 20);
    }

    #[test]
    fn defaults_enable_every_source() {
        let config = CollectorConfig::default();
        assert!(config.sources.curve_api);
        assert!(config.sources.subgraph);
        assert!(config.sources.defillama);
        assert!(config.sources.synthetic);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            batch_size = 8
            [sources]
            subgraph = false
        "#;
        let config: CollectorConfig = toml::from_str(raw).expect("partial config");
        assert_eq!(config.batch_size, 8);
        assert!(!config.sources.subgraph);
        assert!(config.sources.curve_api);
    }
}
