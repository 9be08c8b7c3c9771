/// CSV-backed store for fetched time series
///
/// Layout: one file per (pool, window) key, `{pool}_{days}d.csv`, plus a
/// `{pool}_latest.csv` that is always overwritten with the newest successful
/// fetch and never evicted. Writes go through a temp file in the same
/// directory and an atomic rename, so a crash mid-write cannot leave a
/// half-written entry behind. An entry that fails to parse is logged and
/// treated as a miss, never as a fatal error.
///
/// Record format: header row, RFC 3339 timestamps, one `{token}_balance`
/// column per token observed anywhere in the series.
use crate::errors::{CacheError, CacheResult};
use crate::logger::{self, LogTag};
use crate::series::{Provenance, Snapshot, TimeSeries};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const LATEST_SUFFIX: &str = "_latest.csv";
const BALANCE_SUFFIX: &str = "_balance";

const FIXED_COLUMNS: [&str; 6] = [
    "timestamp",
    "virtual_price",
    "tvl",
    "volume_24h",
    "apy",
    "provenance",
];

/// Metadata for one on-disk entry, used by eviction and reporting
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub file_name: String,
    pub modified: DateTime<Utc>,
    pub is_latest: bool,
}

impl CacheEntryInfo {
    pub fn age(&self) -> Duration {
        Utc::now() - self.modified
    }
}

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, pool_id: &str, days: u32) -> PathBuf {
        self.dir.join(format!("{}_{}d.csv", pool_id, days))
    }

    fn latest_path(&self, pool_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", pool_id, LATEST_SUFFIX))
    }

    /// Look up the entry for exactly this (pool, window) key.
    ///
    /// Unreadable entries degrade to a miss so one corrupt file cannot take
    /// the pipeline down; the caller will refetch and overwrite it.
    pub fn get(&self, pool_id: &str, days: u32) -> Option<TimeSeries> {
        let path = self.entry_path(pool_id, days);
        if !path.exists() {
            return None;
        }

        match self.read_series(pool_id, &path) {
            Ok(series) => {
                logger::debug(
                    LogTag::Cache,
                    &format!("hit for {} ({}d): {} rows", pool_id, days, series.len()),
                );
                Some(series)
            }
            Err(err) => {
                logger::warning(
                    LogTag::Cache,
                    &format!(
                        "treating unreadable entry {} as a miss: {}",
                        path.display(),
                        err
                    ),
                );
                None
            }
        }
    }

    /// Persist a series under the (pool, window) key and refresh the
    /// pool's latest file
    pub fn put(&self, series: &TimeSeries, days: u32) -> CacheResult<()> {
        self.write_atomic(&self.entry_path(&series.pool_id, days), series)?;
        self.write_atomic(&self.latest_path(&series.pool_id), series)?;
        logger::debug(
            LogTag::Cache,
            &format!(
                "stored {} rows for {} ({}d)",
                series.len(),
                series.pool_id,
                days
            ),
        );
        Ok(())
    }

    /// Newest successful fetch for the pool, whatever window produced it
    pub fn latest(&self, pool_id: &str) -> Option<TimeSeries> {
        let path = self.latest_path(pool_id);
        if !path.exists() {
            return None;
        }
        self.read_series(pool_id, &path).ok()
    }

    /// Remove entries whose last-modified time exceeds the retention period.
    /// Latest files are always kept. Returns the number of files removed.
    pub fn evict(&self, older_than: Duration) -> CacheResult<usize> {
        let cutoff = older_than.to_std().unwrap_or_default();
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".csv") || name.ends_with(LATEST_SUFFIX) {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let age = std::time::SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age > cutoff {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        if removed > 0 {
            logger::info(LogTag::Cache, &format!("evicted {} stale entries", removed));
        }
        Ok(removed)
    }

    /// Enumerate on-disk entries with their modification times
    pub fn entries(&self) -> CacheResult<Vec<CacheEntryInfo>> {
        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.ends_with(".csv") {
                continue;
            }
            let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
            infos.push(CacheEntryInfo {
                is_latest: file_name.ends_with(LATEST_SUFFIX),
                file_name,
                modified,
            });
        }
        infos.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(infos)
    }

    fn write_atomic(&self, path: &Path, series: &TimeSeries) -> CacheResult<()> {
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)?;

        {
            let mut writer = csv::Writer::from_writer(tmp.as_file());

            // Union of tokens across the whole series; sources differ in
            // which balances they report
            let tokens: BTreeSet<&str> = series
                .snapshots
                .iter()
                .flat_map(|s| s.balances.keys().map(String::as_str))
                .collect();

            let mut header: Vec<String> =
                FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
            header.extend(tokens.iter().map(|t| format!("{}{}", t, BALANCE_SUFFIX)));
            writer.write_record(&header)?;

            for snapshot in &series.snapshots {
                let mut record = vec![
                    snapshot.timestamp.to_rfc3339(),
                    snapshot.virtual_price.to_string(),
                    snapshot.tvl.to_string(),
                    snapshot.volume_24h.to_string(),
                    snapshot.apy.to_string(),
                    snapshot.provenance.as_str().to_string(),
                ];
                for token in &tokens {
                    record.push(
                        snapshot
                            .balances
                            .get(*token)
                            .map(|b| b.to_string())
                            .unwrap_or_default(),
                    );
                }
                writer.write_record(&record)?;
            }

            writer.flush()?;
        }

        tmp.persist(path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    fn read_series(&self, pool_id: &str, path: &Path) -> CacheResult<TimeSeries> {
        let corrupt = |detail: String| CacheError::Corrupt {
            path: path.display().to_string(),
            detail,
        };

        let mut reader = csv::Reader::from_path(path)?;
        let header = reader.headers()?.clone();

        for (i, expected) in FIXED_COLUMNS.iter().enumerate() {
            if header.get(i) != Some(*expected) {
                return Err(corrupt(format!(
                    "expected column {} at position {}",
                    expected, i
                )));
            }
        }

        let token_columns: Vec<(usize, String)> = header
            .iter()
            .enumerate()
            .skip(FIXED_COLUMNS.len())
            .filter_map(|(i, name)| {
                name.strip_suffix(BALANCE_SUFFIX)
                    .map(|token| (i, token.to_string()))
            })
            .collect();

        let mut snapshots = Vec::new();
        for record in reader.records() {
            let record = record?;

            let field = |i: usize| record.get(i).unwrap_or_default();
            let parse_f64 = |i: usize| {
                field(i)
                    .parse::<f64>()
                    .map_err(|e| corrupt(format!("column {}: {}", i, e)))
            };

            let timestamp = DateTime::parse_from_rfc3339(field(0))
                .map_err(|e| corrupt(format!("timestamp: {}", e)))?
                .with_timezone(&Utc);
            let provenance = Provenance::parse(field(5))
                .ok_or_else(|| corrupt(format!("unknown provenance {:?}", field(5))))?;

            let mut balances = BTreeMap::new();
            for (i, token) in &token_columns {
                let raw = field(*i);
                if raw.is_empty() {
                    continue;
                }
                balances.insert(
                    token.clone(),
                    raw.parse::<f64>()
                        .map_err(|e| corrupt(format!("balance {}: {}", token, e)))?,
                );
            }

            snapshots.push(Snapshot {
                timestamp,
                virtual_price: parse_f64(1)?,
                tvl: parse_f64(2)?,
                volume_24h: parse_f64(3)?,
                apy: parse_f64(4)?,
                balances,
                provenance,
            });
        }

        Ok(TimeSeries::from_snapshots(pool_id, snapshots))
    }
}
