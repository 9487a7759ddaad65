//! Persistent Parquet store for historical series.
//!
//! Layout: `{cache_dir}/{kind}_{symbol}_{period}.parquet`, one file per
//! partition. The file name is the partition's only identity.
//!
//! Features:
//! - Merge-by-date on save (new rows win), whole-file rewrite
//! - Atomic writes (write to .tmp, rename into place)
//! - Freshness check on load (partition must reach within N days of the
//!   requested end)
//! - Dates stored as `YYYY-MM-DD` strings and re-normalized on read

use super::normalize::{into_canonical, PartialRecord};
use super::provider::DataError;
use crate::domain::{normalize_date, DataKind, HistoricalRecord, Period};
use chrono::{DateTime, Local, NaiveDate};
use polars::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default number of calendar days a partition may lag the requested end date.
pub const DEFAULT_STALENESS_DAYS: i64 = 2;

const PARQUET_EXT: &str = ".parquet";

/// Identity of one persisted series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub kind: DataKind,
    pub symbol: String,
    pub period: Period,
}

impl PartitionKey {
    pub fn new(kind: DataKind, symbol: impl Into<String>, period: Period) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            period,
        }
    }

    /// `{kind}_{symbol}_{period}.parquet`
    pub fn file_name(&self) -> String {
        format!("{self}{PARQUET_EXT}")
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.kind, self.symbol, self.period)
    }
}

/// One partition file as reported by [`HistoricalStore::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct FileStat {
    pub name: String,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Local>>,
}

/// Aggregate view of the store directory.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub file_count: usize,
    pub total_bytes: u64,
    pub files: Vec<FileStat>,
}

/// The Parquet store.
#[derive(Debug, Clone)]
pub struct HistoricalStore {
    cache_dir: PathBuf,
    staleness_days: i64,
}

impl HistoricalStore {
    /// Open (and create if needed) a store rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, DataError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        Ok(Self {
            cache_dir,
            staleness_days: DEFAULT_STALENESS_DAYS,
        })
    }

    pub fn with_staleness_days(mut self, days: i64) -> Self {
        self.staleness_days = days;
        self
    }

    /// Root directory of the store.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.cache_dir.join(key.file_name())
    }

    /// Rows of `key` within `[start, end]`, or `None` on any miss.
    ///
    /// Read errors, an empty window and a stale partition are all misses;
    /// the reason is logged at debug level.
    pub fn load(
        &self,
        key: &PartitionKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<Vec<HistoricalRecord>> {
        match self.try_load(key, start, end) {
            Ok(rows) => {
                debug!(partition = %key, rows = rows.len(), "store hit");
                Some(rows)
            }
            Err(e) => {
                debug!(partition = %key, reason = %e, "store miss");
                None
            }
        }
    }

    /// Like [`HistoricalStore::load`] but reports why the cache cannot answer.
    pub fn try_load(
        &self,
        key: &PartitionKey,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HistoricalRecord>, DataError> {
        let path = self.partition_path(key);
        if !path.exists() {
            return Err(DataError::NoCachedData {
                partition: key.to_string(),
            });
        }

        let rows = read_partition(&path)?;
        let cached_end = rows
            .last()
            .map(|r| r.date)
            .ok_or_else(|| DataError::NoCachedData {
                partition: key.to_string(),
            })?;

        let window: Vec<HistoricalRecord> = rows
            .into_iter()
            .filter(|r| r.date >= start && r.date <= end)
            .collect();
        if window.is_empty() {
            return Err(DataError::NoCachedData {
                partition: key.to_string(),
            });
        }

        if (end - cached_end).num_days() > self.staleness_days {
            return Err(DataError::Stale {
                partition: key.to_string(),
                cached_end,
                requested_end: end,
            });
        }

        Ok(window)
    }

    /// Merge `rows` into the partition and rewrite it.
    ///
    /// Existing and new rows are unioned by date; on a duplicate date the new
    /// row wins. The result is sorted ascending. Empty input is a no-op. An
    /// unreadable existing file is replaced by the new rows.
    pub fn save(&self, rows: &[HistoricalRecord], key: &PartitionKey) -> Result<(), DataError> {
        if rows.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        let path = self.partition_path(key);

        let mut merged: BTreeMap<NaiveDate, HistoricalRecord> = BTreeMap::new();
        if path.exists() {
            match read_partition(&path) {
                Ok(existing) => merged.extend(existing.into_iter().map(|r| (r.date, r))),
                Err(e) => warn!(partition = %key, error = %e, "replacing unreadable partition"),
            }
        }
        merged.extend(rows.iter().cloned().map(|r| (r.date, r)));

        let combined: Vec<HistoricalRecord> = merged.into_values().collect();
        let mut df = records_to_dataframe(&combined)?;

        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&mut df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })?;

        info!(partition = %key, rows = combined.len(), "partition saved");
        Ok(())
    }

    /// File count, total size and per-file metadata. A missing directory
    /// reports zero files.
    pub fn stats(&self) -> StoreStats {
        let mut files: Vec<FileStat> = self
            .partition_files()
            .into_iter()
            .filter_map(|path| {
                let meta = fs::metadata(&path).ok()?;
                Some(FileStat {
                    name: path.file_name()?.to_string_lossy().into_owned(),
                    size_bytes: meta.len(),
                    modified_at: meta.modified().ok().map(DateTime::<Local>::from),
                })
            })
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        StoreStats {
            file_count: files.len(),
            total_bytes: files.iter().map(|f| f.size_bytes).sum(),
            files,
        }
    }

    /// Delete every partition of `symbol` (any kind, any period), or every
    /// partition when `symbol` is `None`. Returns the number of files removed.
    pub fn clear(&self, symbol: Option<&str>) -> Result<usize, DataError> {
        let needle = symbol.map(|s| format!("_{s}_"));
        let mut count = 0;
        for path in self.partition_files() {
            let matches = match (&needle, path.file_name().and_then(|n| n.to_str())) {
                (Some(needle), Some(name)) => name.contains(needle.as_str()),
                (None, Some(_)) => true,
                (_, None) => false,
            };
            if matches {
                fs::remove_file(&path).map_err(|e| {
                    DataError::CacheError(format!("remove {}: {e}", path.display()))
                })?;
                count += 1;
            }
        }
        info!(?symbol, count, "cleared partitions");
        Ok(count)
    }

    fn partition_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(PARQUET_EXT))
            })
            .collect()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Convert canonical rows to a DataFrame with a string `date` column.
fn records_to_dataframe(rows: &[HistoricalRecord]) -> Result<DataFrame, DataError> {
    let dates: Vec<String> = rows.iter().map(|r| r.date_key()).collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();
    let amounts: Vec<f64> = rows.iter().map(|r| r.amount).collect();
    let changes: Vec<f64> = rows.iter().map(|r| r.change_percent).collect();
    let turnovers: Vec<f64> = rows.iter().map(|r| r.turnover).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("amount".into(), amounts),
        Column::new("change_percent".into(), changes),
        Column::new("turnover".into(), turnovers),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

/// Read a partition file back into sorted, date-unique canonical rows.
fn read_partition(path: &Path) -> Result<Vec<HistoricalRecord>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ParquetError("empty parquet file".into()));
    }
    dataframe_to_records(&df)
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<HistoricalRecord>, DataError> {
    let dates = string_column(df, "date")?;
    let opens = f64_column(df, "open")?;
    let highs = f64_column(df, "high")?;
    let lows = f64_column(df, "low")?;
    let closes = f64_column(df, "close")?;
    let volumes = u64_column(df, "volume")?;
    let amounts = optional_f64_column(df, "amount")?;
    let changes = optional_f64_column(df, "change_percent")?;
    let turnovers = optional_f64_column(df, "turnover")?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let raw_date = dates[i]
            .as_deref()
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        let date = normalize_date(raw_date)
            .ok_or_else(|| DataError::ParquetError(format!("bad date '{raw_date}' at row {i}")))?;

        rows.push(PartialRecord {
            date,
            open: opens[i].unwrap_or(f64::NAN),
            high: highs[i].unwrap_or(f64::NAN),
            low: lows[i].unwrap_or(f64::NAN),
            close: closes[i].unwrap_or(f64::NAN),
            volume: volumes[i].unwrap_or(0),
            amount: amounts.as_ref().and_then(|c| c[i]),
            change_percent: changes.as_ref().and_then(|c| c[i]),
            turnover: turnovers.as_ref().and_then(|c| c[i]),
        });
    }

    Ok(into_canonical(rows))
}

fn cast_column(df: &DataFrame, name: &str, dtype: &DataType) -> Result<Column, DataError> {
    df.column(name)
        .map_err(|_| DataError::ParquetError(format!("missing column '{name}'")))?
        .cast(dtype)
        .map_err(|e| DataError::ParquetError(format!("{name} column cast: {e}")))
}

/// Dates may be stored as strings or as native `Date`; both cast to ISO strings.
fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, DataError> {
    let col = cast_column(df, name, &DataType::String)?;
    let ca = col
        .str()
        .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let col = cast_column(df, name, &DataType::Float64)?;
    let ca = col
        .f64()
        .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))?;
    Ok(ca.into_iter().collect())
}

fn u64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<u64>>, DataError> {
    let col = cast_column(df, name, &DataType::UInt64)?;
    let ca = col
        .u64()
        .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))?;
    Ok(ca.into_iter().collect())
}

/// Derived columns may be absent in files written by older tools.
fn optional_f64_column(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<f64>>>, DataError> {
    if df.column(name).is_err() {
        return Ok(None);
    }
    f64_column(df, name).map(Some)
}
