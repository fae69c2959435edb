//! A sorted, sparse collection of [`Bucket`]s spanning all time, with
//! routing, parallel fan-out, and on-disk configuration.
//!
//! Grounded on the teacher's `Store<S>` (`src/storage/store.rs`), which maps
//! a flat key (`UserId`) to a lazily-created per-key storage instance behind
//! a `DashMap` — here the key is a bucket id, the map is a sorted `Vec`
//! (since routing needs range queries over ids, not point lookups), and the
//! "factory function" is `Bucket::new` parameterised by `value_byte_length`.

use crate::bucket::{self, Bucket};
use crate::error::{Error, Result};
use crate::fanout::settle_all;
use crate::search::lower_bound;
use crate::types::{bucket_id, DeleteOptions, Entry, ErrorSink, FlushOptions, SelectOptions};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const CONFIG_FILENAME: &str = "zekta.config.json";
const BUCKETS_DIRNAME: &str = "buckets";

/// On-disk series configuration (`zekta.config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Config file format version.
    pub version: u32,
    /// Fixed byte width every value in this series must have.
    #[serde(rename = "valueByteLength")]
    pub value_byte_length: usize,
}

impl SeriesConfig {
    /// The only config version this build understands.
    pub const CURRENT_VERSION: u32 = 1;
}

/// Options controlling [`Series::open`].
#[derive(Clone, Debug)]
pub struct OpenOptions {
    /// Required when creating a brand new series; must match the on-disk
    /// config when opening an existing one.
    pub value_byte_length: Option<usize>,
    /// Create the series (write a fresh config) if none exists yet.
    pub create: bool,
    /// Sink for errors raised by background auto-flush/auto-unload timers.
    /// Defaults to logging via `tracing::error!`.
    pub error_sink: Option<ErrorSink>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            value_byte_length: None,
            create: true,
            error_sink: None,
        }
    }
}

/// Point-in-time introspection snapshot, used by tests and embedders.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesStats {
    /// Number of bucket handles currently tracked (loaded or not).
    pub bucket_count: usize,
    /// Number of buckets currently resident in memory.
    pub loaded_count: usize,
    /// Number of resident buckets with unpersisted changes.
    pub dirty_count: usize,
    /// Total entries across currently-loaded buckets.
    pub total_entries: usize,
}

/// A time series: a sparse, sorted set of fixed-record buckets backed by a
/// directory of `<id>.bucket` files plus a `zekta.config.json`.
pub struct Series {
    value_byte_length: usize,
    #[allow(dead_code)]
    dir: PathBuf,
    buckets_dir: PathBuf,
    buckets: Mutex<Vec<Arc<Bucket>>>,
    error_sink: ErrorSink,
}

impl Series {
    /// Open (or create) the series rooted at `dir`. See spec.md §4.4 "Open
    /// algorithm" for the exact config/bucket-discovery sequence.
    pub async fn open(dir: impl AsRef<Path>, opts: OpenOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let buckets_dir = dir.join(BUCKETS_DIRNAME);
        let error_sink = opts.error_sink.clone().unwrap_or_default();

        let value_byte_length = match read_config(&dir).await? {
            Some(cfg) => {
                if cfg.version != SeriesConfig::CURRENT_VERSION {
                    return Err(Error::UnsupportedVersion(cfg.version));
                }
                if let Some(requested) = opts.value_byte_length {
                    if requested != cfg.value_byte_length {
                        return Err(Error::IncompatibleConfig {
                            on_disk: cfg.value_byte_length,
                            requested,
                        });
                    }
                }
                cfg.value_byte_length
            }
            None => {
                if !opts.create {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} not found", CONFIG_FILENAME),
                    )));
                }
                let value_byte_length = opts
                    .value_byte_length
                    .ok_or(Error::MissingValueByteLength)?;
                write_config(
                    &dir,
                    &SeriesConfig {
                        version: SeriesConfig::CURRENT_VERSION,
                        value_byte_length,
                    },
                )
                .await?;
                value_byte_length
            }
        };

        let buckets = discover_buckets(&buckets_dir, value_byte_length, &error_sink).await?;
        tracing::debug!(
            dir = %dir.display(),
            value_byte_length,
            bucket_count = buckets.len(),
            "opened series"
        );

        Ok(Self {
            value_byte_length,
            dir,
            buckets_dir,
            buckets: Mutex::new(buckets),
            error_sink,
        })
    }

    /// The fixed byte width every value in this series must have.
    pub fn value_byte_length(&self) -> usize {
        self.value_byte_length
    }

    /// Ids of every bucket currently tracked, ascending.
    pub async fn bucket_ids(&self) -> Vec<i64> {
        self.buckets.lock().await.iter().map(|b| b.id()).collect()
    }

    /// Snapshot of bucket residency/dirtiness, without forcing a load.
    pub async fn stats(&self) -> Result<SeriesStats> {
        let buckets = self.buckets.lock().await.clone();
        let mut stats = SeriesStats {
            bucket_count: buckets.len(),
            ..Default::default()
        };
        for bucket in &buckets {
            if bucket.is_loaded().await {
                stats.loaded_count += 1;
                if bucket.is_dirty().await {
                    stats.dirty_count += 1;
                }
                stats.total_entries += bucket.entry_count().await?;
            }
        }
        Ok(stats)
    }

    async fn get_or_create_bucket(&self, time: f64) -> Arc<Bucket> {
        let id = bucket_id(time);
        let mut buckets = self.buckets.lock().await;
        let idx = lower_bound(buckets.len(), |i| buckets[i].id().cmp(&id));
        if idx < buckets.len() && buckets[idx].id() == id {
            buckets[idx].clone()
        } else {
            let bucket = Bucket::new(id, self.value_byte_length, &self.buckets_dir, self.error_sink.clone());
            buckets.insert(idx, bucket.clone());
            bucket
        }
    }

    /// Buckets whose `[from, to)` span intersects `[from, to]`, in `asc`
    /// order (spec.md §4.4 "Range fan-out").
    async fn covered_buckets(&self, from: f64, to: f64, asc: bool) -> Vec<Arc<Bucket>> {
        let from_id = bucket_id(from);
        let to_id = bucket_id(to);
        let buckets = self.buckets.lock().await;
        let from_idx = lower_bound(buckets.len(), |i| buckets[i].id().cmp(&from_id));
        let to_idx = (lower_bound(buckets.len(), |i| buckets[i].id().cmp(&to_id)) + 1)
            .min(buckets.len())
            .max(from_idx);
        let mut slice: Vec<Arc<Bucket>> = buckets[from_idx..to_idx].to_vec();
        if !asc {
            slice.reverse();
        }
        slice
    }

    async fn all_buckets(&self) -> Vec<Arc<Bucket>> {
        self.buckets.lock().await.clone()
    }

    /// Route a single entry to its bucket and insert it.
    #[tracing::instrument(skip(self, value))]
    pub async fn push(&self, time: f64, value: &[u8]) -> Result<()> {
        let bucket = self.get_or_create_bucket(time).await;
        tracing::debug!(bucket_id = bucket.id(), time, "routing push");
        bucket.push(time, value).await
    }

    /// Sort `entries` by time, then route and push each concurrently
    /// (spec.md §4.4 "insert"). Creation of missing buckets happens
    /// sequentially (under the series' structural lock) before the
    /// concurrent pushes are dispatched.
    #[tracing::instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn insert(&self, mut entries: Vec<Entry>) -> Result<()> {
        entries.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
        let mut futures = Vec::with_capacity(entries.len());
        for entry in entries {
            let bucket = self.get_or_create_bucket(entry.time).await;
            futures.push(async move { bucket.push(entry.time, &entry.value).await });
        }
        settle_all(futures).await?;
        Ok(())
    }

    /// Select entries across every bucket covering `[opts.from, opts.to]`,
    /// concatenated in the requested direction.
    #[tracing::instrument(skip(self), fields(from = opts.from, to = opts.to))]
    pub async fn select(&self, opts: SelectOptions) -> Result<Vec<Entry>> {
        let buckets = self.covered_buckets(opts.from, opts.to, opts.asc).await;
        tracing::debug!(buckets = buckets.len(), "fanning out select");
        let futures = buckets.into_iter().map(|bucket| {
            let (from, to, asc) = (opts.from, opts.to, opts.asc);
            async move { bucket.select(from, to, asc).await }
        });
        let results = settle_all(futures.collect()).await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Delete entries across every bucket covering `[opts.from, opts.to]`.
    #[tracing::instrument(skip(self), fields(from = opts.from, to = opts.to))]
    pub async fn delete(&self, opts: DeleteOptions) -> Result<()> {
        let buckets = self.covered_buckets(opts.from, opts.to, true).await;
        tracing::debug!(buckets = buckets.len(), "fanning out delete");
        let futures = buckets.into_iter().map(|bucket| {
            let (from, to) = (opts.from, opts.to);
            async move { bucket.delete(from, to).await }
        });
        settle_all(futures.collect()).await?;
        Ok(())
    }

    /// Truncate every bucket to zero length.
    #[tracing::instrument(skip(self))]
    pub async fn drop_all(&self) -> Result<()> {
        let buckets = self.all_buckets().await;
        tracing::debug!(buckets = buckets.len(), "fanning out drop_all");
        let futures = buckets
            .into_iter()
            .map(|bucket| async move { bucket.drop_all().await });
        settle_all(futures.collect()).await?;
        Ok(())
    }

    /// Flush every bucket, optionally unloading each afterward.
    #[tracing::instrument(skip(self), fields(unload = opts.unload))]
    pub async fn flush(&self, opts: FlushOptions) -> Result<()> {
        let buckets = self.all_buckets().await;
        tracing::debug!(buckets = buckets.len(), "fanning out flush");
        let futures = buckets
            .into_iter()
            .map(|bucket| async move { bucket.flush(opts).await });
        settle_all(futures.collect()).await?;
        Ok(())
    }
}

async fn read_config(dir: &Path) -> Result<Option<SeriesConfig>> {
    match tokio::fs::read(dir.join(CONFIG_FILENAME)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_config(dir: &Path, config: &SeriesConfig) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let bytes = serde_json::to_vec_pretty(config)?;
    tokio::fs::write(dir.join(CONFIG_FILENAME), bytes).await?;
    Ok(())
}

async fn discover_buckets(buckets_dir: &Path, value_byte_length: usize, error_sink: &ErrorSink) -> Result<Vec<Arc<Bucket>>> {
    let mut read_dir = match tokio::fs::read_dir(buckets_dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut ids = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name();
        let id = bucket::parse_bucket_filename(&name.to_string_lossy())?;
        ids.push(id);
    }
    ids.sort_unstable();

    Ok(ids
        .into_iter()
        .map(|id| Bucket::new(id, value_byte_length, buckets_dir, error_sink.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_new(dir: &Path, value_byte_length: usize) -> Series {
        Series::open(
            dir,
            OpenOptions {
                value_byte_length: Some(value_byte_length),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn missing_value_byte_length_on_create_fails() {
        let dir = tempdir().unwrap();
        let err = Series::open(dir.path(), OpenOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingValueByteLength));
    }

    #[tokio::test]
    async fn reopen_with_mismatched_value_byte_length_fails() {
        let dir = tempdir().unwrap();
        {
            let _series = open_new(dir.path(), 4).await;
        }
        let err = Series::open(
            dir.path(),
            OpenOptions {
                value_byte_length: Some(8),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::IncompatibleConfig { on_disk: 4, requested: 8 }));
    }

    #[tokio::test]
    async fn cross_bucket_push_and_flush_creates_two_files() {
        let dir = tempdir().unwrap();
        let series = open_new(dir.path(), 2).await;

        for (t, v) in [
            (10.0, 1u16),
            (1.0, 2u16),
            (2.0, 3u16),
            (4.0, 4u16),
            (600.0, 4u16),
            (601.0, 5u16),
        ] {
            series.push(t, &v.to_le_bytes()).await.unwrap();
        }
        series.flush(FlushOptions::default()).await.unwrap();

        let mut ids = series.bucket_ids().await;
        ids.sort();
        assert_eq!(ids, vec![0, 1]);
        assert!(dir.path().join("buckets/0.bucket").exists());
        assert!(dir.path().join("buckets/1.bucket").exists());
        assert_eq!(std::fs::metadata(dir.path().join("buckets/0.bucket")).unwrap().len(), 40);
        assert_eq!(std::fs::metadata(dir.path().join("buckets/1.bucket")).unwrap().len(), 20);

        let entries = series
            .select(SelectOptions {
                from: 0.0,
                to: 60000.0,
                asc: true,
            })
            .await
            .unwrap();
        let times: Vec<f64> = entries.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 4.0, 10.0, 600.0, 601.0]);
    }

    #[tokio::test]
    async fn unload_then_reload_preserves_entries() {
        let dir = tempdir().unwrap();
        let series = open_new(dir.path(), 2).await;
        for (t, v) in [(10.0, 1u16), (600.0, 4u16)] {
            series.push(t, &v.to_le_bytes()).await.unwrap();
        }
        series.flush(FlushOptions { unload: true }).await.unwrap();

        let stats = series.stats().await.unwrap();
        assert_eq!(stats.loaded_count, 0);

        let entries = series.select(SelectOptions::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn config_mismatch_on_open_without_override_still_checks_version() {
        let dir = tempdir().unwrap();
        tokio::fs::write(
            dir.path().join(CONFIG_FILENAME),
            br#"{"version":2,"valueByteLength":4}"#,
        )
        .await
        .unwrap();
        let err = Series::open(dir.path(), OpenOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(2)));
    }

    #[tokio::test]
    async fn reopening_with_non_integer_bucket_filename_fails() {
        let dir = tempdir().unwrap();
        {
            let _series = open_new(dir.path(), 1).await;
        }
        tokio::fs::create_dir_all(dir.path().join("buckets")).await.unwrap();
        tokio::fs::write(dir.path().join("buckets/not-a-number.bucket"), b"")
            .await
            .unwrap();

        let err = Series::open(
            dir.path(),
            OpenOptions {
                value_byte_length: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::BadBucketFile(_)));
    }

    #[tokio::test]
    async fn insert_batch_is_available_via_select() {
        let dir = tempdir().unwrap();
        let series = open_new(dir.path(), 1).await;
        let entries = vec![
            Entry::new(100.0, vec![1]),
            Entry::new(5.0, vec![2]),
            Entry::new(700.0, vec![3]),
        ];
        series.insert(entries).await.unwrap();
        let got = series.select(SelectOptions::default()).await.unwrap();
        let times: Vec<f64> = got.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![5.0, 100.0, 700.0]);
    }

    #[tokio::test]
    async fn drop_all_then_select_is_empty() {
        let dir = tempdir().unwrap();
        let series = open_new(dir.path(), 1).await;
        series.push(1.0, &[1]).await.unwrap();
        series.push(600.0, &[2]).await.unwrap();
        series.drop_all().await.unwrap();
        let entries = series.select(SelectOptions::default()).await.unwrap();
        assert!(entries.is_empty());
    }
}
