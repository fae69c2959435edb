//! A single time-bucketed, file-backed run of sorted entries.
//!
//! Mirrors the teacher's `UserDocumentSpace`/`MemStore` shape — a unit of
//! storage that owns its data exclusively and exposes a small op surface
//! (`src/storage/store.rs`, `src/storage/mem_store.rs`) — but backs that
//! data with a single binary file instead of an in-memory map, per
//! spec.md §3-§4.3.
//!
//! The bucket's "serialiser" (spec.md §5) is realised directly as a
//! `tokio::sync::Mutex<BucketState>`: tokio's mutex never poisons on a
//! panicking/erroring holder, so a failed operation releases the lock to
//! the next queued waiter exactly as the source's must-continue-through-
//! failures task-chain does — no bespoke queue type needed.

use crate::arena::ResizeableBuffer;
use crate::error::{Error, Result};
use crate::search::lower_bound;
use crate::types::{bucket_id, Entry, ErrorSink, FlushOptions, TIME_BYTES, TIME_RANGE};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const AUTO_FLUSH_DELAY: Duration = Duration::from_millis(1000);
const AUTO_UNLOAD_DELAY: Duration = Duration::from_millis(5000);

struct BucketState {
    /// `None` == Unloaded. `Some` == Loaded, with `dirty` tracking whether
    /// the in-memory content diverges from disk.
    data: Option<ResizeableBuffer>,
    dirty: bool,
}

#[derive(Default)]
struct Timers {
    flush: Option<JoinHandle<()>>,
    unload: Option<JoinHandle<()>>,
}

/// A single `id.bucket` file and its sorted, fixed-record contents.
pub struct Bucket {
    id: i64,
    from: f64,
    to: f64,
    value_len: usize,
    record_len: usize,
    path: PathBuf,
    state: Mutex<BucketState>,
    timers: StdMutex<Timers>,
    error_sink: ErrorSink,
}

impl Bucket {
    /// Construct a new, Unloaded bucket handle for `id` rooted at `buckets_dir`.
    pub(crate) fn new(id: i64, value_len: usize, buckets_dir: &Path, error_sink: ErrorSink) -> Arc<Self> {
        let from = id as f64 * TIME_RANGE;
        let to = (id + 1) as f64 * TIME_RANGE;
        Arc::new(Bucket {
            id,
            from,
            to,
            value_len,
            record_len: TIME_BYTES + value_len,
            path: buckets_dir.join(format!("{id}.bucket")),
            state: Mutex::new(BucketState {
                data: None,
                dirty: false,
            }),
            timers: StdMutex::new(Timers::default()),
            error_sink,
        })
    }

    /// This bucket's id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Inclusive lower time bound this bucket accepts.
    pub fn from(&self) -> f64 {
        self.from
    }

    /// Exclusive upper time bound this bucket accepts.
    pub fn to(&self) -> f64 {
        self.to
    }

    fn in_range(&self, time: f64) -> bool {
        time >= self.from && time < self.to
    }

    fn validate_entry(&self, time: f64, value: &[u8]) -> Result<()> {
        if value.len() != self.value_len {
            return Err(Error::BadValueLength {
                expected: self.value_len,
                actual: value.len(),
            });
        }
        if !self.in_range(time) {
            return Err(Error::OutOfRange {
                time,
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }

    fn intersects(&self, from: f64, to: f64) -> bool {
        from <= to && to >= self.from && from < self.to
    }

    // ---- record layout helpers -------------------------------------------------

    fn record_count(&self, buf: &ResizeableBuffer) -> usize {
        buf.len() / self.record_len
    }

    fn time_at(&self, buf: &ResizeableBuffer, index: usize) -> f64 {
        let off = index * self.record_len;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf.bytes()[off..off + TIME_BYTES]);
        f64::from_le_bytes(bytes)
    }

    fn entry_at(&self, buf: &ResizeableBuffer, index: usize) -> Entry {
        let off = index * self.record_len;
        let record = &buf.bytes()[off..off + self.record_len];
        let mut time_bytes = [0u8; 8];
        time_bytes.copy_from_slice(&record[..TIME_BYTES]);
        Entry::new(f64::from_le_bytes(time_bytes), record[TIME_BYTES..].to_vec())
    }

    /// Insertion-position algorithm from spec.md §4.3: append/prepend fast
    /// paths, falling back to the shared lower-bound search. Ties resolve to
    /// whatever index the comparator happens to land on.
    fn insertion_index(&self, buf: &ResizeableBuffer, time: f64) -> usize {
        let n = self.record_count(buf);
        if n == 0 {
            return 0;
        }
        if time >= self.time_at(buf, n - 1) {
            return n;
        }
        if time <= self.time_at(buf, 0) {
            return 0;
        }
        lower_bound(n, |i| {
            self.time_at(buf, i)
                .partial_cmp(&time)
                .unwrap_or(Ordering::Equal)
        })
    }

    /// Maps an inclusive `[from, to]` range onto `[lo, hi)` record indices,
    /// per spec.md §4.3's asymmetric walk: expand left across `from`-ties,
    /// expand right across `to`-ties.
    fn range_indices(&self, buf: &ResizeableBuffer, from: f64, to: f64) -> (usize, usize) {
        let n = self.record_count(buf);
        let mut lo = self.insertion_index(buf, from);
        while lo > 0 && self.time_at(buf, lo - 1) == from {
            lo -= 1;
        }
        let mut hi = self.insertion_index(buf, to);
        while hi < n && self.time_at(buf, hi) == to {
            hi += 1;
        }
        (lo, hi)
    }

    fn insert_record(&self, buf: &mut ResizeableBuffer, index: usize, time: f64, value: &[u8]) -> Result<()> {
        let old_len = buf.len();
        let off = index * self.record_len;
        buf.resize(old_len + self.record_len)?;
        buf.view().copy_within(off..old_len, off + self.record_len);
        let record = &mut buf.view()[off..off + self.record_len];
        record[..TIME_BYTES].copy_from_slice(&time.to_le_bytes());
        record[TIME_BYTES..].copy_from_slice(value);
        Ok(())
    }

    fn delete_span(&self, buf: &mut ResizeableBuffer, lo: usize, hi: usize) {
        if lo == hi {
            return;
        }
        let len = buf.len();
        let lo_off = lo * self.record_len;
        let hi_off = hi * self.record_len;
        buf.view().copy_within(hi_off..len, lo_off);
        buf.resize(len - (hi_off - lo_off))
            .expect("shrinking an arena never exceeds its capacity");
    }

    // ---- state machine -----------------------------------------------------

    async fn ensure_loaded(&self, state: &mut BucketState) -> Result<()> {
        if state.data.is_some() {
            return Ok(());
        }
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                state.data = Some(ResizeableBuffer::from_bytes(&bytes));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                state.data = Some(ResizeableBuffer::new());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn disarm_timers(&self) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(handle) = timers.flush.take() {
            handle.abort();
        }
        if let Some(handle) = timers.unload.take() {
            handle.abort();
        }
    }

    fn rearm_timers(self: &Arc<Self>) {
        let flush_weak = Arc::downgrade(self);
        let flush_handle = tokio::spawn(async move {
            tokio::time::sleep(AUTO_FLUSH_DELAY).await;
            if let Some(bucket) = flush_weak.upgrade() {
                if let Err(e) = bucket.flush(FlushOptions { unload: false }).await {
                    tracing::warn!(bucket_id = bucket.id, error = %e, "auto-flush failed");
                    bucket.error_sink.report(e);
                }
            }
        });
        let unload_weak = Arc::downgrade(self);
        let unload_handle = tokio::spawn(async move {
            tokio::time::sleep(AUTO_UNLOAD_DELAY).await;
            if let Some(bucket) = unload_weak.upgrade() {
                if let Err(e) = bucket.flush(FlushOptions { unload: true }).await {
                    tracing::warn!(bucket_id = bucket.id, error = %e, "auto-unload failed");
                    bucket.error_sink.report(e);
                }
            }
        });
        let mut timers = self.timers.lock().unwrap();
        timers.flush = Some(flush_handle);
        timers.unload = Some(unload_handle);
    }

    // ---- public op surface --------------------------------------------------

    /// Insert a single entry, preserving sortedness.
    pub async fn push(self: &Arc<Self>, time: f64, value: &[u8]) -> Result<()> {
        tracing::trace!(bucket_id = self.id, time, "push");
        self.validate_entry(time, value)?;
        self.disarm_timers();
        let result = async {
            let mut state = self.state.lock().await;
            self.ensure_loaded(&mut state).await?;
            let buf = state.data.as_mut().expect("just ensured loaded");
            let idx = self.insertion_index(buf, time);
            self.insert_record(buf, idx, time, value)?;
            state.dirty = true;
            Ok(())
        }
        .await;
        self.rearm_timers();
        result
    }

    /// Batch-insert entries already validated to belong to this bucket.
    /// Entries are expected to be pre-sorted by the caller for locality;
    /// the bucket does not re-sort them (spec.md §4.3).
    pub async fn insert(self: &Arc<Self>, entries: &[Entry]) -> Result<()> {
        tracing::trace!(bucket_id = self.id, count = entries.len(), "insert");
        for entry in entries {
            self.validate_entry(entry.time, &entry.value)?;
        }
        self.disarm_timers();
        let result = async {
            let mut state = self.state.lock().await;
            self.ensure_loaded(&mut state).await?;
            for entry in entries {
                let buf = state.data.as_mut().expect("just ensured loaded");
                let idx = self.insertion_index(buf, entry.time);
                self.insert_record(buf, idx, entry.time, &entry.value)?;
            }
            state.dirty = true;
            Ok(())
        }
        .await;
        self.rearm_timers();
        result
    }

    /// Return entries with `from <= time <= to`, in the requested direction.
    /// Returns an empty vector without touching disk if `[from, to]` does
    /// not intersect this bucket's `[from, to)` span.
    pub async fn select(self: &Arc<Self>, from: f64, to: f64, asc: bool) -> Result<Vec<Entry>> {
        tracing::trace!(bucket_id = self.id, from, to, asc, "select");
        if !self.intersects(from, to) {
            return Ok(Vec::new());
        }
        self.disarm_timers();
        let result = async {
            let mut state = self.state.lock().await;
            self.ensure_loaded(&mut state).await?;
            let buf = state.data.as_ref().expect("just ensured loaded");
            let (lo, hi) = self.range_indices(buf, from, to);
            let mut entries: Vec<Entry> = (lo..hi).map(|i| self.entry_at(buf, i)).collect();
            if !asc {
                entries.reverse();
            }
            Ok(entries)
        }
        .await;
        self.rearm_timers();
        result
    }

    /// Remove entries with `from <= time <= to`.
    pub async fn delete(self: &Arc<Self>, from: f64, to: f64) -> Result<()> {
        tracing::debug!(bucket_id = self.id, from, to, "delete");
        if !self.intersects(from, to) {
            return Ok(());
        }
        self.disarm_timers();
        let result = async {
            let mut state = self.state.lock().await;
            self.ensure_loaded(&mut state).await?;
            let buf = state.data.as_mut().expect("just ensured loaded");
            let (lo, hi) = self.range_indices(buf, from, to);
            if lo != hi {
                self.delete_span(buf, lo, hi);
                state.dirty = true;
            }
            Ok(())
        }
        .await;
        self.rearm_timers();
        result
    }

    /// Truncate this bucket to zero length.
    pub async fn drop_all(self: &Arc<Self>) -> Result<()> {
        tracing::debug!(bucket_id = self.id, "drop_all");
        self.disarm_timers();
        let result = async {
            let mut state = self.state.lock().await;
            self.ensure_loaded(&mut state).await?;
            let buf = state.data.as_mut().expect("just ensured loaded");
            if buf.len() > 0 {
                buf.resize(0)?;
                state.dirty = true;
            }
            Ok(())
        }
        .await;
        self.rearm_timers();
        result
    }

    /// Persist this bucket if dirty, optionally releasing its in-memory arena.
    pub async fn flush(self: &Arc<Self>, opts: FlushOptions) -> Result<()> {
        tracing::debug!(bucket_id = self.id, unload = opts.unload, "flush");
        self.disarm_timers();
        let result = async {
            let mut state = self.state.lock().await;
            if state.dirty {
                match &state.data {
                    Some(buf) if buf.len() > 0 => {
                        if let Some(parent) = self.path.parent() {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        tokio::fs::write(&self.path, buf.bytes()).await?;
                    }
                    _ => match tokio::fs::remove_file(&self.path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    },
                }
                state.dirty = false;
            }
            if opts.unload {
                state.data = None;
            }
            Ok(())
        }
        .await;
        self.rearm_timers();
        result
    }

    /// True if this bucket currently holds unpersisted changes.
    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// True if the bucket's arena is currently resident in memory.
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.data.is_some()
    }

    /// Number of entries currently held in memory, loading the bucket first
    /// if necessary. Used by `Series::stats`.
    pub async fn entry_count(self: &Arc<Self>) -> Result<usize> {
        self.disarm_timers();
        let result = async {
            let mut state = self.state.lock().await;
            self.ensure_loaded(&mut state).await?;
            let buf = state.data.as_ref().expect("just ensured loaded");
            Ok(self.record_count(buf))
        }
        .await;
        self.rearm_timers();
        result
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        let mut timers = self.timers.lock().unwrap();
        if let Some(handle) = timers.flush.take() {
            handle.abort();
        }
        if let Some(handle) = timers.unload.take() {
            handle.abort();
        }
    }
}

/// Parse a `<id>.bucket` filename stem into a bucket id. Fails with
/// `BadBucketFile` if the stem is not a plain, safe-integer decimal number.
pub fn parse_bucket_filename(name: &str) -> Result<i64> {
    let stem = name
        .strip_suffix(".bucket")
        .ok_or_else(|| Error::BadBucketFile(name.to_string()))?;
    stem.parse::<i64>()
        .map_err(|_| Error::BadBucketFile(name.to_string()))
}

/// `floor(time / TIME_RANGE)`, exposed here for callers building bucket
/// filenames directly (`Series` uses this internally too).
pub fn id_for_time(time: f64) -> i64 {
    bucket_id(time)
}
