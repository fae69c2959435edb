//! Shared value types: entries, option structs, and the constants the core
//! partitioning scheme is built on.

use std::sync::Arc;

/// Time units spanned by a single bucket. Callers may treat `time` as
/// milliseconds, seconds, or any other unit — the engine itself is
/// unit-agnostic.
pub const TIME_RANGE: f64 = 512.0;

/// Bytes used to encode `time` (little-endian IEEE-754 f64) in each record.
pub const TIME_BYTES: usize = 8;

/// A single `(time, value)` record.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The entry's timestamp.
    pub time: f64,
    /// The entry's fixed-width payload.
    pub value: Vec<u8>,
}

impl Entry {
    /// Construct an entry from a timestamp and owned payload.
    pub fn new(time: f64, value: Vec<u8>) -> Self {
        Self { time, value }
    }
}

/// Options for `select`. Defaults to the full time range, ascending.
#[derive(Debug, Clone, Copy)]
pub struct SelectOptions {
    /// Inclusive lower bound.
    pub from: f64,
    /// Inclusive upper bound.
    pub to: f64,
    /// Ascending (`true`, the default) or descending order.
    pub asc: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            from: f64::NEG_INFINITY,
            to: f64::INFINITY,
            asc: true,
        }
    }
}

/// Options for `delete`. Defaults to the full time range.
#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    /// Inclusive lower bound.
    pub from: f64,
    /// Inclusive upper bound.
    pub to: f64,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            from: f64::NEG_INFINITY,
            to: f64::INFINITY,
        }
    }
}

/// Options for `flush`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushOptions {
    /// Release the bucket's in-memory arena after a successful flush.
    pub unload: bool,
}

/// `floor(time / TIME_RANGE)` — the bucket id a timestamp routes to.
pub fn bucket_id(time: f64) -> i64 {
    (time / TIME_RANGE).floor() as i64
}

/// Injectable sink for errors that occur off the caller's call stack —
/// specifically auto-flush/auto-unload timer callbacks, which must never
/// propagate into user code (spec.md §5, "Cancellation / timeouts" and §9
/// "Global error sink"). Defaults to logging via `tracing::error!`.
#[derive(Clone)]
pub struct ErrorSink(Arc<dyn Fn(crate::Error) + Send + Sync>);

impl ErrorSink {
    /// Build a sink from a closure.
    pub fn new(f: impl Fn(crate::Error) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Report an error produced by background work.
    pub fn report(&self, error: crate::Error) {
        (self.0.as_ref())(error);
    }
}

impl Default for ErrorSink {
    fn default() -> Self {
        Self::new(|error| tracing::error!(%error, "zekta background operation failed"))
    }
}

impl std::fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ErrorSink(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_id_floors_toward_negative_infinity() {
        assert_eq!(bucket_id(0.0), 0);
        assert_eq!(bucket_id(511.9), 0);
        assert_eq!(bucket_id(512.0), 1);
        assert_eq!(bucket_id(-1.0), -1);
    }

    #[test]
    fn select_options_default_is_full_range_ascending() {
        let opts = SelectOptions::default();
        assert_eq!(opts.from, f64::NEG_INFINITY);
        assert_eq!(opts.to, f64::INFINITY);
        assert!(opts.asc);
    }
}
