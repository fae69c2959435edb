//! Error types and handling for the zekta time-series engine.
//!
//! Mirrors the teacher's single-enum, `thiserror`-derived approach
//! (`massive-graph`'s `core::error::Error`): one flat error type with a
//! variant per failure domain and `#[from]` conversions for the libraries
//! we lean on for I/O and serialization.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the zekta storage engine.
#[derive(Error, Debug)]
pub enum Error {
    /// `push`/`insert` supplied a time outside the bucket's `[from, to)` span.
    #[error("time {time} out of bucket range [{from}, {to})")]
    OutOfRange {
        /// The offending timestamp.
        time: f64,
        /// Inclusive lower bound of the bucket.
        from: f64,
        /// Exclusive upper bound of the bucket.
        to: f64,
    },

    /// A value's byte length did not match the series' configured `value_byte_length`.
    #[error("bad value length: expected {expected} bytes, got {actual}")]
    BadValueLength {
        /// Configured `value_byte_length`.
        expected: usize,
        /// Length of the value actually supplied.
        actual: usize,
    },

    /// A bucket filename's stem was not parseable as a safe integer id.
    #[error("bad bucket file name: {0}")]
    BadBucketFile(String),

    /// The on-disk config file declared an unsupported version.
    #[error("unsupported config version: {0}")]
    UnsupportedVersion(u32),

    /// The caller-supplied `value_byte_length` disagreed with the on-disk config.
    #[error("incompatible config: on-disk value_byte_length={on_disk}, requested={requested}")]
    IncompatibleConfig {
        /// Value recorded in `zekta.config.json`.
        on_disk: usize,
        /// Value the caller asked to open with.
        requested: usize,
    },

    /// A new series was opened with `create: true` but no `value_byte_length`.
    #[error("value_byte_length is required to create a new series")]
    MissingValueByteLength,

    /// The arena would have to grow past its hard cap (2^32 bytes).
    #[error("capacity exceeded: requested {requested} bytes, max is {max}")]
    CapacityExceeded {
        /// Length that was requested.
        requested: u64,
        /// Hard ceiling (`MAX_BYTES`).
        max: u64,
    },

    /// Underlying filesystem failure not otherwise classified above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reading or writing `zekta.config.json`.
    #[error("config (de)serialization error: {0}")]
    Config(#[from] serde_json::Error),

    /// A parallel fan-out across buckets produced more than one failure;
    /// carries every underlying reason. A fan-out with exactly one failure
    /// instead surfaces that failure directly (see [`crate::fanout::settle_all`]).
    #[error("{} operations failed: {}", .0.len(), render_aggregate(.0))]
    Aggregate(Vec<Error>),
}

fn render_aggregate(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Apply the fan-out collapsing rule from spec.md §4.4 to a batch of
    /// per-bucket failures: exactly one failure surfaces directly, two or
    /// more collapse into a single [`Error::Aggregate`].
    ///
    /// Panics if `errors` is empty — callers only reach for this once they
    /// already know at least one operation failed.
    pub(crate) fn aggregate(mut errors: Vec<Error>) -> Error {
        match errors.len() {
            0 => unreachable!("aggregate called with no failures"),
            1 => errors.pop().unwrap(),
            _ => Error::Aggregate(errors),
        }
    }
}
