//! zekta: an embedded, append-friendly time-series storage engine.
//!
//! A [`Series`] is a sparse, sorted run of fixed-width-record buckets, each
//! backed by its own `<id>.bucket` file under a series directory. Writes are
//! routed to the bucket whose time span covers them; range reads and
//! deletes fan out across every bucket the range touches and are settled
//! via [`fanout::settle_all`]. See `SPEC_FULL.md` in the repository root for
//! the full design.
//!
//! ```no_run
//! # async fn run() -> zekta::Result<()> {
//! use zekta::{OpenOptions, Series, SelectOptions};
//!
//! let series = Series::open(
//!     "./data/my-series",
//!     OpenOptions { value_byte_length: Some(8), ..Default::default() },
//! )
//! .await?;
//!
//! series.push(1.0, &42f64.to_le_bytes()).await?;
//! let _entries = series.select(SelectOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod bucket;
pub mod codec;
pub mod error;
pub mod fanout;
pub mod search;
pub mod series;
pub mod types;

pub use bucket::Bucket;
pub use codec::{Codec, F64Codec, TimeSeries, U64LeCodec};
pub use error::{Error, Result};
pub use series::{OpenOptions, Series, SeriesConfig, SeriesStats};
pub use types::{bucket_id, DeleteOptions, Entry, ErrorSink, FlushOptions, SelectOptions, TIME_BYTES, TIME_RANGE};

/// Install a `tracing_subscriber` fmt layer driven by `RUST_LOG` (defaults
/// to `info` when unset). Optional: embedders may install their own
/// subscriber instead, or none at all — zekta never initializes one
/// implicitly on its own.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
