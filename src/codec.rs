//! A typed `Codec<T>` capability plus a generic [`TimeSeries`] wrapper.
//!
//! spec.md §9 flags the original `TimeSeries<T>` inheritance hierarchy for
//! a redesign: rather than a trait object dispatching encode/decode calls,
//! this crate exposes [`Series`] as the untyped engine and lets embedders
//! layer a zero-cost typed view on top by implementing `Codec`. Grounded on
//! the teacher's own preference for generic, monomorphised wrappers over
//! `dyn Trait` storage abstractions (`src/storage/factory.rs`'s
//! `StorageFactory<S: StorageEngine>`).

use crate::error::Result;
use crate::series::Series;
use crate::types::{DeleteOptions, Entry, SelectOptions};

/// Encodes/decodes `T` to/from the fixed-width byte payload a [`Series`]
/// stores. `WIDTH` must equal the series' configured `value_byte_length`.
pub trait Codec<T> {
    /// Byte width of the encoded representation.
    const WIDTH: usize;

    /// Encode a value into its fixed-width byte form.
    fn encode(value: &T) -> Vec<u8>;

    /// Decode a fixed-width byte form back into a value.
    fn decode(bytes: &[u8]) -> T;
}

/// A typed view over a [`Series`], encoding/decoding values through `C`.
pub struct TimeSeries<T, C: Codec<T>> {
    series: Series,
    _codec: std::marker::PhantomData<fn() -> (T, C)>,
}

impl<T, C: Codec<T>> TimeSeries<T, C> {
    /// Wrap an already-open series. Debug builds assert the series'
    /// configured value width agrees with `C::WIDTH`.
    pub fn new(series: Series) -> Self {
        debug_assert_eq!(
            series.value_byte_length(),
            C::WIDTH,
            "codec width does not match the series' configured value_byte_length"
        );
        Self {
            series,
            _codec: std::marker::PhantomData,
        }
    }

    /// Insert a single typed value.
    pub async fn push(&self, time: f64, value: &T) -> Result<()> {
        self.series.push(time, &C::encode(value)).await
    }

    /// Insert a batch of typed entries, sorted by time.
    pub async fn insert(&self, entries: Vec<(f64, T)>) -> Result<()> {
        let entries = entries
            .into_iter()
            .map(|(time, value)| Entry::new(time, C::encode(&value)))
            .collect();
        self.series.insert(entries).await
    }

    /// Select entries in range, decoded through `C`.
    pub async fn select(&self, opts: SelectOptions) -> Result<Vec<(f64, T)>> {
        let entries = self.series.select(opts).await?;
        Ok(entries
            .into_iter()
            .map(|Entry { time, value }| (time, C::decode(&value)))
            .collect())
    }

    /// Delete entries in range.
    pub async fn delete(&self, opts: DeleteOptions) -> Result<()> {
        self.series.delete(opts).await
    }

    /// Borrow the underlying untyped series (for `flush`, `drop_all`,
    /// `stats`, and any other operation that doesn't need decoding).
    pub fn inner(&self) -> &Series {
        &self.series
    }
}

/// 8-byte little-endian `f64`.
pub struct F64Codec;

impl Codec<f64> for F64Codec {
    const WIDTH: usize = 8;

    fn encode(value: &f64) -> Vec<u8> {
        value.to_le_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        f64::from_le_bytes(buf)
    }
}

/// 8-byte little-endian `u64`.
pub struct U64LeCodec;

impl Codec<u64> for U64LeCodec {
    const WIDTH: usize = 8;

    fn encode(value: &u64) -> Vec<u8> {
        value.to_le_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        u64::from_le_bytes(buf)
    }
}
