//! Multi-sample wave storage and nearest-frequency chunk selection.
//!
//! A [`Wave`] owns a set of [`WaveChunk`]s recorded at different oscillator
//! frequencies. Playback takes an [`IndexLease`] over a frequency-sorted
//! [`WaveIndex`] snapshot and asks it for the chunk closest to the pitch it
//! needs; the snapshot is rebuilt lazily after edits and released when the
//! last lease is dropped.

pub mod chunk;
pub mod index;
pub mod wave;

pub use chunk::{ChunkError, SampleSource, WaveChunk};
pub use index::WaveIndex;
pub use wave::{IndexLease, Wave};
