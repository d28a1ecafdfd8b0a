//! Frequency-sorted lookup structure over the chunks of a wave.

use std::sync::Arc;

use log::warn;

use crate::chunk::WaveChunk;

#[derive(Debug)]
struct IndexEntry {
  osc_freq: f32,
  #[allow(dead_code)]
  velocity: f32,
  chunk: Arc<WaveChunk>,
}

/// Immutable snapshot of a wave's chunks, sorted by oscillator frequency.
/// Building opens every chunk; dropping the index closes them again.
#[derive(Debug)]
pub struct WaveIndex {
  entries: Vec<IndexEntry>,
}

impl WaveIndex {
  /// Builds the index from the given chunks. A chunk whose data cannot be
  /// opened is excluded from the index, not a fatal error.
  pub fn build(chunks: &[Arc<WaveChunk>]) -> WaveIndex {
    let mut entries = Vec::with_capacity(chunks.len());
    for chunk in chunks {
      match chunk.open() {
        Ok(()) => entries.push(IndexEntry {
          osc_freq: chunk.osc_freq,
          velocity: 1.0, // multi-velocity layers are not recorded yet
          chunk: chunk.clone(),
        }),
        Err(err) => {
          warn!("wave chunk '{}' excluded from index: {}", chunk.data.name(), err);
        }
      }
    }
    entries.sort_by(|a, b| a.osc_freq.total_cmp(&b.osc_freq));
    WaveIndex { entries }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Returns the chunk whose recorded frequency is closest to `osc_freq`,
  /// or `None` for an empty index. Velocity is accepted for forward
  /// compatibility and does not affect the search yet.
  pub fn lookup_best(&self, osc_freq: f32, _velocity: f32) -> Option<&Arc<WaveChunk>> {
    let mut best: Option<&IndexEntry> = None;
    let mut best_diff = f32::INFINITY;
    let mut base = 0usize;
    let mut n = self.entries.len();
    while n > 0 {
      let i = (n + 1) >> 1;
      let entry = &self.entries[base + i - 1];
      let cmp = osc_freq - entry.osc_freq;
      if cmp == 0.0 {
        return Some(&entry.chunk);
      }
      let diff = cmp.abs();
      if diff < best_diff {
        best_diff = diff;
        best = Some(entry);
      }
      if cmp > 0.0 {
        base += i;
        n -= i;
      } else {
        n = i - 1;
      }
    }
    best.map(|entry| &entry.chunk)
  }
}

impl Drop for WaveIndex {
  fn drop(&mut self) {
    for entry in &self.entries {
      entry.chunk.close();
    }
  }
}
