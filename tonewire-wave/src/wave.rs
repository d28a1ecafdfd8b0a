//! Multi-sample waves and demand-driven index leases.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::chunk::WaveChunk;
use crate::index::WaveIndex;

/// A named collection of sample chunks. Cloning is cheap and shares the
/// underlying state, so editor and playback sides can hold the same wave.
#[derive(Debug, Clone)]
pub struct Wave {
  shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
  name: String,
  inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
  chunks: Vec<Arc<WaveChunk>>,
  index: Option<Arc<WaveIndex>>,
  dirty: bool,
  requests: u32,
}

impl Wave {
  pub fn new(name: impl Into<String>) -> Wave {
    Wave {
      shared: Arc::new(Shared {
        name: name.into(),
        inner: Mutex::new(Inner {
          chunks: Vec::new(),
          index: None,
          dirty: false,
          requests: 0,
        }),
      }),
    }
  }

  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn n_chunks(&self) -> usize {
    self.shared.inner.lock().chunks.len()
  }

  /// Adds a chunk and marks any existing index stale. Outstanding leases keep
  /// serving the snapshot they were taken from.
  pub fn add_chunk(&self, chunk: Arc<WaveChunk>) {
    let mut inner = self.shared.inner.lock();
    inner.chunks.push(chunk);
    inner.dirty = true;
  }

  /// Removes the given chunk, matched by identity. Returns whether anything
  /// was removed.
  pub fn remove_chunk(&self, chunk: &Arc<WaveChunk>) -> bool {
    let mut inner = self.shared.inner.lock();
    let before = inner.chunks.len();
    inner.chunks.retain(|c| !Arc::ptr_eq(c, chunk));
    let removed = inner.chunks.len() != before;
    if removed {
      inner.dirty = true;
    }
    removed
  }

  /// Takes a lease on the frequency index, building or rebuilding it first
  /// when chunks changed since the last build. The index stays alive until
  /// the last lease is dropped.
  pub fn request_index(&self) -> IndexLease {
    let mut inner = self.shared.inner.lock();
    if inner.dirty {
      // outstanding leases keep the old snapshot alive on their own
      inner.index = None;
      inner.dirty = false;
    }
    let index = match &inner.index {
      Some(index) => index.clone(),
      None => {
        debug!(
          "building index for wave '{}' with {} chunks",
          self.shared.name,
          inner.chunks.len()
        );
        let built = Arc::new(WaveIndex::build(&inner.chunks));
        inner.index = Some(built.clone());
        built
      }
    };
    inner.requests += 1;
    IndexLease {
      shared: self.shared.clone(),
      index,
    }
  }

  /// One-shot convenience lookup: lease, search, release.
  pub fn lookup_chunk(&self, osc_freq: f32, velocity: f32) -> Option<Arc<WaveChunk>> {
    self.request_index().lookup(osc_freq, velocity)
  }
}

/// RAII handle pinning a built [`WaveIndex`] snapshot. When the last lease
/// on a wave is dropped the index is released and its chunks closed.
#[derive(Debug)]
pub struct IndexLease {
  shared: Arc<Shared>,
  index: Arc<WaveIndex>,
}

impl IndexLease {
  /// Nearest-frequency search against the pinned index snapshot, lock free.
  pub fn lookup(&self, osc_freq: f32, velocity: f32) -> Option<Arc<WaveChunk>> {
    self.index.lookup_best(osc_freq, velocity).cloned()
  }

  pub fn len(&self) -> usize {
    self.index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.index.is_empty()
  }
}

impl Drop for IndexLease {
  fn drop(&mut self) {
    let mut inner = self.shared.inner.lock();
    inner.requests -= 1;
    if inner.requests == 0 {
      inner.index = None;
    }
  }
}
