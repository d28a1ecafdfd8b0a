//! Sample chunks backing a multi-sample wave.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
  #[error("i/o error accessing chunk data: {0}")]
  Io(#[from] std::io::Error),
  #[error("codec error in chunk data: {0}")]
  Codec(String),
}

/// Backing storage of a chunk. Opening may hit the filesystem or a codec and
/// can fail; closing releases whatever the open acquired.
pub trait SampleSource: Send + Sync {
  fn open(&self) -> Result<(), ChunkError>;
  fn close(&self);
  fn name(&self) -> &str;
}

/// One recorded sample of a multi-sample wave: the frequency it was recorded
/// at plus its backing data.
pub struct WaveChunk {
  pub osc_freq: f32,
  pub mix_freq: f32,
  pub n_channels: u32,
  pub data: Arc<dyn SampleSource>,
}

impl WaveChunk {
  pub fn new(osc_freq: f32, mix_freq: f32, n_channels: u32, data: Arc<dyn SampleSource>) -> Self {
    WaveChunk {
      osc_freq,
      mix_freq,
      n_channels,
      data,
    }
  }

  pub fn open(&self) -> Result<(), ChunkError> {
    self.data.open()
  }

  pub fn close(&self) {
    self.data.close()
  }
}

impl std::fmt::Debug for WaveChunk {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WaveChunk")
      .field("osc_freq", &self.osc_freq)
      .field("mix_freq", &self.mix_freq)
      .field("n_channels", &self.n_channels)
      .field("data", &self.data.name())
      .finish()
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use std::sync::atomic::{AtomicI32, Ordering};
  use std::sync::Arc;

  /// In-memory source counting open/close pairs, optionally failing to open.
  pub struct MemorySamples {
    name: String,
    open_count: AtomicI32,
    fail_open: bool,
  }

  impl MemorySamples {
    pub fn new(name: &str) -> Arc<Self> {
      Arc::new(MemorySamples {
        name: name.to_string(),
        open_count: AtomicI32::new(0),
        fail_open: false,
      })
    }

    pub fn failing(name: &str) -> Arc<Self> {
      Arc::new(MemorySamples {
        name: name.to_string(),
        open_count: AtomicI32::new(0),
        fail_open: true,
      })
    }

    pub fn open_count(&self) -> i32 {
      self.open_count.load(Ordering::SeqCst)
    }
  }

  impl SampleSource for MemorySamples {
    fn open(&self) -> Result<(), ChunkError> {
      if self.fail_open {
        return Err(ChunkError::Codec("unreadable sample data".to_string()));
      }
      self.open_count.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }

    fn close(&self) {
      self.open_count.fetch_sub(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
      &self.name
    }
  }
}
