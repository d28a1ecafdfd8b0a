//! Standard MIDI File chunk container parsing.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::decoder::MidiDecoder;
use crate::event::{MidiEvent, MidiMessage};

/// Internal score resolution in ticks per quarter note, independent of the
/// division value of the source file.
pub const TPQN: u32 = 384;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to open midi file: {0}")]
  OpenFailed(#[source] std::io::Error),
  #[error("i/o error reading midi file: {0}")]
  Io(#[from] std::io::Error),
  #[error("invalid midi file: {0}")]
  FormatInvalid(&'static str),
  #[error("unsupported midi file: {0}")]
  FormatUnknown(&'static str),
  #[error("midi file contains no tracks")]
  NoData,
}

/// A fully decoded Standard MIDI File: tempo map fields plus one event list
/// per track, delta-times still in file ticks.
#[derive(Debug, Clone)]
pub struct MidiFile {
  pub tpqn: u32,
  /// Factor rescaling file ticks to [`TPQN`] resolution.
  pub tpqn_rate: f64,
  pub bpm: f64,
  pub numerator: u8,
  pub denominator: u16,
  pub tracks: Vec<MidiTrack>,
}

#[derive(Debug, Clone, Default)]
pub struct MidiTrack {
  pub events: Vec<MidiEvent>,
}

struct SmfHeader {
  format: u16,
  n_tracks: u16,
  division: u16,
}

impl MidiFile {
  pub fn load(path: impl AsRef<Path>) -> Result<MidiFile> {
    let file = File::open(path.as_ref()).map_err(Error::OpenFailed)?;
    Self::parse(&mut BufReader::new(file))
  }

  /// Parses a complete SMF byte stream. Any failure aborts the whole load,
  /// nothing partial is returned.
  pub fn parse(reader: &mut impl Read) -> Result<MidiFile> {
    let header = read_header(reader)?;
    let mut tracks = Vec::with_capacity(usize::from(header.n_tracks));
    for i in 0..header.n_tracks {
      let track = read_track(reader)?;
      debug!("track{}: n_events={}", i, track.events.len());
      tracks.push(track);
    }

    let mut file = MidiFile {
      tpqn: TPQN,
      tpqn_rate: f64::from(TPQN) / f64::from(header.division),
      bpm: 120.0,
      numerator: 4,
      denominator: 4,
      tracks,
    };
    // tempo and time signature are taken from the beginning of the master track
    for event in file.tracks[0].events.iter().take(16) {
      match event.message {
        MidiMessage::SetTempo { usecs_per_quarter } => {
          file.bpm = if usecs_per_quarter != 0 {
            60_000_000.0 / f64::from(usecs_per_quarter)
          } else {
            120.0
          };
        }
        MidiMessage::TimeSignature {
          numerator,
          denominator,
          ..
        } => {
          file.numerator = numerator;
          file.denominator = denominator;
        }
        _ => {}
      }
    }
    Ok(file)
  }
}

fn read_header(reader: &mut impl Read) -> Result<SmfHeader> {
  let mut raw = [0u8; 14];
  reader.read_exact(&mut raw)?;
  if &raw[0..4] != b"MThd" {
    return Err(Error::FormatInvalid("unmatched token 'MThd'"));
  }
  let length = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
  if length < 6 {
    return Err(Error::FormatInvalid("truncated file header"));
  }
  let header = SmfHeader {
    format: u16::from_be_bytes([raw[8], raw[9]]),
    n_tracks: u16::from_be_bytes([raw[10], raw[11]]),
    division: u16::from_be_bytes([raw[12], raw[13]]),
  };
  if header.format > 2 {
    return Err(Error::FormatUnknown("unknown file format"));
  }
  if header.format == 0 && header.n_tracks != 1 {
    return Err(Error::FormatInvalid("invalid number of tracks"));
  }
  if header.n_tracks < 1 {
    return Err(Error::NoData);
  }
  if header.division & 0x8000 != 0 {
    return Err(Error::FormatUnknown("SMPTE time encoding not supported"));
  }
  if header.division == 0 {
    return Err(Error::FormatInvalid("division is zero"));
  }
  // skip unused header bytes beyond the mandatory fields
  skip_bytes(reader, u64::from(length) - 6)?;
  Ok(header)
}

fn skip_bytes(reader: &mut impl Read, n_bytes: u64) -> Result<()> {
  let mut space = [0u8; 1024];
  let mut total = 0u64;
  while total < n_bytes {
    let l = ((n_bytes - total) as usize).min(space.len());
    reader.read_exact(&mut space[..l])?;
    total += l as u64;
  }
  Ok(())
}

fn read_track(reader: &mut impl Read) -> Result<MidiTrack> {
  let mut raw = [0u8; 8];
  reader.read_exact(&mut raw)?;
  if &raw[0..4] != b"MTrk" {
    return Err(Error::FormatInvalid("unmatched token 'MTrk'"));
  }
  let mut n_bytes = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
  // the payload is fed verbatim through a fresh SMF mode decoder
  let mut decoder = MidiDecoder::new_smf();
  let mut buffer = [0u8; 4096];
  while n_bytes > 0 {
    let l = n_bytes.min(buffer.len());
    reader.read_exact(&mut buffer[..l])?;
    decoder.push(&buffer[..l], 0);
    n_bytes -= l;
  }
  Ok(MidiTrack {
    events: decoder.pop_event_list(),
  })
}
