//! MIDI byte-stream decoding and Standard MIDI File reading.
//!
//! [`MidiDecoder`] turns arbitrarily chunked byte buffers from a live device
//! or an SMF track into a FIFO of decoded [`MidiEvent`]s, handling running
//! status and messages split across buffer boundaries. [`MidiFile`] parses
//! the SMF chunk container and projects the decoded tracks onto a score
//! model through the [`ScoreSink`] trait.

pub mod decoder;
pub mod event;
pub mod note;
pub mod sink;
pub mod smf;
pub mod song;

pub use decoder::MidiDecoder;
pub use event::{MidiEvent, MidiMessage};
pub use sink::EventSink;
pub use smf::{MidiFile, MidiTrack};
pub use song::{MidiSignal, ScoreSink};
