use std::fmt::Formatter;

/// A decoded, timestamped MIDI event.
///
/// `time` carries the tick stamp of the byte buffer the message arrived in
/// (live input) or the decoded delta-time (SMF tracks). Events are immutable
/// once constructed.
#[derive(Clone, PartialEq)]
pub struct MidiEvent {
  /// 1..=16 for channel voice messages, the channel-prefix channel for meta
  /// events that follow one, 0 otherwise.
  pub channel: u8,
  pub time: u64,
  pub message: MidiMessage,
}

impl MidiEvent {
  pub fn is_channel_voice(&self) -> bool {
    matches!(
      self.message,
      MidiMessage::NoteOn { .. }
        | MidiMessage::NoteOff { .. }
        | MidiMessage::KeyPressure { .. }
        | MidiMessage::ControlChange { .. }
        | MidiMessage::ProgramChange { .. }
        | MidiMessage::ChannelPressure { .. }
        | MidiMessage::PitchBend { .. }
    )
  }
}

impl std::fmt::Debug for MidiEvent {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "[ch-{:02}] {:016} {:?}",
      self.channel, self.time, self.message
    )
  }
}

/// One variant per decoded message kind, carrying only its relevant fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
  /// Note frequency in Hz and velocity normalized to 0..1.
  NoteOn { frequency: f32, velocity: f32 },
  /// Velocity is always 0, some devices report junk there.
  NoteOff { frequency: f32, velocity: f32 },
  KeyPressure { frequency: f32, intensity: f32 },
  /// Controller number and value normalized to 0..1.
  ControlChange { control: u8, value: f32 },
  ProgramChange { program: u8 },
  ChannelPressure { intensity: f32 },
  /// Bend normalized to -1..~1, center 0.
  PitchBend { value: f32 },
  /// Raw payload without the 0xF7 terminator.
  SysEx(Vec<u8>),
  SongPointer(u16),
  SongSelect(u8),
  Tune,
  TimingClock,
  SongStart,
  SongContinue,
  SongStop,
  ActiveSensing,
  SystemReset,

  // SMF meta events
  SequenceNumber(u16),
  Text(String),
  Copyright(String),
  TrackName(String),
  InstrumentName(String),
  Lyric(String),
  Marker(String),
  CuePoint(String),
  ChannelPrefix(u8),
  EndOfTrack,
  /// Microseconds per quarter note.
  SetTempo { usecs_per_quarter: u32 },
  SmpteOffset {
    hour: u8,
    minute: u8,
    second: u8,
    frame: u8,
    fraction: u8,
  },
  TimeSignature {
    numerator: u8,
    denominator: u16,
    metro_clocks: u8,
    notated_32nds: u8,
  },
  KeySignature {
    sharps: u8,
    flats: u8,
    minor: bool,
  },
  SequencerSpecific(Vec<u8>),
}
