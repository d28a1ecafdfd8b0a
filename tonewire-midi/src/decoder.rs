use std::collections::VecDeque;

use log::{debug, warn};

use crate::event::{MidiEvent, MidiMessage};
use crate::note::note_to_freq;
use crate::sink::EventSink;

// channel voice status bytes, channel nibble masked out
const NOTE_OFF: u16 = 0x80;
const NOTE_ON: u16 = 0x90;
const KEY_PRESSURE: u16 = 0xA0;
const CONTROL_CHANGE: u16 = 0xB0;
const PROGRAM_CHANGE: u16 = 0xC0;
const CHANNEL_PRESSURE: u16 = 0xD0;
const PITCH_BEND: u16 = 0xE0;

// system common
const SYS_EX: u16 = 0xF0;
const SONG_POINTER: u16 = 0xF2;
const SONG_SELECT: u16 = 0xF3;
const TUNE: u16 = 0xF6;
const END_EX: u16 = 0xF7;

// system realtime
const TIMING_CLOCK: u16 = 0xF8;
const SONG_START: u16 = 0xFA;
const SONG_CONTINUE: u16 = 0xFB;
const SONG_STOP: u16 = 0xFC;
const ACTIVE_SENSING: u16 = 0xFE;
const SYSTEM_RESET: u16 = 0xFF;

// SMF meta events are shifted past the status byte range: META_OFFSET + type
const META_OFFSET: u16 = 0x100;
const META_SEQUENCE_NUMBER: u16 = META_OFFSET;
const META_TEXT: u16 = META_OFFSET + 0x01;
const META_COPYRIGHT: u16 = META_OFFSET + 0x02;
const META_TRACK_NAME: u16 = META_OFFSET + 0x03;
const META_INSTRUMENT_NAME: u16 = META_OFFSET + 0x04;
const META_LYRIC: u16 = META_OFFSET + 0x05;
const META_MARKER: u16 = META_OFFSET + 0x06;
const META_CUE_POINT: u16 = META_OFFSET + 0x07;
const META_CHANNEL_PREFIX: u16 = META_OFFSET + 0x20;
const META_END_OF_TRACK: u16 = META_OFFSET + 0x2F;
const META_SET_TEMPO: u16 = META_OFFSET + 0x51;
const META_SMPTE_OFFSET: u16 = META_OFFSET + 0x54;
const META_TIME_SIGNATURE: u16 = META_OFFSET + 0x58;
const META_KEY_SIGNATURE: u16 = META_OFFSET + 0x59;
const META_SEQUENCER_SPECIFIC: u16 = META_OFFSET + 0x7F;

// SMF sys-ex packets carry a length prefix like meta events do
const SMF_SYS_EX_START: u16 = 0x200;
const SMF_SYS_EX_NEXT: u16 = 0x201;

const DR7F: f32 = 1.0 / 0x7F as f32;
const DR2000: f32 = 1.0 / 0x2000 as f32;

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
  Zero,
  DeltaTime,
  Event,
  VLength,
  Data,
  Done,
}

impl State {
  fn next(self) -> State {
    match self {
      State::Zero => State::DeltaTime,
      State::DeltaTime => State::Event,
      State::Event => State::VLength,
      State::VLength => State::Data,
      State::Data => State::Done,
      State::Done => State::Zero,
    }
  }
}

/// Byte-stream MIDI decoder.
///
/// One instance per input stream. Consumes arbitrarily chunked byte buffers
/// and queues fully decoded events; a message may be split across any number
/// of `push` calls. Malformed bytes are dropped without error, real-time
/// input must never stall on garbage.
pub struct MidiDecoder {
  smf_mode: bool,
  state: State,
  state_changed: bool,
  delta_time: u64,
  /// 0 while no message is pending.
  event_type: u16,
  /// Last channel voice status byte, 0 when none is remembered.
  running_status: u8,
  /// Zero-based channel of the pending channel voice message.
  channel: u8,
  /// One-based channel assigned to meta events by a channel prefix, 0 unset.
  meta_channel: u8,
  left_bytes: u32,
  /// Live sys-ex reads until the 0xF7 end mark instead of counting down.
  scan_terminator: bool,
  bytes: Vec<u8>,
  events: VecDeque<MidiEvent>,
}

impl MidiDecoder {
  /// Decoder for live device input: events are stamped with the buffer time
  /// passed to `push`.
  pub fn new() -> Self {
    Self::with_mode(false)
  }

  /// Decoder for one SMF track: every event is preceded by a delta-time
  /// varint, meta events and length-prefixed sys-ex packets are understood.
  pub fn new_smf() -> Self {
    Self::with_mode(true)
  }

  fn with_mode(smf_mode: bool) -> Self {
    Self {
      smf_mode,
      state: State::Zero,
      state_changed: false,
      delta_time: 0,
      event_type: 0,
      running_status: 0,
      channel: 0,
      meta_channel: 0,
      left_bytes: 0,
      scan_terminator: false,
      bytes: Vec::new(),
      events: VecDeque::new(),
    }
  }

  /// Feeds a byte buffer of any length into the decoder. `time` applies to
  /// the whole buffer and becomes the tick stamp of live-decoded events.
  pub fn push(&mut self, data: &[u8], time: u64) {
    let mut pos = 0;
    while pos < data.len() || self.state_changed {
      self.state_changed = false;
      self.step(data, &mut pos, time);
    }
  }

  /// Dequeues the next completed event, FIFO in completion order.
  pub fn pop_event(&mut self) -> Option<MidiEvent> {
    self.events.pop_front()
  }

  /// Drains all completed events.
  pub fn pop_event_list(&mut self) -> Vec<MidiEvent> {
    self.events.drain(..).collect()
  }

  /// Hands all completed events to a subscriber sink.
  pub fn drain_into(&mut self, sink: &mut EventSink) {
    while let Some(event) = self.events.pop_front() {
      sink.deliver(event);
    }
  }

  fn advance(&mut self) {
    self.state = self.state.next();
    if self.state == State::Zero {
      self.delta_time = 0;
      self.event_type = 0;
      self.scan_terminator = false;
      // running_status and channel survive between messages
      if !self.bytes.is_empty() {
        warn!("leaking {} bytes of midi data", self.bytes.len());
        self.bytes.clear();
      }
    }
    self.state_changed = true;
  }

  fn goto(&mut self, target: State) {
    while self.state != target {
      self.advance();
    }
  }

  fn step(&mut self, data: &[u8], pos: &mut usize, time: u64) {
    match self.state {
      State::Zero => {
        if *pos < data.len() {
          self.advance();
        }
      }
      State::DeltaTime => {
        if *pos >= data.len() {
          return;
        }
        if self.smf_mode {
          let v = data[*pos];
          *pos += 1;
          self.delta_time = (self.delta_time << 7) + u64::from(v & 0x7F);
          if v & 0x80 == 0 {
            self.goto(State::Event);
          }
          // else: continuation, more delta-time bytes follow
        } else {
          self.delta_time = time;
          self.goto(State::Event);
        }
      }
      State::Event => {
        if *pos >= data.len() {
          return;
        }
        let v = data[*pos];
        *pos += 1;
        let mut next = State::VLength;
        if self.event_type == 0xFF {
          // second half of an SMF meta event
          self.event_type = META_OFFSET + u16::from(v);
        } else if v & 0x80 == 0 {
          // data byte, MIDI running status
          if self.running_status != 0 {
            self.event_type = u16::from(self.running_status & 0xF0);
            self.channel = self.running_status & 0x0F;
            *pos -= 1; // push back, this is the first data byte of the message
          } else {
            // no running status established, drop the byte and start over
            debug!("discarding data byte 0x{:02X} without running status", v);
            next = State::Zero;
          }
        } else if v < 0xF0 {
          // channel voice status, remembered for running status
          self.event_type = u16::from(v & 0xF0);
          self.channel = v & 0x0F;
          self.running_status = v;
        } else if self.smf_mode && v == 0xF0 {
          self.event_type = SMF_SYS_EX_START;
          self.running_status = 0;
        } else if self.smf_mode && v == 0xF7 {
          self.event_type = SMF_SYS_EX_NEXT;
          self.running_status = 0;
        } else if self.smf_mode && v == 0xFF {
          // meta event, the type byte follows
          self.event_type = 0xFF;
          self.running_status = 0;
          next = State::Event;
        } else if v < 0xF8 {
          // system common resets running status
          self.event_type = u16::from(v);
          self.running_status = 0;
        } else {
          // system realtime keeps running status
          self.event_type = u16::from(v);
        }
        self.goto(next);
      }
      State::VLength => {
        let mut next = State::Data;
        if self.event_type >= META_OFFSET {
          // meta events and SMF sys-ex carry a varint length prefix
          if *pos >= data.len() {
            return;
          }
          let v = data[*pos];
          *pos += 1;
          self.left_bytes = (self.left_bytes << 7) + u32::from(v & 0x7F);
          if v & 0x80 != 0 {
            next = State::VLength;
          }
        } else {
          match self.event_type {
            NOTE_OFF | NOTE_ON | KEY_PRESSURE | CONTROL_CHANGE | PITCH_BEND | SONG_POINTER => {
              self.left_bytes = 2;
            }
            PROGRAM_CHANGE | CHANNEL_PRESSURE | SONG_SELECT => {
              self.left_bytes = 1;
            }
            TUNE | TIMING_CLOCK | SONG_START | SONG_CONTINUE | SONG_STOP | ACTIVE_SENSING
            | SYSTEM_RESET => {
              self.left_bytes = 0;
            }
            SYS_EX => {
              self.scan_terminator = true;
            }
            _ => {
              // END_EX without a started sys-ex, or an unassigned status
              warn!("unhandled midi command byte 0x{:02X}", self.event_type);
              self.event_type = 0;
              next = State::Zero;
            }
          }
        }
        self.goto(next);
      }
      State::Data => {
        if self.scan_terminator {
          let avail = &data[*pos..];
          match avail.iter().position(|&b| b == END_EX as u8) {
            Some(end) => {
              self.bytes.extend_from_slice(&avail[..end]);
              *pos += end + 1; // consume the end mark, excluded from the payload
              self.scan_terminator = false;
              self.advance();
            }
            None => {
              self.bytes.extend_from_slice(avail);
              *pos += avail.len();
            }
          }
        } else {
          let l = (self.left_bytes as usize).min(data.len() - *pos);
          self.bytes.extend_from_slice(&data[*pos..*pos + l]);
          *pos += l;
          self.left_bytes -= l as u32;
          if self.left_bytes == 0 {
            self.advance();
          }
        }
      }
      State::Done => {
        if self.event_type != 0 {
          self.construct_event();
        }
        self.advance();
      }
    }
  }

  fn construct_event(&mut self) {
    let mut event_type = self.event_type;
    // collapse a terminated SMF sys-ex packet into a plain sys-ex event; the
    // end mark may trail the start packet or the final escape packet
    if (event_type == SMF_SYS_EX_START || event_type == SMF_SYS_EX_NEXT)
      && self.bytes.last() == Some(&(END_EX as u8))
    {
      self.bytes.pop();
      event_type = SYS_EX;
    }
    let bytes = std::mem::take(&mut self.bytes);
    let channel = if event_type < 0xF0 {
      1 + self.channel
    } else if (META_OFFSET..META_OFFSET + 0x100).contains(&event_type) {
      self.meta_channel
    } else {
      0
    };
    match extract_message(event_type, bytes) {
      Some(message) => {
        if let MidiMessage::ChannelPrefix(prefix) = message {
          self.meta_channel = 1 + (prefix & 0x0F);
        }
        self.events.push_back(MidiEvent {
          channel,
          time: self.delta_time,
          message,
        });
      }
      None => {
        warn!("discarding midi event (0x{:02X}): data invalid", event_type);
      }
    }
  }
}

impl Default for MidiDecoder {
  fn default() -> Self {
    Self::new()
  }
}

fn extract_message(event_type: u16, bytes: Vec<u8>) -> Option<MidiMessage> {
  match event_type {
    NOTE_OFF | NOTE_ON | KEY_PRESSURE => {
      if bytes.len() < 2 {
        return None;
      }
      let frequency = note_to_freq(bytes[0] & 0x7F);
      let ival = bytes[1] & 0x7F;
      // velocity 0 indicates note-off, and note-off velocity from devices
      // is unreliable, so it is forced to 0
      if event_type == NOTE_OFF || (event_type == NOTE_ON && ival == 0) {
        Some(MidiMessage::NoteOff {
          frequency,
          velocity: 0.0,
        })
      } else if event_type == NOTE_ON {
        Some(MidiMessage::NoteOn {
          frequency,
          velocity: f32::from(ival) * DR7F,
        })
      } else {
        Some(MidiMessage::KeyPressure {
          frequency,
          intensity: f32::from(ival) * DR7F,
        })
      }
    }
    CONTROL_CHANGE => {
      if bytes.len() < 2 {
        return None;
      }
      Some(MidiMessage::ControlChange {
        control: bytes[0] & 0x7F,
        value: f32::from(bytes[1] & 0x7F) * DR7F,
      })
    }
    PROGRAM_CHANGE => {
      if bytes.is_empty() {
        return None;
      }
      Some(MidiMessage::ProgramChange {
        program: bytes[0] & 0x7F,
      })
    }
    CHANNEL_PRESSURE => {
      if bytes.is_empty() {
        return None;
      }
      Some(MidiMessage::ChannelPressure {
        intensity: f32::from(bytes[0] & 0x7F) * DR7F,
      })
    }
    PITCH_BEND => {
      if bytes.len() < 2 {
        return None;
      }
      // 14 bit: 7lsb 7msb, range 0..0x3FFF with center 0x2000
      let ival = i32::from(bytes[0] & 0x7F) | (i32::from(bytes[1] & 0x7F) << 7);
      Some(MidiMessage::PitchBend {
        value: (ival - 0x2000) as f32 * DR2000,
      })
    }
    SYS_EX | SMF_SYS_EX_START | SMF_SYS_EX_NEXT | META_SEQUENCER_SPECIFIC => {
      // the accumulated buffer is detached into the event, not copied
      if event_type == META_SEQUENCER_SPECIFIC {
        Some(MidiMessage::SequencerSpecific(bytes))
      } else {
        Some(MidiMessage::SysEx(bytes))
      }
    }
    SONG_POINTER => {
      if bytes.len() < 2 {
        return None;
      }
      Some(MidiMessage::SongPointer(
        u16::from(bytes[0] & 0x7F) | (u16::from(bytes[1] & 0x7F) << 7),
      ))
    }
    SONG_SELECT => {
      if bytes.is_empty() {
        return None;
      }
      Some(MidiMessage::SongSelect(bytes[0] & 0x7F))
    }
    TUNE => Some(MidiMessage::Tune),
    TIMING_CLOCK => Some(MidiMessage::TimingClock),
    SONG_START => Some(MidiMessage::SongStart),
    SONG_CONTINUE => Some(MidiMessage::SongContinue),
    SONG_STOP => Some(MidiMessage::SongStop),
    ACTIVE_SENSING => Some(MidiMessage::ActiveSensing),
    SYSTEM_RESET => Some(MidiMessage::SystemReset),
    META_SEQUENCE_NUMBER => {
      if bytes.len() < 2 {
        return None;
      }
      Some(MidiMessage::SequenceNumber(
        (u16::from(bytes[0]) << 8) | u16::from(bytes[1]),
      ))
    }
    META_TEXT => Some(MidiMessage::Text(lossy_text(bytes))),
    META_COPYRIGHT => Some(MidiMessage::Copyright(lossy_text(bytes))),
    META_TRACK_NAME => Some(MidiMessage::TrackName(lossy_text(bytes))),
    META_INSTRUMENT_NAME => Some(MidiMessage::InstrumentName(lossy_text(bytes))),
    META_LYRIC => Some(MidiMessage::Lyric(lossy_text(bytes))),
    META_MARKER => Some(MidiMessage::Marker(lossy_text(bytes))),
    META_CUE_POINT => Some(MidiMessage::CuePoint(lossy_text(bytes))),
    META_CHANNEL_PREFIX => {
      if bytes.is_empty() {
        return None;
      }
      Some(MidiMessage::ChannelPrefix(bytes[0]))
    }
    META_END_OF_TRACK => Some(MidiMessage::EndOfTrack),
    META_SET_TEMPO => {
      if bytes.len() < 3 {
        return None;
      }
      Some(MidiMessage::SetTempo {
        usecs_per_quarter: (u32::from(bytes[0]) << 16)
          | (u32::from(bytes[1]) << 8)
          | u32::from(bytes[2]),
      })
    }
    META_SMPTE_OFFSET => {
      if bytes.len() < 5 {
        return None;
      }
      Some(MidiMessage::SmpteOffset {
        hour: bytes[0],
        minute: bytes[1],
        second: bytes[2],
        frame: bytes[3],
        fraction: bytes[4],
      })
    }
    META_TIME_SIGNATURE => {
      if bytes.len() < 4 {
        return None;
      }
      Some(MidiMessage::TimeSignature {
        numerator: bytes[0],
        denominator: 1u16 << (bytes[1] & 0x0F),
        metro_clocks: bytes[2],
        notated_32nds: bytes[3],
      })
    }
    META_KEY_SIGNATURE => {
      if bytes.len() < 2 {
        return None;
      }
      // sf is two's complement: negative counts flats, positive sharps
      let sf = bytes[0] as i8;
      let (sharps, flats) = if sf < 0 {
        (0, sf.unsigned_abs())
      } else {
        (sf as u8, 0)
      };
      Some(MidiMessage::KeySignature {
        sharps,
        flats,
        minor: bytes[1] != 0,
      })
    }
    _ => {
      debug!("ignoring unknown midi event 0x{:02X}", event_type);
      None
    }
  }
}

fn lossy_text(bytes: Vec<u8>) -> String {
  String::from_utf8_lossy(&bytes).into_owned()
}
