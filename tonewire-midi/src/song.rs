//! Projection of decoded SMF tracks onto a score model.

use log::warn;

use crate::event::MidiMessage;
use crate::note::{fine_tune_from_note_freq, note_from_freq};
use crate::smf::{MidiFile, MidiTrack};

/// Identifies the control signal a projected event drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiSignal {
  Control(u8),
  Program,
  Pressure,
  PitchBend,
}

/// Score model consumed by [`MidiFile::setup_song`]. The implementation owns
/// tracks, parts and their storage; this crate only drives insertions.
pub trait ScoreSink {
  type TrackId: Copy;
  type PartId: Copy;

  fn set_song_tempo(&mut self, bpm: f64, numerator: u8, denominator: u16, tpqn: u32);
  fn create_track(&mut self) -> Self::TrackId;
  fn create_part(&mut self, track: Self::TrackId) -> Self::PartId;
  fn insert_note(
    &mut self,
    part: Self::PartId,
    start: u32,
    duration: u32,
    note: i32,
    fine_tune: i32,
    velocity: f32,
  );
  fn insert_control(&mut self, part: Self::PartId, tick: u32, signal: MidiSignal, value: f32);
  fn set_track_name(&mut self, track: Self::TrackId, name: &str);
  fn set_part_name(&mut self, part: Self::PartId, name: &str);
  fn set_track_description(&mut self, track: Self::TrackId, text: &str);
}

impl MidiFile {
  /// Projects the file onto a score model: tempo first, then one track/part
  /// pair per source track that carries channel voice messages. Purely meta
  /// tracks produce no playable track.
  pub fn setup_song<S: ScoreSink>(&self, sink: &mut S) {
    sink.set_song_tempo(self.bpm, self.numerator, self.denominator, self.tpqn);
    for track in &self.tracks {
      if track.events.iter().any(|event| event.is_channel_voice()) {
        let track_id = sink.create_track();
        let part_id = sink.create_part(track_id);
        self.add_part_events(track, sink, track_id, part_id);
      }
    }
  }

  fn add_part_events<S: ScoreSink>(
    &self,
    track: &MidiTrack,
    sink: &mut S,
    track_id: S::TrackId,
    part_id: S::PartId,
  ) {
    let rescale = |ticks: u64| (ticks as f64 * self.tpqn_rate) as u32;
    let mut start: u64 = 0;
    let mut description = String::new();
    for (i, event) in track.events.iter().enumerate() {
      start += event.time;
      match &event.message {
        MidiMessage::NoteOn {
          frequency,
          velocity,
        } => {
          // scan forward for the note-off at the same frequency; an
          // unterminated note keeps the remainder of the track as duration
          let mut dur: u64 = 0;
          let mut terminated = false;
          for later in &track.events[i + 1..] {
            dur += later.time;
            if matches!(&later.message, MidiMessage::NoteOff { frequency: f, .. } if f == frequency)
            {
              terminated = true;
              break;
            }
          }
          if !terminated {
            warn!(
              "note at tick {} ({}Hz) has no matching note-off",
              start, frequency
            );
          }
          let note = note_from_freq(*frequency);
          let fine_tune = fine_tune_from_note_freq(note, *frequency);
          sink.insert_note(
            part_id,
            rescale(start),
            rescale(dur),
            note,
            fine_tune,
            *velocity,
          );
        }
        // exactly one signal per event, priority order is part of the contract:
        // control change before program change before pressure before pitch bend
        MidiMessage::ControlChange { control, value } => {
          sink.insert_control(part_id, rescale(start), MidiSignal::Control(*control), *value);
        }
        MidiMessage::ProgramChange { program } => {
          sink.insert_control(
            part_id,
            rescale(start),
            MidiSignal::Program,
            f32::from(*program) / 127.0,
          );
        }
        MidiMessage::ChannelPressure { intensity } => {
          sink.insert_control(part_id, rescale(start), MidiSignal::Pressure, *intensity);
        }
        MidiMessage::PitchBend { value } => {
          sink.insert_control(part_id, rescale(start), MidiSignal::PitchBend, *value);
        }
        MidiMessage::Text(text) => {
          if !description.is_empty() {
            description.push(' ');
          }
          description.push_str(text);
          sink.set_track_description(track_id, &description);
        }
        MidiMessage::TrackName(name) => {
          sink.set_track_name(track_id, name);
        }
        MidiMessage::InstrumentName(name) => {
          sink.set_part_name(part_id, name);
        }
        _ => {}
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::event::MidiEvent;
  use crate::note::note_to_freq;
  use crate::smf::TPQN;

  fn ev(time: u64, message: MidiMessage) -> MidiEvent {
    MidiEvent {
      channel: 1,
      time,
      message,
    }
  }

  fn note_on(time: u64, note: u8, velocity: f32) -> MidiEvent {
    ev(
      time,
      MidiMessage::NoteOn {
        frequency: note_to_freq(note),
        velocity,
      },
    )
  }

  fn note_off(time: u64, note: u8) -> MidiEvent {
    ev(
      time,
      MidiMessage::NoteOff {
        frequency: note_to_freq(note),
        velocity: 0.0,
      },
    )
  }

  fn file_with_tracks(tpqn_rate: f64, tracks: Vec<MidiTrack>) -> MidiFile {
    MidiFile {
      tpqn: TPQN,
      tpqn_rate,
      bpm: 120.0,
      numerator: 4,
      denominator: 4,
      tracks,
    }
  }

  #[derive(Default)]
  struct TestSink {
    tempo: Option<(f64, u8, u16, u32)>,
    track_names: Vec<Option<String>>,
    track_descriptions: Vec<Option<String>>,
    part_names: Vec<Option<String>>,
    notes: Vec<Vec<(u32, u32, i32, i32, f32)>>,
    controls: Vec<Vec<(u32, MidiSignal, f32)>>,
  }

  impl ScoreSink for TestSink {
    type TrackId = usize;
    type PartId = usize;

    fn set_song_tempo(&mut self, bpm: f64, numerator: u8, denominator: u16, tpqn: u32) {
      self.tempo = Some((bpm, numerator, denominator, tpqn));
    }

    fn create_track(&mut self) -> usize {
      self.track_names.push(None);
      self.track_descriptions.push(None);
      self.track_names.len() - 1
    }

    fn create_part(&mut self, _track: usize) -> usize {
      self.part_names.push(None);
      self.notes.push(Vec::new());
      self.controls.push(Vec::new());
      self.part_names.len() - 1
    }

    fn insert_note(
      &mut self,
      part: usize,
      start: u32,
      duration: u32,
      note: i32,
      fine_tune: i32,
      velocity: f32,
    ) {
      self.notes[part].push((start, duration, note, fine_tune, velocity));
    }

    fn insert_control(&mut self, part: usize, tick: u32, signal: MidiSignal, value: f32) {
      self.controls[part].push((tick, signal, value));
    }

    fn set_track_name(&mut self, track: usize, name: &str) {
      self.track_names[track] = Some(name.to_string());
    }

    fn set_part_name(&mut self, part: usize, name: &str) {
      self.part_names[part] = Some(name.to_string());
    }

    fn set_track_description(&mut self, track: usize, text: &str) {
      self.track_descriptions[track] = Some(text.to_string());
    }
  }

  #[test]
  fn tempo_is_applied_to_the_sink() {
    let file = file_with_tracks(1.0, vec![MidiTrack::default()]);
    let mut sink = TestSink::default();
    file.setup_song(&mut sink);
    assert_eq!(sink.tempo, Some((120.0, 4, 4, TPQN)));
  }

  #[test]
  fn notes_are_paired_by_frequency() {
    // two overlapping notes, note-offs arrive in reverse order
    let track = MidiTrack {
      events: vec![
        note_on(0, 60, 0.5),
        note_on(10, 64, 0.8),
        note_off(20, 64),
        note_off(5, 60),
      ],
    };
    let file = file_with_tracks(1.0, vec![track]);
    let mut sink = TestSink::default();
    file.setup_song(&mut sink);

    assert_eq!(sink.notes.len(), 1);
    let notes = &sink.notes[0];
    assert_eq!(notes.len(), 2);
    // note 60: starts at 0, off after 10+20+5 ticks
    assert_eq!(notes[0], (0, 35, 60, 0, 0.5));
    // note 64: starts at 10, off 20 ticks later
    assert_eq!(notes[1], (10, 20, 64, 0, 0.8));
  }

  #[test]
  fn unterminated_note_keeps_track_remainder_as_duration() {
    let track = MidiTrack {
      events: vec![
        note_on(0, 60, 1.0),
        ev(30, MidiMessage::EndOfTrack),
      ],
    };
    let file = file_with_tracks(1.0, vec![track]);
    let mut sink = TestSink::default();
    file.setup_song(&mut sink);
    assert_eq!(sink.notes[0], vec![(0, 30, 60, 0, 1.0)]);
  }

  #[test]
  fn ticks_are_rescaled_to_internal_resolution() {
    let track = MidiTrack {
      events: vec![note_on(96, 69, 1.0), note_off(48, 69)],
    };
    // division 96 in the source file gives a rate of 4
    let file = file_with_tracks(4.0, vec![track]);
    let mut sink = TestSink::default();
    file.setup_song(&mut sink);
    assert_eq!(sink.notes[0], vec![(384, 192, 69, 0, 1.0)]);
  }

  #[test]
  fn control_events_map_to_signals() {
    let track = MidiTrack {
      events: vec![
        note_on(0, 60, 1.0),
        ev(
          1,
          MidiMessage::ControlChange {
            control: 7,
            value: 0.5,
          },
        ),
        ev(1, MidiMessage::ProgramChange { program: 127 }),
        ev(1, MidiMessage::ChannelPressure { intensity: 0.25 }),
        ev(1, MidiMessage::PitchBend { value: -0.5 }),
        note_off(1, 60),
      ],
    };
    let file = file_with_tracks(1.0, vec![track]);
    let mut sink = TestSink::default();
    file.setup_song(&mut sink);

    assert_eq!(
      sink.controls[0],
      vec![
        (1, MidiSignal::Control(7), 0.5),
        (2, MidiSignal::Program, 1.0),
        (3, MidiSignal::Pressure, 0.25),
        (4, MidiSignal::PitchBend, -0.5),
      ]
    );
  }

  #[test]
  fn text_events_accumulate_into_the_description() {
    let track = MidiTrack {
      events: vec![
        note_on(0, 60, 1.0),
        note_off(1, 60),
        ev(0, MidiMessage::Text("first".into())),
        ev(0, MidiMessage::Text("second".into())),
        ev(0, MidiMessage::TrackName("Lead".into())),
        ev(0, MidiMessage::InstrumentName("Piano".into())),
      ],
    };
    let file = file_with_tracks(1.0, vec![track]);
    let mut sink = TestSink::default();
    file.setup_song(&mut sink);

    assert_eq!(sink.track_descriptions[0].as_deref(), Some("first second"));
    assert_eq!(sink.track_names[0].as_deref(), Some("Lead"));
    assert_eq!(sink.part_names[0].as_deref(), Some("Piano"));
  }

  #[test]
  fn meta_only_tracks_are_not_materialized() {
    let meta_track = MidiTrack {
      events: vec![
        ev(
          0,
          MidiMessage::SetTempo {
            usecs_per_quarter: 500000,
          },
        ),
        ev(0, MidiMessage::EndOfTrack),
      ],
    };
    let voice_track = MidiTrack {
      events: vec![note_on(0, 60, 1.0), note_off(8, 60)],
    };
    let file = file_with_tracks(1.0, vec![meta_track, voice_track]);
    let mut sink = TestSink::default();
    file.setup_song(&mut sink);

    assert_eq!(sink.track_names.len(), 1);
    assert_eq!(sink.notes.len(), 1);
    assert_eq!(sink.notes[0].len(), 1);
  }
}
