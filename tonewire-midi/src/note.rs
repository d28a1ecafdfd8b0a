//! 12-tone equal tempered note/frequency conversions, A4 = 440 Hz at note 69.

pub const KAMMER_FREQ: f32 = 440.0;
pub const KAMMER_NOTE: i32 = 69;

/// Frequency in Hz of a MIDI note number.
pub fn note_to_freq(note: u8) -> f32 {
  KAMMER_FREQ * 2.0_f32.powf((note as f32 - KAMMER_NOTE as f32) / 12.0)
}

/// Nearest MIDI note number for a frequency, clamped to 0..=127.
pub fn note_from_freq(freq: f32) -> i32 {
  if freq <= 0.0 {
    return 0;
  }
  let note = KAMMER_NOTE as f32 + 12.0 * (freq / KAMMER_FREQ).log2();
  note.round().clamp(0.0, 127.0) as i32
}

/// Cent deviation of `freq` from the tempered pitch of `note`, clamped to a
/// semitone in either direction.
pub fn fine_tune_from_note_freq(note: i32, freq: f32) -> i32 {
  if freq <= 0.0 {
    return 0;
  }
  let tempered = note_to_freq(note.clamp(0, 127) as u8);
  let cents = 1200.0 * (freq / tempered).log2();
  cents.round().clamp(-100.0, 100.0) as i32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kammer_pitch() {
    assert!((note_to_freq(69) - 440.0).abs() < 0.01);
    assert!((note_to_freq(81) - 880.0).abs() < 0.01);
    assert!((note_to_freq(60) - 261.63).abs() < 0.01);
  }

  #[test]
  fn note_round_trip() {
    for note in 0..=127u8 {
      assert_eq!(note_from_freq(note_to_freq(note)), note as i32);
    }
  }

  #[test]
  fn fine_tune_of_tempered_pitch_is_zero() {
    assert_eq!(fine_tune_from_note_freq(69, 440.0), 0);
    assert_eq!(fine_tune_from_note_freq(60, note_to_freq(60)), 0);
  }

  #[test]
  fn fine_tune_tracks_detuning() {
    // a quarter tone above A4 is +50 cents
    let detuned = 440.0 * 2.0_f32.powf(50.0 / 1200.0);
    let cents = fine_tune_from_note_freq(69, detuned);
    assert!((cents - 50).abs() <= 1, "got {} cents", cents);
  }
}
