use ringbuf::Producer;
use std::fmt::{Debug, Formatter};

use crate::event::MidiEvent;

/// Subscriber endpoint for the live distribution path: decoded events are
/// handed to a callback or pushed into an SPSC ring buffer drained by the
/// consumer thread.
pub enum EventSink {
  Callback(Box<dyn FnMut(MidiEvent) + Send + 'static>),
  RingBuffer(Producer<MidiEvent>),
}

impl EventSink {
  pub fn deliver(&mut self, event: MidiEvent) {
    match self {
      EventSink::Callback(ref mut callback) => (callback)(event),
      EventSink::RingBuffer(ref mut producer) => {
        producer.push(event).ok();
      }
    };
  }
}

impl<F> From<F> for EventSink
where
  F: FnMut(MidiEvent) + Send + 'static,
{
  fn from(callback: F) -> Self {
    EventSink::Callback(Box::new(callback))
  }
}

impl From<Producer<MidiEvent>> for EventSink {
  fn from(producer: Producer<MidiEvent>) -> Self {
    EventSink::RingBuffer(producer)
  }
}

impl Debug for EventSink {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Callback(_) => write!(f, "Callback"),
      Self::RingBuffer(_) => write!(f, "RingBuffer"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decoder::MidiDecoder;
  use crate::event::MidiMessage;
  use std::sync::{Arc, Mutex};

  #[test]
  fn callback_receives_decoded_events() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();

    let mut decoder = MidiDecoder::new();
    decoder.push(&[0x90, 0x40, 0x7F, 0x80, 0x40, 0x00], 7);
    let mut sink = EventSink::from(move |event: MidiEvent| {
      received_clone.lock().unwrap().push(event);
    });
    decoder.drain_into(&mut sink);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert!(matches!(received[0].message, MidiMessage::NoteOn { .. }));
    assert!(matches!(received[1].message, MidiMessage::NoteOff { .. }));
    assert_eq!(received[0].time, 7);
  }

  #[test]
  fn ring_buffer_receives_decoded_events() {
    let (producer, mut consumer) = ringbuf::RingBuffer::new(8).split();
    let mut sink = EventSink::from(producer);

    let mut decoder = MidiDecoder::new();
    decoder.push(&[0xF8], 0);
    decoder.drain_into(&mut sink);

    assert!(matches!(
      consumer.pop(),
      Some(MidiEvent {
        message: MidiMessage::TimingClock,
        ..
      })
    ));
    assert!(consumer.pop().is_none());
  }
}
