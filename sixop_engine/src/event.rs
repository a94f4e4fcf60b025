//! Timestamped performance events.
//!
//! Events carry a sample offset relative to the start of the current block.
//! The host is expected to deliver them sorted by non-decreasing offset; the
//! scheduler applies them in order and never reorders them.

use wmidi::MidiMessage;

/// The command carried by a [`TimedEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventBody {
    /// Start a note.  A velocity of zero is dispatched as a note-off with
    /// velocity 64, as some sequencers encode releases that way.
    NoteOn { note: u8, velocity: u8 },
    /// Release a note.
    NoteOff { note: u8, velocity: u8 },
    /// Polyphonic key pressure for one sounding note.
    KeyPressure { note: u8, pressure: u8 },
    /// A controller change.
    ControlChange {
        controller: wmidi::ControlFunction,
        value: u8,
    },
    /// Channel-wide pressure.
    ChannelPressure { pressure: u8 },
    /// Pitch bend, centered on zero (full range is -8192..=8191).
    PitchBend { value: i16 },
}

/// An immutable timestamped command for the block scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedEvent {
    /// Sample offset from the start of the block.
    pub offset: u32,
    pub body: EventBody,
}

impl TimedEvent {
    pub const fn new(offset: u32, body: EventBody) -> Self {
        Self { offset, body }
    }

    /// Convert a MIDI message into an event at `offset`, or `None` for
    /// message types the engine does not consume (program changes arrive
    /// through the control path, not the event list).
    pub fn from_midi(offset: u32, msg: &MidiMessage) -> Option<Self> {
        let body = match msg {
            MidiMessage::NoteOn(_, note, velocity) => EventBody::NoteOn {
                note: u8::from(*note),
                velocity: u8::from(*velocity),
            },
            MidiMessage::NoteOff(_, note, velocity) => EventBody::NoteOff {
                note: u8::from(*note),
                velocity: u8::from(*velocity),
            },
            MidiMessage::PolyphonicKeyPressure(_, note, pressure) => EventBody::KeyPressure {
                note: u8::from(*note),
                pressure: u8::from(*pressure),
            },
            MidiMessage::ControlChange(_, controller, value) => EventBody::ControlChange {
                controller: *controller,
                value: u8::from(*value),
            },
            MidiMessage::ChannelPressure(_, pressure) => EventBody::ChannelPressure {
                pressure: u8::from(*pressure),
            },
            MidiMessage::PitchBendChange(_, bend) => EventBody::PitchBend {
                value: u16::from(*bend) as i16 - 0x2000,
            },
            _ => return None,
        };
        Some(Self { offset, body })
    }
}
