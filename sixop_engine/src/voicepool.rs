//! The voice slot pool: note-to-voice assignment and channel controllers.
//!
//! Slots are created once at engine construction and reused for the life of
//! the instance; the allocation lists are fixed-capacity so nothing here
//! allocates on the audio path.  The pool owns note assignment, stealing,
//! sustain, monophonic key priority, and the channel controller values; the
//! external renderer owns all DSP state and reads the slots each burst.

use arrayvec::ArrayVec;

use crate::{EventBody, MAX_POLYPHONY};

/// Lifecycle of one voice slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VoiceStatus {
    /// Not sounding, available for allocation.
    #[default]
    Free,
    /// Key down (or held by mono key priority).
    On,
    /// Key up but held by the damper pedal.
    Sustained,
    /// Key up, envelope releasing; the renderer frees the slot via
    /// [`VoicePool::voice_finished`] once it falls silent.
    Released,
}

/// Monophonic keyboard modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MonoMode {
    /// Polyphonic operation.
    #[default]
    Off,
    /// Monophonic; every key press retriggers the envelope.
    On,
    /// Monophonic; only the first key of a legato group retriggers.
    Once,
    /// Monophonic; both key presses and returns to a held key retrigger.
    Both,
}

/// One polyphonic voice.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoiceSlot {
    pub note: u8,
    pub velocity: u8,
    /// Polyphonic key pressure for this voice's note.
    pub pressure: u8,
    pub status: VoiceStatus,
    /// Bumped on every (re)trigger, so the renderer can detect envelope
    /// restarts without tracking note transitions itself.
    pub serial: u64,
}

pub struct VoicePool {
    slots: Vec<VoiceSlot>,
    /// Sounding slots, oldest first; stealing takes the front.
    active: ArrayVec<usize, MAX_POLYPHONY>,
    free: ArrayVec<usize, MAX_POLYPHONY>,
    max_voices: usize,
    mono_mode: MonoMode,
    /// Depressed keys in press order, for mono key priority.
    held_keys: ArrayVec<(u8, u8), 128>,
    next_serial: u64,
    pitch_bend: i16,
    pitch_bend_range: u8,
    mod_wheel: u8,
    volume: u8,
    channel_pressure: u8,
    sustain: bool,
}

impl VoicePool {
    pub fn new(polyphony: usize) -> Self {
        let mut free = ArrayVec::new();
        // pop() allocates the lowest-numbered free slot first
        for i in (0..MAX_POLYPHONY).rev() {
            free.push(i);
        }
        Self {
            slots: vec![VoiceSlot::default(); MAX_POLYPHONY],
            active: ArrayVec::new(),
            free,
            max_voices: polyphony.clamp(1, MAX_POLYPHONY),
            mono_mode: MonoMode::Off,
            held_keys: ArrayVec::new(),
            next_serial: 1,
            pitch_bend: 0,
            pitch_bend_range: 2,
            mod_wheel: 0,
            volume: 127,
            channel_pressure: 0,
            sustain: false,
        }
    }

    /// Apply one scheduler event.
    pub fn handle_event(&mut self, body: &EventBody) {
        match *body {
            EventBody::NoteOn { note, velocity } => self.note_on(note, velocity),
            EventBody::NoteOff { note, velocity } => self.note_off(note, velocity),
            EventBody::KeyPressure { note, pressure } => self.key_pressure(note, pressure),
            EventBody::ControlChange { controller, value } => {
                self.control_change(controller, value)
            }
            EventBody::ChannelPressure { pressure } => self.channel_pressure = pressure,
            EventBody::PitchBend { value } => self.pitch_bend = value,
        }
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        if velocity == 0 {
            // Running-status release; shouldn't happen, but some hosts send it.
            self.note_off(note, 64);
            return;
        }
        if self.mono_mode == MonoMode::Off {
            self.poly_note_on(note, velocity);
        } else {
            self.mono_note_on(note, velocity);
        }
    }

    pub fn note_off(&mut self, note: u8, velocity: u8) {
        if self.mono_mode == MonoMode::Off {
            self.poly_note_off(note, velocity);
        } else {
            self.mono_note_off(note);
        }
    }

    fn poly_note_on(&mut self, note: u8, velocity: u8) {
        let idx = if self.active.len() >= self.max_voices {
            // Steal the oldest sounding voice.
            self.active.remove(0)
        } else if let Some(idx) = self.free.pop() {
            idx
        } else {
            self.active.remove(0)
        };
        self.start_voice(idx, note, velocity);
        self.active.push(idx);
    }

    fn poly_note_off(&mut self, note: u8, _velocity: u8) {
        for &idx in &self.active {
            let slot = &mut self.slots[idx];
            if slot.note == note && slot.status == VoiceStatus::On {
                slot.status = if self.sustain {
                    VoiceStatus::Sustained
                } else {
                    VoiceStatus::Released
                };
                return;
            }
        }
    }

    fn mono_note_on(&mut self, note: u8, velocity: u8) {
        if self.held_keys.is_full() {
            self.held_keys.remove(0);
        }
        self.held_keys.push((note, velocity));
        let retrigger = match self.mono_mode {
            MonoMode::On | MonoMode::Both => true,
            MonoMode::Once => self.held_keys.len() == 1,
            MonoMode::Off => unreachable!(),
        };
        if let Some(&idx) = self.active.first() {
            if self.slots[idx].status == VoiceStatus::On && !retrigger {
                // Legato: change pitch without restarting the envelope.
                self.slots[idx].note = note;
                self.slots[idx].velocity = velocity;
            } else {
                self.start_voice(idx, note, velocity);
            }
        } else if let Some(idx) = self.free.pop() {
            self.start_voice(idx, note, velocity);
            self.active.push(idx);
        }
    }

    fn mono_note_off(&mut self, note: u8) {
        self.held_keys.retain(|&mut (n, _)| n != note);
        let Some(&idx) = self.active.first() else { return };
        let slot = &mut self.slots[idx];
        if slot.note != note || slot.status != VoiceStatus::On {
            return;
        }
        if let Some(&(prev_note, prev_velocity)) = self.held_keys.last() {
            // Return to the most recent key still held.
            if self.mono_mode == MonoMode::Both {
                self.start_voice(idx, prev_note, prev_velocity);
            } else {
                slot.note = prev_note;
                slot.velocity = prev_velocity;
            }
        } else {
            slot.status = if self.sustain {
                VoiceStatus::Sustained
            } else {
                VoiceStatus::Released
            };
        }
    }

    fn start_voice(&mut self, idx: usize, note: u8, velocity: u8) {
        let slot = &mut self.slots[idx];
        slot.note = note;
        slot.velocity = velocity;
        slot.pressure = 0;
        slot.status = VoiceStatus::On;
        slot.serial = self.next_serial;
        self.next_serial += 1;
    }

    /// Called by the renderer when a released voice has fallen silent.
    pub fn voice_finished(&mut self, idx: usize) {
        if self.slots.get(idx).map(|s| s.status) == Some(VoiceStatus::Free) {
            return;
        }
        self.slots[idx].status = VoiceStatus::Free;
        if let Some(pos) = self.active.iter().position(|&i| i == idx) {
            self.active.remove(pos);
        }
        self.free.push(idx);
    }

    /// Force every voice to the free/silent state.  This is the guard's
    /// recovery action as well as the activate/deactivate behavior.
    pub fn all_voices_off(&mut self) {
        for slot in &mut self.slots {
            slot.status = VoiceStatus::Free;
        }
        self.active.clear();
        self.free.clear();
        for i in (0..MAX_POLYPHONY).rev() {
            self.free.push(i);
        }
        self.held_keys.clear();
    }

    /// Release every sounding voice (damper pedal still applies).
    pub fn all_notes_off(&mut self) {
        for &idx in &self.active {
            let slot = &mut self.slots[idx];
            if slot.status == VoiceStatus::On {
                slot.status = if self.sustain {
                    VoiceStatus::Sustained
                } else {
                    VoiceStatus::Released
                };
            }
        }
        self.held_keys.clear();
    }

    pub fn key_pressure(&mut self, note: u8, pressure: u8) {
        for &idx in &self.active {
            let slot = &mut self.slots[idx];
            if slot.note == note && slot.status == VoiceStatus::On {
                slot.pressure = pressure;
            }
        }
    }

    pub fn control_change(&mut self, controller: wmidi::ControlFunction, value: u8) {
        use wmidi::ControlFunction;
        match controller {
            ControlFunction::MODULATION_WHEEL => self.mod_wheel = value,
            ControlFunction::CHANNEL_VOLUME => self.volume = value,
            ControlFunction::DAMPER_PEDAL => self.set_sustain(value >= 64),
            ControlFunction::ALL_SOUND_OFF => self.all_voices_off(),
            ControlFunction::RESET_ALL_CONTROLLERS => self.reset_controllers(),
            ControlFunction::ALL_NOTES_OFF => self.all_notes_off(),
            _ => {}
        }
    }

    fn set_sustain(&mut self, sustain: bool) {
        self.sustain = sustain;
        if !sustain {
            for &idx in &self.active {
                let slot = &mut self.slots[idx];
                if slot.status == VoiceStatus::Sustained {
                    slot.status = VoiceStatus::Released;
                }
            }
        }
    }

    /// Reset channel controllers to their power-on values.  Per the MIDI
    /// recommendation this leaves channel volume alone.
    fn reset_controllers(&mut self) {
        self.pitch_bend = 0;
        self.mod_wheel = 0;
        self.channel_pressure = 0;
        self.set_sustain(false);
    }

    /// Reduce or raise the number of usable voices, killing the oldest
    /// voices if the pool is over the new limit.
    pub fn set_polyphony(&mut self, polyphony: usize) {
        self.max_voices = polyphony.clamp(1, MAX_POLYPHONY);
        while self.active.len() > self.max_voices {
            let idx = self.active[0];
            self.voice_finished(idx);
        }
    }

    /// Switch keyboard mode.  All voices are silenced on a change so the two
    /// allocation disciplines never see each other's state.
    pub fn set_mono_mode(&mut self, mode: MonoMode) {
        if mode != self.mono_mode {
            self.all_voices_off();
            self.mono_mode = mode;
        }
    }

    pub fn set_pitch_bend_range(&mut self, semitones: u8) {
        self.pitch_bend_range = semitones;
    }

    pub fn slots(&self) -> &[VoiceSlot] {
        &self.slots
    }

    /// Indices of sounding slots, oldest first.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn mono_mode(&self) -> MonoMode {
        self.mono_mode
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    /// Raw pitch bend, -8192..=8191.
    pub fn pitch_bend(&self) -> i16 {
        self.pitch_bend
    }

    pub fn pitch_bend_range(&self) -> u8 {
        self.pitch_bend_range
    }

    pub fn mod_wheel(&self) -> u8 {
        self.mod_wheel
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn channel_pressure(&self) -> u8 {
        self.channel_pressure
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }
}
