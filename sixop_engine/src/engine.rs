//! The engine instance: block scheduler and control surface.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use sixop::{decode_bank, Bank, BankError, Patch, PATCH_SIZE_UNPACKED};
use thiserror::Error;

use crate::rtlock::RtLock;
use crate::voicepool::{MonoMode, VoicePool};
use crate::{EngineConfig, TimedEvent, VoiceRenderer, MAX_POLYPHONY, NUGGET_SIZE};

/// Global performance parameters, kept as a raw byte record the way hardware
/// performance dumps deliver them.  Only the pitch bend range is interpreted
/// here; the rest is passed through to the renderer untouched.
#[derive(Clone, Copy, Debug)]
pub struct Performance {
    data: [u8; 64],
}

impl Performance {
    /// Copy as many bytes as `data` provides, zero-filling the rest.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut perf = Self { data: [0; 64] };
        let n = data.len().min(64);
        perf.data[..n].copy_from_slice(&data[..n]);
        perf
    }

    /// Pitch bend range in semitones, clamped to `0..=12`.
    pub fn pitch_bend_range(&self) -> u8 {
        self.data[3].min(12)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.data
    }
}

impl Default for Performance {
    fn default() -> Self {
        let mut data = [0; 64];
        data[3] = 2;
        Self { data }
    }
}

/// Failure of a [`Engine::configure`] call.  No state is mutated when one of
/// these is returned.
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error(transparent)]
    Bank(#[from] BankError),
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("unrecognized configure key `{0}`")]
    UnrecognizedKey(String),
}

/// Everything the audio path needs behind a single guard.
struct VoiceState {
    pool: VoicePool,
    renderer: Box<dyn VoiceRenderer>,
    current_program: u8,
    /// Copy of the sounding patch.  A copy rather than a bank index, so the
    /// audio path never needs the patch store lock to render.
    current_patch: Patch,
    /// Samples left in the current control-rate quantum; persists across
    /// blocks, always in `0..=NUGGET_SIZE`.
    nugget_remains: usize,
    performance: Performance,
    gain: f32,
}

/// One synthesizer instance.
///
/// `render` is the audio path and must be the only caller on the audio
/// thread; every other method is control-path and may block.
pub struct Engine {
    sample_rate: f32,
    voices: RtLock<VoiceState>,
    bank: Mutex<Bank>,
    /// Program change waiting for the patch store lock; -1 when none.  A
    /// newer request simply overwrites an older unconsumed one.
    pending_program: AtomicI32,
}

const NO_PENDING: i32 = -1;

impl Engine {
    pub fn new(config: EngineConfig, renderer: Box<dyn VoiceRenderer>) -> Self {
        let mut bank = Bank::default();
        if let Some(path) = &config.default_bank {
            let loaded = std::fs::read(path)
                .map_err(BankError::from)
                .and_then(|data| decode_bank(&data, path.to_str(), sixop::BANK_SIZE));
            match loaded {
                Ok(patches) => {
                    log::info!("loaded {} patches from {}", patches.len(), path.display());
                    bank.load(&patches);
                }
                Err(err) => {
                    log::warn!("default bank {} not loaded: {err}", path.display());
                }
            }
        }
        let mut pool = VoicePool::new(config.polyphony);
        let performance = Performance::default();
        pool.set_pitch_bend_range(performance.pitch_bend_range());
        let current_patch = bank[0];
        Self {
            sample_rate: config.sample_rate,
            voices: RtLock::new(VoiceState {
                pool,
                renderer,
                current_program: 0,
                current_patch,
                nugget_remains: 0,
                performance,
                gain: config.gain,
            }),
            bank: Mutex::new(bank),
            pending_program: AtomicI32::new(NO_PENDING),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Render one block, dispatching `events` at their sample offsets.
    ///
    /// `events` must be sorted by non-decreasing offset.  Offsets at or past
    /// the end of the block are ignored.  Never blocks: if the control path
    /// holds the voice guard the block stays silent and the next successful
    /// render starts from a clean pool.
    pub fn render(&self, output: &mut [f32], events: &[TimedEvent]) {
        output.fill(0.0);
        let Some(mut state) = self.voices.try_lock_audio() else {
            return;
        };
        if state.needs_recovery() {
            state.pool.all_voices_off();
        }
        if self.pending_program.load(Ordering::Acquire) != NO_PENDING {
            self.consume_pending_program(&mut state);
        }
        let VoiceState {
            pool,
            renderer,
            current_patch,
            nugget_remains,
            gain,
            ..
        } = &mut *state;

        let total = output.len();
        let mut samples_done = 0usize;
        let mut next_event = 0usize;
        while samples_done < total {
            if *nugget_remains == 0 {
                *nugget_remains = NUGGET_SIZE;
            }
            while next_event < events.len() && events[next_event].offset as usize <= samples_done {
                pool.handle_event(&events[next_event].body);
                next_event += 1;
            }
            let mut burst = (total - samples_done).min(*nugget_remains);
            if let Some(event) = events.get(next_event) {
                burst = burst.min(event.offset as usize - samples_done);
            }
            let nugget_end = burst == *nugget_remains;
            renderer.render(
                pool,
                current_patch,
                &mut output[samples_done..samples_done + burst],
                nugget_end,
            );
            samples_done += burst;
            *nugget_remains -= burst;
        }
        if *gain != 1.0 {
            for sample in output.iter_mut() {
                *sample *= *gain;
            }
        }
    }

    fn consume_pending_program(&self, state: &mut VoiceState) {
        // Only a try: if the control path holds the patch store the change
        // just stays pending for a later block.
        let Some(bank) = self.try_lock_bank() else {
            return;
        };
        let program = self.pending_program.swap(NO_PENDING, Ordering::AcqRel);
        if program != NO_PENDING {
            state.current_program = program as u8;
            state.current_patch = bank[program as usize];
        }
    }

    /// Switch the sounding program.  Out-of-range selections are ignored.
    pub fn select_program(&self, bank_number: u32, program: u32) {
        if bank_number != 0 || program >= sixop::BANK_SIZE as u32 {
            log::debug!("ignoring program select {bank_number}:{program}");
            return;
        }
        let Some(bank) = self.try_lock_bank() else {
            self.pending_program.store(program as i32, Ordering::Release);
            return;
        };
        let patch = bank[program as usize];
        let mut state = self.voices.lock_control();
        state.current_program = program as u8;
        state.current_patch = patch;
        // A stale deferred request must not override this newer selection.
        self.pending_program.store(NO_PENDING, Ordering::Release);
    }

    /// The currently selected program number.
    pub fn current_program(&self) -> u8 {
        self.voices.lock_control().current_program
    }

    /// Name of a stored program, or `None` if out of range.
    pub fn patch_name(&self, program: usize) -> Option<String> {
        self.lock_bank().get(program).map(Patch::name)
    }

    /// The active global performance record.
    pub fn performance(&self) -> Performance {
        self.voices.lock_control().performance
    }

    pub fn set_gain(&self, gain: f32) {
        self.voices.lock_control().gain = gain;
    }

    /// String-keyed configuration dispatch.
    pub fn configure(&self, key: &str, value: &str) -> Result<(), ConfigureError> {
        match key {
            "load" => self.load_bank(value),
            "edit_buffer" => self.set_edit_buffer(value),
            "performance" => self.set_performance(value),
            "monophonic" => {
                let mode = match value {
                    "off" => MonoMode::Off,
                    "on" => MonoMode::On,
                    "once" => MonoMode::Once,
                    "both" => MonoMode::Both,
                    _ => {
                        return Err(ConfigureError::InvalidValue {
                            key: "monophonic",
                            reason: format!("`{value}` is not off|on|once|both"),
                        })
                    }
                };
                self.voices.lock_control().pool.set_mono_mode(mode);
                Ok(())
            }
            "polyphony" => {
                let polyphony = value
                    .parse::<usize>()
                    .ok()
                    .filter(|p| (1..=MAX_POLYPHONY).contains(p))
                    .ok_or_else(|| ConfigureError::InvalidValue {
                        key: "polyphony",
                        reason: format!("`{value}` is not an integer in 1..={MAX_POLYPHONY}"),
                    })?;
                self.voices.lock_control().pool.set_polyphony(polyphony);
                Ok(())
            }
            _ => Err(ConfigureError::UnrecognizedKey(key.to_string())),
        }
    }

    /// Decode a bank file and replace the patch store wholesale.  On any
    /// error the existing bank is untouched.
    fn load_bank(&self, path: &str) -> Result<(), ConfigureError> {
        let data = std::fs::read(path).map_err(BankError::from)?;
        let patches = decode_bank(&data, Some(path), sixop::BANK_SIZE)?;
        log::info!("loaded {} patches from {path}", patches.len());
        let mut bank = self.lock_bank();
        bank.load(&patches);
        // The sounding copy tracks the store.
        let mut state = self.voices.lock_control();
        let program = state.current_program as usize;
        state.current_patch = bank[program];
        Ok(())
    }

    /// Install a hex-encoded 155-byte unpacked voice as the sounding patch,
    /// without touching the patch store.
    fn set_edit_buffer(&self, value: &str) -> Result<(), ConfigureError> {
        let bytes = parse_hex("edit_buffer", value)?;
        let unpacked: &[u8; PATCH_SIZE_UNPACKED] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| ConfigureError::InvalidValue {
                    key: "edit_buffer",
                    reason: format!("expected {PATCH_SIZE_UNPACKED} bytes, got {}", bytes.len()),
                })?;
        let patch = sixop::sysex::pack_patch(unpacked);
        self.voices.lock_control().current_patch = patch;
        Ok(())
    }

    fn set_performance(&self, value: &str) -> Result<(), ConfigureError> {
        let bytes = parse_hex("performance", value)?;
        if bytes.len() > 64 {
            return Err(ConfigureError::InvalidValue {
                key: "performance",
                reason: format!("expected at most 64 bytes, got {}", bytes.len()),
            });
        }
        let performance = Performance::from_bytes(&bytes);
        let mut state = self.voices.lock_control();
        state.pool.set_pitch_bend_range(performance.pitch_bend_range());
        state.performance = performance;
        Ok(())
    }

    /// Prepare for rendering: silence the pool and reset renderer state.
    pub fn activate(&self) {
        let mut state = self.voices.lock_control();
        state.pool.all_voices_off();
        state.renderer.reset();
        state.nugget_remains = 0;
    }

    pub fn deactivate(&self) {
        self.voices.lock_control().pool.all_voices_off();
    }

    fn lock_bank(&self) -> MutexGuard<'_, Bank> {
        self.bank
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn try_lock_bank(&self) -> Option<MutexGuard<'_, Bank>> {
        match self.bank.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

fn parse_hex(key: &'static str, value: &str) -> Result<Vec<u8>, ConfigureError> {
    let invalid = || ConfigureError::InvalidValue {
        key,
        reason: format!("`{value}` is not an even-length hex string"),
    };
    if !value.is_ascii() || value.len() % 2 != 0 {
        return Err(invalid());
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).map_err(|_| invalid()))
        .collect()
}
