//! The seam between the block scheduler and the per-voice DSP.

use sixop::Patch;

use crate::voicepool::VoicePool;

/// Per-voice signal generation, driven one burst at a time by
/// [`Engine::render`](crate::Engine::render).
///
/// The scheduler zeroes the output before the first burst, so implementations
/// mix into `out` rather than overwrite it.  `out` never exceeds
/// [`NUGGET_SIZE`](crate::NUGGET_SIZE) samples, and `nugget_end` is true
/// exactly when the burst reaches a nugget boundary: that is the only point
/// at which control-rate parameters (envelope increments, LFO phase steps)
/// should be recomputed from the pool's controller state.
///
/// Implementations detect retriggers by watching
/// [`VoiceSlot::serial`](crate::VoiceSlot::serial), and report voices whose
/// release has decayed to silence via
/// [`VoicePool::voice_finished`](crate::VoicePool::voice_finished).
pub trait VoiceRenderer: Send {
    /// Mix one burst of every sounding voice into `out`.
    fn render(&mut self, voices: &mut VoicePool, patch: &Patch, out: &mut [f32], nugget_end: bool);

    /// Discard all DSP state (oscillator phases, envelope positions).  Called
    /// when the engine is activated, never from the audio path.
    fn reset(&mut self);
}
