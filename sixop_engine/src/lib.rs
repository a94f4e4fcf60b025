//! Real-time rendering engine for the sixop software synthesizer.
//!
//! An [`Engine`] is one synthesizer instance: a fixed pool of voice slots, a
//! 128-slot patch store, and a block scheduler that renders audio in bounded
//! sub-bursts so that performance events land at exact sample offsets while
//! control-rate voice parameters are still recomputed on a fixed low-rate
//! quantum (the "nugget").
//!
//! Two call paths share an instance.  The audio path calls
//! [`Engine::render`] once per block and never blocks or allocates: every
//! lock acquisition there is a non-blocking attempt that degrades the block
//! to silence on contention.  The control path (program selects, bank loads,
//! configuration) may block and is the only side allowed to.  The actual
//! per-voice DSP lives behind the [`VoiceRenderer`] trait and is not part of
//! this crate.

/// Control-rate quantum, in samples: envelope and LFO increments are
/// recomputed at most once per this many samples.
pub const NUGGET_SIZE: usize = 64;
/// Hard upper bound on simultaneous voices per instance.
pub const MAX_POLYPHONY: usize = 64;
/// Default number of voices for a new instance.
pub const DEFAULT_POLYPHONY: usize = 16;

mod config;
pub use config::EngineConfig;

pub mod event;
pub use event::{EventBody, TimedEvent};

mod rtlock;
pub use rtlock::{AudioGuard, RtLock};

pub mod voicepool;
pub use voicepool::{MonoMode, VoicePool, VoiceSlot, VoiceStatus};

mod renderer;
pub use renderer::VoiceRenderer;

mod engine;
pub use engine::{ConfigureError, Engine, Performance};
