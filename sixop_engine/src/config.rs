//! Per-instance engine configuration.

use std::path::PathBuf;

use crate::DEFAULT_POLYPHONY;

/// Configuration injected at engine construction.
///
/// Everything here is owned by the instance it configures; in particular the
/// output gain is a plain per-instance value, never a process-wide override
/// shared between instances.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Audio sample rate, in Hz.
    pub sample_rate: f32,
    /// Number of simultaneous voices, clamped to `1..=MAX_POLYPHONY`.
    pub polyphony: usize,
    /// Linear output gain applied once per rendered block.
    pub gain: f32,
    /// Optional bank file decoded into the patch store at construction.
    /// Load failures are logged and otherwise ignored; the store keeps its
    /// init patches.
    pub default_bank: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            polyphony: DEFAULT_POLYPHONY,
            gain: 1.0,
            default_bank: None,
        }
    }
}
