//! Canonical patch and bank containers.

use crate::{BANK_SIZE, PATCH_SIZE_PACKED};

/// One voice program in the canonical 128-byte packed format.
///
/// The record is immutable once decoded and is treated as an opaque blob by
/// the scheduler; only the decoder and the external voice renderer interpret
/// the field layout.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    bytes: [u8; PATCH_SIZE_PACKED],
}

impl Patch {
    /// Wrap a packed 128-byte record.
    pub const fn from_packed(bytes: [u8; PATCH_SIZE_PACKED]) -> Self {
        Self { bytes }
    }

    /// Wrap the first 128 bytes of `data`, or `None` if it is too short.
    pub fn from_packed_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; PATCH_SIZE_PACKED] = data.get(..PATCH_SIZE_PACKED)?.try_into().ok()?;
        Some(Self { bytes })
    }

    /// The raw packed record.
    pub const fn as_bytes(&self) -> &[u8; PATCH_SIZE_PACKED] {
        &self.bytes
    }

    /// The ten-character program name stored in bytes 118..128.
    ///
    /// Non-printable bytes are rendered as spaces, matching how the classic
    /// hardware displays garbage names.
    pub fn name(&self) -> String {
        self.bytes[118..128]
            .iter()
            .map(|&b| if (0x20..=0x7e).contains(&b) { b as char } else { ' ' })
            .collect()
    }
}

impl Default for Patch {
    /// The silent/init program ("INIT VOICE"): single carrier at full level,
    /// all modulators muted, 1:1 frequency ratios, LFO at rest.
    fn default() -> Self {
        let mut b = [0u8; PATCH_SIZE_PACKED];
        // Operators are stored op6 first; op1 occupies the final 17 bytes.
        for op in 0..6 {
            let o = op * 17;
            b[o..o + 4].fill(99); // EG rates
            b[o + 4..o + 7].fill(99); // EG levels 1-3
            b[o + 12] = 7 << 3; // detune centered, no rate scaling
            b[o + 15] = 1 << 1; // frequency coarse 1.00, ratio mode
        }
        b[5 * 17 + 14] = 99; // op1 output level
        b[102..106].fill(99); // pitch EG rates
        b[106..110].fill(50); // pitch EG levels
        b[111] = 1 << 3; // osc key sync on, no feedback
        b[112] = 35; // LFO speed
        b[116] = 0x31; // LFO pitch mod sens 3, triangle, key sync on
        b[117] = 24; // transpose C3
        b[118..128].copy_from_slice(b"INIT VOICE");
        Self { bytes: b }
    }
}

impl core::fmt::Debug for Patch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Patch").field("name", &self.name()).finish()
    }
}

/// An ordered collection of 128 patches, indexed by program number.
///
/// Unset slots read as the default init patch, so a freshly created bank is
/// silent but well-defined.
pub struct Bank {
    patches: Box<[Patch; BANK_SIZE]>,
}

impl Bank {
    /// Replace slots `0..patches.len()` wholesale, leaving the rest as-is.
    pub fn load(&mut self, patches: &[Patch]) {
        let n = patches.len().min(BANK_SIZE);
        self.patches[..n].copy_from_slice(&patches[..n]);
    }

    /// The patch stored at `program`, or `None` if out of range.
    pub fn get(&self, program: usize) -> Option<&Patch> {
        self.patches.get(program)
    }

    /// Overwrite a single slot.  Out-of-range programs are ignored.
    pub fn set(&mut self, program: usize, patch: Patch) {
        if let Some(slot) = self.patches.get_mut(program) {
            *slot = patch;
        }
    }
}

impl Default for Bank {
    fn default() -> Self {
        Self {
            patches: Box::new([Patch::default(); BANK_SIZE]),
        }
    }
}

impl core::ops::Index<usize> for Bank {
    type Output = Patch;
    fn index(&self, program: usize) -> &Patch {
        &self.patches[program]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_patch_name() {
        assert_eq!(Patch::default().name(), "INIT VOICE");
    }

    #[test]
    fn name_replaces_unprintable_bytes() {
        let mut bytes = *Patch::default().as_bytes();
        bytes[118] = 0x01;
        bytes[127] = 0xff;
        assert_eq!(Patch::from_packed(bytes).name(), " NIT VOIC ");
    }

    #[test]
    fn from_packed_slice_requires_full_record() {
        assert!(Patch::from_packed_slice(&[0u8; 127]).is_none());
        assert!(Patch::from_packed_slice(&[0u8; 129]).is_some());
    }

    #[test]
    fn bank_load_is_partial() {
        let mut bank = Bank::default();
        let mut bytes = [0u8; PATCH_SIZE_PACKED];
        bytes[118..128].copy_from_slice(b"BRASS   1 ");
        bank.load(&[Patch::from_packed(bytes)]);
        assert_eq!(bank[0].name(), "BRASS   1 ");
        assert_eq!(bank[1], Patch::default());
        assert!(bank.get(128).is_none());
    }
}
