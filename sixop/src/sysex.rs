//! SysEx dump geometries and voice parameter packing.
//!
//! Two exclusive-message shapes are recognized by the bank decoder: the
//! 32-voice bulk dump, whose payload is already in the packed format, and the
//! single-voice edit-buffer dump, whose payload is the unpacked parameter
//! list and must be transcoded via [`pack_patch`].

use crate::{Patch, PATCH_SIZE_PACKED, PATCH_SIZE_UNPACKED};

/// Total size of a 32-voice bulk dump: 6 header bytes, 4096 payload bytes,
/// checksum and end-of-exclusive.
pub const BULK_DUMP_SIZE: usize = 4104;
/// Packed voice data carried by a bulk dump.
pub const BULK_PAYLOAD_SIZE: usize = 4096;
/// Total size of a single-voice (edit buffer) dump: 6 header bytes, 155
/// payload bytes, checksum and end-of-exclusive.
pub const SINGLE_DUMP_SIZE: usize = 163;

/// Exclusive status byte.
pub const SYSEX_START: u8 = 0xf0;
/// End-of-exclusive byte.
pub const SYSEX_END: u8 = 0xf7;
/// Manufacturer id carried by both recognized dump shapes.
pub const MANUFACTURER_ID: u8 = 0x43;

/// Transcode an unpacked 155-byte voice parameter block into the canonical
/// packed record.
///
/// Each operator collapses from 21 parameters to 17 bytes: the EG curves
/// share byte 11, detune and rate scaling share byte 12, the velocity and
/// amplitude-modulation sensitivities share byte 13, and the oscillator mode
/// shares byte 15 with the coarse frequency.  Globals pack key sync with
/// feedback and the three LFO switches into single bytes the same way.
/// Source fields are masked to their legal widths first, so out-of-range
/// input cannot bleed into neighboring fields.
pub fn pack_patch(unpacked: &[u8; PATCH_SIZE_UNPACKED]) -> Patch {
    let u = unpacked;
    let mut p = [0u8; PATCH_SIZE_PACKED];
    for op in 0..6 {
        let s = op * 21;
        let d = op * 17;
        p[d..d + 11].copy_from_slice(&u[s..s + 11]);
        p[d + 11] = (u[s + 11] & 0x03) | ((u[s + 12] & 0x03) << 2);
        p[d + 12] = (u[s + 13] & 0x07) | ((u[s + 20] & 0x0f) << 3);
        p[d + 13] = (u[s + 14] & 0x03) | ((u[s + 15] & 0x07) << 2);
        p[d + 14] = u[s + 16];
        p[d + 15] = (u[s + 17] & 0x01) | ((u[s + 18] & 0x1f) << 1);
        p[d + 16] = u[s + 19];
    }
    p[102..110].copy_from_slice(&u[126..134]);
    p[110] = u[134] & 0x1f;
    p[111] = (u[135] & 0x07) | ((u[136] & 0x01) << 3);
    p[112..116].copy_from_slice(&u[137..141]);
    p[116] = (u[141] & 0x01) | ((u[142] & 0x07) << 1) | ((u[143] & 0x07) << 4);
    p[117] = u[144];
    p[118..128].copy_from_slice(&u[145..155]);
    Patch::from_packed(p)
}
