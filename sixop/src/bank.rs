//! The patch-bank decoder.
//!
//! Accepts the raw contents of a bank file in any of the recognized legacy
//! encodings and normalizes them into canonical [`Patch`] records:
//!
//! - raw concatenated 128-byte packed records,
//! - 32-voice bulk SysEx dumps, optionally wrapped in a standard MIDI file,
//! - single-voice (edit buffer) SysEx dumps,
//! - a handful of vendor editor/sequencer bank layouts identified by file
//!   extension, exact length and/or magic bytes.
//!
//! Vendor formats are evaluated as an ordered list of (predicate,
//! transcoder) pairs; the first match wins and fully overrides the generic
//! scan's result.  When nothing matches at all, the permissive default is to
//! treat the buffer as raw packed records - the historical behavior of the
//! original hardware tooling.  [`decode_bank_strict`] rejects such input
//! instead.

use arrayvec::ArrayVec;
use thiserror::Error;

use crate::sysex::{
    self, BULK_DUMP_SIZE, BULK_PAYLOAD_SIZE, MANUFACTURER_ID, SINGLE_DUMP_SIZE, SYSEX_END,
    SYSEX_START,
};
use crate::{Patch, BANK_SIZE, PATCH_SIZE_PACKED, PATCH_SIZE_UNPACKED};

/// Largest bank file the decoder will look at.
pub const MAX_BANK_FILE_SIZE: usize = 2 * 1024 * 1024;

/// Errors produced while loading or decoding a patch bank.
#[derive(Debug, Error)]
pub enum BankError {
    /// The file could not be read at all.
    #[error("could not read patch bank file: {0}")]
    Io(#[from] std::io::Error),
    /// The file has zero length.
    #[error("patch bank file has zero length")]
    Empty,
    /// The file is smaller than a single packed patch record.
    #[error("patch bank file is too small ({0} bytes, minimum is {PATCH_SIZE_PACKED})")]
    TooSmall(usize),
    /// The file exceeds [`MAX_BANK_FILE_SIZE`].
    #[error("patch bank file is too large ({0} bytes, limit is {MAX_BANK_FILE_SIZE})")]
    TooLarge(usize),
    /// Strict mode only: no dump or vendor layout was recognized.
    #[error("no recognizable patch data found in bank file")]
    NoSysexData,
}

/// Decode `data` into at most `maxpatches` canonical patch records.
///
/// `filename` participates in vendor format detection (several legacy
/// formats are keyed on the file extension); pass `None` when the data did
/// not come from a file.  Excess decoded patches beyond `maxpatches` are
/// silently discarded.
///
/// Unrecognized input is assumed to be raw concatenated packed records; use
/// [`decode_bank_strict`] to reject it instead.
pub fn decode_bank(
    data: &[u8],
    filename: Option<&str>,
    maxpatches: usize,
) -> Result<ArrayVec<Patch, BANK_SIZE>, BankError> {
    decode(data, filename, maxpatches, false)
}

/// Like [`decode_bank`], but returns [`BankError::NoSysexData`] instead of
/// falling back to raw-mode decoding when no dump and no vendor layout was
/// recognized.
pub fn decode_bank_strict(
    data: &[u8],
    filename: Option<&str>,
    maxpatches: usize,
) -> Result<ArrayVec<Patch, BANK_SIZE>, BankError> {
    decode(data, filename, maxpatches, true)
}

fn decode(
    data: &[u8],
    filename: Option<&str>,
    maxpatches: usize,
    strict: bool,
) -> Result<ArrayVec<Patch, BANK_SIZE>, BankError> {
    match data.len() {
        0 => return Err(BankError::Empty),
        n if n > MAX_BANK_FILE_SIZE => return Err(BankError::TooLarge(n)),
        n if n < PATCH_SIZE_PACKED => return Err(BankError::TooSmall(n)),
        _ => {}
    }

    // The scan and the vendor transcoders compact patch data toward the
    // front of a scratch copy, exactly like the historical in-place loaders.
    let mut buf = data.to_vec();
    let mut count = scan_sysex(&mut buf);
    let mut datastart = 0usize;
    let mut recognized = count > 0;

    for format in VENDOR_FORMATS {
        if (format.detect)(filename, data) {
            let d = (format.transcode)(&mut buf);
            log::debug!("bank file matched {} layout ({} patches)", format.name, d.count);
            count = d.count;
            datastart = d.datastart;
            recognized = true;
            break;
        }
    }

    if count == 0 {
        if strict {
            debug_assert!(!recognized);
            return Err(BankError::NoSysexData);
        }
        // Permissive fallback: assume raw packed records and trust the user.
        count = data.len() / PATCH_SIZE_PACKED;
    }

    count = count.min(maxpatches).min(BANK_SIZE);
    let mut patches = ArrayVec::new();
    for chunk in buf[datastart..].chunks_exact(PATCH_SIZE_PACKED).take(count) {
        if let Some(patch) = Patch::from_packed_slice(chunk) {
            patches.push(patch);
        }
    }
    Ok(patches)
}

/// Scan for bulk and single-voice dumps, compacting their payloads (packed
/// on the fly where necessary) to the front of `buf`.  Returns the number of
/// patches recovered.
fn scan_sysex(buf: &mut [u8]) -> usize {
    let len = buf.len();
    // A standard-MIDI-file wrapper inserts two event-length bytes between
    // the exclusive status byte and the manufacturer id.
    let m = if buf.starts_with(b"MThd") { 2 } else { 0 };
    let mut count = 0usize;
    let mut p = 0usize;
    while p + m + 5 < len {
        if buf[p] == SYSEX_START
            && buf[p + 1 + m] == MANUFACTURER_ID
            && buf[p + 2 + m] <= 0x0f
            && buf[p + 3 + m] == 0x09
            && buf[p + 5 + m] == 0x00
            && p + BULK_DUMP_SIZE - 1 + m < len
            && buf[p + BULK_DUMP_SIZE - 1 + m] == SYSEX_END
        {
            // 32-voice bulk dump: the payload is already packed.
            buf.copy_within(
                p + 6 + m..p + 6 + m + BULK_PAYLOAD_SIZE,
                count * PATCH_SIZE_PACKED,
            );
            count += 32;
            p += BULK_DUMP_SIZE;
            continue;
        }
        if buf[p] == SYSEX_START
            && buf[p + 1 + m] == MANUFACTURER_ID
            && buf[p + 2 + m] <= 0x0f
            && buf[p + 4 + m] == 0x01
            && buf[p + 5 + m] == 0x1b
            && p + SINGLE_DUMP_SIZE - 1 + m < len
            && buf[p + SINGLE_DUMP_SIZE - 1 + m] == SYSEX_END
        {
            // Single-voice dump: the payload is unpacked and must be
            // transcoded through a scratch record first.
            let mut unpacked = [0u8; PATCH_SIZE_UNPACKED];
            unpacked.copy_from_slice(&buf[p + 6 + m..p + 6 + m + PATCH_SIZE_UNPACKED]);
            let packed = sysex::pack_patch(&unpacked);
            buf[count * PATCH_SIZE_PACKED..][..PATCH_SIZE_PACKED]
                .copy_from_slice(packed.as_bytes());
            count += 1;
            p += SINGLE_DUMP_SIZE;
            continue;
        }
        p += 1;
    }
    count
}

struct Detection {
    count: usize,
    datastart: usize,
}

struct VendorFormat {
    name: &'static str,
    detect: fn(Option<&str>, &[u8]) -> bool,
    transcode: fn(&mut [u8]) -> Detection,
}

/// Vendor bank layouts in fixed priority order; the first matching predicate
/// wins.
const VENDOR_FORMATS: &[VendorFormat] = &[
    VendorFormat {
        name: "Dr.T / Steinberg TX7",
        detect: |name, data| {
            (has_ext(name, ".tx7") || has_ext(name, ".snd")) && data.len() == 8192
        },
        transcode: |_| Detection { count: 32, datastart: 0 },
    },
    VendorFormat {
        name: "Transform XSyn BNK",
        detect: |name, data| has_ext(name, ".bnk") && data.len() == 8192,
        transcode: deinterleave_bnk,
    },
    VendorFormat {
        name: "Steinberg Synthworks SND",
        detect: |name, data| has_ext(name, ".snd") && data.len() == 5216,
        transcode: |_| Detection { count: 32, datastart: 0 },
    },
    VendorFormat {
        name: "Voyetra SIDEMAN/Patchmaster",
        detect: |_, data| {
            (data.len() == 9816 || data.len() == 5663) && data.starts_with(&[0xdf, 0x05, 0x01, 0x00])
        },
        transcode: |_| Detection { count: 32, datastart: 0x60f },
    },
    VendorFormat {
        name: "DX200 editor DX2",
        detect: |name, data| has_ext(name, ".dx2") && data.len() == 326454,
        transcode: transcode_dx200,
    },
];

fn has_ext(name: Option<&str>, ext: &str) -> bool {
    let Some(name) = name else { return false };
    let (n, e) = (name.as_bytes(), ext.as_bytes());
    n.len() >= e.len() && n[n.len() - e.len()..].eq_ignore_ascii_case(e)
}

/// XSyn banks store each 128-byte record on a 256-byte stride.
fn deinterleave_bnk(buf: &mut [u8]) -> Detection {
    for i in 0..32 {
        buf.copy_within(256 * i..256 * i + PATCH_SIZE_PACKED, PATCH_SIZE_PACKED * i);
    }
    Detection { count: 32, datastart: 0 }
}

/// DX200 editor banks carry 128 voices in a 381-byte-per-voice unpacked
/// layout starting at file offset 34.  This remaps every voice into the
/// packed record, including the multi-field byte packing, the break-point
/// offset correction (-21) and the transpose correction (-36).  Byte
/// arithmetic wraps, matching the unsigned-char math of the original
/// transcoders.
fn transcode_dx200(buf: &mut [u8]) -> Detection {
    const VOICE_STRIDE: usize = 381;
    const OP_STRIDE: usize = 35;
    const SRC_START: usize = 34;
    let src = buf[SRC_START..SRC_START + 128 * VOICE_STRIDE].to_vec();
    for voice in 0..128 {
        let v = &src[voice * VOICE_STRIDE..][..VOICE_STRIDE];
        let out = voice * PATCH_SIZE_PACKED;
        for op in 0..6 {
            let s = OP_STRIDE * op;
            // Source operators are numbered opposite to the packed layout.
            let d = out + 17 * (5 - op);
            for i in 0..8 {
                buf[d + i] = v[s + 76 + i];
            }
            buf[d + 8] = v[s + 84].wrapping_sub(21);
            buf[d + 9] = v[s + 87];
            buf[d + 10] = v[s + 88];
            buf[d + 11] = v[s + 85].wrapping_add(v[s + 86].wrapping_mul(4));
            buf[d + 12] = v[s + 89].wrapping_add(v[s + 75].wrapping_mul(8));
            let ams = v[s + 71].min(3);
            buf[d + 13] = (ams / 2).wrapping_add(v[s + 91].wrapping_mul(4));
            buf[d + 14] = v[s + 90];
            buf[d + 15] = v[s + 72].wrapping_add(v[s + 73].wrapping_mul(2));
            buf[d + 16] = v[s + 74];
        }
        for i in 0..4 {
            buf[out + 102 + i] = v[26 + i];
            buf[out + 106 + i] = v[32 + i];
            buf[out + 112 + i] = v[20 + i];
        }
        buf[out + 110] = v[17];
        buf[out + 111] = v[18].wrapping_add(v[38].wrapping_mul(8));
        buf[out + 116] = v[24]
            .wrapping_add(v[19].wrapping_mul(2))
            .wrapping_add(v[25].wrapping_mul(16));
        buf[out + 117] = v[37].wrapping_sub(36);
        for i in 0..10 {
            buf[out + 118 + i] = v[i];
        }
    }
    Detection { count: 128, datastart: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysex::tests::golden_voice;

    fn raw_patch(tag: u8) -> [u8; PATCH_SIZE_PACKED] {
        let mut b = [tag; PATCH_SIZE_PACKED];
        b[118..128].copy_from_slice(b"RAW PATCH ");
        b
    }

    fn bulk_dump(payload: &[u8; BULK_PAYLOAD_SIZE]) -> Vec<u8> {
        let mut file = vec![0xf0, 0x43, 0x00, 0x09, 0x20, 0x00];
        file.extend_from_slice(payload);
        file.push(0x00); // checksum, not validated
        file.push(0xf7);
        assert_eq!(file.len(), BULK_DUMP_SIZE);
        file
    }

    fn bulk_payload() -> [u8; BULK_PAYLOAD_SIZE] {
        let mut payload = [0u8; BULK_PAYLOAD_SIZE];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i % 113) as u8;
        }
        payload
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(decode_bank(&[], None, 128), Err(BankError::Empty)));
    }

    #[test]
    fn rejects_undersized_input() {
        assert!(matches!(
            decode_bank(&[0u8; 50], None, 128),
            Err(BankError::TooSmall(50))
        ));
    }

    #[test]
    fn rejects_oversized_input() {
        assert!(matches!(
            decode_bank(&vec![0u8; 3_000_000], None, 128),
            Err(BankError::TooLarge(3_000_000))
        ));
    }

    #[test]
    fn raw_decode_is_idempotent() {
        let mut data = Vec::new();
        for tag in [1u8, 2, 3] {
            data.extend_from_slice(&raw_patch(tag));
        }
        let patches = decode_bank(&data, None, 128).unwrap();
        assert_eq!(patches.len(), 3);
        for (i, tag) in [1u8, 2, 3].iter().enumerate() {
            assert_eq!(patches[i].as_bytes(), &raw_patch(*tag));
        }
    }

    #[test]
    fn raw_decode_truncates_to_maxpatches() {
        let data = [raw_patch(1), raw_patch(2), raw_patch(3), raw_patch(4)].concat();
        let patches = decode_bank(&data, None, 2).unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[1].as_bytes(), &raw_patch(2));
    }

    #[test]
    fn bulk_dump_yields_32_patches() {
        let payload = bulk_payload();
        let file = bulk_dump(&payload);
        let patches = decode_bank(&file, None, 128).unwrap();
        assert_eq!(patches.len(), 32);
        for (i, patch) in patches.iter().enumerate() {
            assert_eq!(
                patch.as_bytes().as_slice(),
                &payload[i * PATCH_SIZE_PACKED..(i + 1) * PATCH_SIZE_PACKED]
            );
        }
    }

    #[test]
    fn truncated_bulk_dump_falls_back_to_raw() {
        let mut file = bulk_dump(&bulk_payload());
        file.pop(); // drop the end-of-exclusive byte
        let patches = decode_bank(&file, None, 128).unwrap();
        // 4103 / 128, with the header bytes landing inside the records.
        assert_eq!(patches.len(), 32);
        assert_eq!(patches[0].as_bytes().as_slice(), &file[..PATCH_SIZE_PACKED]);
    }

    #[test]
    fn single_voice_dump_is_packed() {
        let (unpacked, packed) = golden_voice();
        let mut file = vec![0xf0, 0x43, 0x00, 0x00, 0x01, 0x1b];
        file.extend_from_slice(&unpacked);
        file.push(0x00); // checksum
        file.push(0xf7);
        assert_eq!(file.len(), SINGLE_DUMP_SIZE);
        let patches = decode_bank(&file, None, 128).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].as_bytes(), &packed);
    }

    #[test]
    fn edit_buffer_dump_matches_raw_form() {
        // Round-trip property: decoding the single-voice dump and decoding
        // the voice's raw packed form must agree byte for byte.
        let (unpacked, packed) = golden_voice();
        let mut dump = vec![0xf0, 0x43, 0x00, 0x00, 0x01, 0x1b];
        dump.extend_from_slice(&unpacked);
        dump.extend_from_slice(&[0x00, 0xf7]);
        let from_dump = decode_bank(&dump, None, 128).unwrap();
        let from_raw = decode_bank(&packed, None, 128).unwrap();
        assert_eq!(from_dump[0], from_raw[0]);
    }

    #[test]
    fn midi_file_container_shifts_scan_offsets() {
        let payload = bulk_payload();
        let mut file = b"MThd".to_vec();
        file.extend_from_slice(&[0u8; 16]); // rest of the chunk header, ignored
        file.push(0xf0);
        file.extend_from_slice(&[0x88, 0x08]); // SMF event length bytes
        file.extend_from_slice(&[0x43, 0x00, 0x09, 0x20, 0x00]);
        file.extend_from_slice(&payload);
        file.extend_from_slice(&[0x00, 0xf7]);
        let patches = decode_bank(&file, None, 128).unwrap();
        assert_eq!(patches.len(), 32);
        assert_eq!(patches[0].as_bytes().as_slice(), &payload[..PATCH_SIZE_PACKED]);
    }

    #[test]
    fn consecutive_dumps_accumulate() {
        let payload = bulk_payload();
        let mut file = bulk_dump(&payload);
        file.extend_from_slice(&bulk_dump(&payload));
        let patches = decode_bank(&file, None, 128).unwrap();
        assert_eq!(patches.len(), 64);
        assert_eq!(patches[32].as_bytes().as_slice(), &payload[..PATCH_SIZE_PACKED]);
    }

    #[test]
    fn tx7_bank_takes_first_half() {
        let mut data = vec![0u8; 8192];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 101) as u8;
        }
        for name in ["voices.TX7", "voices.tx7", "voices.snd"] {
            let patches = decode_bank(&data, Some(name), 128).unwrap();
            assert_eq!(patches.len(), 32);
            assert_eq!(patches[0].as_bytes().as_slice(), &data[..PATCH_SIZE_PACKED]);
            assert_eq!(
                patches[31].as_bytes().as_slice(),
                &data[31 * PATCH_SIZE_PACKED..32 * PATCH_SIZE_PACKED]
            );
        }
    }

    #[test]
    fn xsyn_bank_is_deinterleaved() {
        let mut data = vec![0u8; 8192];
        for i in 0..32 {
            data[256 * i..256 * i + PATCH_SIZE_PACKED].fill(i as u8 + 1);
        }
        let patches = decode_bank(&data, Some("bank.BNK"), 128).unwrap();
        assert_eq!(patches.len(), 32);
        for (i, patch) in patches.iter().enumerate() {
            assert_eq!(patch.as_bytes(), &[i as u8 + 1; PATCH_SIZE_PACKED]);
        }
    }

    #[test]
    fn synthworks_bank_takes_first_half() {
        let mut data = vec![0u8; 5216];
        data[..PATCH_SIZE_PACKED].fill(9);
        let patches = decode_bank(&data, Some("lib.snd"), 128).unwrap();
        assert_eq!(patches.len(), 32);
        assert_eq!(patches[0].as_bytes(), &[9u8; PATCH_SIZE_PACKED]);
    }

    #[test]
    fn voyetra_bank_starts_at_fixed_offset() {
        for len in [5663usize, 9816] {
            let mut data = vec![0u8; len];
            data[..4].copy_from_slice(&[0xdf, 0x05, 0x01, 0x00]);
            data[0x60f..0x60f + PATCH_SIZE_PACKED].fill(7);
            let patches = decode_bank(&data, Some("sideman"), 128).unwrap();
            assert_eq!(patches.len(), 32);
            assert_eq!(patches[0].as_bytes(), &[7u8; PATCH_SIZE_PACKED]);
        }
    }

    #[test]
    fn voyetra_requires_magic() {
        let data = vec![0u8; 5663];
        let patches = decode_bank(&data, None, 128).unwrap();
        // No magic: falls back to raw decoding.
        assert_eq!(patches.len(), 5663 / PATCH_SIZE_PACKED);
    }

    #[test]
    fn dx200_bank_is_transcoded() {
        let mut data = vec![0u8; 326454];
        let v = 34; // first voice record
        // Operator block 0 maps to the last packed operator slot (offset 85).
        for i in 0..8 {
            data[v + 76 + i] = 60 + i as u8;
        }
        data[v + 84] = 60; // break point, stored with +21 bias
        data[v + 85] = 1; // left curve
        data[v + 86] = 2; // right curve
        data[v + 89] = 3; // rate scale
        data[v + 75] = 10; // detune
        data[v + 71] = 9; // amp mod sens, clamped to 3
        data[v + 91] = 5; // key vel sens
        data[v + 90] = 99; // output level
        data[v + 72] = 1; // osc mode
        data[v + 73] = 4; // freq coarse
        data[v + 74] = 33; // freq fine
        data[v + 17] = 13; // algorithm
        data[v + 18] = 5; // feedback
        data[v + 38] = 1; // osc key sync
        data[v + 37] = 60; // transpose, stored with +36 bias
        data[v..v + 10].copy_from_slice(b"DX200 BANK");
        let patches = decode_bank(&data, Some("export.dx2"), 128).unwrap();
        assert_eq!(patches.len(), 128);
        let p = patches[0].as_bytes();
        assert_eq!(&p[85..93], &[60, 61, 62, 63, 64, 65, 66, 67]);
        assert_eq!(p[85 + 8], 39); // 60 - 21
        assert_eq!(p[85 + 11], 1 + 2 * 4);
        assert_eq!(p[85 + 12], 3 + 10 * 8);
        assert_eq!(p[85 + 13], 3 / 2 + 5 * 4);
        assert_eq!(p[85 + 14], 99);
        assert_eq!(p[85 + 15], 1 + 4 * 2);
        assert_eq!(p[85 + 16], 33);
        assert_eq!(p[110], 13);
        assert_eq!(p[111], 5 + 8);
        assert_eq!(p[117], 24); // 60 - 36
        assert_eq!(&p[118..128], b"DX200 BANK");
    }

    #[test]
    fn strict_mode_rejects_unrecognized_data() {
        let data = [raw_patch(1), raw_patch(2)].concat();
        assert!(matches!(
            decode_bank_strict(&data, None, 128),
            Err(BankError::NoSysexData)
        ));
        let file = bulk_dump(&bulk_payload());
        assert_eq!(decode_bank_strict(&file, None, 128).unwrap().len(), 32);
    }
}
