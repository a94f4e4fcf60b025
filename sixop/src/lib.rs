//! Patch data model and bank decoder for a six-operator FM synthesizer.
//!
//! This crate is host-independent: it knows nothing about audio rendering,
//! voice allocation, or threading.  It defines the canonical 128-byte packed
//! patch record, the classic bulk/single-voice SysEx dump geometries, and a
//! format-sniffing decoder that normalizes a dozen mutually incompatible
//! legacy bank encodings into [`Patch`] records.
//!
//! The packed record layout is treated as opaque everywhere except in
//! [`sysex::pack_patch`] and the vendor transcoders in [`bank`] - the voice
//! renderer living on the other side of the engine boundary is the only
//! other code expected to understand the field layout.

/// Size in bytes of one canonical packed patch record.
pub const PATCH_SIZE_PACKED: usize = 128;
/// Size in bytes of one unpacked (edit-buffer) voice parameter block.
pub const PATCH_SIZE_UNPACKED: usize = 155;
/// Number of patch slots in a full bank.
pub const BANK_SIZE: usize = 128;

pub mod bank;
pub mod patch;
pub mod sysex;

pub use bank::{decode_bank, decode_bank_strict, BankError};
pub use patch::{Bank, Patch};
