/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains data structures for the package2 firmware container and
    the signed boot configuration record.

--*/

#![cfg_attr(not(feature = "std"), no_std)]

use core::ops::Range;

use getset::{CopyGetters, Getters, MutGetters, Setters};
use memoffset::span_of;
use zerocopy::{AsBytes, FromBytes};

/// "PK21" little-endian.
pub const PACKAGE2_MAGIC: u32 = 0x31324B50;

/// Number of payload descriptors in the container.
pub const PACKAGE2_PAYLOAD_COUNT: usize = 3;

/// Minimum payload alignment in bytes.
pub const PACKAGE2_PAYLOAD_ALIGNMENT: u32 = 4;

/// Largest container the loader accepts.
pub const PACKAGE2_SIZE_MAX: u32 = 0x007F_C000;

pub const PACKAGE2_META_BYTE_SIZE: usize = core::mem::size_of::<Package2Meta>();
pub const PACKAGE2_HEADER_BYTE_SIZE: usize = core::mem::size_of::<Package2Header>();

pub const SHA_256_HASH_BYTE_SIZE: usize = 32;
pub const RSA_2048_SIGNATURE_BYTE_SIZE: usize = 256;
pub const AES_128_IV_BYTE_SIZE: usize = 16;

pub type PayloadHash = [u8; SHA_256_HASH_BYTE_SIZE];

/// Package2 metadata block.
///
/// The declared container size and the header version are stored XORed
/// into the IV words so that tampering with either breaks the CTR
/// decryption of the rest of the block.
#[repr(C)]
#[derive(AsBytes, FromBytes, Debug, Getters, Setters, MutGetters, CopyGetters, Clone, Copy, PartialEq)]
pub struct Package2Meta {
    /// CTR decryption IV; size and version ride in its words.
    #[getset(get = "pub", set = "pub")]
    iv: [u8; AES_128_IV_BYTE_SIZE],

    /// Per-payload CTR IVs.
    #[getset(get = "pub", set = "pub")]
    payload_ivs: [[u8; AES_128_IV_BYTE_SIZE]; PACKAGE2_PAYLOAD_COUNT],

    /// Magic ("PK21")
    #[getset(get_copy = "pub", set = "pub")]
    magic: u32,

    /// Entrypoint offset relative to the first payload's load base.
    #[getset(get_copy = "pub", set = "pub")]
    entrypoint: u32,

    _reserved0: [u8; 4],

    /// Package2 format version.
    #[getset(get_copy = "pub", set = "pub")]
    package2_version: u8,

    /// Minimum bootloader version this container requires.
    #[getset(get_copy = "pub", set = "pub")]
    bootloader_version: u8,

    _reserved1: [u8; 2],

    /// Payload sizes in bytes.
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    payload_sizes: [u32; PACKAGE2_PAYLOAD_COUNT],

    _reserved2: [u8; 4],

    /// Payload offsets relative to their load bases.
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    payload_offsets: [u32; PACKAGE2_PAYLOAD_COUNT],

    _reserved3: [u8; 4],

    /// SHA-256 per payload; all-zero means "skip verification".
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    payload_hashes: [PayloadHash; PACKAGE2_PAYLOAD_COUNT],

    _reserved4: [u8; 48],
}

impl Package2Meta {
    fn iv_word(&self, idx: usize) -> u32 {
        let base = idx * 4;
        u32::from_le_bytes([
            self.iv[base],
            self.iv[base + 1],
            self.iv[base + 2],
            self.iv[base + 3],
        ])
    }

    /// Declared total container size (header included), recovered from the
    /// IV words.
    pub fn size(&self) -> u32 {
        self.iv_word(0) ^ self.iv_word(2) ^ self.iv_word(3)
    }

    /// Key generation tag, recovered from the IV words.
    pub fn key_generation(&self) -> u8 {
        let w = self.iv_word(1);
        (w ^ (w >> 16) ^ (w >> 24)) as u8
    }

    /// Encode `size` and `key_generation` into the IV, preserving the
    /// nonce words the encoding does not constrain.
    pub fn encode_iv(&mut self, size: u32, key_generation: u8) {
        let w2 = self.iv_word(2);
        let w3 = self.iv_word(3);
        self.iv[0..4].copy_from_slice(&(size ^ w2 ^ w3).to_le_bytes());
        self.iv[4..8].copy_from_slice(&(key_generation as u32).to_le_bytes());
    }

    /// Byte range of payload `idx` within the container.
    pub fn payload_range(&self, idx: usize) -> Range<u32> {
        let mut start = PACKAGE2_HEADER_BYTE_SIZE as u32;
        for size in &self.payload_sizes[..idx] {
            start = start.wrapping_add(*size);
        }
        start..start.wrapping_add(self.payload_sizes[idx])
    }

    /// Returns the `Range<usize>` of the metadata that stays cleartext
    /// (the IV) versus the encrypted remainder.
    pub fn encrypted_range() -> Range<usize> {
        let span = span_of!(Package2Meta, payload_ivs..=_reserved4);
        span.start..span.end
    }
}

impl Default for Package2Meta {
    fn default() -> Self {
        Self {
            iv: [0; AES_128_IV_BYTE_SIZE],
            payload_ivs: [[0; AES_128_IV_BYTE_SIZE]; PACKAGE2_PAYLOAD_COUNT],
            magic: 0,
            entrypoint: 0,
            _reserved0: [0; 4],
            package2_version: 0,
            bootloader_version: 0,
            _reserved1: [0; 2],
            payload_sizes: [0; PACKAGE2_PAYLOAD_COUNT],
            _reserved2: [0; 4],
            payload_offsets: [0; PACKAGE2_PAYLOAD_COUNT],
            _reserved3: [0; 4],
            payload_hashes: [[0; SHA_256_HASH_BYTE_SIZE]; PACKAGE2_PAYLOAD_COUNT],
            _reserved4: [0; 48],
        }
    }
}

/// Package2 container header: signature over the metadata, then the
/// metadata itself. Payload bytes follow contiguously.
#[repr(C)]
#[derive(AsBytes, FromBytes, Debug, Getters, Setters, MutGetters, Clone, Copy)]
pub struct Package2Header {
    /// RSA-2048-PSS signature over `meta`.
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    signature: [u8; RSA_2048_SIGNATURE_BYTE_SIZE],

    /// Metadata block.
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    meta: Package2Meta,
}

impl Package2Header {
    /// True if the signature field is structurally all-zero. Combined with
    /// a plaintext magic this selects the development escape hatch.
    pub fn is_signature_zero(&self) -> bool {
        self.signature.iter().all(|&b| b == 0)
    }
}

impl Default for Package2Header {
    fn default() -> Self {
        Self {
            signature: [0; RSA_2048_SIGNATURE_BYTE_SIZE],
            meta: Package2Meta::default(),
        }
    }
}

/// Flag bits in `BootConfigSignedData::flags0`.
pub const BOOT_CONFIG_FLAG_PACKAGE2_SIGNATURE_DISABLED: u32 = 1 << 0;
pub const BOOT_CONFIG_FLAG_PACKAGE2_ENCRYPTION_DISABLED: u32 = 1 << 1;

/// The signed region of the boot configuration record.
#[repr(C)]
#[derive(AsBytes, FromBytes, Debug, Getters, Setters, CopyGetters, Clone, Copy)]
pub struct BootConfigSignedData {
    /// Record format version.
    #[getset(get_copy = "pub", set = "pub")]
    version: u32,

    _reserved0: [u8; 4],

    /// Feature-enable flags.
    #[getset(get_copy = "pub", set = "pub")]
    flags0: u32,

    /// Additional flags.
    #[getset(get_copy = "pub", set = "pub")]
    flags1: u32,

    /// Chip-unique id this record is bound to.
    #[getset(get = "pub", set = "pub")]
    ecid: [u8; 16],

    /// Initial system counter value; only the low 55 bits are honored.
    #[getset(get_copy = "pub", set = "pub")]
    initial_tsc_value: u64,

    /// Memory mode override.
    #[getset(get_copy = "pub", set = "pub")]
    memory_mode: u8,

    _reserved1: [u8; 215],
}

impl BootConfigSignedData {
    pub fn is_package2_signature_disabled(&self) -> bool {
        self.flags0 & BOOT_CONFIG_FLAG_PACKAGE2_SIGNATURE_DISABLED != 0
    }

    pub fn is_package2_encryption_disabled(&self) -> bool {
        self.flags0 & BOOT_CONFIG_FLAG_PACKAGE2_ENCRYPTION_DISABLED != 0
    }

    /// The honored portion of the initial counter value.
    pub fn initial_tsc(&self) -> u64 {
        self.initial_tsc_value & ((1u64 << 55) - 1)
    }
}

impl Default for BootConfigSignedData {
    fn default() -> Self {
        Self {
            version: 0,
            _reserved0: [0; 4],
            flags0: 0,
            flags1: 0,
            ecid: [0; 16],
            initial_tsc_value: 0,
            memory_mode: 0,
            _reserved1: [0; 215],
        }
    }
}

/// Boot configuration record: signed policy bits plus their signature.
#[repr(C)]
#[derive(AsBytes, FromBytes, Debug, Getters, Setters, MutGetters, Clone, Copy)]
pub struct BootConfig {
    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    signed_data: BootConfigSignedData,

    #[getset(get = "pub", get_mut = "pub", set = "pub")]
    signature: [u8; RSA_2048_SIGNATURE_BYTE_SIZE],
}

impl BootConfig {
    /// Degrade to defaults: zero the signed region, leave the signature.
    pub fn clear_signed_data(&mut self) {
        self.signed_data = BootConfigSignedData::default();
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            signed_data: BootConfigSignedData::default(),
            signature: [0; RSA_2048_SIGNATURE_BYTE_SIZE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(PACKAGE2_META_BYTE_SIZE, 0x100);
        assert_eq!(PACKAGE2_HEADER_BYTE_SIZE, 0x200);
        assert_eq!(core::mem::size_of::<BootConfigSignedData>(), 0x100);
        assert_eq!(core::mem::size_of::<BootConfig>(), 0x200);
    }

    #[test]
    fn test_iv_encoding_round_trip() {
        let mut meta = Package2Meta::default();
        let mut iv = [0u8; AES_128_IV_BYTE_SIZE];
        iv[8..].copy_from_slice(&[0xAA; 8]); // nonce words untouched
        meta.set_iv(iv);
        meta.encode_iv(0x0004_0200, 9);
        assert_eq!(meta.size(), 0x0004_0200);
        assert_eq!(meta.key_generation(), 9);
        assert_eq!(&meta.iv()[8..], &[0xAA; 8]);
    }

    #[test]
    fn test_payload_ranges_are_contiguous() {
        let mut meta = Package2Meta::default();
        meta.set_payload_sizes([0x100, 0x40, 0]);
        assert_eq!(meta.payload_range(0), 0x200..0x300);
        assert_eq!(meta.payload_range(1), 0x300..0x340);
        assert_eq!(meta.payload_range(2), 0x340..0x340);
    }

    #[test]
    fn test_encrypted_range_excludes_iv() {
        let range = Package2Meta::encrypted_range();
        assert_eq!(range.start, AES_128_IV_BYTE_SIZE);
        assert_eq!(range.end, PACKAGE2_META_BYTE_SIZE);
    }

    #[test]
    fn test_boot_config_flags_and_tsc() {
        let mut data = BootConfigSignedData::default();
        data.set_flags0(BOOT_CONFIG_FLAG_PACKAGE2_SIGNATURE_DISABLED);
        assert!(data.is_package2_signature_disabled());
        assert!(!data.is_package2_encryption_disabled());

        data.set_initial_tsc_value(u64::MAX);
        assert_eq!(data.initial_tsc(), (1u64 << 55) - 1);
    }
}
