/*++

Licensed under the Apache-2.0 license.

File Name:

    key_generation.rs

Abstract:

    File contains key generation constants and the AES keyslot assignment
    map.

--*/

use secmon_drivers::AES_KEY_SIZE;

/// A 128-bit AES key value.
pub type AesKey = [u8; AES_KEY_SIZE];

/// Number of known key generations.
pub const KEY_GENERATION_COUNT: usize = 16;

/// First generation that carries a device master key.
pub const DEVICE_MASTER_KEY_FIRST_GENERATION: usize = 3;

/// Keyslots selectable by SMC callers.
pub const USER_KEY_SLOT_FIRST: usize = 0;
pub const USER_KEY_SLOT_COUNT: usize = 6;

/// Scratch slot for derivation chains; contents are transient.
pub const KEY_SLOT_TEMPORARY: usize = 6;

/// Scratch slot for seal/unseal operations.
pub const KEY_SLOT_SEAL: usize = 7;

/// Per-boot random key sealing caller-visible access keys.
pub const KEY_SLOT_RANDOM_FOR_USER_WRAP: usize = 8;

/// Per-boot random key wrapping stored key material at rest.
pub const KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP: usize = 9;

/// Current-generation device master key.
pub const KEY_SLOT_DEVICE_MASTER: usize = 10;

/// Fused device key (set up by the boot stub).
pub const KEY_SLOT_DEVICE: usize = 11;

/// Current-generation master key.
pub const KEY_SLOT_MASTER: usize = 12;

/// Fused secure boot key (set up by the boot stub).
pub const KEY_SLOT_SECURE_BOOT: usize = 14;

/// Slots with no assignment; fully locked during the boot sweep.
pub const UNUSED_KEY_SLOTS: [usize; 2] = [13, 15];

/// RSA slot used for boot-time signature verification; locked once the
/// package2 and boot config checks are done.
pub const RSA_KEY_SLOT_BOOT: usize = 0;

/// RSA slot serving the SMC modular-exponentiation surface; reloaded per
/// operation and never locked.
pub const RSA_KEY_SLOT_RUNTIME: usize = 1;

/// True if `slot` belongs to the range SMC callers may name directly.
pub fn is_user_key_slot(slot: usize) -> bool {
    (USER_KEY_SLOT_FIRST..USER_KEY_SLOT_FIRST + USER_KEY_SLOT_COUNT).contains(&slot)
}
