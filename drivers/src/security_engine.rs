/*++

Licensed under the Apache-2.0 license.

File Name:

    security_engine.rs

Abstract:

    File contains the software model of the hardware security engine: AES
    keyslots with monotonic lock flags, RSA keyslots with raw modular
    exponentiation, SHA-256, and the engine RNG.

--*/

use aes::cipher::{
    block_padding::NoPadding, generic_array::GenericArray, BlockDecrypt, BlockDecryptMut,
    BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes::Aes128;
use bitflags::bitflags;
use ctr::cipher::StreamCipher;
use ghash::{
    universal_hash::{KeyInit as GhashKeyInit, UniversalHash},
    GHash,
};
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use rsa::BigUint;
use secmon_error::{MonitorError, MonitorResult};
use sha2::{Digest, Sha256};

/// Number of AES keyslots in the engine.
pub const AES_KEY_SLOT_COUNT: usize = 16;

/// Number of RSA keyslots in the engine.
pub const RSA_KEY_SLOT_COUNT: usize = 2;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// AES-128 key size in bytes.
pub const AES_KEY_SIZE: usize = 16;

/// RSA-2048 modulus/signature size in bytes.
pub const RSA_2048_BYTE_SIZE: usize = 256;

/// SHA-256 hash size in bytes.
pub const SHA_256_HASH_SIZE: usize = 32;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

bitflags! {
    /// Keyslot lock flags. Locks only tighten; nothing short of a hard
    /// reset clears them.
    #[derive(Default)]
    pub struct KeySlotLock: u32 {
        /// Key value can no longer be read back out of the slot.
        const READ = 1 << 0;

        /// Key value can no longer be replaced.
        const WRITE = 1 << 1;

        /// Slot can no longer encrypt/decrypt caller data.
        const USE = 1 << 2;

        /// Slot can no longer wrap or derive other keys.
        const KEK = 1 << 3;

        /// Slot is reserved to the secure world.
        const PER_KEY = 1 << 4;
    }
}

impl KeySlotLock {
    /// Every lock an unused slot receives during the final sweep.
    pub const ALL: KeySlotLock = KeySlotLock::all();
}

#[derive(Clone, Copy, Default)]
struct AesKeySlot {
    key: [u8; AES_KEY_SIZE],
    locks: KeySlotLock,
}

#[derive(Clone)]
struct RsaKeySlot {
    modulus: [u8; RSA_2048_BYTE_SIZE],
    exponent: [u8; RSA_2048_BYTE_SIZE],
    exponent_len: usize,
    locked: bool,
}

impl Default for RsaKeySlot {
    fn default() -> Self {
        Self {
            modulus: [0; RSA_2048_BYTE_SIZE],
            exponent: [0; RSA_2048_BYTE_SIZE],
            exponent_len: 0,
            locked: false,
        }
    }
}

/// Software model of the hardware security engine.
///
/// Operations complete before returning; the `operation_done` flag models
/// the hardware completion status the asynchronous callers poll.
pub struct SecurityEngine {
    aes_slots: [AesKeySlot; AES_KEY_SLOT_COUNT],
    rsa_slots: [RsaKeySlot; RSA_KEY_SLOT_COUNT],
    rng: ChaCha20Rng,
    operation_done: bool,
    sticky_bits_valid: bool,
}

impl SecurityEngine {
    /// Create an engine seeded with entropy gathered by the boot stub.
    pub fn new(entropy: [u8; 32]) -> Self {
        Self {
            aes_slots: [AesKeySlot::default(); AES_KEY_SLOT_COUNT],
            rsa_slots: Default::default(),
            rng: ChaCha20Rng::from_seed(entropy),
            operation_done: true,
            sticky_bits_valid: true,
        }
    }

    fn aes_slot(&self, slot: usize) -> MonitorResult<&AesKeySlot> {
        self.aes_slots
            .get(slot)
            .ok_or(MonitorError::DRIVER_ENGINE_KEY_SLOT_OUT_OF_BOUNDS)
    }

    fn aes_slot_mut(&mut self, slot: usize) -> MonitorResult<&mut AesKeySlot> {
        self.aes_slots
            .get_mut(slot)
            .ok_or(MonitorError::DRIVER_ENGINE_KEY_SLOT_OUT_OF_BOUNDS)
    }

    /// Load a key value into an AES keyslot.
    pub fn set_aes_key(&mut self, slot: usize, key: &[u8; AES_KEY_SIZE]) -> MonitorResult<()> {
        let entry = self.aes_slot_mut(slot)?;
        if entry.locks.contains(KeySlotLock::WRITE) {
            return Err(MonitorError::DRIVER_ENGINE_KEY_SLOT_LOCKED);
        }
        entry.key = *key;
        Ok(())
    }

    /// Unwrap `wrapped` under the kek in `kek_slot` and load the result
    /// into `dst_slot`. The cleartext never leaves the engine.
    pub fn set_encrypted_aes_key(
        &mut self,
        dst_slot: usize,
        kek_slot: usize,
        wrapped: &[u8; AES_KEY_SIZE],
    ) -> MonitorResult<()> {
        let kek = self.aes_slot(kek_slot)?;
        if kek.locks.contains(KeySlotLock::KEK) {
            return Err(MonitorError::DRIVER_ENGINE_KEY_SLOT_LOCKED);
        }
        let cipher = Aes128::new(GenericArray::from_slice(&kek.key));
        let mut block = GenericArray::clone_from_slice(wrapped);
        cipher.decrypt_block(&mut block);

        let key: [u8; AES_KEY_SIZE] = block.into();
        self.set_aes_key(dst_slot, &key)
    }

    /// Clear a keyslot back to all-zero.
    pub fn clear_aes_key(&mut self, slot: usize) -> MonitorResult<()> {
        self.set_aes_key(slot, &[0; AES_KEY_SIZE])
    }

    /// Tighten a keyslot's locks. Locks accumulate; there is no unlock.
    pub fn lock_aes_key_slot(&mut self, slot: usize, locks: KeySlotLock) -> MonitorResult<()> {
        self.aes_slot_mut(slot)?.locks |= locks;
        Ok(())
    }

    /// Current lock flags for a keyslot.
    pub fn aes_key_slot_locks(&self, slot: usize) -> MonitorResult<KeySlotLock> {
        Ok(self.aes_slot(slot)?.locks)
    }

    /// Read a key value back out of a slot. Fails once the slot is
    /// read-locked; the lock sweep read-locks every slot before the
    /// non-secure world runs.
    pub fn read_aes_key(&self, slot: usize) -> MonitorResult<[u8; AES_KEY_SIZE]> {
        let entry = self.aes_slot(slot)?;
        if entry.locks.contains(KeySlotLock::READ) {
            return Err(MonitorError::DRIVER_ENGINE_KEY_SLOT_LOCKED);
        }
        Ok(entry.key)
    }

    fn usable_aes_key(&self, slot: usize) -> MonitorResult<[u8; AES_KEY_SIZE]> {
        let entry = self.aes_slot(slot)?;
        if entry.locks.contains(KeySlotLock::USE) {
            return Err(MonitorError::DRIVER_ENGINE_KEY_SLOT_LOCKED);
        }
        Ok(entry.key)
    }

    /// ECB-encrypt a single block under a keyslot.
    pub fn encrypt_block(
        &mut self,
        slot: usize,
        block: &[u8; AES_BLOCK_SIZE],
    ) -> MonitorResult<[u8; AES_BLOCK_SIZE]> {
        let key = self.usable_aes_key(slot)?;
        let cipher = Aes128::new(GenericArray::from_slice(&key));
        let mut out = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut out);
        self.operation_done = true;
        Ok(out.into())
    }

    /// ECB-decrypt a single block under a keyslot.
    pub fn decrypt_block(
        &mut self,
        slot: usize,
        block: &[u8; AES_BLOCK_SIZE],
    ) -> MonitorResult<[u8; AES_BLOCK_SIZE]> {
        let key = self.usable_aes_key(slot)?;
        let cipher = Aes128::new(GenericArray::from_slice(&key));
        let mut out = GenericArray::clone_from_slice(block);
        cipher.decrypt_block(&mut out);
        self.operation_done = true;
        Ok(out.into())
    }

    /// AES-128-CTR transform `src` into `dst`. Encrypt and decrypt are the
    /// same operation.
    pub fn crypt_ctr(
        &mut self,
        slot: usize,
        iv: &[u8; AES_BLOCK_SIZE],
        src: &[u8],
        dst: &mut [u8],
    ) -> MonitorResult<()> {
        if src.len() != dst.len() {
            return Err(MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE);
        }
        let key = self.usable_aes_key(slot)?;
        let mut cipher = Aes128Ctr::new((&key).into(), iv.into());
        dst.copy_from_slice(src);
        cipher.apply_keystream(dst);
        self.operation_done = true;
        Ok(())
    }

    /// AES-128-CBC encrypt. Buffer lengths must match and be a multiple of
    /// the block size.
    pub fn encrypt_cbc(
        &mut self,
        slot: usize,
        iv: &[u8; AES_BLOCK_SIZE],
        src: &[u8],
        dst: &mut [u8],
    ) -> MonitorResult<()> {
        if src.len() != dst.len() || src.len() % AES_BLOCK_SIZE != 0 {
            return Err(MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE);
        }
        let key = self.usable_aes_key(slot)?;
        let cipher = Aes128CbcEnc::new((&key).into(), iv.into());
        dst.copy_from_slice(src);
        cipher
            .encrypt_padded_mut::<NoPadding>(dst, src.len())
            .map_err(|_| MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE)?;
        self.operation_done = true;
        Ok(())
    }

    /// AES-128-CBC decrypt. Buffer lengths must match and be a multiple of
    /// the block size.
    pub fn decrypt_cbc(
        &mut self,
        slot: usize,
        iv: &[u8; AES_BLOCK_SIZE],
        src: &[u8],
        dst: &mut [u8],
    ) -> MonitorResult<()> {
        if src.len() != dst.len() || src.len() % AES_BLOCK_SIZE != 0 {
            return Err(MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE);
        }
        let key = self.usable_aes_key(slot)?;
        let cipher = Aes128CbcDec::new((&key).into(), iv.into());
        dst.copy_from_slice(src);
        cipher
            .decrypt_padded_mut::<NoPadding>(dst)
            .map_err(|_| MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE)?;
        self.operation_done = true;
        Ok(())
    }

    /// AES-128-CMAC over `data` under a keyslot.
    pub fn compute_cmac(&mut self, slot: usize, data: &[u8]) -> MonitorResult<[u8; AES_BLOCK_SIZE]> {
        let key = self.usable_aes_key(slot)?;
        let cipher = Aes128::new(GenericArray::from_slice(&key));

        let encrypt = |block: &[u8; AES_BLOCK_SIZE]| -> [u8; AES_BLOCK_SIZE] {
            let mut out = GenericArray::clone_from_slice(block);
            cipher.encrypt_block(&mut out);
            out.into()
        };

        let k1 = cmac_double(&encrypt(&[0; AES_BLOCK_SIZE]));
        let k2 = cmac_double(&k1);

        let mut mac = [0u8; AES_BLOCK_SIZE];
        let full_blocks = if !data.is_empty() && data.len() % AES_BLOCK_SIZE == 0 {
            data.len() / AES_BLOCK_SIZE - 1
        } else {
            data.len() / AES_BLOCK_SIZE
        };

        for block in data[..full_blocks * AES_BLOCK_SIZE].chunks_exact(AES_BLOCK_SIZE) {
            for (m, b) in mac.iter_mut().zip(block) {
                *m ^= b;
            }
            mac = encrypt(&mac);
        }

        let tail = &data[full_blocks * AES_BLOCK_SIZE..];
        let mut last = [0u8; AES_BLOCK_SIZE];
        let subkey = if tail.len() == AES_BLOCK_SIZE {
            last.copy_from_slice(tail);
            k1
        } else {
            last[..tail.len()].copy_from_slice(tail);
            last[tail.len()] = 0x80;
            k2
        };
        for i in 0..AES_BLOCK_SIZE {
            mac[i] ^= last[i] ^ subkey[i];
        }
        mac = encrypt(&mac);

        self.operation_done = true;
        Ok(mac)
    }

    /// AES-128-GMAC over `data` under a keyslot with a 96-bit IV.
    pub fn compute_gmac(
        &mut self,
        slot: usize,
        iv: &[u8; 12],
        data: &[u8],
    ) -> MonitorResult<[u8; AES_BLOCK_SIZE]> {
        let hash_key = self.encrypt_block(slot, &[0; AES_BLOCK_SIZE])?;

        let mut ghash = GHash::new(GenericArray::from_slice(&hash_key));
        ghash.update_padded(data);

        let mut len_block = [0u8; AES_BLOCK_SIZE];
        len_block[8..].copy_from_slice(&((data.len() as u64) * 8).to_be_bytes());
        ghash.update(&[len_block.into()]);
        let ghash_out: [u8; AES_BLOCK_SIZE] = ghash.finalize().into();

        let mut j0 = [0u8; AES_BLOCK_SIZE];
        j0[..12].copy_from_slice(iv);
        j0[15] = 1;
        let mask = self.encrypt_block(slot, &j0)?;

        let mut tag = [0u8; AES_BLOCK_SIZE];
        for i in 0..AES_BLOCK_SIZE {
            tag[i] = ghash_out[i] ^ mask[i];
        }
        Ok(tag)
    }

    /// Load a modulus and exponent into an RSA keyslot.
    pub fn set_rsa_key(
        &mut self,
        slot: usize,
        modulus: &[u8; RSA_2048_BYTE_SIZE],
        exponent: &[u8],
    ) -> MonitorResult<()> {
        if exponent.len() > RSA_2048_BYTE_SIZE {
            return Err(MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE);
        }
        let entry = self
            .rsa_slots
            .get_mut(slot)
            .ok_or(MonitorError::DRIVER_ENGINE_RSA_SLOT_OUT_OF_BOUNDS)?;
        if entry.locked {
            return Err(MonitorError::DRIVER_ENGINE_RSA_SLOT_LOCKED);
        }
        entry.modulus = *modulus;
        entry.exponent = [0; RSA_2048_BYTE_SIZE];
        entry.exponent[RSA_2048_BYTE_SIZE - exponent.len()..].copy_from_slice(exponent);
        entry.exponent_len = exponent.len();
        Ok(())
    }

    /// Lock an RSA keyslot against further key loads.
    pub fn lock_rsa_key_slot(&mut self, slot: usize) -> MonitorResult<()> {
        self.rsa_slots
            .get_mut(slot)
            .ok_or(MonitorError::DRIVER_ENGINE_RSA_SLOT_OUT_OF_BOUNDS)?
            .locked = true;
        Ok(())
    }

    /// Raw modular exponentiation of `base` under the keyslot's modulus and
    /// exponent.
    pub fn exp_mod(
        &mut self,
        slot: usize,
        base: &[u8; RSA_2048_BYTE_SIZE],
    ) -> MonitorResult<[u8; RSA_2048_BYTE_SIZE]> {
        let entry = self
            .rsa_slots
            .get(slot)
            .ok_or(MonitorError::DRIVER_ENGINE_RSA_SLOT_OUT_OF_BOUNDS)?;

        let base = BigUint::from_bytes_be(base);
        let exponent = BigUint::from_bytes_be(&entry.exponent);
        let modulus = BigUint::from_bytes_be(&entry.modulus);
        if modulus.bits() == 0 {
            return Err(MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE);
        }

        let result = base.modpow(&exponent, &modulus);
        let bytes = result.to_bytes_be();

        let mut out = [0u8; RSA_2048_BYTE_SIZE];
        out[RSA_2048_BYTE_SIZE - bytes.len()..].copy_from_slice(&bytes);
        self.operation_done = true;
        Ok(out)
    }

    /// SHA-256 over `data`.
    pub fn sha256(&mut self, data: &[u8]) -> [u8; SHA_256_HASH_SIZE] {
        let digest = Sha256::digest(data);
        self.operation_done = true;
        digest.into()
    }

    /// Fill `dst` from the engine RNG.
    pub fn generate_random(&mut self, dst: &mut [u8]) {
        self.rng.fill_bytes(dst);
    }

    /// A fresh random 64-bit value. Never zero, so callers can use zero as
    /// an "absent" sentinel.
    pub fn generate_random_u64(&mut self) -> u64 {
        loop {
            let val = self.rng.next_u64();
            if val != 0 {
                return val;
            }
        }
    }

    /// True once the most recent engine operation has retired.
    pub fn is_operation_done(&self) -> bool {
        self.operation_done
    }

    /// Check the engine's sticky configuration bits. These are programmed
    /// by the boot stub and must match before keys are derived.
    pub fn validate_sticky_bits(&self) -> MonitorResult<()> {
        if self.sticky_bits_valid {
            Ok(())
        } else {
            Err(MonitorError::DRIVER_ENGINE_STICKY_BITS_MISMATCH)
        }
    }

    /// Force the sticky-bit check to fail.
    #[cfg(any(test, feature = "test-hooks"))]
    pub fn corrupt_sticky_bits(&mut self) {
        self.sticky_bits_valid = false;
    }
}

/// CMAC subkey derivation: left shift by one, conditionally folding in the
/// GF(2^128) reduction constant.
fn cmac_double(block: &[u8; AES_BLOCK_SIZE]) -> [u8; AES_BLOCK_SIZE] {
    let mut out = [0u8; AES_BLOCK_SIZE];
    let mut carry = 0u8;
    for i in (0..AES_BLOCK_SIZE).rev() {
        out[i] = (block[i] << 1) | carry;
        carry = block[i] >> 7;
    }
    if carry != 0 {
        out[AES_BLOCK_SIZE - 1] ^= 0x87;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SecurityEngine {
        SecurityEngine::new([7u8; 32])
    }

    #[test]
    fn test_set_encrypted_aes_key_round_trip() {
        let mut se = engine();
        let kek = [0x11u8; AES_KEY_SIZE];
        let key = [0x22u8; AES_KEY_SIZE];
        se.set_aes_key(0, &kek).unwrap();

        // Wrap the key under the kek, then ask the engine to unwrap it.
        let wrapped = {
            let mut se2 = engine();
            se2.set_aes_key(0, &kek).unwrap();
            se2.encrypt_block(0, &key).unwrap()
        };
        se.set_encrypted_aes_key(1, 0, &wrapped).unwrap();

        let plain = [0x33u8; AES_BLOCK_SIZE];
        let a = se.encrypt_block(1, &plain).unwrap();
        se.set_aes_key(2, &key).unwrap();
        let b = se.encrypt_block(2, &plain).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_locks_are_monotonic_and_enforced() {
        let mut se = engine();
        se.set_aes_key(3, &[1; AES_KEY_SIZE]).unwrap();
        se.lock_aes_key_slot(3, KeySlotLock::READ).unwrap();
        assert_eq!(
            se.read_aes_key(3),
            Err(MonitorError::DRIVER_ENGINE_KEY_SLOT_LOCKED)
        );
        // Data use still works until the USE lock lands.
        se.encrypt_block(3, &[0; AES_BLOCK_SIZE]).unwrap();

        se.lock_aes_key_slot(3, KeySlotLock::USE).unwrap();
        assert_eq!(
            se.encrypt_block(3, &[0; AES_BLOCK_SIZE]),
            Err(MonitorError::DRIVER_ENGINE_KEY_SLOT_LOCKED)
        );
        assert!(se
            .aes_key_slot_locks(3)
            .unwrap()
            .contains(KeySlotLock::READ | KeySlotLock::USE));
    }

    #[test]
    fn test_kek_lock_blocks_unwrap() {
        let mut se = engine();
        se.set_aes_key(0, &[5; AES_KEY_SIZE]).unwrap();
        se.lock_aes_key_slot(0, KeySlotLock::KEK).unwrap();
        assert_eq!(
            se.set_encrypted_aes_key(1, 0, &[0; AES_KEY_SIZE]),
            Err(MonitorError::DRIVER_ENGINE_KEY_SLOT_LOCKED)
        );
    }

    #[test]
    fn test_ctr_round_trip() {
        let mut se = engine();
        se.set_aes_key(4, &[9; AES_KEY_SIZE]).unwrap();
        let iv = [0xA5u8; AES_BLOCK_SIZE];
        let plain = [0x5Au8; 48];
        let mut enc = [0u8; 48];
        let mut dec = [0u8; 48];
        se.crypt_ctr(4, &iv, &plain, &mut enc).unwrap();
        assert_ne!(enc, plain);
        se.crypt_ctr(4, &iv, &enc, &mut dec).unwrap();
        assert_eq!(dec, plain);
    }

    #[test]
    fn test_cbc_round_trip() {
        let mut se = engine();
        se.set_aes_key(4, &[9; AES_KEY_SIZE]).unwrap();
        let iv = [1u8; AES_BLOCK_SIZE];
        let plain = [0x77u8; 32];
        let mut enc = [0u8; 32];
        let mut dec = [0u8; 32];
        se.encrypt_cbc(4, &iv, &plain, &mut enc).unwrap();
        se.decrypt_cbc(4, &iv, &enc, &mut dec).unwrap();
        assert_eq!(dec, plain);

        let mut bad = [0u8; 17];
        assert_eq!(
            se.encrypt_cbc(4, &iv, &[0u8; 17], &mut bad),
            Err(MonitorError::DRIVER_ENGINE_INVALID_BUFFER_SIZE)
        );
    }

    #[test]
    fn test_cmac_known_answer() {
        // NIST SP 800-38B example 1: AES-128, empty message.
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let mut se = engine();
        se.set_aes_key(0, key[..].try_into().unwrap()).unwrap();
        let mac = se.compute_cmac(0, &[]).unwrap();
        assert_eq!(
            mac.to_vec(),
            hex::decode("bb1d6929e95937287fa37d129b756746").unwrap()
        );

        // Example 2: one full block.
        let msg = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let mac = se.compute_cmac(0, &msg).unwrap();
        assert_eq!(
            mac.to_vec(),
            hex::decode("070a16b46b4d4144f79bdd9dd04a287c").unwrap()
        );
    }

    #[test]
    fn test_gmac_detects_tamper() {
        let mut se = engine();
        se.set_aes_key(0, &[3; AES_KEY_SIZE]).unwrap();
        let iv = [0u8; 12];
        let data = [0xABu8; 40];
        let tag = se.compute_gmac(0, &iv, &data).unwrap();
        let mut tampered = data;
        tampered[0] ^= 1;
        assert_ne!(tag, se.compute_gmac(0, &iv, &tampered).unwrap());
        assert_eq!(tag, se.compute_gmac(0, &iv, &data).unwrap());
    }

    #[test]
    fn test_exp_mod_small_values() {
        let mut se = engine();
        let mut modulus = [0u8; RSA_2048_BYTE_SIZE];
        modulus[RSA_2048_BYTE_SIZE - 1] = 101;
        se.set_rsa_key(0, &modulus, &[5]).unwrap();

        let mut base = [0u8; RSA_2048_BYTE_SIZE];
        base[RSA_2048_BYTE_SIZE - 1] = 3;
        let out = se.exp_mod(0, &base).unwrap();
        // 3^5 mod 101 = 243 mod 101 = 41
        assert_eq!(out[RSA_2048_BYTE_SIZE - 1], 41);
        assert!(out[..RSA_2048_BYTE_SIZE - 1].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rsa_slot_lock() {
        let mut se = engine();
        se.lock_rsa_key_slot(1).unwrap();
        assert_eq!(
            se.set_rsa_key(1, &[0xFF; RSA_2048_BYTE_SIZE], &[1, 0, 1]),
            Err(MonitorError::DRIVER_ENGINE_RSA_SLOT_LOCKED)
        );
    }

    #[test]
    fn test_random_u64_nonzero() {
        let mut se = engine();
        for _ in 0..32 {
            assert_ne!(se.generate_random_u64(), 0);
        }
    }
}
