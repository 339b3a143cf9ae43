/*++

Licensed under the Apache-2.0 license.

File Name:

    key_storage.rs

Abstract:

    File contains the wrapped key stores: historical master and device
    master keys at rest, and imported RSA keys with their provisional /
    committed modulus lifecycle.

--*/

use secmon_drivers::SecurityEngine;
use secmon_error::{MonitorError, MonitorResult};

use crate::key_generation::{AesKey, KEY_GENERATION_COUNT, KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP};
use secmon_drivers::RSA_2048_BYTE_SIZE;

/// Historical master and device-master keys, AES-wrapped under the per-boot
/// storage-wrap key. The cleartext values only ever exist inside hardware
/// keyslots.
#[derive(Default)]
pub struct WrappedKeyStore {
    master: [Option<AesKey>; KEY_GENERATION_COUNT],
    device_master: [Option<AesKey>; KEY_GENERATION_COUNT],
}

impl WrappedKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_generation(generation: usize) -> MonitorResult<()> {
        if generation < KEY_GENERATION_COUNT {
            Ok(())
        } else {
            Err(MonitorError::KEY_STORAGE_GENERATION_OUT_OF_BOUNDS)
        }
    }

    /// Wrap `key` under the storage-wrap keyslot and record it for
    /// `generation`.
    pub fn set_master_key(
        &mut self,
        se: &mut SecurityEngine,
        generation: usize,
        key: &AesKey,
    ) -> MonitorResult<()> {
        Self::check_generation(generation)?;
        self.master[generation] =
            Some(se.encrypt_block(KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP, key)?);
        Ok(())
    }

    /// Unwrap the master key for `generation` directly into `dst_slot`.
    pub fn load_master_key(
        &self,
        se: &mut SecurityEngine,
        dst_slot: usize,
        generation: usize,
    ) -> MonitorResult<()> {
        Self::check_generation(generation)?;
        let wrapped = self.master[generation]
            .as_ref()
            .ok_or(MonitorError::KEY_STORAGE_ENTRY_NOT_PRESENT)?;
        se.set_encrypted_aes_key(dst_slot, KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP, wrapped)
    }

    pub fn has_master_key(&self, generation: usize) -> bool {
        generation < KEY_GENERATION_COUNT && self.master[generation].is_some()
    }

    /// Wrap a device master key for `generation`.
    pub fn set_device_master_key(
        &mut self,
        se: &mut SecurityEngine,
        generation: usize,
        key: &AesKey,
    ) -> MonitorResult<()> {
        Self::check_generation(generation)?;
        self.device_master[generation] =
            Some(se.encrypt_block(KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP, key)?);
        Ok(())
    }

    /// Unwrap the device master key for `generation` into `dst_slot`.
    pub fn load_device_master_key(
        &self,
        se: &mut SecurityEngine,
        dst_slot: usize,
        generation: usize,
    ) -> MonitorResult<()> {
        Self::check_generation(generation)?;
        let wrapped = self.device_master[generation]
            .as_ref()
            .ok_or(MonitorError::KEY_STORAGE_ENTRY_NOT_PRESENT)?;
        se.set_encrypted_aes_key(dst_slot, KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP, wrapped)
    }

    pub fn has_device_master_key(&self, generation: usize) -> bool {
        generation < KEY_GENERATION_COUNT && self.device_master[generation].is_some()
    }
}

/// The four imported RSA key identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaKeyId {
    Lotus = 0,
    EsDrmCert = 1,
    Ssl = 2,
    EsClientCert = 3,
}

impl RsaKeyId {
    pub const COUNT: usize = 4;
}

/// Lifecycle of an imported modulus. A modulus is Provisional until a
/// public/private round-trip self test promotes it to Committed; only the
/// self-test path may use a Provisional modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModulusState {
    Absent,
    Provisional,
    Committed,
}

struct ImportedRsaKey {
    exponent: [u8; RSA_2048_BYTE_SIZE],
    exponent_present: bool,
    modulus: [u8; RSA_2048_BYTE_SIZE],
    modulus_state: ModulusState,
}

impl Default for ImportedRsaKey {
    fn default() -> Self {
        Self {
            exponent: [0; RSA_2048_BYTE_SIZE],
            exponent_present: false,
            modulus: [0; RSA_2048_BYTE_SIZE],
            modulus_state: ModulusState::Absent,
        }
    }
}

/// Store for device-unique imported RSA keys.
#[derive(Default)]
pub struct ImportedRsaKeyStore {
    keys: [ImportedRsaKey; RsaKeyId::COUNT],
}

impl ImportedRsaKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a private exponent. Importing a fresh exponent invalidates
    /// any previously committed modulus.
    pub fn import_exponent(&mut self, id: RsaKeyId, exponent: &[u8; RSA_2048_BYTE_SIZE]) {
        let key = &mut self.keys[id as usize];
        key.exponent = *exponent;
        key.exponent_present = true;
        key.modulus_state = ModulusState::Absent;
    }

    /// Import a modulus; it remains Provisional until committed.
    pub fn import_modulus(&mut self, id: RsaKeyId, modulus: &[u8; RSA_2048_BYTE_SIZE]) {
        let key = &mut self.keys[id as usize];
        key.modulus = *modulus;
        key.modulus_state = ModulusState::Provisional;
    }

    /// Promote a provisional modulus after a successful self test.
    pub fn commit_modulus(&mut self, id: RsaKeyId) -> MonitorResult<()> {
        let key = &mut self.keys[id as usize];
        match key.modulus_state {
            ModulusState::Provisional | ModulusState::Committed => {
                key.modulus_state = ModulusState::Committed;
                Ok(())
            }
            ModulusState::Absent => Err(MonitorError::KEY_STORAGE_RSA_KEY_NOT_PRESENT),
        }
    }

    pub fn modulus_state(&self, id: RsaKeyId) -> ModulusState {
        self.keys[id as usize].modulus_state
    }

    /// Private exponent for `id`, if one has been imported.
    pub fn exponent(&self, id: RsaKeyId) -> MonitorResult<&[u8; RSA_2048_BYTE_SIZE]> {
        let key = &self.keys[id as usize];
        if !key.exponent_present {
            return Err(MonitorError::KEY_STORAGE_RSA_KEY_NOT_PRESENT);
        }
        Ok(&key.exponent)
    }

    /// Modulus for `id`. Operations other than the self test must pass
    /// `require_committed`; a provisional modulus then fails rather than
    /// being silently used.
    pub fn modulus(
        &self,
        id: RsaKeyId,
        require_committed: bool,
    ) -> MonitorResult<&[u8; RSA_2048_BYTE_SIZE]> {
        let key = &self.keys[id as usize];
        match key.modulus_state {
            ModulusState::Absent => Err(MonitorError::KEY_STORAGE_RSA_KEY_NOT_PRESENT),
            ModulusState::Provisional if require_committed => {
                Err(MonitorError::KEY_STORAGE_RSA_KEY_PROVISIONAL)
            }
            _ => Ok(&key.modulus),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_generation::KEY_SLOT_TEMPORARY;
    use secmon_drivers::AES_BLOCK_SIZE;

    fn engine_with_wrap_key() -> SecurityEngine {
        let mut se = SecurityEngine::new([1u8; 32]);
        se.set_aes_key(KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP, &[0x44; 16])
            .unwrap();
        se
    }

    #[test]
    fn test_master_key_round_trip() {
        let mut se = engine_with_wrap_key();
        let mut store = WrappedKeyStore::new();
        let key: AesKey = [0xC3; 16];

        for generation in 0..KEY_GENERATION_COUNT {
            store.set_master_key(&mut se, generation, &key).unwrap();
            store
                .load_master_key(&mut se, KEY_SLOT_TEMPORARY, generation)
                .unwrap();

            // The unwrapped slot behaves identically to one loaded directly.
            let probe = [0x99u8; AES_BLOCK_SIZE];
            let via_store = se.encrypt_block(KEY_SLOT_TEMPORARY, &probe).unwrap();
            se.set_aes_key(KEY_SLOT_TEMPORARY, &key).unwrap();
            let direct = se.encrypt_block(KEY_SLOT_TEMPORARY, &probe).unwrap();
            assert_eq!(via_store, direct);
        }
    }

    #[test]
    fn test_missing_entries_and_bounds() {
        let mut se = engine_with_wrap_key();
        let mut store = WrappedKeyStore::new();
        assert_eq!(
            store.load_master_key(&mut se, KEY_SLOT_TEMPORARY, 2),
            Err(MonitorError::KEY_STORAGE_ENTRY_NOT_PRESENT)
        );
        assert_eq!(
            store.set_master_key(&mut se, KEY_GENERATION_COUNT, &[0; 16]),
            Err(MonitorError::KEY_STORAGE_GENERATION_OUT_OF_BOUNDS)
        );
        assert!(!store.has_device_master_key(0));
    }

    #[test]
    fn test_wrapped_at_rest() {
        let mut se = engine_with_wrap_key();
        let mut store = WrappedKeyStore::new();
        let key: AesKey = [0xAB; 16];
        store.set_master_key(&mut se, 5, &key).unwrap();
        // The stored bytes are not the cleartext key.
        assert_ne!(store.master[5].unwrap(), key);
    }

    #[test]
    fn test_rsa_modulus_lifecycle() {
        let mut store = ImportedRsaKeyStore::new();
        let id = RsaKeyId::EsDrmCert;

        assert_eq!(
            store.modulus(id, true),
            Err(MonitorError::KEY_STORAGE_RSA_KEY_NOT_PRESENT)
        );

        store.import_exponent(id, &[7; RSA_2048_BYTE_SIZE]);
        store.import_modulus(id, &[9; RSA_2048_BYTE_SIZE]);
        assert_eq!(store.modulus_state(id), ModulusState::Provisional);

        // Committed-only callers are refused while provisional.
        assert_eq!(
            store.modulus(id, true),
            Err(MonitorError::KEY_STORAGE_RSA_KEY_PROVISIONAL)
        );
        // The self-test path may read it.
        assert!(store.modulus(id, false).is_ok());

        store.commit_modulus(id).unwrap();
        assert!(store.modulus(id, true).is_ok());

        // A new exponent import invalidates the committed modulus.
        store.import_exponent(id, &[8; RSA_2048_BYTE_SIZE]);
        assert_eq!(store.modulus_state(id), ModulusState::Absent);
    }
}
