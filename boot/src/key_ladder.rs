/*++

Licensed under the Apache-2.0 license.

File Name:

    key_ladder.rs

Abstract:

    File contains the key derivation ladder: key generation detection over
    the master key vector chain, derivation of all historical master and
    device master keys, the per-boot random wrapping keys, and the final
    keyslot lock sweep.

--*/

use secmon_common::{
    AesKey, WrappedKeyStore, DEVICE_MASTER_KEY_FIRST_GENERATION, KEY_GENERATION_COUNT,
    KEY_SLOT_DEVICE, KEY_SLOT_DEVICE_MASTER, KEY_SLOT_MASTER,
    KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP, KEY_SLOT_RANDOM_FOR_USER_WRAP, KEY_SLOT_SEAL,
    KEY_SLOT_SECURE_BOOT, KEY_SLOT_TEMPORARY, RSA_KEY_SLOT_BOOT, UNUSED_KEY_SLOTS,
};
use secmon_drivers::{
    DeviceBuffer, KeySlotLock, SecurityEngine, AES_BLOCK_SIZE, AES_KEY_SIZE, AES_KEY_SLOT_COUNT,
};
use secmon_error::{MonitorError, MonitorResult};

/// Master key vector chain. `vectors[0]` is the zero block encrypted under
/// master key 0; `vectors[g]` for g > 0 is master key g-1 encrypted under
/// master key g. Production and development devices carry different
/// tables.
#[derive(Clone)]
pub struct MasterKeyVectors {
    pub vectors: [AesKey; KEY_GENERATION_COUNT],
}

/// Device master key derivation sources. Each generation's kek source is
/// unwrapped through the fused secure boot key; the key source is then
/// unwrapped through that kek.
#[derive(Clone)]
pub struct DeviceMasterKeyVectors {
    pub kek_sources: [AesKey; KEY_GENERATION_COUNT],
    pub key_sources: [AesKey; KEY_GENERATION_COUNT],
}

/// Test whether the live master keyslot holds generation `candidate`:
/// unwind the vector chain from `candidate` down to zero and check that
/// the fully unwound value is the zero block.
pub fn test_key_generation(
    se: &mut SecurityEngine,
    vectors: &MasterKeyVectors,
    candidate: usize,
) -> MonitorResult<bool> {
    if candidate >= KEY_GENERATION_COUNT {
        return Err(MonitorError::KEY_STORAGE_GENERATION_OUT_OF_BOUNDS);
    }
    if candidate == 0 {
        let unwound = se.decrypt_block(KEY_SLOT_MASTER, &vectors.vectors[0])?;
        return Ok(unwound == [0u8; AES_BLOCK_SIZE]);
    }

    se.set_encrypted_aes_key(KEY_SLOT_TEMPORARY, KEY_SLOT_MASTER, &vectors.vectors[candidate])?;
    for generation in (1..candidate).rev() {
        se.set_encrypted_aes_key(
            KEY_SLOT_TEMPORARY,
            KEY_SLOT_TEMPORARY,
            &vectors.vectors[generation],
        )?;
    }
    let unwound = se.decrypt_block(KEY_SLOT_TEMPORARY, &vectors.vectors[0])?;
    Ok(unwound == [0u8; AES_BLOCK_SIZE])
}

/// Detect which generation the boot stub left in the master keyslot.
/// Exhausting every known generation means the keyslot is corrupt or the
/// device is outside our support window; that is fatal.
pub fn determine_key_generation(
    se: &mut SecurityEngine,
    vectors: &MasterKeyVectors,
) -> MonitorResult<usize> {
    for candidate in 0..KEY_GENERATION_COUNT {
        if test_key_generation(se, vectors, candidate)? {
            log::info!("detected key generation {candidate}");
            return Ok(candidate);
        }
    }
    Err(MonitorError::BOOT_KEY_GENERATION_NOT_FOUND)
}

/// Walk the chain from `generation` down to zero, wrapping every
/// historical master key into the store. The current generation stays
/// live in its keyslot only.
pub fn derive_all_master_keys(
    se: &mut SecurityEngine,
    store: &mut WrappedKeyStore,
    vectors: &MasterKeyVectors,
    generation: usize,
) -> MonitorResult<()> {
    if generation >= KEY_GENERATION_COUNT {
        return Err(MonitorError::KEY_STORAGE_GENERATION_OUT_OF_BOUNDS);
    }
    let mut previous: Option<AesKey> = None;
    for current in (0..generation).rev() {
        let raw = match previous {
            None => se.decrypt_block(KEY_SLOT_MASTER, &vectors.vectors[current + 1])?,
            Some(key) => {
                se.set_aes_key(KEY_SLOT_TEMPORARY, &key)?;
                se.decrypt_block(KEY_SLOT_TEMPORARY, &vectors.vectors[current + 1])?
            }
        };
        store.set_master_key(se, current, &raw)?;
        previous = Some(raw);
    }
    se.clear_aes_key(KEY_SLOT_TEMPORARY)?;
    Ok(())
}

/// Derive the device master key for every generation that has one. The
/// current generation lands live in its keyslot; older generations are
/// wrapped into the store.
pub fn derive_all_device_master_keys(
    se: &mut SecurityEngine,
    store: &mut WrappedKeyStore,
    vectors: &DeviceMasterKeyVectors,
    generation: usize,
) -> MonitorResult<()> {
    if generation >= KEY_GENERATION_COUNT {
        return Err(MonitorError::KEY_STORAGE_GENERATION_OUT_OF_BOUNDS);
    }
    for current in DEVICE_MASTER_KEY_FIRST_GENERATION..=generation {
        se.set_encrypted_aes_key(
            KEY_SLOT_TEMPORARY,
            KEY_SLOT_SECURE_BOOT,
            &vectors.kek_sources[current],
        )?;
        if current == generation {
            se.set_encrypted_aes_key(
                KEY_SLOT_DEVICE_MASTER,
                KEY_SLOT_TEMPORARY,
                &vectors.key_sources[current],
            )?;
        } else {
            let raw = se.decrypt_block(KEY_SLOT_TEMPORARY, &vectors.key_sources[current])?;
            store.set_device_master_key(se, current, &raw)?;
        }
    }
    se.clear_aes_key(KEY_SLOT_TEMPORARY)?;
    Ok(())
}

/// Generate the two per-boot random wrapping keys: the storage wrap key
/// protecting wrapped key material at rest, and the user wrap key sealing
/// caller-visible access keys. Neither survives a power cycle, so nothing
/// wrapped under them does either.
pub fn setup_random_keys(se: &mut SecurityEngine) -> MonitorResult<()> {
    for slot in [
        KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP,
        KEY_SLOT_RANDOM_FOR_USER_WRAP,
    ] {
        // Staged through a DMA buffer with the flush choreography the
        // engine requires for key loads.
        let mut buf = DeviceBuffer::<AES_KEY_SIZE>::new();
        se.generate_random(buf.as_mut_slice());
        buf.flush();
        se.set_aes_key(slot, buf.as_array())?;
        buf.as_mut_slice().fill(0);
        buf.flush();
    }
    Ok(())
}

/// Final lock sweep. Every slot becomes unreadable; secure monitor slots
/// become invisible to the non-secure world; the master and device master
/// slots become kek-only; unused slots are locked outright.
pub fn lock_key_slots(se: &mut SecurityEngine) -> MonitorResult<()> {
    for slot in 0..AES_KEY_SLOT_COUNT {
        se.lock_aes_key_slot(slot, KeySlotLock::READ)?;
    }
    for slot in [
        KEY_SLOT_TEMPORARY,
        KEY_SLOT_SEAL,
        KEY_SLOT_RANDOM_FOR_KEY_STORAGE_WRAP,
        KEY_SLOT_RANDOM_FOR_USER_WRAP,
        KEY_SLOT_DEVICE_MASTER,
        KEY_SLOT_DEVICE,
        KEY_SLOT_MASTER,
        KEY_SLOT_SECURE_BOOT,
    ] {
        se.lock_aes_key_slot(slot, KeySlotLock::PER_KEY)?;
    }
    // Kek-only: these may derive and unwrap, never touch caller data.
    for slot in [KEY_SLOT_MASTER, KEY_SLOT_DEVICE_MASTER, KEY_SLOT_SECURE_BOOT] {
        se.lock_aes_key_slot(slot, KeySlotLock::USE)?;
    }
    for slot in UNUSED_KEY_SLOTS {
        se.lock_aes_key_slot(slot, KeySlotLock::ALL)?;
    }
    Ok(())
}

/// Lock the boot-time RSA keyslot. Runs after the boot-time signature
/// checks have finished with it; the runtime slot stays loadable for the
/// SMC modular-exponentiation surface.
pub fn lock_rsa_key_slots(se: &mut SecurityEngine) -> MonitorResult<()> {
    se.lock_rsa_key_slot(RSA_KEY_SLOT_BOOT)
}
