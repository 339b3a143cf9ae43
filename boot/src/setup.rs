/*++

Licensed under the Apache-2.0 license.

File Name:

    setup.rs

Abstract:

    File contains the cold and warm boot key setup flows and the boot-time
    consistency gates.

--*/

use secmon_common::WrappedKeyStore;
use secmon_drivers::SecurityEngine;
use secmon_error::{MonitorError, MonitorResult};

use crate::key_ladder::{
    derive_all_device_master_keys, derive_all_master_keys, determine_key_generation,
    lock_key_slots, setup_random_keys, DeviceMasterKeyVectors, MasterKeyVectors,
};

/// The only system counter frequency this platform ships with.
pub const SYSTEM_COUNTER_FREQUENCY_HZ: u32 = 19_200_000;

/// Consistency gate: a wrong counter frequency means the boot stub or the
/// hardware is not what we think it is.
pub fn validate_system_counters(frequency_hz: u32) -> MonitorResult<()> {
    if frequency_hz == SYSTEM_COUNTER_FREQUENCY_HZ {
        Ok(())
    } else {
        Err(MonitorError::BOOT_SYSTEM_COUNTER_INVALID)
    }
}

/// Record a fatal error code into the shared postmortem slot. The caller
/// halts the core afterwards; there is no recovery from a failed boot
/// integrity check.
pub fn record_fatal_error(error_slot: &mut u32, error: MonitorError) {
    *error_slot = error.into();
    log::error!("fatal boot error {:#010x}", u32::from(error));
}

/// Cold boot key setup. Returns the detected key generation.
///
/// Order matters: the random wrap keys must exist before any derived key
/// can be wrapped into the store, and the lock sweep must run only after
/// every derivation has finished.
pub fn initialize_keys(
    se: &mut SecurityEngine,
    store: &mut WrappedKeyStore,
    master_vectors: &MasterKeyVectors,
    device_master_vectors: &DeviceMasterKeyVectors,
    counter_frequency_hz: u32,
) -> MonitorResult<usize> {
    validate_system_counters(counter_frequency_hz)?;
    se.validate_sticky_bits()?;

    setup_random_keys(se)?;
    let generation = determine_key_generation(se, master_vectors)?;
    derive_all_master_keys(se, store, master_vectors, generation)?;
    derive_all_device_master_keys(se, store, device_master_vectors, generation)?;
    lock_key_slots(se)?;

    log::info!("cold boot key setup done, generation {generation}");
    Ok(generation)
}

/// Warm boot setup. Keyslot contents survive the sleep; the sticky
/// configuration and the lock sweep do not, so both are re-established.
pub fn warm_boot_setup(se: &mut SecurityEngine, counter_frequency_hz: u32) -> MonitorResult<()> {
    validate_system_counters(counter_frequency_hz)?;
    se.validate_sticky_bits()?;
    lock_key_slots(se)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_ladder::test_fixtures::*;
    use secmon_common::{KEY_SLOT_MASTER, KEY_SLOT_SECURE_BOOT};
    use secmon_drivers::AES_KEY_SIZE;

    #[test]
    fn test_validate_system_counters() {
        validate_system_counters(SYSTEM_COUNTER_FREQUENCY_HZ).unwrap();
        assert_eq!(
            validate_system_counters(19_200_001),
            Err(MonitorError::BOOT_SYSTEM_COUNTER_INVALID)
        );
    }

    #[test]
    fn test_cold_boot_flow() {
        let master_keys = test_master_keys(0x33);
        let master_vectors = build_master_vectors(&master_keys);
        let secure_boot_key = [0xB1u8; AES_KEY_SIZE];
        let device_vectors = build_device_master_vectors(
            &secure_boot_key,
            &test_master_keys(0x55),
            &test_master_keys(0x77),
        );

        let generation = 5;
        let mut se = SecurityEngine::new([4u8; 32]);
        se.set_aes_key(KEY_SLOT_MASTER, &master_keys[generation]).unwrap();
        se.set_aes_key(KEY_SLOT_SECURE_BOOT, &secure_boot_key).unwrap();

        let mut store = WrappedKeyStore::new();
        let detected = initialize_keys(
            &mut se,
            &mut store,
            &master_vectors,
            &device_vectors,
            SYSTEM_COUNTER_FREQUENCY_HZ,
        )
        .unwrap();
        assert_eq!(detected, generation);
        for g in 0..generation {
            assert!(store.has_master_key(g));
        }
        // Locked down afterwards.
        assert!(se.read_aes_key(KEY_SLOT_MASTER).is_err());
    }

    #[test]
    fn test_sticky_bit_failure_is_fatal() {
        let master_vectors = build_master_vectors(&test_master_keys(0x33));
        let device_vectors = build_device_master_vectors(
            &[0; AES_KEY_SIZE],
            &test_master_keys(0x55),
            &test_master_keys(0x77),
        );
        let mut se = SecurityEngine::new([4u8; 32]);
        se.corrupt_sticky_bits();
        let mut store = WrappedKeyStore::new();
        assert_eq!(
            initialize_keys(
                &mut se,
                &mut store,
                &master_vectors,
                &device_vectors,
                SYSTEM_COUNTER_FREQUENCY_HZ,
            ),
            Err(MonitorError::DRIVER_ENGINE_STICKY_BITS_MISMATCH)
        );
    }

    #[test]
    fn test_record_fatal_error() {
        let mut slot = 0u32;
        record_fatal_error(&mut slot, MonitorError::BOOT_KEY_GENERATION_NOT_FOUND);
        assert_eq!(slot, 0x0005_0001);
    }
}
