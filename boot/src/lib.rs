/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the cold boot flow: key derivation ladder, keyslot lock
    sweep, and the package2 load pipeline driver.

--*/
#![cfg_attr(not(feature = "std"), no_std)]

mod key_ladder;
mod pkg2_loader;
mod setup;

pub use key_ladder::{
    derive_all_device_master_keys, derive_all_master_keys, determine_key_generation,
    lock_key_slots, lock_rsa_key_slots, setup_random_keys, test_key_generation,
    DeviceMasterKeyVectors, MasterKeyVectors,
};
pub use pkg2_loader::{Package2LoadEnv, Package2Loader, LoadedPackage2, PACKAGE2_KEY_SOURCE};
pub use setup::{
    initialize_keys, record_fatal_error, validate_system_counters, warm_boot_setup,
    SYSTEM_COUNTER_FREQUENCY_HZ,
};
