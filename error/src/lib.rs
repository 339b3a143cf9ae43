/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the error type and error constants used across the
    secure monitor.

--*/
#![cfg_attr(not(feature = "std"), no_std)]

use core::convert::From;
use core::num::{NonZeroU32, TryFromIntError};

/// Secure monitor error type.
///
/// Errors are non-zero so that `Result<(), MonitorError>` and the
/// hardware error-report register can share a representation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MonitorError(pub NonZeroU32);

/// Result type used by all fallible monitor internals.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: MonitorError = MonitorError::new_const($value);
        )*

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl MonitorError {
    /// Create a monitor error; intended to only be used from const contexts, as we
    /// don't want runtime panics if val is zero. The preferred way to get a
    /// MonitorError from a u32 is `MonitorError::try_from()`.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("MonitorError cannot be 0"),
        }
    }

    // Error space layout: high 16 bits select the component, low 16 bits the
    // specific failure.
    define_error_constants![
        // Security engine driver
        (
            DRIVER_ENGINE_KEY_SLOT_OUT_OF_BOUNDS,
            0x0001_0001,
            "AES keyslot index out of bounds"
        ),
        (
            DRIVER_ENGINE_KEY_SLOT_LOCKED,
            0x0001_0002,
            "AES keyslot is locked against this operation"
        ),
        (
            DRIVER_ENGINE_RSA_SLOT_OUT_OF_BOUNDS,
            0x0001_0003,
            "RSA keyslot index out of bounds"
        ),
        (
            DRIVER_ENGINE_RSA_SLOT_LOCKED,
            0x0001_0004,
            "RSA keyslot is locked against this operation"
        ),
        (
            DRIVER_ENGINE_INVALID_BUFFER_SIZE,
            0x0001_0005,
            "Engine operation buffer size invalid"
        ),
        (
            DRIVER_ENGINE_BUSY,
            0x0001_0006,
            "Security engine already has an operation in flight"
        ),
        (
            DRIVER_ENGINE_NO_OPERATION,
            0x0001_0007,
            "No security engine operation in flight"
        ),
        (
            DRIVER_ENGINE_STICKY_BITS_MISMATCH,
            0x0001_0008,
            "Security engine sticky configuration bits are wrong"
        ),
        // Key storage
        (
            KEY_STORAGE_GENERATION_OUT_OF_BOUNDS,
            0x0002_0001,
            "Key generation index out of bounds"
        ),
        (
            KEY_STORAGE_ENTRY_NOT_PRESENT,
            0x0002_0002,
            "Wrapped key entry has not been derived"
        ),
        (
            KEY_STORAGE_RSA_KEY_NOT_PRESENT,
            0x0002_0003,
            "Imported RSA key has not been imported"
        ),
        (
            KEY_STORAGE_RSA_KEY_PROVISIONAL,
            0x0002_0004,
            "Imported RSA modulus has not passed its self test"
        ),
        // Package2 pipeline
        (
            PKG2_HEADER_SIGNATURE_INVALID,
            0x0003_0001,
            "Package2 header signature verification failed"
        ),
        (
            PKG2_META_INVALID,
            0x0003_0002,
            "Package2 metadata failed structural validation"
        ),
        (
            PKG2_VERSION_INVALID,
            0x0003_0003,
            "Package2 version outside the accepted window"
        ),
        (
            PKG2_PAYLOAD_HASH_INVALID,
            0x0003_0004,
            "Package2 payload hash mismatch"
        ),
        (
            PKG2_META_NOT_DECRYPTABLE,
            0x0003_0005,
            "No key generation decrypts the package2 metadata"
        ),
        (
            PKG2_LOAD_DESTINATION_INVALID,
            0x0003_0006,
            "Package2 payload load destination out of range"
        ),
        // Boot config
        (
            BOOTCONFIG_SIGNATURE_INVALID,
            0x0004_0001,
            "Boot config signature verification failed"
        ),
        // Boot flow / key ladder
        (
            BOOT_KEY_GENERATION_NOT_FOUND,
            0x0005_0001,
            "Key generation detection exhausted all known generations"
        ),
        (
            BOOT_SYSTEM_COUNTER_INVALID,
            0x0005_0002,
            "System counter frequency is not the expected value"
        ),
        (
            BOOT_HANDOFF_STATE_INVALID,
            0x0005_0003,
            "Bootloader handoff block advanced to an unexpected state"
        ),
        (
            BOOT_HANDOFF_TIMED_OUT,
            0x0005_0004,
            "Bootloader handoff block never reached the awaited state"
        ),
        // SMC dispatch
        (
            SMC_UNKNOWN_FUNCTION,
            0x0006_0001,
            "SMC function id does not resolve to a handler"
        ),
        (
            SMC_WRONG_CORE,
            0x0006_0002,
            "User SMC issued from a core other than the designated one"
        ),
        (
            SMC_UNKNOWN_TIER,
            0x0006_0003,
            "SMC tier selector out of range"
        ),
    ];
}

impl From<MonitorError> for NonZeroU32 {
    fn from(val: MonitorError) -> Self {
        val.0
    }
}

impl From<MonitorError> for u32 {
    fn from(val: MonitorError) -> Self {
        val.0.get()
    }
}

impl TryFrom<u32> for MonitorError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(MonitorError(val)),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_error_constants_are_unique() {
        let constants = MonitorError::all_constants();
        let mut seen = HashSet::new();
        for (name, value) in constants {
            assert!(seen.insert(value), "duplicate error code for {name}");
            assert_ne!(value, 0, "error code for {name} is zero");
        }
    }

    #[test]
    fn test_try_from() {
        assert!(MonitorError::try_from(0).is_err());
        assert_eq!(
            MonitorError::try_from(0x0001_0001),
            Ok(MonitorError::DRIVER_ENGINE_KEY_SLOT_OUT_OF_BOUNDS)
        );
    }
}
