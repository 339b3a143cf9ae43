/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the secure monitor call layer: argument block, result
    codes, dispatch tables, and the handler set.

--*/
#![cfg_attr(not(feature = "std"), no_std)]

mod aes;
mod context;
mod device_unique;
mod dispatch;
mod extension;
mod info;
mod mapper;
mod power;
mod random;
mod result;
mod rsa;

pub use context::{Monitor, RebootState};
pub use dispatch::{
    configure_smc_handlers_for_target_firmware, handle_smc, SmcTableEntry, SmcTier,
    DESIGNATED_USER_CORE, FUNCTION_ID_GET_SECURE_DATA,
};
pub use info::ConfigItem;
pub use mapper::{
    AmsIramPage, AmsUserPage, MappingWindow, MappingWindows, PageMapper, SmcMemory, SmcUserPage,
};
pub use power::{
    CorePowerState, CORE_COUNT, PSCI_ALREADY_ON, PSCI_DENIED, PSCI_INVALID_PARAMETERS,
    PSCI_SUCCESS, SUPPORTED_DEEP_SLEEP_STATE,
};
pub use random::RandomCache;
pub use result::{AsyncCompletion, SmcResult};

/// The eight general registers of one secure monitor call. By convention
/// `r[0]` carries the function id in and the result code out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmcArguments(pub [u64; 8]);

impl SmcArguments {
    pub fn new(function_id: u64) -> Self {
        let mut args = Self::default();
        args.0[0] = function_id;
        args
    }
}

/// Reassemble a 16-byte value carried across two argument registers,
/// little-endian, low register first.
pub fn key_from_registers(lo: u64, hi: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&lo.to_le_bytes());
    key[8..].copy_from_slice(&hi.to_le_bytes());
    key
}

/// Split a 16-byte value across two argument registers.
pub fn key_to_registers(key: &[u8; 16]) -> (u64, u64) {
    let mut lo = [0u8; 8];
    let mut hi = [0u8; 8];
    lo.copy_from_slice(&key[..8]);
    hi.copy_from_slice(&key[8..]);
    (u64::from_le_bytes(lo), u64::from_le_bytes(hi))
}
