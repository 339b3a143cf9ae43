/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains types shared between the boot flow and the SMC layer:
    keyslot assignments, wrapped key storage, the bootloader handoff block,
    and the boot-time monitor configuration.

--*/
#![cfg_attr(not(feature = "std"), no_std)]

mod config;
mod handoff;
mod key_generation;
mod key_storage;

pub use config::{HardwareType, MonitorConfiguration, TargetFirmware};
pub use handoff::{BootloaderState, SecureMonitorParameters, HANDOFF_POLL_BUDGET};
pub use key_generation::*;
pub use key_storage::{ImportedRsaKeyStore, ModulusState, RsaKeyId, WrappedKeyStore};
