/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the security engine driver layer exports.

--*/
#![cfg_attr(not(feature = "std"), no_std)]

mod device_buffer;
mod lock;
mod pss;
mod security_engine;

pub use device_buffer::DeviceBuffer;
pub use lock::{AsyncOperation, SecurityEngineLock};
pub use pss::{verify_hash, verify_signature};
pub use security_engine::{
    KeySlotLock, SecurityEngine, AES_BLOCK_SIZE, AES_KEY_SLOT_COUNT, AES_KEY_SIZE,
    RSA_2048_BYTE_SIZE, RSA_KEY_SLOT_COUNT, SHA_256_HASH_SIZE,
};
