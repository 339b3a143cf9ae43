/*++

Licensed under the Apache-2.0 license.

File Name:

    bootconfig.rs

Abstract:

    File contains the boot configuration validator: verify the signed
    region against the fixed modulus and the device identity, or zero it.

--*/

use secmon_drivers::{verify_signature, SecurityEngine, RSA_2048_BYTE_SIZE};
use secmon_pkg2_types::BootConfig;
use zerocopy::AsBytes;

/// Validates boot configuration records against a fixed signing modulus
/// and the device's fused chip-unique id.
pub struct BootConfigValidator {
    modulus: [u8; RSA_2048_BYTE_SIZE],
    rsa_slot: usize,
}

impl BootConfigValidator {
    pub fn new(modulus: [u8; RSA_2048_BYTE_SIZE], rsa_slot: usize) -> Self {
        Self { modulus, rsa_slot }
    }

    /// Verify `config`'s signature and ECID binding. On failure the signed
    /// region is zeroed so the record degrades to defaults; the record
    /// itself is never rejected. Idempotent: a zeroed record stays zeroed.
    pub fn verify_or_clear(
        &self,
        se: &mut SecurityEngine,
        config: &mut BootConfig,
        device_ecid: &[u8; 16],
    ) -> bool {
        let signature_ok = verify_signature(
            se,
            self.rsa_slot,
            config.signature(),
            &self.modulus,
            config.signed_data().as_bytes(),
        );
        let ecid_ok = config.signed_data().ecid() == device_ecid;

        let ok = signature_ok && ecid_ok;
        if !ok {
            config.clear_signed_data();
        }
        ok
    }
}
