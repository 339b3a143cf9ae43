/*++

Licensed under the Apache-2.0 license.

File Name:

    pkg2_loader.rs

Abstract:

    File contains the package2 load driver: bootloader handoff
    sequencing, boot config validation, the verification pipeline, and
    payload placement into DRAM.

--*/

use secmon_common::{
    AesKey, BootloaderState, MonitorConfiguration, SecureMonitorParameters, WrappedKeyStore,
    HANDOFF_POLL_BUDGET, KEY_SLOT_MASTER, KEY_SLOT_TEMPORARY, RSA_KEY_SLOT_BOOT,
};
use secmon_drivers::{verify_signature, SecurityEngine, RSA_2048_BYTE_SIZE, SHA_256_HASH_SIZE};
use secmon_error::{MonitorError, MonitorResult};
use secmon_pkg2_types::{BootConfig, Package2Header, PACKAGE2_PAYLOAD_COUNT};
use secmon_pkg2_verify::{
    BootConfigValidator, Package2VerificationEnv, Package2Verifier, VersionPolicy,
};
use zerocopy::FromBytes;

use crate::key_ladder::lock_rsa_key_slots;

/// Fixed source wrapped through the selected master key to produce the
/// package2 decryption key.
pub const PACKAGE2_KEY_SOURCE: AesKey = [
    0xFB, 0x8B, 0x6A, 0x9C, 0x79, 0x00, 0xC8, 0x49, 0xEF, 0xD2, 0x4D, 0x85, 0x4D, 0x30, 0xA0,
    0xC7,
];

/// Verification environment backed by the live engine and the wrapped key
/// store.
pub struct Package2LoadEnv<'a> {
    se: &'a mut SecurityEngine,
    store: &'a WrappedKeyStore,
    current_generation: usize,
    signing_modulus: [u8; RSA_2048_BYTE_SIZE],
}

impl<'a> Package2LoadEnv<'a> {
    pub fn new(
        se: &'a mut SecurityEngine,
        store: &'a WrappedKeyStore,
        current_generation: usize,
        signing_modulus: [u8; RSA_2048_BYTE_SIZE],
    ) -> Self {
        Self {
            se,
            store,
            current_generation,
            signing_modulus,
        }
    }
}

impl Package2VerificationEnv for Package2LoadEnv<'_> {
    fn verify_header_signature(&mut self, signature: &[u8; 256], meta_bytes: &[u8]) -> bool {
        verify_signature(
            self.se,
            RSA_KEY_SLOT_BOOT,
            signature,
            &self.signing_modulus,
            meta_bytes,
        )
    }

    fn crypt_with_package2_key(
        &mut self,
        generation: usize,
        iv: &[u8; 16],
        src: &[u8],
        dst: &mut [u8],
    ) -> MonitorResult<()> {
        // Wrap the fixed key source through the generation's master key:
        // live keyslot for the current generation, store otherwise.
        if generation == self.current_generation {
            self.se
                .set_encrypted_aes_key(KEY_SLOT_TEMPORARY, KEY_SLOT_MASTER, &PACKAGE2_KEY_SOURCE)?;
        } else {
            self.store
                .load_master_key(self.se, KEY_SLOT_TEMPORARY, generation)?;
            self.se.set_encrypted_aes_key(
                KEY_SLOT_TEMPORARY,
                KEY_SLOT_TEMPORARY,
                &PACKAGE2_KEY_SOURCE,
            )?;
        }
        self.se.crypt_ctr(KEY_SLOT_TEMPORARY, iv, src, dst)
    }

    fn sha256(&mut self, data: &[u8]) -> [u8; SHA_256_HASH_SIZE] {
        self.se.sha256(data)
    }

    fn current_key_generation(&self) -> usize {
        self.current_generation
    }
}

/// A successfully loaded package2.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPackage2 {
    pub entrypoint: u32,
    pub key_generation: usize,
    pub encrypted: bool,
    /// Container hash snapshot, taken only during recovery boot for the
    /// config surface to report.
    pub package2_hash: Option<[u8; SHA_256_HASH_SIZE]>,
}

/// Drives the full package2 pipeline against the bootloader handoff
/// block.
pub struct Package2Loader {
    policy: VersionPolicy,
    signing_modulus: [u8; RSA_2048_BYTE_SIZE],
    bootconfig_modulus: [u8; RSA_2048_BYTE_SIZE],
    dram_base: u32,
}

impl Package2Loader {
    pub fn new(
        policy: VersionPolicy,
        signing_modulus: [u8; RSA_2048_BYTE_SIZE],
        bootconfig_modulus: [u8; RSA_2048_BYTE_SIZE],
        dram_base: u32,
    ) -> Self {
        Self {
            policy,
            signing_modulus,
            bootconfig_modulus,
            dram_base,
        }
    }

    /// Wait for the bootloader, validate the boot config, run the
    /// verification pipeline, and place the payloads into `dram`.
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        &self,
        se: &mut SecurityEngine,
        store: &WrappedKeyStore,
        config: &MonitorConfiguration,
        current_generation: usize,
        params: &mut SecureMonitorParameters,
        bootconfig: &mut BootConfig,
        device_ecid: &[u8; 16],
        container: &[u8],
        dram: &mut [u8],
    ) -> MonitorResult<LoadedPackage2> {
        params.wait_for_bootloader_state(BootloaderState::LoadedBootConfig, HANDOFF_POLL_BUDGET)?;

        // Production units never honor a boot config; everyone else gets
        // verify-or-degrade semantics.
        if config.is_production {
            bootconfig.clear_signed_data();
        } else {
            let validator = BootConfigValidator::new(self.bootconfig_modulus, RSA_KEY_SLOT_BOOT);
            validator.verify_or_clear(se, bootconfig, device_ecid);
        }
        let signature_disabled =
            !config.is_production && bootconfig.signed_data().is_package2_signature_disabled();
        let encryption_disabled =
            !config.is_production && bootconfig.signed_data().is_package2_encryption_disabled();

        params.wait_for_bootloader_state(BootloaderState::LoadedPackage2, HANDOFF_POLL_BUDGET)?;

        let header =
            Package2Header::read_from_prefix(container).ok_or(MonitorError::PKG2_META_INVALID)?;

        let mut verifier = Package2Verifier::new(
            Package2LoadEnv::new(se, store, current_generation, self.signing_modulus),
            self.policy,
        );
        let verified = verifier.verify_header(&header, signature_disabled, encryption_disabled)?;
        verifier.verify_payload_hashes(&verified, container)?;

        let declared_size = verified.meta.size() as usize;
        if container.len() < declared_size {
            return Err(MonitorError::PKG2_META_INVALID);
        }

        for i in 0..PACKAGE2_PAYLOAD_COUNT {
            let size = verified.meta.payload_sizes()[i] as usize;
            if size == 0 {
                continue;
            }
            let offset = verified.meta.payload_offsets()[i];
            let start = offset
                .checked_sub(self.dram_base)
                .ok_or(MonitorError::PKG2_LOAD_DESTINATION_INVALID)? as usize;
            let dst = dram
                .get_mut(start..start + size)
                .ok_or(MonitorError::PKG2_LOAD_DESTINATION_INVALID)?;
            verifier.load_payload(&verified, container, i, dst)?;
        }
        drop(verifier);

        let package2_hash = if config.is_recovery_boot {
            Some(se.sha256(&container[..declared_size]))
        } else {
            None
        };

        // Boot signature checks are over; the boot slot refuses key loads
        // from here on.
        lock_rsa_key_slots(se)?;

        params.set_secmon_state(BootloaderState::Done as u32);
        log::info!(
            "package2 loaded, generation {} encrypted {}",
            verified.key_generation,
            verified.encrypted
        );

        Ok(LoadedPackage2 {
            entrypoint: verified.meta.entrypoint(),
            key_generation: verified.key_generation,
            encrypted: verified.encrypted,
            package2_hash,
        })
    }
}
