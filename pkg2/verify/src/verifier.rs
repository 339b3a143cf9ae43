/*++

Licensed under the Apache-2.0 license.

File Name:

    verifier.rs

Abstract:

    File contains the staged package2 verification pipeline: header
    signature, metadata decryption, structural validation, version window,
    per-payload hashes, and the decrypt-or-copy load step.

--*/

use secmon_error::{MonitorError, MonitorResult};
use secmon_pkg2_types::{
    Package2Header, Package2Meta, PACKAGE2_HEADER_BYTE_SIZE, PACKAGE2_MAGIC,
    PACKAGE2_PAYLOAD_ALIGNMENT, PACKAGE2_PAYLOAD_COUNT, PACKAGE2_SIZE_MAX,
    SHA_256_HASH_BYTE_SIZE,
};
use zerocopy::AsBytes;

/// Environment the verifier runs against.
///
/// The pipeline owns the checking logic; the environment owns the crypto
/// and the key material.
pub trait Package2VerificationEnv {
    /// Verify the header signature over the metadata bytes.
    fn verify_header_signature(&mut self, signature: &[u8; 256], meta_bytes: &[u8]) -> bool;

    /// CTR-transform `src` into `dst` under the package2 key for
    /// `generation`.
    fn crypt_with_package2_key(
        &mut self,
        generation: usize,
        iv: &[u8; 16],
        src: &[u8],
        dst: &mut [u8],
    ) -> MonitorResult<()>;

    /// SHA-256 over `data`.
    fn sha256(&mut self, data: &[u8]) -> [u8; SHA_256_HASH_BYTE_SIZE];

    /// The highest key generation derivable on this device.
    fn current_key_generation(&self) -> usize;
}

/// Accepted version window for the container.
#[derive(Debug, Clone, Copy)]
pub struct VersionPolicy {
    /// Smallest accepted package2 format version.
    pub min_package2_version: u8,
    /// Largest accepted required-bootloader version.
    pub max_bootloader_version: u8,
}

/// Result of header verification, carried into the load step.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPackage2 {
    /// Decrypted, validated metadata.
    pub meta: Package2Meta,
    /// Generation whose package2 key decrypted the metadata.
    pub key_generation: usize,
    /// False when the development plaintext escape hatch was taken.
    pub encrypted: bool,
}

/// Package2 verification pipeline. Every stage is fatal on failure; the
/// error code records which stage rejected the container.
pub struct Package2Verifier<Env: Package2VerificationEnv> {
    env: Env,
    policy: VersionPolicy,
}

impl<Env: Package2VerificationEnv> Package2Verifier<Env> {
    pub fn new(env: Env, policy: VersionPolicy) -> Self {
        Self { env, policy }
    }

    pub fn into_env(self) -> Env {
        self.env
    }

    /// Run the header stages: signature, metadata decrypt, structural
    /// validation, version window.
    ///
    /// `signature_disabled` and `encryption_disabled` come from the boot
    /// config; the caller has already refused to honor them on production
    /// hardware.
    pub fn verify_header(
        &mut self,
        header: &Package2Header,
        signature_disabled: bool,
        encryption_disabled: bool,
    ) -> MonitorResult<VerifiedPackage2> {
        self.verify_signature(header, signature_disabled)?;
        let verified = self.decrypt_and_validate_meta(header, encryption_disabled)?;
        self.verify_versions(&verified.meta)?;
        Ok(verified)
    }

    /// Stage 1: header signature. The plaintext escape hatch requires both
    /// the config bit and a structurally all-zero signature.
    fn verify_signature(
        &mut self,
        header: &Package2Header,
        signature_disabled: bool,
    ) -> MonitorResult<()> {
        if signature_disabled && header.is_signature_zero() {
            return Ok(());
        }
        if self
            .env
            .verify_header_signature(header.signature(), header.meta().as_bytes())
        {
            Ok(())
        } else {
            Err(MonitorError::PKG2_HEADER_SIGNATURE_INVALID)
        }
    }

    /// Stage 2 + 3: metadata decrypt and structural validation.
    ///
    /// The key generation rides in the cleartext IV, but nothing else in
    /// the header is trusted yet, so the generation is confirmed by trial
    /// decryption from generation 0 upward; the first candidate whose
    /// decryption validates structurally wins.
    fn decrypt_and_validate_meta(
        &mut self,
        header: &Package2Header,
        encryption_disabled: bool,
    ) -> MonitorResult<VerifiedPackage2> {
        let meta = header.meta();

        if encryption_disabled && meta.magic() == PACKAGE2_MAGIC {
            if !Self::is_meta_valid(meta) {
                return Err(MonitorError::PKG2_META_INVALID);
            }
            return Ok(VerifiedPackage2 {
                meta: *meta,
                key_generation: 0,
                encrypted: false,
            });
        }

        let encrypted_range = Package2Meta::encrypted_range();
        for generation in 0..=self.env.current_key_generation() {
            let mut candidate = *meta;
            self.env.crypt_with_package2_key(
                generation,
                meta.iv(),
                &meta.as_bytes()[encrypted_range.clone()],
                &mut candidate.as_bytes_mut()[encrypted_range.clone()],
            )?;
            if Self::is_meta_valid(&candidate) {
                return Ok(VerifiedPackage2 {
                    meta: candidate,
                    key_generation: generation,
                    encrypted: true,
                });
            }
        }
        Err(MonitorError::PKG2_META_NOT_DECRYPTABLE)
    }

    /// Structural validation of decrypted metadata.
    pub fn is_meta_valid(meta: &Package2Meta) -> bool {
        if meta.magic() != PACKAGE2_MAGIC {
            return false;
        }

        let size = meta.size();
        if size <= PACKAGE2_HEADER_BYTE_SIZE as u32 || size > PACKAGE2_SIZE_MAX {
            return false;
        }

        if meta.entrypoint() % PACKAGE2_PAYLOAD_ALIGNMENT != 0 {
            return false;
        }

        // Total size must account for every payload plus the header.
        let mut total = PACKAGE2_HEADER_BYTE_SIZE as u32;
        for &payload_size in meta.payload_sizes() {
            total = match total.checked_add(payload_size) {
                Some(total) => total,
                None => return false,
            };
        }
        if total != size {
            return false;
        }

        let mut entrypoint_found = false;
        for i in 0..PACKAGE2_PAYLOAD_COUNT {
            let payload_size = meta.payload_sizes()[i];
            let offset = meta.payload_offsets()[i];

            if payload_size % PACKAGE2_PAYLOAD_ALIGNMENT != 0
                || offset % PACKAGE2_PAYLOAD_ALIGNMENT != 0
            {
                return false;
            }
            let end = match offset.checked_add(payload_size) {
                Some(end) => end,
                None => return false,
            };
            if payload_size == 0 {
                continue;
            }

            // Payload target ranges must not overlap.
            for j in i + 1..PACKAGE2_PAYLOAD_COUNT {
                let other_size = meta.payload_sizes()[j];
                let other = meta.payload_offsets()[j];
                if other_size == 0 {
                    continue;
                }
                let other_end = match other.checked_add(other_size) {
                    Some(other_end) => other_end,
                    None => return false,
                };
                if offset < other_end && other < end {
                    return false;
                }
            }

            if (offset..end).contains(&meta.entrypoint()) {
                entrypoint_found = true;
            }
        }

        entrypoint_found
    }

    /// Stage 4: version window.
    fn verify_versions(&self, meta: &Package2Meta) -> MonitorResult<()> {
        if meta.bootloader_version() > self.policy.max_bootloader_version
            || meta.package2_version() < self.policy.min_package2_version
        {
            return Err(MonitorError::PKG2_VERSION_INVALID);
        }
        Ok(())
    }

    /// Stage 5: per-payload hashes over the container's payload bytes.
    /// An all-zero hash field skips verification for that payload.
    pub fn verify_payload_hashes(
        &mut self,
        verified: &VerifiedPackage2,
        container: &[u8],
    ) -> MonitorResult<()> {
        for i in 0..PACKAGE2_PAYLOAD_COUNT {
            let expected = &verified.meta.payload_hashes()[i];
            if expected.iter().all(|&b| b == 0) {
                continue;
            }
            let payload = Self::payload_bytes(&verified.meta, container, i)?;
            let digest = self.env.sha256(payload);
            if digest != *expected {
                return Err(MonitorError::PKG2_PAYLOAD_HASH_INVALID);
            }
        }
        Ok(())
    }

    /// Stage 6: place payload `idx` into its final destination,
    /// CTR-decrypted under its own IV when the container is encrypted,
    /// plain-copied otherwise.
    pub fn load_payload(
        &mut self,
        verified: &VerifiedPackage2,
        container: &[u8],
        idx: usize,
        dst: &mut [u8],
    ) -> MonitorResult<()> {
        let payload = Self::payload_bytes(&verified.meta, container, idx)?;
        if dst.len() != payload.len() {
            return Err(MonitorError::PKG2_LOAD_DESTINATION_INVALID);
        }
        if verified.encrypted {
            let iv = verified.meta.payload_ivs()[idx];
            self.env
                .crypt_with_package2_key(verified.key_generation, &iv, payload, dst)?;
        } else {
            dst.copy_from_slice(payload);
        }
        Ok(())
    }

    fn payload_bytes<'a>(
        meta: &Package2Meta,
        container: &'a [u8],
        idx: usize,
    ) -> MonitorResult<&'a [u8]> {
        let range = meta.payload_range(idx);
        container
            .get(range.start as usize..range.end as usize)
            .ok_or(MonitorError::PKG2_META_INVALID)
    }
}
