/*++

Licensed under the Apache-2.0 license.

File Name:

    boot_flow.rs

Abstract:

    File contains the end-to-end cold boot test: key setup, generation
    detection, package2 verification, and payload placement, driven
    entirely through the public API.

--*/

use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use secmon_boot::{
    initialize_keys, DeviceMasterKeyVectors, LoadedPackage2, MasterKeyVectors, Package2Loader,
    PACKAGE2_KEY_SOURCE, SYSTEM_COUNTER_FREQUENCY_HZ,
};
use secmon_common::{
    BootloaderState, MonitorConfiguration, SecureMonitorParameters, WrappedKeyStore, AesKey,
    KEY_GENERATION_COUNT, KEY_SLOT_MASTER, KEY_SLOT_SECURE_BOOT,
};
use secmon_drivers::{SecurityEngine, AES_BLOCK_SIZE, AES_KEY_SIZE, RSA_2048_BYTE_SIZE};
use secmon_pkg2_types::{
    BootConfig, Package2Header, Package2Meta, PACKAGE2_HEADER_BYTE_SIZE, PACKAGE2_MAGIC,
};
use secmon_pkg2_verify::VersionPolicy;
use zerocopy::AsBytes;

const DRAM_BASE: u32 = 0x0800_0000;
const GENERATION: usize = 7;

/// ECB-encrypt one block under a raw key, via a scratch engine.
fn encrypt_under(key: &AesKey, block: &[u8; AES_BLOCK_SIZE]) -> [u8; AES_BLOCK_SIZE] {
    let mut se = SecurityEngine::new([0u8; 32]);
    se.set_aes_key(0, key).unwrap();
    se.encrypt_block(0, block).unwrap()
}

fn master_keys(seed: u8) -> [AesKey; KEY_GENERATION_COUNT] {
    let mut keys = [[0u8; AES_KEY_SIZE]; KEY_GENERATION_COUNT];
    for (g, key) in keys.iter_mut().enumerate() {
        key.fill(seed.wrapping_add(g as u8).wrapping_mul(13) | 1);
    }
    keys
}

fn master_vectors(keys: &[AesKey; KEY_GENERATION_COUNT]) -> MasterKeyVectors {
    let mut vectors = [[0u8; AES_KEY_SIZE]; KEY_GENERATION_COUNT];
    vectors[0] = encrypt_under(&keys[0], &[0u8; AES_BLOCK_SIZE]);
    for g in 1..KEY_GENERATION_COUNT {
        vectors[g] = encrypt_under(&keys[g], &keys[g - 1]);
    }
    MasterKeyVectors { vectors }
}

fn device_master_vectors(secure_boot_key: &AesKey) -> DeviceMasterKeyVectors {
    let keks = master_keys(0x90);
    let keys = master_keys(0xB0);
    let mut kek_sources = [[0u8; AES_KEY_SIZE]; KEY_GENERATION_COUNT];
    let mut key_sources = [[0u8; AES_KEY_SIZE]; KEY_GENERATION_COUNT];
    for g in 0..KEY_GENERATION_COUNT {
        kek_sources[g] = encrypt_under(secure_boot_key, &keks[g]);
        key_sources[g] = encrypt_under(&keks[g], &keys[g]);
    }
    DeviceMasterKeyVectors {
        kek_sources,
        key_sources,
    }
}

fn keypair() -> (RsaPrivateKey, [u8; RSA_2048_BYTE_SIZE]) {
    let mut rng = ChaCha20Rng::from_seed([0x61u8; 32]);
    let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let n = private.n().to_bytes_be();
    let mut modulus = [0u8; RSA_2048_BYTE_SIZE];
    modulus[RSA_2048_BYTE_SIZE - n.len()..].copy_from_slice(&n);
    (private, modulus)
}

/// Build a signed, encrypted container carrying one payload, keyed for
/// `generation`.
fn build_container(
    master_key: &AesKey,
    private: &RsaPrivateKey,
    payload: &[u8],
    generation: usize,
) -> Vec<u8> {
    let mut scratch = SecurityEngine::new([0u8; 32]);
    scratch.set_aes_key(0, master_key).unwrap();
    let package2_key = scratch.decrypt_block(0, &PACKAGE2_KEY_SOURCE).unwrap();
    scratch.set_aes_key(0, &package2_key).unwrap();

    let mut meta = Package2Meta::default();
    meta.set_magic(PACKAGE2_MAGIC);
    meta.set_package2_version(1);
    meta.set_bootloader_version(0);
    meta.set_payload_sizes([payload.len() as u32, 0, 0]);
    meta.set_payload_offsets([DRAM_BASE, 0, 0]);
    meta.set_entrypoint(DRAM_BASE);
    meta.encode_iv(
        (PACKAGE2_HEADER_BYTE_SIZE + payload.len()) as u32,
        generation as u8,
    );

    let iv0 = meta.payload_ivs()[0];
    let mut enc_payload = vec![0u8; payload.len()];
    scratch.crypt_ctr(0, &iv0, payload, &mut enc_payload).unwrap();

    let mut hashes = *meta.payload_hashes();
    hashes[0] = scratch.sha256(&enc_payload);
    meta.set_payload_hashes(hashes);

    let range = Package2Meta::encrypted_range();
    let iv = *meta.iv();
    let src = meta.as_bytes()[range.clone()].to_vec();
    let mut enc_meta = meta;
    scratch
        .crypt_ctr(0, &iv, &src, &mut enc_meta.as_bytes_mut()[range])
        .unwrap();

    let mut rng = ChaCha20Rng::from_seed([0x62u8; 32]);
    let signer = BlindedSigningKey::<sha2::Sha256>::new_with_salt_len(private.clone(), 32);
    let sig = signer.sign_with_rng(&mut rng, enc_meta.as_bytes()).to_vec();
    let mut signature = [0u8; RSA_2048_BYTE_SIZE];
    signature[RSA_2048_BYTE_SIZE - sig.len()..].copy_from_slice(&sig);

    let mut header = Package2Header::default();
    header.set_signature(signature);
    header.set_meta(enc_meta);

    let mut container = header.as_bytes().to_vec();
    container.extend_from_slice(&enc_payload);
    container
}

#[test]
fn test_cold_boot_to_loaded_package2() {
    let keys = master_keys(0x24);
    let vectors = master_vectors(&keys);
    let secure_boot_key = [0xD4u8; AES_KEY_SIZE];
    let device_vectors = device_master_vectors(&secure_boot_key);
    let (private, modulus) = keypair();

    // The boot stub leaves the current master key and the fused secure
    // boot key in their slots.
    let mut se = SecurityEngine::new([0x77u8; 32]);
    se.set_aes_key(KEY_SLOT_MASTER, &keys[GENERATION]).unwrap();
    se.set_aes_key(KEY_SLOT_SECURE_BOOT, &secure_boot_key).unwrap();

    let mut store = WrappedKeyStore::new();
    let generation = initialize_keys(
        &mut se,
        &mut store,
        &vectors,
        &device_vectors,
        SYSTEM_COUNTER_FREQUENCY_HZ,
    )
    .unwrap();
    assert_eq!(generation, GENERATION);

    let payload: Vec<u8> = (0u8..=255).cycle().take(256).collect();
    let container = build_container(&keys[GENERATION], &private, &payload, GENERATION);

    let loader = Package2Loader::new(
        VersionPolicy {
            min_package2_version: 0,
            max_bootloader_version: 4,
        },
        modulus,
        [0u8; RSA_2048_BYTE_SIZE],
        DRAM_BASE,
    );

    let mut params = SecureMonitorParameters::new();
    params.set_bootloader_state(BootloaderState::LoadedPackage2);
    let mut bootconfig = BootConfig::default();
    let mut dram = vec![0u8; 0x1000];

    let loaded: LoadedPackage2 = loader
        .load(
            &mut se,
            &mut store,
            &MonitorConfiguration::development(),
            generation,
            &mut params,
            &mut bootconfig,
            &[0u8; 16],
            &container,
            &mut dram,
        )
        .unwrap();

    assert_eq!(loaded.entrypoint, DRAM_BASE);
    assert_eq!(loaded.key_generation, GENERATION);
    assert!(loaded.encrypted);
    assert_eq!(&dram[..payload.len()], &payload[..]);
    assert_eq!(params.secmon_state(), BootloaderState::Done as u32);
}

#[test]
fn test_production_boot_ignores_boot_config() {
    let keys = master_keys(0x24);
    let vectors = master_vectors(&keys);
    let secure_boot_key = [0xD4u8; AES_KEY_SIZE];
    let device_vectors = device_master_vectors(&secure_boot_key);
    let (private, modulus) = keypair();

    let mut se = SecurityEngine::new([0x79u8; 32]);
    se.set_aes_key(KEY_SLOT_MASTER, &keys[GENERATION]).unwrap();
    se.set_aes_key(KEY_SLOT_SECURE_BOOT, &secure_boot_key).unwrap();
    let mut store = WrappedKeyStore::new();
    initialize_keys(
        &mut se,
        &mut store,
        &vectors,
        &device_vectors,
        SYSTEM_COUNTER_FREQUENCY_HZ,
    )
    .unwrap();

    let payload = [0x5Au8; 64];
    let container = build_container(&keys[GENERATION], &private, &payload, GENERATION);
    let loader = Package2Loader::new(
        VersionPolicy {
            min_package2_version: 0,
            max_bootloader_version: 4,
        },
        modulus,
        [0u8; RSA_2048_BYTE_SIZE],
        DRAM_BASE,
    );

    let mut params = SecureMonitorParameters::new();
    params.set_bootloader_state(BootloaderState::LoadedPackage2);
    // A config claiming both escape hatches; retail never honors it.
    let mut bootconfig = BootConfig::default();
    bootconfig.signed_data_mut().set_flags0(0x3);
    let mut dram = vec![0u8; 0x1000];

    loader
        .load(
            &mut se,
            &mut store,
            &MonitorConfiguration::production(),
            GENERATION,
            &mut params,
            &mut bootconfig,
            &[0u8; 16],
            &container,
            &mut dram,
        )
        .unwrap();
    assert!(!bootconfig.signed_data().is_package2_signature_disabled());
    assert_eq!(&dram[..64], &payload[..]);
}
