/*++

Licensed under the Apache-2.0 license.

File Name:

    pss.rs

Abstract:

    File contains RSA-2048-PSS/SHA-256 signature verification and plain
    hash verification on top of the security engine.

--*/

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::security_engine::{SecurityEngine, RSA_2048_BYTE_SIZE, SHA_256_HASH_SIZE};

// RSA-2048 with SHA-256 and a 32-byte salt. The modulus top bit is always
// set, so the encoded message is one bit short of the modulus.
const EM_BITS: usize = 2047;
const EM_LEN: usize = RSA_2048_BYTE_SIZE;
const SALT_LEN: usize = SHA_256_HASH_SIZE;
const DB_LEN: usize = EM_LEN - SHA_256_HASH_SIZE - 1;
const PAD_LEN: usize = DB_LEN - SALT_LEN - 1;
const TRAILER: u8 = 0xBC;

/// The fixed public exponent used for every signature-verification key.
pub const PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

/// Verify an RSA-2048-PSS/SHA-256 signature over `msg`.
///
/// The exponentiation runs through the engine RSA slot; the PSS decode runs
/// in software and accumulates validity bitwise so that a malformed encoded
/// message takes the same path as a well-formed one.
pub fn verify_signature(
    se: &mut SecurityEngine,
    rsa_slot: usize,
    signature: &[u8; RSA_2048_BYTE_SIZE],
    modulus: &[u8; RSA_2048_BYTE_SIZE],
    msg: &[u8],
) -> bool {
    if se.set_rsa_key(rsa_slot, modulus, &PUBLIC_EXPONENT).is_err() {
        return false;
    }
    let em = match se.exp_mod(rsa_slot, signature) {
        Ok(em) => em,
        Err(_) => return false,
    };

    let mut invalid = 0u8;

    // Trailer byte and the bits beyond EmBits.
    invalid |= em[EM_LEN - 1] ^ TRAILER;
    invalid |= em[0] & !(0xFFu8 >> (8 * EM_LEN - EM_BITS));

    // Unmask DB = PS || 0x01 || salt with MGF1 keyed by H.
    let h = &em[DB_LEN..EM_LEN - 1];
    let mut db = [0u8; DB_LEN];
    mgf1(h, &mut db);
    for (d, m) in db.iter_mut().zip(em.iter()) {
        *d ^= m;
    }
    db[0] &= 0xFFu8 >> (8 * EM_LEN - EM_BITS);

    for &b in db[..PAD_LEN].iter() {
        invalid |= b;
    }
    invalid |= db[PAD_LEN] ^ 0x01;
    let salt = &db[PAD_LEN + 1..];

    // H' = SHA-256(0^8 || SHA-256(msg) || salt)
    let m_hash: [u8; SHA_256_HASH_SIZE] = Sha256::digest(msg).into();
    let mut hasher = Sha256::new();
    hasher.update([0u8; 8]);
    hasher.update(m_hash);
    hasher.update(salt);
    let h_prime: [u8; SHA_256_HASH_SIZE] = hasher.finalize().into();

    let hashes_match: bool = h_prime.ct_eq(h).into();
    invalid == 0 && hashes_match
}

/// Verify a plain SHA-256 hash. A zero-length message is trivially valid.
pub fn verify_hash(se: &mut SecurityEngine, expected: &[u8; SHA_256_HASH_SIZE], msg: &[u8]) -> bool {
    if msg.is_empty() {
        return true;
    }
    let digest = se.sha256(msg);
    digest.ct_eq(expected).into()
}

/// MGF1-SHA256: fill `mask` from successive digests of `seed || counter`.
fn mgf1(seed: &[u8], mask: &mut [u8]) {
    let mut counter: u32 = 0;
    for chunk in mask.chunks_mut(SHA_256_HASH_SIZE) {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        let digest = hasher.finalize();
        chunk.copy_from_slice(&digest[..chunk.len()]);
        counter += 1;
    }
}
