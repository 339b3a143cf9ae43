/*++

Licensed under the Apache-2.0 license.

File Name:

    device_unique.rs

Abstract:

    File contains the device-unique data handlers: authenticated
    decryption of data bound to this device's id, RSA key import with a
    round-trip self test, re-encryption with updated bookkeeping, and the
    legacy secure-data accessor.

--*/

use subtle::ConstantTimeEq;

use secmon_common::{
    KEY_SLOT_DEVICE, KEY_SLOT_RANDOM_FOR_USER_WRAP, KEY_SLOT_SEAL, RSA_KEY_SLOT_RUNTIME, RsaKeyId,
};
use secmon_drivers::{AES_BLOCK_SIZE, AES_KEY_SIZE, RSA_2048_BYTE_SIZE};
use secmon_error::MonitorResult;

use crate::context::Monitor;
use crate::mapper::{PageMapper, SmcMemory, SmcUserPage};
use crate::result::SmcResult;
use crate::rsa::rsa_key_id;
use crate::{key_from_registers, SmcArguments};

/// Device-unique data envelope: IV, ciphertext, trailing GMAC. The
/// ciphertext decrypts to the payload followed by a 16-byte id block
/// (device id little-endian, then zero padding).
const ENVELOPE_IV_SIZE: usize = 16;
const ENVELOPE_MAC_SIZE: usize = 16;
const ENVELOPE_ID_BLOCK_SIZE: usize = 16;
const ENVELOPE_OVERHEAD: usize = ENVELOPE_IV_SIZE + ENVELOPE_MAC_SIZE + ENVELOPE_ID_BLOCK_SIZE;

const DEVICE_UNIQUE_DATA_MIN_SIZE: usize = 0x30;
const DEVICE_UNIQUE_DATA_MAX_SIZE: usize = 0x300;

/// Imported RSA key payload: private exponent then modulus.
const RSA_IMPORT_PAYLOAD_SIZE: usize = 2 * RSA_2048_BYTE_SIZE;

const PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

/// Per-selector tweaks for the legacy secure-data accessor.
const SECURE_DATA_TWEAKS: [[u8; AES_BLOCK_SIZE]; 3] = [
    [
        0x1E, 0x51, 0x2C, 0xAB, 0x66, 0x33, 0x5C, 0x68, 0x9D, 0x3A, 0x97, 0xE4, 0x75, 0x2B,
        0x40, 0x7C,
    ],
    [
        0xBD, 0xC0, 0x58, 0xFF, 0x21, 0xA1, 0x91, 0x2E, 0x0F, 0x9E, 0xDD, 0x6C, 0x64, 0xD2,
        0x08, 0x3A,
    ],
    [
        0x86, 0x67, 0x74, 0x4A, 0x33, 0xEA, 0x1F, 0xC6, 0x9C, 0xC4, 0x0E, 0x49, 0x82, 0x16,
        0x5A, 0xD6,
    ],
];

const SECURE_DATA_SIZE: usize = 0x10;

/// What to do with a validated payload.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PayloadDisposition {
    /// Write the plaintext payload back to the caller buffer.
    Plain,
    /// Import the payload as a device-unique RSA key.
    ImportRsaKey(RsaKeyId),
}

fn unseal_kek<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    access_key: &[u8; AES_KEY_SIZE],
) -> MonitorResult<()> {
    ctx.se
        .set_encrypted_aes_key(KEY_SLOT_SEAL, KEY_SLOT_RANDOM_FOR_USER_WRAP, access_key)
}

/// Decrypt an envelope in place and validate the MAC and the device id
/// binding. Both checks run before either verdict is acted on. On success
/// `buf[ENVELOPE_IV_SIZE..][..payload_len]` holds the plaintext payload.
fn decrypt_and_validate<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    buf: &mut [u8],
) -> Result<usize, SmcResult> {
    let size = buf.len();
    let (head, mac) = buf.split_at_mut(size - ENVELOPE_MAC_SIZE);
    let (iv, ciphertext) = head.split_at_mut(ENVELOPE_IV_SIZE);

    let mut iv_block = [0u8; AES_BLOCK_SIZE];
    iv_block.copy_from_slice(iv);
    let mut plaintext = [0u8; DEVICE_UNIQUE_DATA_MAX_SIZE];
    let plaintext = &mut plaintext[..ciphertext.len()];
    ctx.se
        .crypt_ctr(KEY_SLOT_SEAL, &iv_block, ciphertext, plaintext)
        .map_err(SmcResult::from_error)?;

    let mut gmac_iv = [0u8; 12];
    gmac_iv.copy_from_slice(&iv_block[..12]);
    let computed = ctx
        .se
        .compute_gmac(KEY_SLOT_SEAL, &gmac_iv, plaintext)
        .map_err(SmcResult::from_error)?;
    let mac_ok = bool::from(computed.ct_eq(mac));

    let id_block = &plaintext[plaintext.len() - ENVELOPE_ID_BLOCK_SIZE..];
    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&id_block[..8]);
    let device_id = u64::from_le_bytes(id_bytes);
    let id_ok = device_id & 0x00FF_FFFF_FFFF_FFFF == ctx.config.device_id_low()
        && id_block[8..].iter().all(|&b| b == 0);

    if !(mac_ok && id_ok) {
        return Err(SmcResult::InvalidArgument);
    }

    let payload_len = plaintext.len() - ENVELOPE_ID_BLOCK_SIZE;
    ciphertext[..payload_len].copy_from_slice(&plaintext[..payload_len]);
    Ok(payload_len)
}

/// Import an RSA key payload and run the public/private round-trip self
/// test before committing the modulus.
fn import_rsa_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    id: RsaKeyId,
    payload: &[u8],
) -> Result<(), SmcResult> {
    if payload.len() != RSA_IMPORT_PAYLOAD_SIZE {
        return Err(SmcResult::InvalidArgument);
    }
    let mut exponent = [0u8; RSA_2048_BYTE_SIZE];
    exponent.copy_from_slice(&payload[..RSA_2048_BYTE_SIZE]);
    let mut modulus = [0u8; RSA_2048_BYTE_SIZE];
    modulus.copy_from_slice(&payload[RSA_2048_BYTE_SIZE..]);

    ctx.rsa_keys.import_exponent(id, &exponent);
    ctx.rsa_keys.import_modulus(id, &modulus);

    // Round-trip self test: a value signed with the private exponent must
    // come back out under the public one.
    let mut probe = [0u8; RSA_2048_BYTE_SIZE];
    ctx.se
        .generate_random(&mut probe[RSA_2048_BYTE_SIZE - AES_KEY_SIZE..]);
    let round_trip = ctx
        .se
        .set_rsa_key(RSA_KEY_SLOT_RUNTIME, &modulus, &exponent)
        .and_then(|()| ctx.se.exp_mod(RSA_KEY_SLOT_RUNTIME, &probe))
        .and_then(|signed| {
            ctx.se
                .set_rsa_key(RSA_KEY_SLOT_RUNTIME, &modulus, &PUBLIC_EXPONENT)?;
            ctx.se.exp_mod(RSA_KEY_SLOT_RUNTIME, &signed)
        })
        .map_err(SmcResult::from_error)?;

    if round_trip != probe {
        return Err(SmcResult::InvalidArgument);
    }
    ctx.rsa_keys
        .commit_modulus(id)
        .map_err(SmcResult::from_error)
}

fn decrypt_with_disposition<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
    disposition: PayloadDisposition,
) -> u64 {
    let access_key = key_from_registers(args.0[1], args.0[2]);
    let addr = args.0[3];
    let size = args.0[4] as usize;

    if !(DEVICE_UNIQUE_DATA_MIN_SIZE..=DEVICE_UNIQUE_DATA_MAX_SIZE).contains(&size) {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        let result = (|| {
            unseal_kek(ctx, &access_key).map_err(SmcResult::from_error)?;
            let mut buf = [0u8; DEVICE_UNIQUE_DATA_MAX_SIZE];
            if !SmcUserPage::copy_from(&ctx.windows, &ctx.memory, addr, &mut buf[..size]) {
                return Err(SmcResult::InvalidArgument);
            }
            let payload_len = decrypt_and_validate(ctx, &mut buf[..size])?;
            let payload_start = ENVELOPE_IV_SIZE;
            match disposition {
                PayloadDisposition::Plain => {
                    let payload = &buf[payload_start..payload_start + payload_len];
                    if !SmcUserPage::copy_to(&ctx.windows, &mut ctx.memory, addr, payload) {
                        return Err(SmcResult::InvalidArgument);
                    }
                    Ok(payload_len as u64)
                }
                PayloadDisposition::ImportRsaKey(id) => {
                    import_rsa_key(ctx, id, &buf[payload_start..payload_start + payload_len])?;
                    Ok(0)
                }
            }
        })();
        let _ = ctx.se.clear_aes_key(KEY_SLOT_SEAL);
        match result {
            Ok(out) => {
                args.0[1] = out;
                SmcResult::Success
            }
            Err(result) => result,
        }
    })
    .into()
}

/// DecryptDeviceUniqueData: modern entry with a caller-selected
/// disposition in the mode argument.
pub(crate) fn decrypt_device_unique_data<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let mode = args.0[5];
    let disposition = if mode == 0 {
        PayloadDisposition::Plain
    } else {
        match rsa_key_id(mode - 1) {
            Some(id) => PayloadDisposition::ImportRsaKey(id),
            None => return SmcResult::InvalidArgument.into(),
        }
    };
    decrypt_with_disposition(ctx, args, disposition)
}

/// Legacy pre-5.0.0 entry: import the ES device key.
pub(crate) fn decrypt_and_import_es_device_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    decrypt_with_disposition(ctx, args, PayloadDisposition::ImportRsaKey(RsaKeyId::EsDrmCert))
}

/// Legacy pre-5.0.0 entry: import the Lotus key.
pub(crate) fn decrypt_and_import_lotus_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    decrypt_with_disposition(ctx, args, PayloadDisposition::ImportRsaKey(RsaKeyId::Lotus))
}

/// ReencryptDeviceUniqueData: validate an envelope, then write it back
/// re-encrypted under a fresh IV with an updated device-id high byte.
pub(crate) fn reencrypt_device_unique_data<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let access_key = key_from_registers(args.0[1], args.0[2]);
    let addr = args.0[3];
    let size = args.0[4] as usize;
    let new_high_byte = args.0[5];

    if !(DEVICE_UNIQUE_DATA_MIN_SIZE..=DEVICE_UNIQUE_DATA_MAX_SIZE).contains(&size) {
        return SmcResult::InvalidArgument.into();
    }
    if new_high_byte > 0xFF {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        let result = (|| {
            unseal_kek(ctx, &access_key).map_err(SmcResult::from_error)?;
            let mut buf = [0u8; DEVICE_UNIQUE_DATA_MAX_SIZE];
            if !SmcUserPage::copy_from(&ctx.windows, &ctx.memory, addr, &mut buf[..size]) {
                return Err(SmcResult::InvalidArgument);
            }
            let payload_len = decrypt_and_validate(ctx, &mut buf[..size])?;

            // Rebuild the plaintext with the updated bookkeeping byte.
            let mut plaintext = [0u8; DEVICE_UNIQUE_DATA_MAX_SIZE];
            let plaintext_len = payload_len + ENVELOPE_ID_BLOCK_SIZE;
            plaintext[..payload_len]
                .copy_from_slice(&buf[ENVELOPE_IV_SIZE..ENVELOPE_IV_SIZE + payload_len]);
            let device_id = ctx.config.device_id_low() | (new_high_byte << 56);
            plaintext[payload_len..payload_len + 8].copy_from_slice(&device_id.to_le_bytes());

            let mut envelope = [0u8; DEVICE_UNIQUE_DATA_MAX_SIZE];
            let mut iv = [0u8; AES_BLOCK_SIZE];
            ctx.se.generate_random(&mut iv);
            envelope[..ENVELOPE_IV_SIZE].copy_from_slice(&iv);
            ctx.se
                .crypt_ctr(
                    KEY_SLOT_SEAL,
                    &iv,
                    &plaintext[..plaintext_len],
                    &mut envelope[ENVELOPE_IV_SIZE..ENVELOPE_IV_SIZE + plaintext_len],
                )
                .map_err(SmcResult::from_error)?;

            let mut gmac_iv = [0u8; 12];
            gmac_iv.copy_from_slice(&iv[..12]);
            let mac = ctx
                .se
                .compute_gmac(KEY_SLOT_SEAL, &gmac_iv, &plaintext[..plaintext_len])
                .map_err(SmcResult::from_error)?;
            envelope[size - ENVELOPE_MAC_SIZE..size].copy_from_slice(&mac);

            if !SmcUserPage::copy_to(&ctx.windows, &mut ctx.memory, addr, &envelope[..size]) {
                return Err(SmcResult::InvalidArgument);
            }
            Ok(())
        })();
        let _ = ctx.se.clear_aes_key(KEY_SLOT_SEAL);
        match result {
            Ok(()) => SmcResult::Success,
            Err(result) => result,
        }
    })
    .into()
}

/// GetSecureData: legacy accessor deriving a small per-selector secret
/// from the fused device key. Refused on production units.
pub(crate) fn get_secure_data<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let which = args.0[1] as usize;
    let addr = args.0[2];

    if ctx.config.is_production {
        return SmcResult::NotPermitted.into();
    }
    if which >= SECURE_DATA_TWEAKS.len() {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        let mut data = [0u8; SECURE_DATA_SIZE];
        if let Err(err) =
            ctx.se
                .crypt_ctr(KEY_SLOT_DEVICE, &SECURE_DATA_TWEAKS[which], &[0u8; SECURE_DATA_SIZE], &mut data)
        {
            return SmcResult::from_error(err);
        }
        if !SmcUserPage::copy_to(&ctx.windows, &mut ctx.memory, addr, &data) {
            return SmcResult::InvalidArgument;
        }
        SmcResult::Success
    })
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_monitor;
    use crate::mapper::test_memory::FlatMemory;

    const KEK: [u8; 16] = [0x42; 16];
    const RANDOM_WRAP_KEY: [u8; 16] = [0x77; 16];

    /// Seal KEK under the per-boot random wrap key so the handler can
    /// unseal it, and build a valid envelope for `payload`.
    fn setup(ctx: &mut Monitor<FlatMemory>, payload: &[u8]) -> (u64, u64, Vec<u8>) {
        ctx.se
            .set_aes_key(KEY_SLOT_RANDOM_FOR_USER_WRAP, &RANDOM_WRAP_KEY)
            .unwrap();
        let access_key = ctx.se.encrypt_block(KEY_SLOT_RANDOM_FOR_USER_WRAP, &KEK).unwrap();

        let mut plaintext = payload.to_vec();
        let mut id_block = [0u8; ENVELOPE_ID_BLOCK_SIZE];
        id_block[..8].copy_from_slice(&ctx.config.device_id.to_le_bytes());
        plaintext.extend_from_slice(&id_block);

        let iv = [0xA1u8; AES_BLOCK_SIZE];
        ctx.se.set_aes_key(0, &KEK).unwrap();
        let mut ciphertext = vec![0u8; plaintext.len()];
        ctx.se.crypt_ctr(0, &iv, &plaintext, &mut ciphertext).unwrap();
        let mut gmac_iv = [0u8; 12];
        gmac_iv.copy_from_slice(&iv[..12]);
        let mac = ctx.se.compute_gmac(0, &gmac_iv, &plaintext).unwrap();
        ctx.se.clear_aes_key(0).unwrap();

        let mut envelope = iv.to_vec();
        envelope.extend_from_slice(&ciphertext);
        envelope.extend_from_slice(&mac);

        let (lo, hi) = crate::key_to_registers(&access_key);
        (lo, hi, envelope)
    }

    #[test]
    fn test_decrypt_plain_round_trip() {
        let mut ctx = test_monitor();
        let payload = [0x5Au8; 0x40];
        let (lo, hi, envelope) = setup(&mut ctx, &payload);
        let addr = ctx.memory.base;
        ctx.memory.bytes[..envelope.len()].copy_from_slice(&envelope);

        let mut args = SmcArguments::default();
        args.0[1] = lo;
        args.0[2] = hi;
        args.0[3] = addr;
        args.0[4] = envelope.len() as u64;
        args.0[5] = 0;
        assert_eq!(
            decrypt_device_unique_data(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        assert_eq!(args.0[1], payload.len() as u64);
        assert_eq!(&ctx.memory.bytes[..payload.len()], &payload);
        assert!(!ctx.lock.is_locked());
    }

    #[test]
    fn test_decrypt_rejects_tampered_mac() {
        let mut ctx = test_monitor();
        let (lo, hi, mut envelope) = setup(&mut ctx, &[0x11u8; 0x20]);
        let last = envelope.len() - 1;
        envelope[last] ^= 1;
        let addr = ctx.memory.base;
        ctx.memory.bytes[..envelope.len()].copy_from_slice(&envelope);

        let mut args = SmcArguments::default();
        args.0[1] = lo;
        args.0[2] = hi;
        args.0[3] = addr;
        args.0[4] = envelope.len() as u64;
        assert_eq!(
            decrypt_device_unique_data(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
    }

    #[test]
    fn test_decrypt_rejects_wrong_device() {
        let mut ctx = test_monitor();
        let (lo, hi, envelope) = setup(&mut ctx, &[0x11u8; 0x20]);
        // The envelope binds the id at build time; change the device.
        ctx.config.device_id ^= 0x1;
        let addr = ctx.memory.base;
        ctx.memory.bytes[..envelope.len()].copy_from_slice(&envelope);

        let mut args = SmcArguments::default();
        args.0[1] = lo;
        args.0[2] = hi;
        args.0[3] = addr;
        args.0[4] = envelope.len() as u64;
        assert_eq!(
            decrypt_device_unique_data(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
    }

    #[test]
    fn test_reencrypt_updates_high_byte_and_stays_valid() {
        let mut ctx = test_monitor();
        let payload = [0x33u8; 0x20];
        let (lo, hi, envelope) = setup(&mut ctx, &payload);
        let addr = ctx.memory.base;
        ctx.memory.bytes[..envelope.len()].copy_from_slice(&envelope);

        let mut args = SmcArguments::default();
        args.0[1] = lo;
        args.0[2] = hi;
        args.0[3] = addr;
        args.0[4] = envelope.len() as u64;
        args.0[5] = 0xAB;
        assert_eq!(
            reencrypt_device_unique_data(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        // A fresh IV means the envelope bytes change.
        assert_ne!(&ctx.memory.bytes[..envelope.len()], &envelope[..]);

        // The rewritten envelope still decrypts on this device.
        let mut fetch = SmcArguments::default();
        fetch.0[1] = lo;
        fetch.0[2] = hi;
        fetch.0[3] = addr;
        fetch.0[4] = envelope.len() as u64;
        assert_eq!(
            decrypt_device_unique_data(&mut ctx, &mut fetch),
            u64::from(SmcResult::Success)
        );
        assert_eq!(&ctx.memory.bytes[..payload.len()], &payload);
    }

    #[test]
    fn test_get_secure_data_production_gate() {
        let mut ctx = test_monitor();
        ctx.config.is_production = true;
        let mut args = SmcArguments::default();
        args.0[2] = ctx.memory.base;
        assert_eq!(
            get_secure_data(&mut ctx, &mut args),
            u64::from(SmcResult::NotPermitted)
        );

        ctx.config.is_production = false;
        assert_eq!(
            get_secure_data(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        assert!(ctx.memory.bytes[..SECURE_DATA_SIZE].iter().any(|&b| b != 0));

        args.0[1] = 3;
        assert_eq!(
            get_secure_data(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
    }
}
