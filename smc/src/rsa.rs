/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa.rs

Abstract:

    File contains the RSA SMC handlers: raw modular exponentiation with a
    caller key or a stored device-unique key, and the ES title-key
    preparation services built on top of it.

--*/

use secmon_common::{
    KEY_SLOT_RANDOM_FOR_USER_WRAP, KEY_SLOT_SEAL, RSA_KEY_SLOT_RUNTIME, RsaKeyId,
};
use secmon_drivers::{AES_KEY_SIZE, RSA_2048_BYTE_SIZE};
use secmon_error::MonitorResult;

use crate::aes::unwrap_with_master_key;
use crate::context::Monitor;
use crate::mapper::{PageMapper, SmcMemory, SmcUserPage};
use crate::result::{AsyncCompletion, SmcResult};
use crate::{key_from_registers, key_to_registers, SmcArguments};

/// Derivation tweak for ES common title keys.
const ES_COMMON_TITLE_KEY_SOURCE: [u8; AES_KEY_SIZE] = [
    0x9B, 0x17, 0xBE, 0x67, 0xB7, 0x6E, 0x2A, 0xAB, 0x18, 0x8B, 0x50, 0x86, 0x4F, 0x36, 0xBA,
    0xE2,
];

pub(crate) fn rsa_key_id(value: u64) -> Option<RsaKeyId> {
    match value {
        0 => Some(RsaKeyId::Lotus),
        1 => Some(RsaKeyId::EsDrmCert),
        2 => Some(RsaKeyId::Ssl),
        3 => Some(RsaKeyId::EsClientCert),
        _ => None,
    }
}

fn read_base<M: SmcMemory>(
    ctx: &Monitor<M>,
    addr: u64,
) -> Result<[u8; RSA_2048_BYTE_SIZE], SmcResult> {
    let mut base = [0u8; RSA_2048_BYTE_SIZE];
    if !SmcUserPage::copy_from(&ctx.windows, &ctx.memory, addr, &mut base) {
        return Err(SmcResult::InvalidArgument);
    }
    Ok(base)
}

/// ModularExponentiate: raw exp-mod with a caller-supplied key, through
/// the runtime RSA keyslot. Result is fetched with GetResultData.
pub(crate) fn modular_exponentiate<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let base_addr = args.0[1];
    let exponent_addr = args.0[2];
    let modulus_addr = args.0[3];
    let exponent_size = args.0[4] as usize;

    if exponent_size == 0 || exponent_size > RSA_2048_BYTE_SIZE {
        return SmcResult::InvalidArgument.into();
    }

    match ctx.lock_and_invoke_async(|ctx| {
        let base = read_base(ctx, base_addr)?;
        let mut exponent = [0u8; RSA_2048_BYTE_SIZE];
        if !SmcUserPage::copy_from(
            &ctx.windows,
            &ctx.memory,
            exponent_addr,
            &mut exponent[..exponent_size],
        ) {
            return Err(SmcResult::InvalidArgument);
        }
        let mut modulus = [0u8; RSA_2048_BYTE_SIZE];
        if !SmcUserPage::copy_from(&ctx.windows, &ctx.memory, modulus_addr, &mut modulus) {
            return Err(SmcResult::InvalidArgument);
        }

        let output = ctx
            .se
            .set_rsa_key(RSA_KEY_SLOT_RUNTIME, &modulus, &exponent[..exponent_size])
            .and_then(|()| ctx.se.exp_mod(RSA_KEY_SLOT_RUNTIME, &base))
            .map_err(SmcResult::from_error)?;
        Ok(AsyncCompletion::ModularExponentiate { output })
    }) {
        Ok(key) => {
            args.0[1] = key;
            SmcResult::Success.into()
        }
        Err(result) => result.into(),
    }
}

/// ModularExponentiateByStorageKey: exp-mod under one of the imported
/// device-unique keys. The modulus must have passed its self test.
pub(crate) fn modular_exponentiate_by_storage_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let base_addr = args.0[1];
    let Some(id) = rsa_key_id(args.0[2]) else {
        return SmcResult::InvalidArgument.into();
    };

    match ctx.lock_and_invoke_async(|ctx| {
        let base = read_base(ctx, base_addr)?;
        let output = exp_mod_storage_key(ctx, id, &base).map_err(SmcResult::from_error)?;
        Ok(AsyncCompletion::ModularExponentiate { output })
    }) {
        Ok(key) => {
            args.0[1] = key;
            SmcResult::Success.into()
        }
        Err(result) => result.into(),
    }
}

fn exp_mod_storage_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    id: RsaKeyId,
    base: &[u8; RSA_2048_BYTE_SIZE],
) -> MonitorResult<[u8; RSA_2048_BYTE_SIZE]> {
    let exponent = *ctx.rsa_keys.exponent(id)?;
    let modulus = *ctx.rsa_keys.modulus(id, true)?;
    ctx.se
        .set_rsa_key(RSA_KEY_SLOT_RUNTIME, &modulus, &exponent)?;
    ctx.se.exp_mod(RSA_KEY_SLOT_RUNTIME, base)
}

/// PrepareEsDeviceUniqueKey: strip the RSA-OAEP-style envelope from an ES
/// title key with the imported ES key and seal the result to this boot.
/// The sealed access key is fetched with GetResultData.
pub(crate) fn prepare_es_device_unique_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let base_addr = args.0[1];

    match ctx.lock_and_invoke_async(|ctx| {
        let base = read_base(ctx, base_addr)?;
        let output = exp_mod_storage_key(ctx, RsaKeyId::EsDrmCert, &base)
            .map_err(SmcResult::from_error)?;

        // The unwrapped title key occupies the low-order block.
        let mut title_key = [0u8; AES_KEY_SIZE];
        title_key.copy_from_slice(&output[RSA_2048_BYTE_SIZE - AES_KEY_SIZE..]);

        let access_key = ctx
            .se
            .encrypt_block(KEY_SLOT_RANDOM_FOR_USER_WRAP, &title_key)
            .map_err(SmcResult::from_error)?;
        Ok(AsyncCompletion::PrepareEsDeviceUniqueKey { access_key })
    }) {
        Ok(key) => {
            args.0[1] = key;
            SmcResult::Success.into()
        }
        Err(result) => result.into(),
    }
}

/// PrepareEsCommonTitleKey: unwrap a common title key under the master
/// key ladder and seal it to this boot.
pub(crate) fn prepare_es_common_title_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let wrapped = key_from_registers(args.0[1], args.0[2]);
    let generation = args.0[3] as usize;

    if generation > ctx.key_generation {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        let result = unwrap_with_master_key(ctx, generation, &ES_COMMON_TITLE_KEY_SOURCE)
            .and_then(|()| ctx.se.decrypt_block(KEY_SLOT_SEAL, &wrapped))
            .and_then(|key| ctx.se.encrypt_block(KEY_SLOT_RANDOM_FOR_USER_WRAP, &key));
        let _ = ctx.se.clear_aes_key(KEY_SLOT_SEAL);
        match result {
            Ok(sealed) => {
                let (lo, hi) = key_to_registers(&sealed);
                args.0[1] = lo;
                args.0[2] = hi;
                SmcResult::Success
            }
            Err(err) => SmcResult::from_error(err),
        }
    })
    .into()
}
