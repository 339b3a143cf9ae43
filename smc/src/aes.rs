/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    File contains the AES SMC handlers: kek generation against the master
    key ladder, user keyslot loads, the asynchronous bulk cipher, and the
    CMAC service. Key material only ever crosses the trust boundary
    wrapped under a per-boot random key.

--*/

use secmon_common::{
    is_user_key_slot, DEVICE_MASTER_KEY_FIRST_GENERATION, KEY_SLOT_DEVICE, KEY_SLOT_DEVICE_MASTER,
    KEY_SLOT_MASTER, KEY_SLOT_RANDOM_FOR_USER_WRAP, KEY_SLOT_SEAL,
};
use secmon_drivers::{AES_BLOCK_SIZE, AES_KEY_SIZE};
use secmon_error::MonitorResult;

use crate::context::Monitor;
use crate::mapper::{PageMapper, SmcMemory, SmcUserPage};
use crate::result::{AsyncCompletion, SmcResult};
use crate::{key_from_registers, key_to_registers, SmcArguments};

/// Largest buffer one ComputeAes/ComputeCmac call may name.
const COMPUTE_AES_MAX_SIZE: usize = 0x400;

/// Static kek derivation sources, one per key type.
const KEY_TYPE_SOURCES: [[u8; AES_KEY_SIZE]; 8] = [
    [
        0x4D, 0x87, 0x09, 0x86, 0xC4, 0x5D, 0x20, 0x72, 0x2F, 0xBA, 0x10, 0x53, 0xDA, 0x92,
        0xE8, 0xA9,
    ],
    [
        0x25, 0x03, 0x31, 0xFB, 0x25, 0x26, 0x0B, 0x79, 0x8C, 0x80, 0xD2, 0x69, 0x98, 0xE2,
        0x22, 0x77,
    ],
    [
        0x76, 0x14, 0x1D, 0x34, 0x93, 0x2D, 0xE1, 0x84, 0x24, 0x7B, 0x66, 0x65, 0x55, 0x04,
        0x65, 0x81,
    ],
    [
        0xAF, 0x3D, 0xB7, 0xF3, 0x08, 0xA2, 0xD8, 0xA2, 0x08, 0xCA, 0x18, 0xA8, 0x69, 0x46,
        0xC9, 0x0B,
    ],
    [
        0x59, 0xD9, 0x31, 0xF4, 0xA7, 0x97, 0xB8, 0x14, 0x40, 0xD6, 0xA2, 0x60, 0x2B, 0xED,
        0x15, 0x31,
    ],
    [
        0x20, 0x4D, 0xBA, 0x73, 0xA5, 0xD2, 0x27, 0x9F, 0x36, 0x80, 0xBB, 0x59, 0xFE, 0xE6,
        0xAC, 0xA5,
    ],
    [
        0x97, 0x6E, 0xBD, 0x0F, 0x07, 0x5E, 0x58, 0x61, 0x29, 0xA1, 0xE7, 0xFB, 0x0C, 0x0A,
        0xB5, 0x8C,
    ],
    [
        0x55, 0x25, 0x29, 0x80, 0x12, 0x48, 0x8F, 0xA2, 0x2D, 0xFB, 0x8C, 0x5F, 0xF6, 0xB3,
        0x5E, 0xEC,
    ],
];

/// Per-seal-index masks folded into the kek source.
const SEAL_KEY_SOURCES: [[u8; AES_KEY_SIZE]; 8] = [
    [0; AES_KEY_SIZE],
    [
        0xA2, 0xAB, 0xBF, 0x9C, 0x92, 0x2F, 0xBB, 0xE3, 0x78, 0x79, 0x9B, 0xC0, 0xCC, 0xEA,
        0xA5, 0x74,
    ],
    [
        0x57, 0xE2, 0xD9, 0xCA, 0xE3, 0xE8, 0x0E, 0xF1, 0x5A, 0xA2, 0xF9, 0xAA, 0x1B, 0xA9,
        0x2D, 0x87,
    ],
    [
        0xE5, 0x4D, 0x9A, 0x79, 0xA1, 0x86, 0x9E, 0x90, 0x74, 0x08, 0xA4, 0x98, 0xC7, 0x7E,
        0x91, 0x1E,
    ],
    [
        0x02, 0xCF, 0x5B, 0x5D, 0x2E, 0x8A, 0x0F, 0x49, 0x27, 0xF2, 0x57, 0xB9, 0xB4, 0x16,
        0xA4, 0xE1,
    ],
    [
        0xC3, 0x6F, 0x6A, 0x91, 0x6B, 0x2E, 0x40, 0x7E, 0x98, 0x79, 0x8B, 0x5E, 0x0D, 0x6C,
        0x97, 0x23,
    ],
    [
        0x8E, 0xB2, 0x3A, 0x81, 0xD1, 0xF0, 0x3F, 0x2C, 0x46, 0x41, 0x2C, 0xB5, 0x9F, 0x23,
        0x5B, 0x44,
    ],
    [
        0x6C, 0x91, 0xF3, 0x8E, 0x46, 0x0A, 0x4A, 0x95, 0x50, 0xD4, 0x37, 0x65, 0x9E, 0x8B,
        0x2C, 0x11,
    ],
];

/// Key types only meaningful while the recovery firmware is in charge.
const FIRST_RECOVERY_ONLY_KEY_TYPE: u64 = 6;

/// Derivation tweak for device-unique key generation.
const DEVICE_UNIQUE_KEY_SOURCE: [u8; AES_KEY_SIZE] = [
    0x8C, 0x68, 0x13, 0xE6, 0x72, 0x90, 0x89, 0x14, 0xBF, 0xE2, 0x43, 0x3F, 0x6C, 0x18, 0x9F,
    0x38,
];

/// Load the master key for `generation` into the seal slot, unwrapping the
/// static `source` under it. The current generation's key lives in its
/// dedicated slot; older generations come out of the wrapped store.
pub(crate) fn unwrap_with_master_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    generation: usize,
    source: &[u8; AES_KEY_SIZE],
) -> MonitorResult<()> {
    if generation == ctx.key_generation {
        ctx.se
            .set_encrypted_aes_key(KEY_SLOT_SEAL, KEY_SLOT_MASTER, source)
    } else {
        ctx.store
            .load_master_key(&mut ctx.se, KEY_SLOT_SEAL, generation)?;
        ctx.se
            .set_encrypted_aes_key(KEY_SLOT_SEAL, KEY_SLOT_SEAL, source)
    }
}

fn derive_kek<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    generation: usize,
    source: &[u8; AES_KEY_SIZE],
    wrapped: &[u8; AES_KEY_SIZE],
) -> MonitorResult<[u8; AES_KEY_SIZE]> {
    unwrap_with_master_key(ctx, generation, source)?;
    let kek = ctx.se.decrypt_block(KEY_SLOT_SEAL, wrapped)?;
    ctx.se
        .encrypt_block(KEY_SLOT_RANDOM_FOR_USER_WRAP, &kek)
}

/// GenerateAesKek: unwrap a caller-provided kek source under a master key
/// and return it sealed to this boot.
pub(crate) fn generate_aes_kek<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let wrapped = key_from_registers(args.0[1], args.0[2]);
    let generation = args.0[3];
    let option = args.0[4];

    let key_type = option & 0x7;
    let seal_index = (option >> 8) & 0x7;
    if option & !0x0707 != 0 {
        return SmcResult::InvalidArgument.into();
    }
    if generation as usize > ctx.key_generation {
        return SmcResult::InvalidArgument.into();
    }
    if key_type >= FIRST_RECOVERY_ONLY_KEY_TYPE && !ctx.config.is_recovery_boot {
        return SmcResult::InvalidArgument.into();
    }

    let mut source = KEY_TYPE_SOURCES[key_type as usize];
    for (s, m) in source.iter_mut().zip(&SEAL_KEY_SOURCES[seal_index as usize]) {
        *s ^= m;
    }

    ctx.lock_and_invoke(|ctx| {
        let result = derive_kek(ctx, generation as usize, &source, &wrapped);
        let _ = ctx.se.clear_aes_key(KEY_SLOT_SEAL);
        match result {
            Ok(access_key) => {
                let (lo, hi) = key_to_registers(&access_key);
                args.0[1] = lo;
                args.0[2] = hi;
                SmcResult::Success
            }
            Err(err) => SmcResult::from_error(err),
        }
    })
    .into()
}

/// LoadAesKey: unseal an access key and use it to unwrap a key into a
/// user keyslot.
pub(crate) fn load_aes_key<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let slot = args.0[1] as usize;
    let access_key = key_from_registers(args.0[2], args.0[3]);
    let wrapped = key_from_registers(args.0[4], args.0[5]);

    if !is_user_key_slot(slot) {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        let result = ctx
            .se
            .set_encrypted_aes_key(KEY_SLOT_SEAL, KEY_SLOT_RANDOM_FOR_USER_WRAP, &access_key)
            .and_then(|()| ctx.se.set_encrypted_aes_key(slot, KEY_SLOT_SEAL, &wrapped));
        let _ = ctx.se.clear_aes_key(KEY_SLOT_SEAL);
        match result {
            Ok(()) => SmcResult::Success,
            Err(err) => SmcResult::from_error(err),
        }
    })
    .into()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CipherMode {
    CbcEncrypt,
    CbcDecrypt,
    Ctr,
}

/// ComputeAes: asynchronous bulk cipher over caller memory under a user
/// keyslot. Returns a ticket in the second register.
pub(crate) fn compute_aes<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let slot = (args.0[1] & 0xFF) as usize;
    let mode = match (args.0[1] >> 8) & 0x3 {
        0 => CipherMode::CbcEncrypt,
        1 => CipherMode::CbcDecrypt,
        2 => CipherMode::Ctr,
        _ => return SmcResult::NotImplemented.into(),
    };
    let iv = key_from_registers(args.0[2], args.0[3]);
    let src_addr = args.0[4];
    let dst_addr = args.0[5];
    let size = args.0[6] as usize;

    if !is_user_key_slot(slot) {
        return SmcResult::InvalidArgument.into();
    }
    if size == 0 || size > COMPUTE_AES_MAX_SIZE || size % AES_BLOCK_SIZE != 0 {
        return SmcResult::InvalidArgument.into();
    }

    match ctx.lock_and_invoke_async(|ctx| {
        let mut src = [0u8; COMPUTE_AES_MAX_SIZE];
        let mut dst = [0u8; COMPUTE_AES_MAX_SIZE];
        if !SmcUserPage::copy_from(&ctx.windows, &ctx.memory, src_addr, &mut src[..size]) {
            return Err(SmcResult::InvalidArgument);
        }

        let result = match mode {
            CipherMode::CbcEncrypt => {
                ctx.se.encrypt_cbc(slot, &iv, &src[..size], &mut dst[..size])
            }
            CipherMode::CbcDecrypt => {
                ctx.se.decrypt_cbc(slot, &iv, &src[..size], &mut dst[..size])
            }
            CipherMode::Ctr => ctx.se.crypt_ctr(slot, &iv, &src[..size], &mut dst[..size]),
        };
        result.map_err(SmcResult::from_error)?;

        if !SmcUserPage::copy_to(&ctx.windows, &mut ctx.memory, dst_addr, &dst[..size]) {
            return Err(SmcResult::InvalidArgument);
        }
        Ok(AsyncCompletion::ComputeAes)
    }) {
        Ok(key) => {
            args.0[1] = key;
            SmcResult::Success.into()
        }
        Err(result) => result.into(),
    }
}

/// GenerateSpecificAesKey: derive a device-unique key. Generations that
/// carry a device master key go through its ladder; older generations and
/// the compatibility selector use the fused device key directly.
pub(crate) fn generate_specific_aes_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let wrapped = key_from_registers(args.0[1], args.0[2]);
    let generation = args.0[3] as usize;
    let which = args.0[4];

    if which > 1 {
        return SmcResult::InvalidArgument.into();
    }
    if generation > ctx.key_generation {
        return SmcResult::InvalidArgument.into();
    }
    let use_device_key = which == 1 || generation < DEVICE_MASTER_KEY_FIRST_GENERATION;

    ctx.lock_and_invoke(|ctx| {
        let result = if use_device_key {
            ctx.se.decrypt_block(KEY_SLOT_DEVICE, &wrapped)
        } else {
            let ladder = if generation == ctx.key_generation {
                ctx.se.set_encrypted_aes_key(
                    KEY_SLOT_SEAL,
                    KEY_SLOT_DEVICE_MASTER,
                    &DEVICE_UNIQUE_KEY_SOURCE,
                )
            } else {
                ctx.store
                    .load_device_master_key(&mut ctx.se, KEY_SLOT_SEAL, generation)
                    .and_then(|()| {
                        ctx.se.set_encrypted_aes_key(
                            KEY_SLOT_SEAL,
                            KEY_SLOT_SEAL,
                            &DEVICE_UNIQUE_KEY_SOURCE,
                        )
                    })
            };
            ladder.and_then(|()| ctx.se.decrypt_block(KEY_SLOT_SEAL, &wrapped))
        };
        let _ = ctx.se.clear_aes_key(KEY_SLOT_SEAL);
        match result {
            Ok(key) => {
                let (lo, hi) = key_to_registers(&key);
                args.0[1] = lo;
                args.0[2] = hi;
                SmcResult::Success
            }
            Err(err) => SmcResult::from_error(err),
        }
    })
    .into()
}

/// ComputeCmac: AES-128-CMAC over caller memory under a user keyslot.
pub(crate) fn compute_cmac<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let slot = args.0[1] as usize;
    let addr = args.0[2];
    let size = args.0[3] as usize;

    if !is_user_key_slot(slot) || size > COMPUTE_AES_MAX_SIZE {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        let mut data = [0u8; COMPUTE_AES_MAX_SIZE];
        if !SmcUserPage::copy_from(&ctx.windows, &ctx.memory, addr, &mut data[..size]) {
            return SmcResult::InvalidArgument;
        }
        match ctx.se.compute_cmac(slot, &data[..size]) {
            Ok(mac) => {
                let (lo, hi) = key_to_registers(&mac);
                args.0[1] = lo;
                args.0[2] = hi;
                SmcResult::Success
            }
            Err(err) => SmcResult::from_error(err),
        }
    })
    .into()
}

/// LoadPreparedAesKey: install a key previously sealed to this boot
/// (by PrepareEsDeviceUniqueKey and friends) into a user keyslot.
pub(crate) fn load_prepared_aes_key<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let slot = args.0[1] as usize;
    let sealed = key_from_registers(args.0[2], args.0[3]);

    if !is_user_key_slot(slot) {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        match ctx
            .se
            .set_encrypted_aes_key(slot, KEY_SLOT_RANDOM_FOR_USER_WRAP, &sealed)
        {
            Ok(()) => SmcResult::Success,
            Err(err) => SmcResult::from_error(err),
        }
    })
    .into()
}
