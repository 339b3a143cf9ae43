/*++

Licensed under the Apache-2.0 license.

File Name:

    dispatch.rs

Abstract:

    File contains the SMC dispatch tables and the top-level dispatcher:
    function-id decoding, per-tier table lookup, the designated-core
    check, and the restriction-mask policy gate.

--*/

use bitfield::bitfield;
use secmon_error::{MonitorError, MonitorResult};

use secmon_common::TargetFirmware;

use crate::context::Monitor;
use crate::mapper::SmcMemory;
use crate::result::SmcResult;
use crate::{aes, device_unique, extension, info, power, random, result, rsa};
use crate::SmcArguments;

bitfield! {
    /// SMC function id layout. The handler index doubles as the table
    /// slot; a mismatch between the two is treated as an attack.
    pub struct SmcFunctionId(u32);
    impl Debug;
    pub handler_index, _: 7, 0;
    pub pointer_flags, _: 15, 8;
    pub call_range, _: 29, 24;
    pub is_64bit, _: 30;
    pub is_fast, _: 31;
}

/// Call range marking the trusted-application (extension) surface.
const CALL_RANGE_TRUSTED_APP: u32 = 0x30;

/// Legacy secure-data accessor, dispatched by full-id match before any
/// table lookup.
pub const FUNCTION_ID_GET_SECURE_DATA: u32 = 0x6789_1234;

/// User-tier calls are only accepted from this core.
pub const DESIGNATED_USER_CORE: usize = 3;

/// Which exception-level surface a call arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmcTier {
    User,
    Kernel,
}

/// Restriction classes; a set bit in the boot-time mask denies every
/// entry carrying that class.
pub(crate) const RESTRICTION_AES: u32 = 1 << 0;
pub(crate) const RESTRICTION_RSA: u32 = 1 << 1;
pub(crate) const RESTRICTION_DEVICE_UNIQUE: u32 = 1 << 2;

/// Handler selector. A closed set so the tables stay `Copy` and the
/// dispatcher's exhaustiveness is checked at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SmcHandler {
    SetConfig,
    GetConfig,
    GetResult,
    GetResultData,
    ModularExponentiate,
    GenerateRandomBytes,
    GenerateAesKek,
    LoadAesKey,
    ComputeAes,
    GenerateSpecificAesKey,
    ComputeCmac,
    ReencryptDeviceUniqueData,
    DecryptDeviceUniqueData,
    ModularExponentiateByStorageKey,
    PrepareEsDeviceUniqueKey,
    LoadPreparedAesKey,
    PrepareEsCommonTitleKey,
    DecryptAndImportEsDeviceKey,
    DecryptAndImportLotusKey,
    SuspendCpu,
    PowerOffCpu,
    PowerOnCpu,
    GenerateRandomBytesNonBlocking,
    SetKernelCarveoutRegion,
    ReadWriteRegister,
    IramCopy,
    WriteAddress,
    GetEmummcConfig,
}

/// One dispatch table slot. The recorded id must match the incoming id
/// exactly, beyond the index bits that selected the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmcTableEntry {
    pub id: u32,
    pub restriction: u32,
    pub(crate) handler: Option<SmcHandler>,
}

impl SmcTableEntry {
    const fn new(id: u32, restriction: u32, handler: SmcHandler) -> Self {
        Self {
            id,
            restriction,
            handler: Some(handler),
        }
    }

    const fn vacant() -> Self {
        Self {
            id: 0,
            restriction: 0,
            handler: None,
        }
    }
}

pub(crate) const USER_TABLE_LEN: usize = 0x13;
const KERNEL_TABLE_LEN: usize = 10;
const EXTENSION_TABLE_LEN: usize = 5;

/// Build the user-tier table for a target firmware. Two slots were
/// repurposed in firmware 5.0.0; older targets get the legacy bindings.
pub fn configure_smc_handlers_for_target_firmware(
    target_firmware: TargetFirmware,
) -> [SmcTableEntry; USER_TABLE_LEN] {
    let mut table = [SmcTableEntry::vacant(); USER_TABLE_LEN];
    table[0x01] = SmcTableEntry::new(0xC300_0401, 0, SmcHandler::SetConfig);
    table[0x02] = SmcTableEntry::new(0xC300_0002, 0, SmcHandler::GetConfig);
    table[0x03] = SmcTableEntry::new(0xC300_0003, 0, SmcHandler::GetResult);
    table[0x04] = SmcTableEntry::new(0xC300_0404, 0, SmcHandler::GetResultData);
    table[0x05] = SmcTableEntry::new(0xC300_0E05, RESTRICTION_RSA, SmcHandler::ModularExponentiate);
    table[0x06] = SmcTableEntry::new(0xC300_0006, 0, SmcHandler::GenerateRandomBytes);
    table[0x07] = SmcTableEntry::new(0xC300_0007, RESTRICTION_AES, SmcHandler::GenerateAesKek);
    table[0x08] = SmcTableEntry::new(0xC300_0008, RESTRICTION_AES, SmcHandler::LoadAesKey);
    table[0x09] = SmcTableEntry::new(0xC300_0009, RESTRICTION_AES, SmcHandler::ComputeAes);
    table[0x0A] = SmcTableEntry::new(
        0xC300_000A,
        RESTRICTION_AES,
        SmcHandler::GenerateSpecificAesKey,
    );
    table[0x0B] = SmcTableEntry::new(0xC300_040B, RESTRICTION_AES, SmcHandler::ComputeCmac);
    table[0x0D] = SmcTableEntry::new(
        0xC300_100D,
        RESTRICTION_DEVICE_UNIQUE,
        SmcHandler::DecryptDeviceUniqueData,
    );
    table[0x0F] = SmcTableEntry::new(
        0xC300_0E0F,
        RESTRICTION_RSA,
        SmcHandler::ModularExponentiateByStorageKey,
    );
    table[0x10] = SmcTableEntry::new(
        0xC300_0610,
        RESTRICTION_RSA,
        SmcHandler::PrepareEsDeviceUniqueKey,
    );
    table[0x11] = SmcTableEntry::new(0xC300_0011, RESTRICTION_AES, SmcHandler::LoadPreparedAesKey);
    table[0x12] = SmcTableEntry::new(
        0xC300_0012,
        RESTRICTION_RSA,
        SmcHandler::PrepareEsCommonTitleKey,
    );

    if target_firmware >= TargetFirmware::FW_5_0_0 {
        table[0x0C] = SmcTableEntry::new(
            0xC300_D60C,
            RESTRICTION_DEVICE_UNIQUE,
            SmcHandler::ReencryptDeviceUniqueData,
        );
    } else {
        table[0x0C] = SmcTableEntry::new(
            0xC300_100C,
            RESTRICTION_DEVICE_UNIQUE,
            SmcHandler::DecryptAndImportEsDeviceKey,
        );
        table[0x0E] = SmcTableEntry::new(
            0xC300_100E,
            RESTRICTION_DEVICE_UNIQUE,
            SmcHandler::DecryptAndImportLotusKey,
        );
    }
    table
}

const KERNEL_TABLE: [SmcTableEntry; KERNEL_TABLE_LEN] = [
    SmcTableEntry::vacant(),
    SmcTableEntry::new(0xC400_0001, 0, SmcHandler::SuspendCpu),
    SmcTableEntry::new(0x8400_0002, 0, SmcHandler::PowerOffCpu),
    SmcTableEntry::new(0xC400_0003, 0, SmcHandler::PowerOnCpu),
    SmcTableEntry::new(0xC300_0004, 0, SmcHandler::GetConfig),
    SmcTableEntry::new(0xC300_0005, 0, SmcHandler::GenerateRandomBytesNonBlocking),
    SmcTableEntry::vacant(),
    SmcTableEntry::new(0xC300_0007, 0, SmcHandler::SetKernelCarveoutRegion),
    SmcTableEntry::new(0xC300_0008, 0, SmcHandler::ReadWriteRegister),
    SmcTableEntry::new(0xC300_0409, 0, SmcHandler::SetConfig),
];

const EXTENSION_TABLE: [SmcTableEntry; EXTENSION_TABLE_LEN] = [
    SmcTableEntry::vacant(),
    SmcTableEntry::new(0xF000_0201, 0, SmcHandler::IramCopy),
    SmcTableEntry::new(0xF000_0002, 0, SmcHandler::ReadWriteRegister),
    SmcTableEntry::new(0xF000_0003, 0, SmcHandler::WriteAddress),
    SmcTableEntry::new(0xF000_0404, 0, SmcHandler::GetEmummcConfig),
];

/// Index a table by the function id's handler bits and validate the slot
/// against the full incoming id. Any mismatch is fatal; result codes are
/// reserved for well-formed calls.
fn lookup(table: &[SmcTableEntry], function_id: u32) -> MonitorResult<SmcTableEntry> {
    let index = SmcFunctionId(function_id).handler_index() as usize;
    let entry = *table
        .get(index)
        .ok_or(MonitorError::SMC_UNKNOWN_FUNCTION)?;
    if entry.handler.is_none() || entry.id != function_id {
        return Err(MonitorError::SMC_UNKNOWN_FUNCTION);
    }
    Ok(entry)
}

/// Dispatch one SMC. `Err` means the call was malformed and the caller
/// context cannot be trusted; the monitor panics the calling core rather
/// than returning a result code.
pub fn handle_smc<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    tier: SmcTier,
    core: usize,
    args: &mut SmcArguments,
) -> MonitorResult<()> {
    let function_id = args.0[0] as u32;

    if tier == SmcTier::User && function_id == FUNCTION_ID_GET_SECURE_DATA {
        args.0[0] = device_unique::get_secure_data(ctx, args);
        return Ok(());
    }

    let entry = match tier {
        SmcTier::User if SmcFunctionId(function_id).call_range() == CALL_RANGE_TRUSTED_APP => {
            lookup(&EXTENSION_TABLE, function_id)?
        }
        SmcTier::User => {
            if core != DESIGNATED_USER_CORE {
                return Err(MonitorError::SMC_WRONG_CORE);
            }
            lookup(&ctx.user_table, function_id)?
        }
        SmcTier::Kernel => lookup(&KERNEL_TABLE, function_id)?,
    };

    // The restriction mask only applies on modern target firmware; older
    // firmware predates the policy and ships a zero mask anyway.
    if ctx.config.target_firmware >= TargetFirmware::FW_8_0_0
        && (entry.restriction & ctx.config.restricted_smc_mask) != 0
    {
        args.0[0] = SmcResult::NotPermitted.into();
        return Ok(());
    }

    let handler = entry.handler.ok_or(MonitorError::SMC_UNKNOWN_FUNCTION)?;
    args.0[0] = invoke(ctx, handler, core, args);
    Ok(())
}

fn invoke<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    handler: SmcHandler,
    core: usize,
    args: &mut SmcArguments,
) -> u64 {
    match handler {
        SmcHandler::SetConfig => info::set_config(ctx, args),
        SmcHandler::GetConfig => info::get_config(ctx, args),
        SmcHandler::GetResult => result::get_result(ctx, args),
        SmcHandler::GetResultData => result::get_result_data(ctx, args),
        SmcHandler::ModularExponentiate => rsa::modular_exponentiate(ctx, args),
        SmcHandler::GenerateRandomBytes => random::generate_random_bytes(ctx, args),
        SmcHandler::GenerateAesKek => aes::generate_aes_kek(ctx, args),
        SmcHandler::LoadAesKey => aes::load_aes_key(ctx, args),
        SmcHandler::ComputeAes => aes::compute_aes(ctx, args),
        SmcHandler::GenerateSpecificAesKey => aes::generate_specific_aes_key(ctx, args),
        SmcHandler::ComputeCmac => aes::compute_cmac(ctx, args),
        SmcHandler::ReencryptDeviceUniqueData => {
            device_unique::reencrypt_device_unique_data(ctx, args)
        }
        SmcHandler::DecryptDeviceUniqueData => {
            device_unique::decrypt_device_unique_data(ctx, args)
        }
        SmcHandler::ModularExponentiateByStorageKey => {
            rsa::modular_exponentiate_by_storage_key(ctx, args)
        }
        SmcHandler::PrepareEsDeviceUniqueKey => rsa::prepare_es_device_unique_key(ctx, args),
        SmcHandler::LoadPreparedAesKey => aes::load_prepared_aes_key(ctx, args),
        SmcHandler::PrepareEsCommonTitleKey => rsa::prepare_es_common_title_key(ctx, args),
        SmcHandler::DecryptAndImportEsDeviceKey => {
            device_unique::decrypt_and_import_es_device_key(ctx, args)
        }
        SmcHandler::DecryptAndImportLotusKey => {
            device_unique::decrypt_and_import_lotus_key(ctx, args)
        }
        SmcHandler::SuspendCpu => power::suspend_cpu(ctx, core, args),
        SmcHandler::PowerOffCpu => power::power_off_cpu(ctx, core, args),
        SmcHandler::PowerOnCpu => power::power_on_cpu(ctx, args),
        SmcHandler::GenerateRandomBytesNonBlocking => {
            random::generate_random_bytes_nonblocking(ctx, args)
        }
        SmcHandler::SetKernelCarveoutRegion => power::set_kernel_carveout_region(ctx, args),
        SmcHandler::ReadWriteRegister => extension::read_write_register(ctx, args),
        SmcHandler::IramCopy => extension::iram_copy(ctx, args),
        SmcHandler::WriteAddress => extension::write_address(ctx, args),
        SmcHandler::GetEmummcConfig => extension::get_emummc_config(ctx, args),
    }
}
