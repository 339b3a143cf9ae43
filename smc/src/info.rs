/*++

Licensed under the Apache-2.0 license.

File Name:

    info.rs

Abstract:

    File contains the GetConfig/SetConfig handlers. GetConfig exposes the
    boot-time configuration read-only; SetConfig accepts the few mutable
    runtime flags (charger state, reboot intent, the one-shot payload
    address).

--*/

use secmon_common::HardwareType;

use crate::context::{Monitor, RebootState};
use crate::mapper::SmcMemory;
use crate::result::SmcResult;
use crate::SmcArguments;

/// Interrupt line the security engine raises on operation completion.
const SECURITY_ENGINE_INTERRUPT_NUMBER: u64 = 0x5A;

/// Version reported for the extension config surface.
const EXTENSION_API_VERSION: u64 = 0x0005_0000;

/// Configuration items. Values below 65000 mirror hardware and boot
/// state; the 65000 range belongs to the extension surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigItem {
    DisableProgramVerification = 1,
    DramId = 2,
    SecurityEngineInterruptNumber = 3,
    FuseVersion = 4,
    HardwareType = 5,
    HardwareState = 6,
    IsRecoveryBoot = 7,
    DeviceId = 8,
    BootReason = 9,
    MemoryMode = 10,
    IsDevelopmentFunctionEnabled = 11,
    KernelConfiguration = 12,
    ChargerHiZ = 13,
    IsQuest = 14,
    RegulatorType = 15,
    DeviceUniqueKeyGeneration = 16,
    Package2Hash = 17,
    ExtensionApiVersion = 65000,
    NeedsReboot = 65001,
    NeedsShutdown = 65002,
    PayloadAddress = 65003,
}

impl ConfigItem {
    pub fn from_value(value: u64) -> Option<Self> {
        Some(match value {
            1 => Self::DisableProgramVerification,
            2 => Self::DramId,
            3 => Self::SecurityEngineInterruptNumber,
            4 => Self::FuseVersion,
            5 => Self::HardwareType,
            6 => Self::HardwareState,
            7 => Self::IsRecoveryBoot,
            8 => Self::DeviceId,
            9 => Self::BootReason,
            10 => Self::MemoryMode,
            11 => Self::IsDevelopmentFunctionEnabled,
            12 => Self::KernelConfiguration,
            13 => Self::ChargerHiZ,
            14 => Self::IsQuest,
            15 => Self::RegulatorType,
            16 => Self::DeviceUniqueKeyGeneration,
            17 => Self::Package2Hash,
            65000 => Self::ExtensionApiVersion,
            65001 => Self::NeedsReboot,
            65002 => Self::NeedsShutdown,
            65003 => Self::PayloadAddress,
            _ => return None,
        })
    }
}

pub(crate) fn get_config<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let Some(item) = ConfigItem::from_value(args.0[1]) else {
        return SmcResult::InvalidArgument.into();
    };

    let value = match item {
        ConfigItem::DisableProgramVerification => 0,
        ConfigItem::DramId => ctx.config.dram_id as u64,
        ConfigItem::SecurityEngineInterruptNumber => SECURITY_ENGINE_INTERRUPT_NUMBER,
        ConfigItem::FuseVersion => ctx.key_generation as u64,
        ConfigItem::HardwareType => ctx.config.hardware_type as u64,
        ConfigItem::HardwareState => ctx.config.is_production as u64,
        ConfigItem::IsRecoveryBoot => ctx.config.is_recovery_boot as u64,
        ConfigItem::DeviceId => ctx.config.device_id,
        ConfigItem::BootReason => 0,
        ConfigItem::MemoryMode => ctx.config.memory_mode as u64,
        ConfigItem::IsDevelopmentFunctionEnabled => (!ctx.config.is_production) as u64,
        ConfigItem::KernelConfiguration => 0,
        ConfigItem::ChargerHiZ => ctx.charger_hiz() as u64,
        ConfigItem::IsQuest => 0,
        ConfigItem::RegulatorType => match ctx.config.hardware_type {
            HardwareType::Icosa | HardwareType::Copper => 0,
            _ => 1,
        },
        ConfigItem::DeviceUniqueKeyGeneration => ctx.key_generation as u64,
        ConfigItem::Package2Hash => {
            // The container hash is only exposed to the recovery firmware.
            if !ctx.config.is_recovery_boot {
                return SmcResult::NotPermitted.into();
            }
            let Some(hash) = ctx.package2_hash else {
                return SmcResult::NotInitialized.into();
            };
            for (i, chunk) in hash.chunks_exact(8).enumerate() {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                args.0[1 + i] = u64::from_le_bytes(word);
            }
            return SmcResult::Success.into();
        }
        ConfigItem::ExtensionApiVersion => EXTENSION_API_VERSION,
        ConfigItem::NeedsReboot => match ctx.reboot_state() {
            RebootState::None | RebootState::Shutdown => 0,
            RebootState::Reboot => 1,
            RebootState::RebootToPayload => 2,
        },
        ConfigItem::NeedsShutdown => (ctx.reboot_state() == RebootState::Shutdown) as u64,
        ConfigItem::PayloadAddress => ctx.payload_address,
    };
    args.0[1] = value;
    SmcResult::Success.into()
}

pub(crate) fn set_config<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let Some(item) = ConfigItem::from_value(args.0[1]) else {
        return SmcResult::InvalidArgument.into();
    };
    let value = args.0[2];

    match item {
        ConfigItem::ChargerHiZ => {
            ctx.set_charger_hiz(value != 0);
            SmcResult::Success.into()
        }
        ConfigItem::NeedsReboot => match value {
            0 => {
                ctx.reboot_state = RebootState::None;
                SmcResult::Success.into()
            }
            1 => {
                ctx.reboot_state = RebootState::Reboot;
                SmcResult::Success.into()
            }
            2 => {
                // Rebooting into a payload needs a registered address.
                if ctx.payload_address == 0 {
                    return SmcResult::InvalidArgument.into();
                }
                ctx.reboot_state = RebootState::RebootToPayload;
                SmcResult::Success.into()
            }
            _ => SmcResult::InvalidArgument.into(),
        },
        ConfigItem::NeedsShutdown => {
            if value == 0 {
                return SmcResult::InvalidArgument.into();
            }
            ctx.reboot_state = RebootState::Shutdown;
            SmcResult::Success.into()
        }
        ConfigItem::PayloadAddress => {
            // One-shot: the first registration wins for the lifetime of
            // this boot.
            if ctx.payload_address != 0 {
                return SmcResult::Busy.into();
            }
            if value == 0 {
                return SmcResult::InvalidArgument.into();
            }
            ctx.payload_address = value;
            SmcResult::Success.into()
        }
        _ => SmcResult::InvalidArgument.into(),
    }
}
