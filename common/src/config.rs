/*++

Licensed under the Apache-2.0 license.

File Name:

    config.rs

Abstract:

    File contains the boot-time monitor configuration: target firmware,
    hardware identity, and the restricted-SMC policy mask. Copied out of
    the handoff block once at boot and immutable thereafter.

--*/

/// Target firmware version, encoded `major << 24 | minor << 16 | micro << 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TargetFirmware(pub u32);

impl TargetFirmware {
    pub const FW_1_0_0: TargetFirmware = TargetFirmware(0x0100_0000);
    pub const FW_4_0_0: TargetFirmware = TargetFirmware(0x0400_0000);
    pub const FW_5_0_0: TargetFirmware = TargetFirmware(0x0500_0000);
    pub const FW_8_0_0: TargetFirmware = TargetFirmware(0x0800_0000);
    pub const CURRENT: TargetFirmware = TargetFirmware(0x1000_0000);
}

/// SoC hardware variants reported through GetConfig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HardwareType {
    Icosa = 0,
    Copper = 1,
    Hoag = 2,
    Iowa = 3,
    Calcio = 4,
    Aula = 5,
}

/// Boot-time configuration. Built once from fuses plus the handoff block's
/// boot parameters; never mutated after the cold boot flow completes.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfiguration {
    pub target_firmware: TargetFirmware,
    pub hardware_type: HardwareType,
    /// Production (retail) unit: development escape hatches are refused.
    pub is_production: bool,
    pub is_recovery_boot: bool,
    /// Bitmask of SMC restriction classes denied to this boot.
    pub restricted_smc_mask: u32,
    /// Fused 64-bit device id.
    pub device_id: u64,
    /// DRAM vendor id from fuses.
    pub dram_id: u32,
    pub memory_mode: u8,
}

impl MonitorConfiguration {
    /// A development-unit configuration; tests and the emulated target
    /// start from this.
    pub fn development() -> Self {
        Self {
            target_firmware: TargetFirmware::CURRENT,
            hardware_type: HardwareType::Icosa,
            is_production: false,
            is_recovery_boot: false,
            restricted_smc_mask: 0,
            device_id: 0x0052_4F54_4F4D_0001,
            dram_id: 0,
            memory_mode: 0,
        }
    }

    pub fn production() -> Self {
        Self {
            is_production: true,
            ..Self::development()
        }
    }

    /// Low 7 bytes of the device id; the high byte is bookkeeping state
    /// owned by the device-unique-data protocol.
    pub fn device_id_low(&self) -> u64 {
        self.device_id & 0x00FF_FFFF_FFFF_FFFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_firmware_ordering() {
        assert!(TargetFirmware::FW_5_0_0 > TargetFirmware::FW_4_0_0);
        assert!(TargetFirmware::FW_8_0_0 <= TargetFirmware::CURRENT);
        assert!(TargetFirmware(0x0501_0000) > TargetFirmware::FW_5_0_0);
    }

    #[test]
    fn test_device_id_low_masks_high_byte() {
        let mut cfg = MonitorConfiguration::development();
        cfg.device_id = 0xAB00_1122_3344_5566;
        assert_eq!(cfg.device_id_low(), 0x0000_1122_3344_5566);
    }
}
