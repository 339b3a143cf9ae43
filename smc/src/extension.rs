/*++

Licensed under the Apache-2.0 license.

File Name:

    extension.rs

Abstract:

    File contains the trusted-application extension handlers: IRAM
    transfers, the whitelisted register accessor, raw address writes, and
    the emummc configuration report.

--*/

use crate::context::Monitor;
use crate::mapper::{AmsIramPage, AmsUserPage, PageMapper, SmcMemory};
use crate::result::SmcResult;
use crate::SmcArguments;

const IRAM_BASE: u64 = 0x4000_0000;
const IRAM_SIZE: u64 = 0x4_0000;

const IRAM_COPY_MAX_SIZE: usize = 0x1000;

/// MMIO ranges the register accessor may touch.
const ALLOWED_REGISTER_RANGES: [(u64, u64); 2] = [
    // Power management controller.
    (0x7000_E400, 0x400),
    // Memory controller.
    (0x7001_9000, 0x1000),
];

/// Emummc configuration block written to the caller: magic, enabled
/// flag, id, sector offset. This build runs without an emummc.
const EMUMMC_MAGIC: u32 = 0x3053_4645;
const EMUMMC_CONFIG_SIZE: usize = 0x20;

#[derive(Clone, Copy, PartialEq, Eq)]
enum IramCopyDirection {
    ToDram,
    ToIram,
}

/// IramCopy: move bytes between DRAM and IRAM through the extension
/// windows.
pub(crate) fn iram_copy<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let dram_addr = args.0[1];
    let iram_addr = args.0[2];
    let size = args.0[3] as usize;
    let direction = match args.0[4] {
        0 => IramCopyDirection::ToDram,
        1 => IramCopyDirection::ToIram,
        _ => return SmcResult::InvalidArgument.into(),
    };

    if size == 0 || size > IRAM_COPY_MAX_SIZE || size % 4 != 0 {
        return SmcResult::InvalidArgument.into();
    }
    let iram_end = IRAM_BASE + IRAM_SIZE;
    if iram_addr < IRAM_BASE || iram_addr + size as u64 > iram_end {
        return SmcResult::InvalidArgument.into();
    }

    let mut buf = [0u8; IRAM_COPY_MAX_SIZE];
    let ok = match direction {
        IramCopyDirection::ToDram => {
            AmsIramPage::copy_from(&ctx.windows, &ctx.memory, iram_addr, &mut buf[..size])
                && AmsUserPage::copy_to(&ctx.windows, &mut ctx.memory, dram_addr, &buf[..size])
        }
        IramCopyDirection::ToIram => {
            AmsUserPage::copy_from(&ctx.windows, &ctx.memory, dram_addr, &mut buf[..size])
                && AmsIramPage::copy_to(&ctx.windows, &mut ctx.memory, iram_addr, &buf[..size])
        }
    };
    if ok {
        SmcResult::Success.into()
    } else {
        SmcResult::InvalidArgument.into()
    }
}

fn register_address_allowed(addr: u64) -> bool {
    addr % 4 == 0
        && ALLOWED_REGISTER_RANGES
            .iter()
            .any(|&(base, len)| addr >= base && addr + 4 <= base + len)
}

/// ReadWriteRegister: masked read-modify-write of a whitelisted MMIO
/// register. The previous value is returned.
pub(crate) fn read_write_register<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let addr = args.0[1];
    let mask = args.0[2] as u32;
    let value = args.0[3] as u32;

    if !register_address_allowed(addr) {
        return SmcResult::InvalidArgument.into();
    }

    let mut word = [0u8; 4];
    if !ctx.memory.read(addr, &mut word) {
        return SmcResult::InvalidArgument.into();
    }
    let old = u32::from_le_bytes(word);

    if mask != 0 {
        let new = (old & !mask) | (value & mask);
        if !ctx.memory.write(addr, &new.to_le_bytes()) {
            return SmcResult::InvalidArgument.into();
        }
    }
    args.0[1] = old as u64;
    SmcResult::Success.into()
}

/// WriteAddress: write a naturally aligned 1/2/4/8 byte value to caller
/// memory.
pub(crate) fn write_address<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let addr = args.0[1];
    let value = args.0[2];
    let size = args.0[3] as usize;

    if !matches!(size, 1 | 2 | 4 | 8) || addr % size as u64 != 0 {
        return SmcResult::InvalidArgument.into();
    }

    let bytes = value.to_le_bytes();
    if AmsUserPage::copy_to(&ctx.windows, &mut ctx.memory, addr, &bytes[..size]) {
        SmcResult::Success.into()
    } else {
        SmcResult::InvalidArgument.into()
    }
}

/// GetEmummcConfig: report the emummc configuration block.
pub(crate) fn get_emummc_config<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let out_addr = args.0[2];

    let mut config = [0u8; EMUMMC_CONFIG_SIZE];
    config[..4].copy_from_slice(&EMUMMC_MAGIC.to_le_bytes());
    // Remaining fields (enabled, id, sector) stay zero.

    if AmsUserPage::copy_to(&ctx.windows, &mut ctx.memory, out_addr, &config) {
        args.0[1] = 0;
        SmcResult::Success.into()
    } else {
        SmcResult::InvalidArgument.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_monitor;
    use crate::context::Monitor;
    use crate::mapper::test_memory::FlatMemory;

    /// Backing that spans IRAM so the copy tests can address both sides.
    fn iram_monitor() -> Monitor<FlatMemory> {
        let mut ctx = test_monitor();
        ctx.memory = FlatMemory::new(IRAM_BASE, (IRAM_SIZE + 0x1_0000) as usize);
        ctx
    }

    #[test]
    fn test_iram_copy_round_trip() {
        let mut ctx = iram_monitor();
        let dram_addr = IRAM_BASE + IRAM_SIZE; // past IRAM in the backing
        ctx.memory.bytes[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut args = SmcArguments::default();
        args.0[1] = dram_addr;
        args.0[2] = IRAM_BASE;
        args.0[3] = 8;
        args.0[4] = 0; // to DRAM
        assert_eq!(iram_copy(&mut ctx, &mut args), u64::from(SmcResult::Success));
        let dram_off = IRAM_SIZE as usize;
        assert_eq!(&ctx.memory.bytes[dram_off..dram_off + 8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_iram_copy_bounds() {
        let mut ctx = iram_monitor();
        let mut args = SmcArguments::default();
        args.0[1] = IRAM_BASE + IRAM_SIZE;
        args.0[2] = IRAM_BASE + IRAM_SIZE - 4; // runs off the end
        args.0[3] = 8;
        assert_eq!(
            iram_copy(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );

        args.0[2] = IRAM_BASE;
        args.0[3] = 6; // not word aligned
        assert_eq!(
            iram_copy(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
    }

    #[test]
    fn test_read_write_register_masking() {
        let mut ctx = test_monitor();
        let addr = 0x7000_E400u64;
        ctx.memory = FlatMemory::new(addr, 0x400);
        ctx.memory.bytes[..4].copy_from_slice(&0xAABB_CCDDu32.to_le_bytes());

        let mut args = SmcArguments::default();
        args.0[1] = addr;
        args.0[2] = 0x0000_FF00;
        args.0[3] = 0x0000_1200;
        assert_eq!(
            read_write_register(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        assert_eq!(args.0[1], 0xAABB_CCDD);
        assert_eq!(
            u32::from_le_bytes(ctx.memory.bytes[..4].try_into().unwrap()),
            0xAABB_12DD
        );
    }

    #[test]
    fn test_read_write_register_whitelist() {
        let mut ctx = test_monitor();
        let mut args = SmcArguments::default();
        args.0[1] = 0x6000_0000;
        assert_eq!(
            read_write_register(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
        args.0[1] = 0x7000_E402; // misaligned
        assert_eq!(
            read_write_register(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
    }

    #[test]
    fn test_write_address_size_rules() {
        let mut ctx = test_monitor();
        let base = ctx.memory.base;

        let mut args = SmcArguments::default();
        args.0[1] = base + 8;
        args.0[2] = 0x1122_3344_5566_7788;
        args.0[3] = 8;
        assert_eq!(
            write_address(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        assert_eq!(
            u64::from_le_bytes(ctx.memory.bytes[8..16].try_into().unwrap()),
            0x1122_3344_5566_7788
        );

        args.0[1] = base + 9; // misaligned for size 8
        assert_eq!(
            write_address(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
        args.0[1] = base;
        args.0[3] = 3;
        assert_eq!(
            write_address(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );
    }

    #[test]
    fn test_emummc_config_reports_magic() {
        let mut ctx = test_monitor();
        let mut args = SmcArguments::default();
        args.0[2] = ctx.memory.base;
        assert_eq!(
            get_emummc_config(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        assert_eq!(
            u32::from_le_bytes(ctx.memory.bytes[..4].try_into().unwrap()),
            EMUMMC_MAGIC
        );
    }
}
