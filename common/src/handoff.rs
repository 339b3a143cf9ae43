/*++

Licensed under the Apache-2.0 license.

File Name:

    handoff.rs

Abstract:

    File contains the bootloader handoff block: the state machine the
    monitor and the less-trusted bootloader advance in lockstep during
    cold boot.

--*/

use core::ptr;

use secmon_error::{MonitorError, MonitorResult};

/// Maximum number of polls of the handoff state before the boot is
/// declared wedged.
pub const HANDOFF_POLL_BUDGET: u32 = 10_000_000;

/// States the bootloader advances through while the monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum BootloaderState {
    Uninitialized = 0,
    Initialized = 1,
    LoadedBootConfig = 2,
    InitializedDram = 3,
    LoadedPackage2 = 4,
    Done = 5,
}

/// The shared handoff block. Lives at a fixed physical address written by
/// the bootloader; all reads of the bootloader-owned field are volatile.
#[repr(C)]
pub struct SecureMonitorParameters {
    bootloader_state: u32,
    secmon_state: u32,
}

impl SecureMonitorParameters {
    pub fn new() -> Self {
        Self {
            bootloader_state: BootloaderState::Uninitialized as u32,
            secmon_state: 0,
        }
    }

    /// Current bootloader state, read volatile: the other side mutates it
    /// behind our back.
    pub fn bootloader_state(&self) -> u32 {
        unsafe { ptr::read_volatile(&self.bootloader_state) }
    }

    /// Bootloader-side write. In production this happens from the other
    /// world; the boot flow tests drive it directly.
    pub fn set_bootloader_state(&mut self, state: BootloaderState) {
        unsafe { ptr::write_volatile(&mut self.bootloader_state, state as u32) }
    }

    /// Advance the monitor-side state so the bootloader can observe
    /// progress.
    pub fn set_secmon_state(&mut self, state: u32) {
        unsafe { ptr::write_volatile(&mut self.secmon_state, state) }
    }

    pub fn secmon_state(&self) -> u32 {
        unsafe { ptr::read_volatile(&self.secmon_state) }
    }

    /// Busy-wait until the bootloader reaches `state`. The budget bounds
    /// the wait; running out means the bootloader died and the boot is
    /// unrecoverable.
    pub fn wait_for_bootloader_state(
        &self,
        state: BootloaderState,
        budget: u32,
    ) -> MonitorResult<()> {
        for _ in 0..budget {
            let current = self.bootloader_state();
            if current >= state as u32 {
                if current > BootloaderState::Done as u32 {
                    return Err(MonitorError::BOOT_HANDOFF_STATE_INVALID);
                }
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(MonitorError::BOOT_HANDOFF_TIMED_OUT)
    }
}

impl Default for SecureMonitorParameters {
    fn default() -> Self {
        Self::new()
    }
}
