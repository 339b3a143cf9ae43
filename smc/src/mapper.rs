/*++

Licensed under the Apache-2.0 license.

File Name:

    mapper.rs

Abstract:

    File contains the physical page mapping windows: a memory access
    seam for caller-supplied physical addresses, three single-occupancy
    mapping windows, and the per-window mapper strategies.

--*/

use core::sync::atomic::{AtomicBool, Ordering};

/// Access to caller-visible physical memory. The production target backs
/// this with the mapping windows' virtual aliases; tests back it with a
/// plain buffer.
pub trait SmcMemory {
    /// Read `dst.len()` bytes at physical address `addr`. False if the
    /// address range is not accessible.
    fn read(&self, addr: u64, dst: &mut [u8]) -> bool;

    /// Write `src` at physical address `addr`.
    fn write(&mut self, addr: u64, src: &[u8]) -> bool;
}

/// One mapping window. A window holds exactly one mapping at a time;
/// claims are try-only, losers report Busy.
pub struct MappingWindow {
    claimed: AtomicBool,
}

impl MappingWindow {
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    pub fn try_claim(&self) -> Option<WindowGuard<'_>> {
        self.claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()?;
        Some(WindowGuard { window: self })
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

impl Default for MappingWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the window on drop, on every exit path.
pub struct WindowGuard<'a> {
    window: &'a MappingWindow,
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        self.window.claimed.store(false, Ordering::Release);
    }
}

/// The three mapping windows.
#[derive(Default)]
pub struct MappingWindows {
    pub smc_user: MappingWindow,
    pub ams_iram: MappingWindow,
    pub ams_user: MappingWindow,
}

impl MappingWindows {
    pub const fn new() -> Self {
        Self {
            smc_user: MappingWindow::new(),
            ams_iram: MappingWindow::new(),
            ams_user: MappingWindow::new(),
        }
    }
}

/// A mapper strategy: which window a copy goes through. The copy logic is
/// identical across strategies; only the window differs.
pub trait PageMapper {
    fn window(windows: &MappingWindows) -> &MappingWindow;

    /// Copy in from a caller address through this mapper's window.
    fn copy_from<M: SmcMemory>(
        windows: &MappingWindows,
        memory: &M,
        addr: u64,
        dst: &mut [u8],
    ) -> bool {
        if addr == 0 {
            return false;
        }
        let Some(_guard) = Self::window(windows).try_claim() else {
            return false;
        };
        memory.read(addr, dst)
    }

    /// Copy out to a caller address through this mapper's window.
    fn copy_to<M: SmcMemory>(
        windows: &MappingWindows,
        memory: &mut M,
        addr: u64,
        src: &[u8],
    ) -> bool {
        if addr == 0 {
            return false;
        }
        let Some(_guard) = Self::window(windows).try_claim() else {
            return false;
        };
        memory.write(addr, src)
    }
}

/// Window for standard user-tier SMC buffers.
pub struct SmcUserPage;

/// Window for extension IRAM transfers.
pub struct AmsIramPage;

/// Window for extension user-memory transfers.
pub struct AmsUserPage;

impl PageMapper for SmcUserPage {
    fn window(windows: &MappingWindows) -> &MappingWindow {
        &windows.smc_user
    }
}

impl PageMapper for AmsIramPage {
    fn window(windows: &MappingWindows) -> &MappingWindow {
        &windows.ams_iram
    }
}

impl PageMapper for AmsUserPage {
    fn window(windows: &MappingWindows) -> &MappingWindow {
        &windows.ams_user
    }
}
