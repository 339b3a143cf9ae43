/*++

Licensed under the Apache-2.0 license.

File Name:

    context.rs

Abstract:

    File contains the process-wide secure monitor context: the engine and
    its lock, the key stores, the dispatch table state, and the mutable
    runtime flags behind the config surface.

--*/

use core::sync::atomic::{AtomicBool, Ordering};

use secmon_common::{ImportedRsaKeyStore, MonitorConfiguration, WrappedKeyStore};
use secmon_drivers::{AsyncOperation, SecurityEngine, SecurityEngineLock, SHA_256_HASH_SIZE};

use crate::dispatch::{configure_smc_handlers_for_target_firmware, SmcTableEntry, USER_TABLE_LEN};
use crate::mapper::{MappingWindows, SmcMemory};
use crate::power::{CorePowerState, CORE_COUNT};
use crate::random::RandomCache;
use crate::result::{AsyncCompletion, SmcResult};

/// Reboot/shutdown intent registered through the extension config items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootState {
    None,
    Reboot,
    RebootToPayload,
    Shutdown,
}

/// Number of kernel carveout regions.
pub(crate) const KERNEL_CARVEOUT_COUNT: usize = 2;

/// The secure monitor's process-wide state. One instance per device;
/// tests instantiate independent instances per case.
pub struct Monitor<M: SmcMemory> {
    pub se: SecurityEngine,
    pub memory: M,
    pub windows: MappingWindows,
    pub lock: SecurityEngineLock,
    pub async_op: AsyncOperation,
    pub(crate) completion: Option<AsyncCompletion>,
    pub config: MonitorConfiguration,
    pub store: WrappedKeyStore,
    pub rsa_keys: ImportedRsaKeyStore,
    /// Detected at cold boot, immutable thereafter.
    pub key_generation: usize,
    pub(crate) random_cache: RandomCache,
    pub(crate) charger_hiz: AtomicBool,
    pub(crate) reboot_state: RebootState,
    /// One-shot payload address registration; zero means unset.
    pub(crate) payload_address: u64,
    /// Container hash snapshot, present only after a recovery boot.
    pub package2_hash: Option<[u8; SHA_256_HASH_SIZE]>,
    pub(crate) cores: [CorePowerState; CORE_COUNT],
    pub(crate) core_entrypoints: [u64; CORE_COUNT],
    /// Simulated power-gate ready flags the power-on handshake polls.
    pub power_gate_ready: [bool; CORE_COUNT],
    /// Last slave-security register value programmed per core.
    pub(crate) slave_security: [u32; CORE_COUNT],
    pub(crate) carveouts: [(u64, u64); KERNEL_CARVEOUT_COUNT],
    pub(crate) user_table: [SmcTableEntry; USER_TABLE_LEN],
}

impl<M: SmcMemory> Monitor<M> {
    pub fn new(
        mut se: SecurityEngine,
        memory: M,
        config: MonitorConfiguration,
        store: WrappedKeyStore,
        rsa_keys: ImportedRsaKeyStore,
        key_generation: usize,
    ) -> Self {
        let mut random_cache = RandomCache::new();
        random_cache.refill(&mut se);

        let mut cores = [CorePowerState::Off; CORE_COUNT];
        cores[0] = CorePowerState::On;

        Self {
            se,
            memory,
            windows: MappingWindows::new(),
            lock: SecurityEngineLock::new(),
            async_op: AsyncOperation::new(),
            completion: None,
            user_table: configure_smc_handlers_for_target_firmware(config.target_firmware),
            config,
            store,
            rsa_keys,
            key_generation,
            random_cache,
            charger_hiz: AtomicBool::new(false),
            reboot_state: RebootState::None,
            payload_address: 0,
            package2_hash: None,
            cores,
            core_entrypoints: [0; CORE_COUNT],
            power_gate_ready: [true; CORE_COUNT],
            slave_security: [0; CORE_COUNT],
            carveouts: [(0, 0); KERNEL_CARVEOUT_COUNT],
        }
    }

    pub fn charger_hiz(&self) -> bool {
        self.charger_hiz.load(Ordering::Acquire)
    }

    pub fn set_charger_hiz(&self, enabled: bool) {
        self.charger_hiz.store(enabled, Ordering::Release);
    }

    pub fn reboot_state(&self) -> RebootState {
        self.reboot_state
    }

    pub fn core_state(&self, core: usize) -> Option<CorePowerState> {
        self.cores.get(core).copied()
    }

    /// Run a synchronous handler under the engine lock. Busy on
    /// contention; the lock is released on every exit path.
    pub fn lock_and_invoke(&mut self, f: impl FnOnce(&mut Self) -> SmcResult) -> SmcResult {
        if !self.lock.try_lock() {
            return SmcResult::Busy;
        }
        let result = f(self);
        self.lock.unlock();
        result
    }

    /// Run an asynchronous handler under the engine lock with the single
    /// async ticket claimed. On success the lock stays held and the ticket
    /// key is returned; ticket redemption releases the lock. On failure
    /// the ticket is cancelled and the lock released.
    pub fn lock_and_invoke_async(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<AsyncCompletion, SmcResult>,
    ) -> Result<u64, SmcResult> {
        if !self.lock.try_lock() {
            return Err(SmcResult::Busy);
        }
        let key = self.se.generate_random_u64();
        if !self.async_op.begin(key) {
            self.lock.unlock();
            return Err(SmcResult::Busy);
        }
        match f(self) {
            Ok(completion) => {
                self.completion = Some(completion);
                Ok(key)
            }
            Err(result) => {
                self.async_op.cancel();
                self.completion = None;
                self.lock.unlock();
                Err(result)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mapper::test_memory::FlatMemory;

    pub(crate) fn test_monitor() -> Monitor<FlatMemory> {
        Monitor::new(
            SecurityEngine::new([3u8; 32]),
            FlatMemory::new(0x8000_0000, 0x4000),
            MonitorConfiguration::development(),
            WrappedKeyStore::new(),
            ImportedRsaKeyStore::new(),
            5,
        )
    }

    #[test]
    fn test_lock_and_invoke_releases_on_error() {
        let mut ctx = test_monitor();
        let result = ctx.lock_and_invoke(|_| SmcResult::InvalidArgument);
        assert_eq!(result, SmcResult::InvalidArgument);
        assert!(!ctx.lock.is_locked());
    }

    #[test]
    fn test_lock_and_invoke_busy_under_contention() {
        let mut ctx = test_monitor();
        assert!(ctx.lock.try_lock());
        assert_eq!(
            ctx.lock_and_invoke(|_| SmcResult::Success),
            SmcResult::Busy
        );
        ctx.lock.unlock();
    }

    #[test]
    fn test_async_success_holds_lock_until_redeemed() {
        let mut ctx = test_monitor();
        let key = ctx
            .lock_and_invoke_async(|_| Ok(AsyncCompletion::ComputeAes))
            .unwrap();
        assert!(ctx.lock.is_locked());
        assert!(ctx.async_op.is_active());

        // A second async attempt fails closed while the first is
        // outstanding.
        assert_eq!(
            ctx.lock_and_invoke_async(|_| Ok(AsyncCompletion::ComputeAes)),
            Err(SmcResult::Busy)
        );

        assert!(ctx.async_op.redeem(key));
        ctx.lock.unlock();
    }

    #[test]
    fn test_async_failure_cancels_ticket_and_unlocks() {
        let mut ctx = test_monitor();
        assert_eq!(
            ctx.lock_and_invoke_async(|_| Err(SmcResult::InvalidArgument)),
            Err(SmcResult::InvalidArgument)
        );
        assert!(!ctx.lock.is_locked());
        assert!(!ctx.async_op.is_active());
    }
}
