/*++

Licensed under the Apache-2.0 license.

File Name:

    lock.rs

Abstract:

    File contains the security engine lock and the single-outstanding
    asynchronous operation ticket.

--*/

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Guards the security engine across cores. Try-lock only; callers that
/// lose the race report Busy rather than spinning.
pub struct SecurityEngineLock {
    locked: AtomicBool,
}

impl SecurityEngineLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Attempt to take the lock. Returns false if another core holds it.
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Default for SecurityEngineLock {
    fn default() -> Self {
        Self::new()
    }
}

/// The single outstanding asynchronous operation, identified by a random
/// non-zero 64-bit key handed to the caller. Zero means "no operation".
pub struct AsyncOperation {
    key: AtomicU64,
}

impl AsyncOperation {
    pub const fn new() -> Self {
        Self {
            key: AtomicU64::new(0),
        }
    }

    /// Register a new operation. Fails if one is already outstanding.
    /// `key` must be non-zero.
    pub fn begin(&self, key: u64) -> bool {
        debug_assert_ne!(key, 0);
        self.key
            .compare_exchange(0, key, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Redeem the ticket. Only the caller presenting the matching key may
    /// consume the operation.
    pub fn redeem(&self, key: u64) -> bool {
        if key == 0 {
            return false;
        }
        self.key
            .compare_exchange(key, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop the ticket without redeeming it (handler setup failed).
    pub fn cancel(&self) {
        self.key.store(0, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.key.load(Ordering::Acquire) != 0
    }
}

impl Default for AsyncOperation {
    fn default() -> Self {
        Self::new()
    }
}
