/*++

Licensed under the Apache-2.0 license.

File Name:

    random.rs

Abstract:

    File contains the random-number SMC handlers. The user entry draws
    from the engine under the lock; the kernel entry serves from a
    pre-filled cache so it never has to wait on the engine.

--*/

use secmon_drivers::SecurityEngine;

use crate::context::Monitor;
use crate::mapper::SmcMemory;
use crate::result::SmcResult;
use crate::SmcArguments;

/// Largest request: seven output registers of eight bytes.
const MAX_RANDOM_BYTES: usize = 0x38;

const RANDOM_CACHE_SIZE: usize = 0x400;

/// Refill the cache once fewer than this many bytes remain.
const RANDOM_CACHE_LOW_WATER: usize = 0x80;

/// Buffered engine randomness for callers that must not block.
pub struct RandomCache {
    buf: [u8; RANDOM_CACHE_SIZE],
    read: usize,
}

impl RandomCache {
    pub fn new() -> Self {
        Self {
            buf: [0; RANDOM_CACHE_SIZE],
            read: RANDOM_CACHE_SIZE,
        }
    }

    pub fn refill(&mut self, se: &mut SecurityEngine) {
        se.generate_random(&mut self.buf);
        self.read = 0;
    }

    pub fn available(&self) -> usize {
        RANDOM_CACHE_SIZE - self.read
    }

    /// Drain `dst.len()` bytes. False if the cache cannot cover the
    /// request; drained bytes are never reused.
    pub fn take(&mut self, dst: &mut [u8]) -> bool {
        if self.available() < dst.len() {
            return false;
        }
        dst.copy_from_slice(&self.buf[self.read..self.read + dst.len()]);
        self.buf[self.read..self.read + dst.len()].fill(0);
        self.read += dst.len();
        true
    }
}

impl Default for RandomCache {
    fn default() -> Self {
        Self::new()
    }
}

fn pack_bytes(args: &mut SmcArguments, bytes: &[u8]) {
    let mut out = [0u8; MAX_RANDOM_BYTES];
    out[..bytes.len()].copy_from_slice(bytes);
    for (i, chunk) in out.chunks_exact(8).enumerate() {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        args.0[1 + i] = u64::from_le_bytes(word);
    }
}

/// GenerateRandomBytes (user): draw fresh bytes from the engine.
pub(crate) fn generate_random_bytes<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let size = args.0[1] as usize;
    if size > MAX_RANDOM_BYTES {
        return SmcResult::InvalidArgument.into();
    }

    ctx.lock_and_invoke(|ctx| {
        let mut bytes = [0u8; MAX_RANDOM_BYTES];
        ctx.se.generate_random(&mut bytes[..size]);
        pack_bytes(args, &bytes[..size]);
        SmcResult::Success
    })
    .into()
}

/// GenerateRandomBytes (kernel): serve from the cache without waiting on
/// the engine. The cache is refilled opportunistically whenever the
/// engine lock happens to be free.
pub(crate) fn generate_random_bytes_nonblocking<M: SmcMemory>(
    ctx: &mut Monitor<M>,
    args: &mut SmcArguments,
) -> u64 {
    let size = args.0[1] as usize;
    if size > MAX_RANDOM_BYTES {
        return SmcResult::InvalidArgument.into();
    }

    if ctx.random_cache.available() < size + RANDOM_CACHE_LOW_WATER && ctx.lock.try_lock() {
        ctx.random_cache.refill(&mut ctx.se);
        ctx.lock.unlock();
    }

    let mut bytes = [0u8; MAX_RANDOM_BYTES];
    if !ctx.random_cache.take(&mut bytes[..size]) {
        return SmcResult::Busy.into();
    }
    pack_bytes(args, &bytes[..size]);
    SmcResult::Success.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_monitor;

    #[test]
    fn test_cache_drains_and_refills() {
        let mut se = SecurityEngine::new([1u8; 32]);
        let mut cache = RandomCache::new();
        let mut buf = [0u8; 16];
        // A fresh cache is empty until the first refill.
        assert!(!cache.take(&mut buf));
        cache.refill(&mut se);
        assert!(cache.take(&mut buf));
        assert!(buf.iter().any(|&b| b != 0));

        let mut rest = [0u8; RANDOM_CACHE_SIZE - 16];
        assert!(cache.take(&mut rest));
        assert!(!cache.take(&mut buf));
    }

    #[test]
    fn test_drained_bytes_are_not_repeated() {
        let mut se = SecurityEngine::new([2u8; 32]);
        let mut cache = RandomCache::new();
        cache.refill(&mut se);
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        assert!(cache.take(&mut a));
        assert!(cache.take(&mut b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_entry_respects_size_limit() {
        let mut ctx = test_monitor();
        let mut args = SmcArguments::default();
        args.0[1] = MAX_RANDOM_BYTES as u64 + 1;
        assert_eq!(
            generate_random_bytes(&mut ctx, &mut args),
            u64::from(SmcResult::InvalidArgument)
        );

        args.0[1] = 0x38;
        assert_eq!(
            generate_random_bytes(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        assert!(args.0[1..8].iter().any(|&w| w != 0));
    }

    #[test]
    fn test_nonblocking_entry_serves_while_engine_locked() {
        let mut ctx = test_monitor();
        assert!(ctx.lock.try_lock());
        let mut args = SmcArguments::default();
        args.0[1] = 0x20;
        assert_eq!(
            generate_random_bytes_nonblocking(&mut ctx, &mut args),
            u64::from(SmcResult::Success)
        );
        assert!(args.0[1..5].iter().any(|&w| w != 0));
        ctx.lock.unlock();
    }
}
