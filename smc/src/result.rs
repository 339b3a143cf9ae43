/*++

Licensed under the Apache-2.0 license.

File Name:

    result.rs

Abstract:

    File contains the SMC result code enumeration, the asynchronous
    completion storage, and the ticket redemption handlers.

--*/

use secmon_drivers::RSA_2048_BYTE_SIZE;
use secmon_error::MonitorError;

use crate::context::Monitor;
use crate::mapper::{PageMapper, SmcMemory, SmcUserPage};
use crate::{key_to_registers, SmcArguments};

/// Result codes returned to the non-secure caller. Nothing beyond this
/// enumeration crosses the trust boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SmcResult {
    Success = 0,
    NotImplemented = 1,
    InvalidArgument = 2,
    Busy = 3,
    NoAsyncOperation = 4,
    InvalidAsyncOperation = 5,
    NotPermitted = 6,
    NotInitialized = 7,
}

impl From<SmcResult> for u64 {
    fn from(result: SmcResult) -> u64 {
        result as u64
    }
}

impl SmcResult {
    /// Collapse an internal error onto the caller-visible code space.
    pub(crate) fn from_error(err: MonitorError) -> Self {
        if err == MonitorError::KEY_STORAGE_RSA_KEY_NOT_PRESENT
            || err == MonitorError::KEY_STORAGE_RSA_KEY_PROVISIONAL
        {
            SmcResult::NotInitialized
        } else if err == MonitorError::DRIVER_ENGINE_BUSY {
            SmcResult::Busy
        } else {
            SmcResult::InvalidArgument
        }
    }
}

/// Stored completion state for the single outstanding asynchronous
/// operation, one variant per operation kind that actually uses the
/// ticket protocol.
pub enum AsyncCompletion {
    ComputeAes,
    ModularExponentiate { output: [u8; RSA_2048_BYTE_SIZE] },
    PrepareEsDeviceUniqueKey { access_key: [u8; 16] },
}

/// Redeem an async ticket without result data. Releases the engine lock
/// the async path left held.
pub(crate) fn get_result<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let key = args.0[1];
    if !ctx.async_op.is_active() {
        return SmcResult::NoAsyncOperation.into();
    }
    if !ctx.se.is_operation_done() {
        return SmcResult::Busy.into();
    }
    if !ctx.async_op.redeem(key) {
        return SmcResult::InvalidAsyncOperation.into();
    }
    ctx.completion = None;
    ctx.lock.unlock();
    SmcResult::Success.into()
}

/// Redeem an async ticket and deliver its result data.
pub(crate) fn get_result_data<M: SmcMemory>(ctx: &mut Monitor<M>, args: &mut SmcArguments) -> u64 {
    let key = args.0[1];
    if !ctx.async_op.is_active() {
        return SmcResult::NoAsyncOperation.into();
    }
    if !ctx.se.is_operation_done() {
        return SmcResult::Busy.into();
    }
    if !ctx.async_op.redeem(key) {
        return SmcResult::InvalidAsyncOperation.into();
    }
    let completion = ctx.completion.take();
    ctx.lock.unlock();

    match completion {
        None => SmcResult::InvalidAsyncOperation.into(),
        Some(AsyncCompletion::ComputeAes) => SmcResult::Success.into(),
        Some(AsyncCompletion::ModularExponentiate { output }) => {
            let addr = args.0[2];
            let size = args.0[3] as usize;
            if size == 0 || size > RSA_2048_BYTE_SIZE {
                return SmcResult::InvalidArgument.into();
            }
            // The caller may take a right-aligned tail of the result.
            let tail = &output[RSA_2048_BYTE_SIZE - size..];
            if !SmcUserPage::copy_to(&ctx.windows, &mut ctx.memory, addr, tail) {
                return SmcResult::InvalidArgument.into();
            }
            SmcResult::Success.into()
        }
        Some(AsyncCompletion::PrepareEsDeviceUniqueKey { access_key }) => {
            let (lo, hi) = key_to_registers(&access_key);
            args.0[1] = lo;
            args.0[2] = hi;
            SmcResult::Success.into()
        }
    }
}
