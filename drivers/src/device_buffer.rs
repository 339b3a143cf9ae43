/*++

Licensed under the Apache-2.0 license.

File Name:

    device_buffer.rs

Abstract:

    File contains the cache-line aligned staging buffer used for data the
    security engine reads or writes by DMA.

--*/

use core::sync::atomic::{fence, Ordering};

/// Cache-line aligned staging buffer for engine DMA.
///
/// Data handed to the engine must be flushed before the operation starts
/// and invalidated before the CPU reads the result; both are modeled as
/// full fences here. Alignment keeps the buffer from sharing a cache line
/// with unrelated data.
#[repr(align(64))]
pub struct DeviceBuffer<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> DeviceBuffer<N> {
    pub const fn new() -> Self {
        Self { data: [0; N] }
    }

    /// Flush CPU-side writes so the engine sees them.
    pub fn flush(&self) {
        fence(Ordering::SeqCst);
    }

    /// Discard stale CPU-side cache contents before reading engine output.
    pub fn invalidate(&self) {
        fence(Ordering::SeqCst);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn as_array(&self) -> &[u8; N] {
        &self.data
    }

    pub fn as_mut_array(&mut self) -> &mut [u8; N] {
        &mut self.data
    }
}

impl<const N: usize> Default for DeviceBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
