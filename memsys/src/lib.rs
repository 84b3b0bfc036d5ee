//! # memsys
//!
//! Narrow wrapper over the memory-related syscalls needed to hold
//! sensitive data safely:
//!
//! - anonymous private memory mappings (`mmap`/`munmap`)
//! - locking regions out of swap (`mlock`/`munlock`)
//! - page protection changes (`mprotect`)
//!
//! Every `unsafe` block in the workspace lives behind this boundary.
//! Mappings are handed out as plain byte slices; callers never see a
//! raw pointer.

mod error;
mod types;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

pub use error::MemsysError;
pub use types::Protection;

/// Maps a new anonymous, private, read-write region of `size` bytes.
///
/// The region is zero-filled by the kernel and not backed by any file.
/// It must be released with [`free`]; it is not tracked by the Rust
/// allocator.
pub fn alloc(size: usize) -> Result<&'static mut [u8], MemsysError> {
    platform::alloc(size)
}

/// Unmaps a region previously returned by [`alloc`].
///
/// The region is made writable, wiped, and then unmapped, so no data
/// survives in the pages being returned to the kernel.
pub fn free(region: &mut [u8]) -> Result<(), MemsysError> {
    platform::free(region)
}

/// Changes the protection of a page-aligned region.
pub fn protect(region: &mut [u8], protection: Protection) -> Result<(), MemsysError> {
    platform::protect(region, protection)
}

/// Locks a region into physical memory so it is never written to swap.
pub fn lock(region: &mut [u8]) -> Result<(), MemsysError> {
    platform::lock(region)
}

/// Unlocks a region previously locked with [`lock`].
pub fn unlock(region: &mut [u8]) -> Result<(), MemsysError> {
    platform::unlock(region)
}

/// Returns the system's page size.
pub fn page_size() -> usize {
    platform::page_size()
}

/// Disables core dump files for the current process.
pub fn disable_core_dumps() -> Result<(), MemsysError> {
    platform::disable_core_dumps()
}
