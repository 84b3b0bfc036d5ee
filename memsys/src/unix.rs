use crate::error::MemsysError;
use crate::types::Protection;
use log::trace;
use once_cell::sync::Lazy;
use std::{io, ptr};
use zeroize::Zeroize;

static PAGE_SIZE: Lazy<usize> = Lazy::new(page_size::get);

#[inline]
fn as_mut_ptr(region: &mut [u8]) -> *mut libc::c_void {
    region.as_mut_ptr().cast()
}

fn os_error() -> String {
    io::Error::last_os_error().to_string()
}

pub fn alloc(size: usize) -> Result<&'static mut [u8], MemsysError> {
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(MemsysError::MapFailed(os_error()));
    }
    trace!("mapped {size} bytes at {ptr:p}");

    // Anonymous mappings are zero-filled by the kernel.
    Ok(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), size) })
}

pub fn free(region: &mut [u8]) -> Result<(), MemsysError> {
    if region.is_empty() {
        return Ok(());
    }

    // Parts of the region may be PROT_NONE; restore access for the wipe.
    protect(region, Protection::ReadWrite)?;
    region.zeroize();

    let len = region.len();
    if unsafe { libc::munmap(as_mut_ptr(region), len) } != 0 {
        return Err(MemsysError::UnmapFailed(os_error()));
    }
    trace!("unmapped {len} bytes");
    Ok(())
}

pub fn protect(region: &mut [u8], protection: Protection) -> Result<(), MemsysError> {
    if region.is_empty() {
        return Ok(());
    }

    let prot = match protection {
        Protection::NoAccess => libc::PROT_NONE,
        Protection::ReadOnly => libc::PROT_READ,
        Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
    };
    let len = region.len();
    if unsafe { libc::mprotect(as_mut_ptr(region), len, prot) } != 0 {
        return Err(MemsysError::ProtectFailed(os_error()));
    }
    trace!("set protection {protection:?} on {len} bytes");
    Ok(())
}

pub fn lock(region: &mut [u8]) -> Result<(), MemsysError> {
    if region.is_empty() {
        return Ok(());
    }

    // Keep locked pages out of core dumps as well as swap.
    #[cfg(target_os = "linux")]
    unsafe {
        libc::madvise(as_mut_ptr(region), region.len(), libc::MADV_DONTDUMP);
    }

    let len = region.len();
    if unsafe { libc::mlock(as_mut_ptr(region), len) } != 0 {
        return Err(MemsysError::LockFailed(os_error()));
    }
    trace!("locked {len} bytes");
    Ok(())
}

pub fn unlock(region: &mut [u8]) -> Result<(), MemsysError> {
    if region.is_empty() {
        return Ok(());
    }

    let len = region.len();
    if unsafe { libc::munlock(as_mut_ptr(region), len) } != 0 {
        return Err(MemsysError::UnlockFailed(os_error()));
    }
    trace!("unlocked {len} bytes");
    Ok(())
}

pub fn page_size() -> usize {
    *PAGE_SIZE
}

pub fn disable_core_dumps() -> Result<(), MemsysError> {
    let rlimit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::setrlimit(libc::RLIMIT_CORE, &rlimit) } != 0 {
        return Err(MemsysError::RlimitFailed(os_error()));
    }
    Ok(())
}
