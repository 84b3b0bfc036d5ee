use thiserror::Error;

/// Errors reported by the memory syscall wrappers.
///
/// Each variant corresponds to one underlying primitive, so callers can
/// tell which stage of an allocation failed. The payload carries the
/// operating system's own error description.
#[derive(Error, Debug)]
pub enum MemsysError {
    /// `mmap` failed.
    #[error("could not map memory: {0}")]
    MapFailed(String),

    /// `munmap` failed.
    #[error("could not unmap memory: {0}")]
    UnmapFailed(String),

    /// `mlock` failed, commonly because `RLIMIT_MEMLOCK` was reached.
    #[error("could not lock memory, limit reached? {0}")]
    LockFailed(String),

    /// `munlock` failed.
    #[error("could not unlock memory: {0}")]
    UnlockFailed(String),

    /// `mprotect` failed.
    #[error("could not change memory protection: {0}")]
    ProtectFailed(String),

    /// `setrlimit` failed.
    #[error("could not set resource limit: {0}")]
    RlimitFailed(String),
}
