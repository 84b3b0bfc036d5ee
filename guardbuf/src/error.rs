use std::io;
use thiserror::Error;

use crate::buffer::Buffer;

/// Errors reported by buffer operations.
#[derive(Error, Debug)]
pub enum BufferError {
    /// The buffer has already been freed.
    #[error("buffer already freed")]
    AlreadyFreed,

    /// The canary (or, in strict mode, the padding) no longer matches;
    /// the buffer contents must not be trusted.
    #[error("buffer data corrupted")]
    DataCorrupted,

    /// A write did not fit entirely; `written` bytes were still copied.
    #[error("no room left in buffer ({written} bytes written)")]
    BufferFull {
        /// Number of bytes copied before the buffer ran out of room.
        written: usize,
    },

    /// A seek position exceeded the data region length.
    #[error("seek position {position} out of bounds (data length {limit})")]
    SeekOutOfBounds {
        /// The rejected position.
        position: usize,
        /// The data region length.
        limit: usize,
    },

    /// A read source repeatedly returned no data without ending.
    #[error("read source made no progress")]
    NoProgress,

    /// The read source failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// An underlying memory syscall failed.
    #[error(transparent)]
    Sys(#[from] memsys::MemsysError),
}

/// Errors reported by [`Buffer::realloc`].
#[derive(Error, Debug)]
pub enum ReallocError {
    /// The requested capacity cannot hold the source's live data. The
    /// freshly allocated buffer is handed back so the caller decides
    /// whether to keep or release it; the source buffer is untouched.
    #[error("reallocated buffer too small for existing contents")]
    BufferTooSmall {
        /// The new, still-live allocation.
        buffer: Buffer,
    },

    /// Any other buffer failure during reallocation.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}
