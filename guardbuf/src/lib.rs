//! # guardbuf
//!
//! A secure memory buffer for sensitive data (keys, passwords, tokens).
//!
//! Each buffer is a single anonymous mapping that is locked out of swap
//! and laid out as five contiguous regions:
//!
//! ```text
//! | front guard | padding | canary | data | rear guard |
//! ```
//!
//! The guard pages are inaccessible, so any stray access past either
//! end of the data region faults immediately. The canary is seeded from
//! a process-wide random value and re-verified before every access; a
//! mismatch means the buffer was corrupted and it is no longer trusted.
//! Freeing a buffer zeroes the data region before the mapping is
//! unlocked and returned to the kernel, and a buffer dropped while
//! still live is freed the same way.
//!
//! A buffer has single-owner semantics: all accessors take `&mut self`
//! or `&self`, and no internal synchronization is provided.
//!
//! ```rust,no_run
//! # fn main() -> Result<(), guardbuf::BufferError> {
//! let mut buffer = guardbuf::alloc(64)?;
//! buffer.write(b"api-token")?;
//! assert_eq!(buffer.view(), b"api-token");
//! buffer.free()?;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod error;
mod globals;

pub use buffer::{alloc, required_bytes, Buffer};
pub use error::{BufferError, ReallocError};

/// Number of bytes in the tamper-detection canary.
pub const CANARY_SIZE: usize = 16;

/// Number of inaccessible guard pages wrapped around every allocation.
pub const GUARD_PAGES: usize = 2;
