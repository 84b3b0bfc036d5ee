use std::fmt;
use std::io::{self, ErrorKind, Read};

use log::{error, warn};
use memsys::Protection;
use subtle::ConstantTimeEq;

use crate::error::{BufferError, ReallocError};
use crate::globals;
use crate::{CANARY_SIZE, GUARD_PAGES};

/// Consecutive zero-progress read attempts tolerated by
/// [`Buffer::read_from`] before the source is declared stalled.
const PROGRESS_THRESHOLD: u32 = 10;

/// Returns the total mapping size needed to give the caller `capacity`
/// usable bytes, once the canary and both guard pages are added.
///
/// The result is always a multiple of the page size: the data region
/// plus canary are rounded up to whole pages so the data ends exactly
/// where the rear guard page begins. This value is informational; it
/// must not be passed to [`alloc`], which takes the raw capacity.
pub fn required_bytes(capacity: usize) -> usize {
    let page = globals::get().page_size;
    let needed = capacity + CANARY_SIZE;

    let total = page * (needed / page + GUARD_PAGES);
    if needed % page == 0 {
        total
    } else {
        // One extra page absorbs the remainder.
        total + page
    }
}

/// A locked, guarded buffer for sensitive data.
///
/// The backing mapping is owned exclusively by the buffer and laid out
/// as front guard, padding, canary, data, rear guard. Both guards are
/// inaccessible for the buffer's whole live lifetime. Every accessor
/// re-verifies the canary before touching the data region.
///
/// Buffers are freed on drop if still live, but callers that care about
/// teardown failures should call [`Buffer::free`] themselves.
pub struct Buffer {
    /// The whole backing mapping; `None` once freed.
    mapping: Option<&'static mut [u8]>,

    canary_offset: usize,
    data_offset: usize,
    capacity: usize,

    /// Write/read position within the data region.
    cursor: usize,

    /// Verify the padding as well as the canary on access.
    strict: bool,
}

/// Allocates a buffer with `capacity` usable bytes.
///
/// The backing mapping is anonymous, private, locked out of swap, and
/// bracketed by inaccessible guard pages; the canary is seeded from the
/// process-wide value. Any syscall failure rolls back everything
/// acquired so far and surfaces the platform error, so a buffer is
/// never returned partially constructed.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn alloc(capacity: usize) -> Result<Buffer, BufferError> {
    assert!(capacity > 0, "zero-capacity buffer requested");

    let g = globals::get();
    let needed = required_bytes(capacity);
    let mapping = memsys::alloc(needed)?;

    if let Err(e) = memsys::lock(mapping) {
        release_mapping(mapping, false);
        return Err(e.into());
    }

    // Region offsets, computed from the high end down so the data
    // region ends exactly at the rear guard page.
    let rear = needed - g.page_size;
    let data = rear - capacity;
    let canary = data - CANARY_SIZE;

    if let Err(e) = memsys::protect(&mut mapping[..g.page_size], Protection::NoAccess) {
        release_mapping(mapping, true);
        return Err(e.into());
    }
    if let Err(e) = memsys::protect(&mut mapping[rear..], Protection::NoAccess) {
        release_mapping(mapping, true);
        return Err(e.into());
    }

    mapping[canary..data].copy_from_slice(&g.canary);

    Ok(Buffer {
        mapping: Some(mapping),
        canary_offset: canary,
        data_offset: data,
        capacity,
        cursor: 0,
        strict: false,
    })
}

/// Rollback path for a failed [`alloc`]: unlock if locked, then unmap.
/// The original error is what the caller sees; failures here are logged.
fn release_mapping(mapping: &'static mut [u8], locked: bool) {
    if locked {
        if let Err(e) = memsys::unlock(mapping) {
            warn!("rollback munlock failed: {e}");
        }
    }
    if let Err(e) = memsys::free(mapping) {
        warn!("rollback munmap failed: {e}");
    }
}

impl Buffer {
    /// Returns the bytes written so far, `data[..cursor]`.
    ///
    /// The slice is a direct window into the locked mapping; pass it to
    /// cryptographic operations rather than copying it out, or the data
    /// loses its protection. If the buffer is freed or corrupted an
    /// empty slice is returned, so untrusted data is never observable.
    pub fn view(&self) -> &[u8] {
        match self.checked_mapping() {
            Ok(mapping) => &mapping[self.data_offset..self.data_offset + self.cursor],
            Err(_) => &[],
        }
    }

    /// Sets the write position within the data region.
    ///
    /// Positions past the end of the data region are rejected with
    /// [`BufferError::SeekOutOfBounds`] and leave the cursor unchanged.
    pub fn seek(&mut self, position: usize) -> Result<(), BufferError> {
        self.canary_check()?;

        if position > self.capacity {
            return Err(BufferError::SeekOutOfBounds {
                position,
                limit: self.capacity,
            });
        }
        self.cursor = position;
        Ok(())
    }

    /// Copies as much of `src` as fits at the cursor and advances it.
    ///
    /// A short copy reports [`BufferError::BufferFull`] carrying the
    /// number of bytes that were still written; the copied prefix is a
    /// normal, usable write.
    pub fn write(&mut self, src: &[u8]) -> Result<usize, BufferError> {
        let (start, len, cursor) = (self.data_offset, self.capacity, self.cursor);
        let mapping = self.checked_mapping_mut()?;

        let data = &mut mapping[start..start + len];
        let n = src.len().min(data.len() - cursor);
        data[cursor..cursor + n].copy_from_slice(&src[..n]);
        self.cursor += n;

        if n < src.len() {
            return Err(BufferError::BufferFull { written: n });
        }
        Ok(n)
    }

    /// Fills the buffer from `source` until it reports end-of-input,
    /// returning the total number of bytes pulled.
    ///
    /// A source that makes no progress for more than ten consecutive
    /// attempts (zero-byte reads into a full buffer, or interrupted
    /// reads) is treated as stalled and aborts with
    /// [`BufferError::NoProgress`]. Other source errors abort
    /// immediately and are surfaced unchanged.
    pub fn read_from<R: Read>(&mut self, source: &mut R) -> Result<u64, BufferError> {
        self.canary_check()?;
        let (start, len) = (self.data_offset, self.capacity);

        let mut total = 0u64;
        let mut stalls = 0u32;
        loop {
            let cursor = self.cursor;
            let mapping = match self.mapping.as_deref_mut() {
                Some(mapping) => mapping,
                None => return Err(BufferError::AlreadyFreed),
            };
            let dest = &mut mapping[start + cursor..start + len];
            let space = dest.len();

            match source.read(dest) {
                Ok(0) if space > 0 => return Ok(total),
                Ok(0) => {
                    stalls += 1;
                    if stalls > PROGRESS_THRESHOLD {
                        return Err(BufferError::NoProgress);
                    }
                }
                Ok(n) => {
                    let n = n.min(space);
                    self.cursor += n;
                    total += n as u64;
                    stalls = 0;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    stalls += 1;
                    if stalls > PROGRESS_THRESHOLD {
                        return Err(BufferError::NoProgress);
                    }
                }
                Err(e) => return Err(BufferError::Io(e)),
            }
        }
    }

    /// Overwrites the whole data region with zeros and resets the
    /// cursor. Has no effect on a freed buffer.
    ///
    /// The canary, padding, and guard regions are untouched.
    pub fn zero(&mut self) {
        let (start, len) = (self.data_offset, self.capacity);
        if let Some(mapping) = self.mapping.as_deref_mut() {
            zero_region(&mut mapping[start..start + len]);
            self.cursor = 0;
        }
    }

    /// Verifies the padding as well as the canary on every subsequent
    /// access. By default only the canary is checked.
    pub fn strict(&mut self) {
        self.strict = true;
    }

    /// Moves the live data into a freshly allocated buffer of
    /// `new_capacity` bytes and frees this one.
    ///
    /// If the new capacity cannot hold the live data, the new buffer is
    /// returned inside [`ReallocError::BufferTooSmall`] and this buffer
    /// is left untouched. On success this buffer reports
    /// [`BufferError::AlreadyFreed`] from then on.
    ///
    /// # Panics
    ///
    /// Panics if `new_capacity` is zero.
    pub fn realloc(&mut self, new_capacity: usize) -> Result<Buffer, ReallocError> {
        assert!(new_capacity > 0, "zero-capacity buffer requested");
        self.canary_check()?;

        let mut new = alloc(new_capacity)?;
        match new.write(self.view()) {
            Ok(_) => {}
            Err(BufferError::BufferFull { .. }) => {
                return Err(ReallocError::BufferTooSmall { buffer: new });
            }
            Err(e) => return Err(ReallocError::Buffer(e)),
        }
        self.free()?;
        Ok(new)
    }

    /// Zeroes the data region, unlocks the mapping, and returns it to
    /// the kernel.
    ///
    /// A second call reports [`BufferError::AlreadyFreed`] and has no
    /// side effects. If unlocking or unmapping fails the buffer stays
    /// live so the call can be retried.
    pub fn free(&mut self) -> Result<(), BufferError> {
        let Some(mapping) = self.mapping.take() else {
            return Err(BufferError::AlreadyFreed);
        };

        let (start, len) = (self.data_offset, self.capacity);
        zero_region(&mut mapping[start..start + len]);
        self.cursor = 0;

        // Unlock before unmapping; the pages must never be swappable
        // while still mapped.
        if let Err(e) = memsys::unlock(mapping) {
            self.mapping = Some(mapping);
            return Err(e.into());
        }
        if let Err(e) = memsys::free(mapping) {
            self.mapping = Some(mapping);
            return Err(e.into());
        }
        Ok(())
    }

    /// Capacity of the data region in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current write position within the data region.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Whether the buffer has been freed.
    pub fn is_freed(&self) -> bool {
        self.mapping.is_none()
    }

    fn canary_check(&self) -> Result<(), BufferError> {
        self.checked_mapping().map(|_| ())
    }

    /// The single integrity gate in front of every accessor: freed
    /// buffers, canary mismatches, and (in strict mode) disturbed
    /// padding all fail here before the data region is touched.
    fn checked_mapping(&self) -> Result<&[u8], BufferError> {
        let mapping = self.mapping.as_deref().ok_or(BufferError::AlreadyFreed)?;
        let g = globals::get();

        // The canary derives from process-secret random bytes, so the
        // comparison must not leak how many bytes matched.
        let canary = &mapping[self.canary_offset..self.data_offset];
        if !bool::from(canary.ct_eq(&g.canary)) {
            return Err(BufferError::DataCorrupted);
        }

        if self.strict
            && mapping[g.page_size..self.canary_offset]
                .iter()
                .any(|&b| b != 0)
        {
            return Err(BufferError::DataCorrupted);
        }
        Ok(mapping)
    }

    fn checked_mapping_mut(&mut self) -> Result<&mut [u8], BufferError> {
        self.canary_check()?;
        self.mapping.as_deref_mut().ok_or(BufferError::AlreadyFreed)
    }
}

/// Zeroes `region` with a doubling copy: zero the first byte, then
/// repeatedly copy the already-zeroed prefix over the bytes after it,
/// so the number of copies is logarithmic in the region length.
fn zero_region(region: &mut [u8]) {
    if region.is_empty() {
        return;
    }
    region[0] = 0;

    let mut zeroed = 1;
    while zeroed < region.len() {
        let (prefix, rest) = region.split_at_mut(zeroed);
        let n = prefix.len().min(rest.len());
        rest[..n].copy_from_slice(&prefix[..n]);
        zeroed *= 2;
    }
}

impl io::Write for Buffer {
    /// Partial writes surface as `Ok(n)` per this trait's contract
    /// rather than as [`BufferError::BufferFull`].
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match Buffer::write(self, buf) {
            Ok(n) | Err(BufferError::BufferFull { written: n }) => Ok(n),
            Err(e) => Err(io::Error::new(ErrorKind::Other, e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.mapping.is_some() {
            if let Err(e) = self.free() {
                error!("failed to release secure buffer on drop: {e}");
            }
        }
    }
}

impl fmt::Debug for Buffer {
    /// Never prints buffer contents.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("strict", &self.strict)
            .field("freed", &self.mapping.is_none())
            .finish()
    }
}
