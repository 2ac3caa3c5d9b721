//! Chunked, vector-aware positioned I/O: alignment enforcement, per-backend
//! maximum-transfer segmentation, and iovec re-slicing across chunk
//! boundaries.
//!
//! Grounded on `zbc_do_preadv`/`zbc_do_pwritev`/`zbc_iov_convert` in
//! `lib/zbc.c`. All arithmetic here is in bytes internally, exactly as the
//! original keeps it, to make the window math exact; the public functions
//! convert to/from 512-byte sectors at the boundary.

use log::{debug, error};

use crate::device::DeviceInfo;
use crate::error::{ZbcError, ZbcResult};
use crate::registry::{DeviceHandle, OpenFlags};

const SECTOR_SIZE: u64 = 512;

/// A single scatter/gather segment. Stores a raw pointer and a byte length
/// rather than borrowing a slice, so the chunking loop can re-slice a
/// caller's buffer window-by-window by adjusting pointer and length only —
/// no new allocation, mirroring `struct iovec` re-slicing in the original.
#[derive(Clone, Copy)]
pub struct IoVec {
    base: *mut u8,
    len: usize,
}

// SAFETY: `IoVec` is only ever constructed from a slice the caller holds for
// the duration of the (synchronous, blocking) call that consumes it, and is
// never retained past that call.
unsafe impl Send for IoVec {}

impl IoVec {
    pub fn from_mut_slice(buf: &mut [u8]) -> Self {
        IoVec {
            base: buf.as_mut_ptr(),
            len: buf.len(),
        }
    }

    pub fn from_slice(buf: &[u8]) -> Self {
        IoVec {
            base: buf.as_ptr() as *mut u8,
            len: buf.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw base pointer, valid for `len()` bytes. For use only by a
    /// `BackendSession` implementation handing the segment to a transport
    /// primitive (SG_IO, `preadv(2)`, an in-process `Read`/`Write`, etc).
    pub fn as_ptr(&self) -> *mut u8 {
        self.base
    }

    /// # Safety
    /// `base` must be valid for `len` bytes for as long as the returned
    /// `IoVec` is used.
    unsafe fn offset(&self, byte_offset: usize, byte_len: usize) -> IoVec {
        IoVec {
            base: self.base.add(byte_offset),
            len: byte_len,
        }
    }
}

/// Total byte length across a vector of segments.
pub fn iov_count(iov: &[IoVec]) -> u64 {
    iov.iter().map(|v| v.len() as u64).sum()
}

/// Re-slices `iov` over the byte window `[byte_offset, byte_offset+byte_len)`
/// of the concatenation of all segments, walking past entries wholly before
/// the window, emitting the suffix of the straddling entry, full interior
/// entries, and the prefix of the entry that crosses the end. Allocates a
/// new `Vec` of segment descriptors, but never copies the underlying bytes.
pub fn iov_convert(iov: &[IoVec], byte_offset: u64, byte_len: u64) -> Vec<IoVec> {
    let mut out = Vec::with_capacity(iov.len());
    let mut remaining_offset = byte_offset;
    let mut remaining = byte_len;

    for seg in iov {
        if remaining == 0 {
            break;
        }
        let seg_len = seg.len() as u64;
        if remaining_offset >= seg_len {
            remaining_offset -= seg_len;
            continue;
        }

        let start = remaining_offset as usize;
        let avail = seg_len - remaining_offset;
        let take = avail.min(remaining);
        // SAFETY: start + take <= seg.len() by construction above.
        out.push(unsafe { seg.offset(start, take as usize) });
        remaining -= take;
        remaining_offset = 0;
    }

    out
}

fn sector_aligned(n: u64, granularity_sectors: u64) -> bool {
    granularity_sectors == 0 || n % granularity_sectors == 0
}

/// Shared chunking loop for both read and write directions.
fn do_iov_transfer(
    handle: &mut DeviceHandle,
    iov: &[IoVec],
    offset_sectors: u64,
    align_sectors: u64,
    is_write: bool,
) -> ZbcResult<u64> {
    let info: DeviceInfo = handle.info().clone();
    let test_mode = handle.test_mode();

    let total_bytes = iov_count(iov);
    if total_bytes % SECTOR_SIZE != 0 {
        return Err(ZbcError::invalid_argument(
            "iovec byte length is not a multiple of the 512-byte sector size",
        ));
    }
    let mut count = total_bytes / SECTOR_SIZE;

    if count.saturating_mul(SECTOR_SIZE) > i64::MAX as u64 {
        return Err(ZbcError::invalid_argument(
            "transfer size exceeds the platform's signed size type",
        ));
    }

    let mut offset = offset_sectors;

    if test_mode {
        if count == 0 {
            let sub = iov_convert(iov, 0, 0);
            return issue(handle, &sub, offset, is_write).map_err(|e| {
                error!("zero-length transfer at sector {offset} failed: {e}");
                e
            });
        }
    } else {
        if !sector_aligned(count, align_sectors) || !sector_aligned(offset, align_sectors) {
            error!(
                "{}: unaligned {} of {count} sectors at sector {offset}",
                handle.path().display(),
                if is_write { "write" } else { "read" }
            );
            return Err(ZbcError::invalid_argument(format!(
                "offset/count must be aligned to {align_sectors} sectors"
            )));
        }

        if offset + count > info.sectors {
            count = info.sectors.saturating_sub(offset);
        }
        if count == 0 || offset >= info.sectors {
            return Ok(0);
        }
    }

    debug!(
        "{}: {} {count} sectors at sector {offset}, {} vectors",
        handle.path().display(),
        if is_write { "write" } else { "read" },
        iov.len()
    );

    let max_count = info.max_rw_sectors.max(1);
    let mut transferred = 0u64;
    while transferred < count {
        let chunk = (count - transferred).min(max_count);
        let sub = iov_convert(iov, transferred * SECTOR_SIZE, chunk * SECTOR_SIZE);

        let ret = issue(handle, &sub, offset, is_write)?;
        if ret == 0 {
            error!(
                "{}: {} {chunk} sectors at sector {offset} made no progress",
                handle.path().display(),
                if is_write { "write" } else { "read" }
            );
            return Err(ZbcError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "short transfer with no forward progress",
            )));
        }

        offset += ret;
        transferred += ret;
    }

    Ok(count)
}

fn issue(handle: &mut DeviceHandle, iov: &[IoVec], offset: u64, is_write: bool) -> ZbcResult<u64> {
    let session = handle.session_mut();
    if is_write {
        session.pwritev(iov, offset)
    } else {
        session.preadv(iov, offset)
    }
}

/// Vector read; `iov` segment lengths are in bytes, `offset` in sectors.
/// Returns the number of sectors transferred.
pub fn preadv(handle: &mut DeviceHandle, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
    let align = (handle.info().logical_block_size as u64 / SECTOR_SIZE).max(1);
    do_iov_transfer(handle, iov, offset, align, false)
}

/// Vector write; see [`preadv`] for units.
pub fn pwritev(handle: &mut DeviceHandle, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
    let align = (handle.info().physical_block_size as u64 / SECTOR_SIZE).max(1);
    do_iov_transfer(handle, iov, offset, align, true)
}

/// Scalar read: wraps `buf` in a single-element iovec and delegates to
/// [`preadv`]. `offset` is in sectors; `buf.len()` must be a multiple of 512.
pub fn pread(handle: &mut DeviceHandle, buf: &mut [u8], offset: u64) -> ZbcResult<u64> {
    let iov = [IoVec::from_mut_slice(buf)];
    preadv(handle, &iov, offset)
}

/// Scalar write counterpart of [`pread`].
pub fn pwrite(handle: &mut DeviceHandle, buf: &[u8], offset: u64) -> ZbcResult<u64> {
    let iov = [IoVec::from_slice(buf)];
    pwritev(handle, &iov, offset)
}
