//! SG_IO passthrough transport: submit a prepared 16-byte CDB, receive the
//! data residual and sense buffer.
//!
//! Grounded on the Linux `struct sg_io_hdr` ioctl ABI (`<scsi/sg.h>`) and the
//! `nix::ioctl_readwrite!`-binding idiom used for raw device ioctls (see
//! `vdev_file.rs`'s `mod ffi` in the wider example pack).

use std::os::unix::io::RawFd;

use log::{debug, error};
use nix::libc::{c_int, c_uchar, c_uint, c_ushort, c_void};

use crate::error::{ZbcError, ZbcResult};
use crate::sense::{self, SenseRecord};

const SG_DXFER_NONE: c_int = -1;
const SG_DXFER_FROM_DEV: c_int = -3;
const SG_DXFER_TO_DEV: c_int = -2;
const SG_INFO_OK_MASK: c_uint = 0x1;
const SG_INFO_OK: c_uint = 0x0;

/// Mirrors Linux's `struct sg_io_hdr` (see `<scsi/sg.h>`), field for field.
#[repr(C)]
struct SgIoHdr {
    interface_id: c_int,
    dxfer_direction: c_int,
    cmd_len: c_uchar,
    mx_sb_len: c_uchar,
    iovec_count: c_ushort,
    dxfer_len: c_uint,
    dxferp: *mut c_void,
    cmdp: *mut c_uchar,
    sbp: *mut c_uchar,
    timeout: c_uint,
    flags: c_uint,
    pack_id: c_int,
    usr_ptr: *mut c_void,
    status: c_uchar,
    masked_status: c_uchar,
    msg_status: c_uchar,
    sb_len_wr: c_uchar,
    host_status: c_ushort,
    driver_status: c_ushort,
    resid: c_int,
    duration: c_uint,
    info: c_uint,
}

const SG_INTERFACE_ID_ORIG: c_int = b'S' as c_int;
const SENSE_BUF_LEN: usize = 32;

mod ffi {
    use super::SgIoHdr;
    nix::ioctl_readwrite!(sg_io, b'S', 0x85, SgIoHdr);
}

/// Direction of data transfer for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    None,
    FromDevice,
    ToDevice,
}

/// Result of a single SG_IO submission.
#[derive(Debug, Default)]
pub struct CdbResult {
    /// Bytes not transferred (0 on a full transfer).
    pub residual: usize,
    pub sense: [u8; SENSE_BUF_LEN],
    pub sense_len: usize,
}

impl CdbResult {
    pub fn sense_key(&self) -> u8 {
        if self.sense_len > 2 {
            self.sense[2] & 0x0f
        } else {
            0
        }
    }

    pub fn asc(&self) -> u8 {
        if self.sense_len > 12 {
            self.sense[12]
        } else {
            0
        }
    }

    pub fn ascq(&self) -> u8 {
        if self.sense_len > 13 {
            self.sense[13]
        } else {
            0
        }
    }
}

/// Submits a prepared CDB over an open SG-like passthrough file descriptor.
pub fn submit(
    fd: RawFd,
    cdb: &[u8],
    direction: Direction,
    data: Option<&mut [u8]>,
    timeout_ms: u32,
) -> ZbcResult<CdbResult> {
    let (result, ok) = execute(fd, cdb, direction, data, timeout_ms)?;

    if !ok {
        sense::set_last_error(SenseRecord {
            sense_key: result.sense_key(),
            asc: result.asc(),
            ascq: result.ascq(),
        });
        debug!(
            "command failed: sense {:#04x} asc/ascq {:#04x}/{:#04x}",
            result.sense_key(),
            result.asc(),
            result.ascq()
        );
        return Err(ZbcError::CommandFailed {
            sense_key: result.sense_key(),
            asc: result.asc(),
            ascq: result.ascq(),
        });
    }

    Ok(result)
}

/// Like [`submit`], but does not treat a non-success SCSI status alone as
/// fatal — only a host/driver/transport-level failure is. For ATA commands
/// issued with `ck_cond=1` (EXECUTE DEVICE DIAGNOSTIC classification), the
/// device deliberately reports CHECK CONDITION to carry the ATA result
/// registers back in the descriptor-format sense data; that is a successful
/// transfer of those registers, not a command failure.
pub fn submit_tolerant(
    fd: RawFd,
    cdb: &[u8],
    direction: Direction,
    data: Option<&mut [u8]>,
    timeout_ms: u32,
) -> ZbcResult<CdbResult> {
    let (result, _ok) = execute(fd, cdb, direction, data, timeout_ms)?;
    Ok(result)
}

/// Runs the ioctl and reports the raw result plus whether the host, driver,
/// and SCSI status all indicate an ordinary success.
fn execute(
    fd: RawFd,
    cdb: &[u8],
    direction: Direction,
    data: Option<&mut [u8]>,
    timeout_ms: u32,
) -> ZbcResult<(CdbResult, bool)> {
    let mut cdb_buf = cdb.to_vec();
    let mut sense_buf = [0u8; SENSE_BUF_LEN];

    let (dxferp, dxfer_len): (*mut c_void, u32) = match &data {
        Some(buf) => (buf.as_ptr() as *mut c_void, buf.len() as u32),
        None => (std::ptr::null_mut(), 0),
    };

    let mut hdr = SgIoHdr {
        interface_id: SG_INTERFACE_ID_ORIG,
        dxfer_direction: match direction {
            Direction::None => SG_DXFER_NONE,
            Direction::FromDevice => SG_DXFER_FROM_DEV,
            Direction::ToDevice => SG_DXFER_TO_DEV,
        },
        cmd_len: cdb_buf.len() as c_uchar,
        mx_sb_len: SENSE_BUF_LEN as c_uchar,
        iovec_count: 0,
        dxfer_len,
        dxferp,
        cmdp: cdb_buf.as_mut_ptr(),
        sbp: sense_buf.as_mut_ptr(),
        timeout: timeout_ms,
        flags: 0,
        pack_id: 0,
        usr_ptr: std::ptr::null_mut(),
        status: 0,
        masked_status: 0,
        msg_status: 0,
        sb_len_wr: 0,
        host_status: 0,
        driver_status: 0,
        resid: 0,
        duration: 0,
        info: 0,
    };

    // SAFETY: `hdr` is a valid, fully-initialized `sg_io_hdr` whose pointer
    // fields (`cmdp`, `sbp`, `dxferp`) remain valid for the duration of this
    // call; the kernel writes results back into the same structure.
    let ret = unsafe { ffi::sg_io(fd, &mut hdr as *mut SgIoHdr) };
    if let Err(e) = ret {
        error!("SG_IO ioctl failed: {e}");
        return Err(ZbcError::Io(std::io::Error::from_raw_os_error(e as i32)));
    }

    let result = CdbResult {
        residual: hdr.resid.max(0) as usize,
        sense: sense_buf,
        sense_len: hdr.sb_len_wr as usize,
    };

    let ok = (hdr.info & SG_INFO_OK_MASK) == SG_INFO_OK
        && hdr.host_status == 0
        && hdr.driver_status == 0
        && hdr.status == 0;

    Ok((result, ok))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sense_key_extraction_from_fixed_format_sense() {
        let mut sense = [0u8; SENSE_BUF_LEN];
        sense[2] = 0x05; // illegal request
        sense[12] = 0x21;
        sense[13] = 0x00;
        let result = CdbResult {
            residual: 0,
            sense,
            sense_len: 18,
        };
        assert_eq!(result.sense_key(), 0x05);
        assert_eq!(result.asc(), 0x21);
        assert_eq!(result.ascq(), 0x00);
    }

    #[test]
    fn short_sense_buffer_reads_as_zero() {
        let result = CdbResult {
            residual: 0,
            sense: [0u8; SENSE_BUF_LEN],
            sense_len: 1,
        };
        assert_eq!(result.sense_key(), 0);
        assert_eq!(result.asc(), 0);
        assert_eq!(result.ascq(), 0);
    }
}
