//! Native Linux zoned-block backend: dispatches through the kernel's
//! `BLKREPORTZONE`/`BLKRESETZONE`/`BLKOPENZONE`/`BLKCLOSEZONE`/
//! `BLKFINISHZONE` ioctl family (`<linux/blkzoned.h>`) plus ordinary
//! `pread`/`pwrite` on the block device node.
//!
//! This backend's feature completeness is explicitly out of scope
//! (SPEC_FULL.md §1); it exists so the registry's block -> scsi -> ata ->
//! fake probe order has a real, distinguishable first entry, honoring the
//! capability-table contract with the minimum needed to do so.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::sys::uio::{pread as nix_pread, pwrite as nix_pwrite};

use crate::device::{BackendKind, DeviceFlags, DeviceInfo, OpenZoneLimit, ZoneModel};
use crate::error::{ZbcError, ZbcResult};
use crate::io_path::IoVec;
use crate::registry::{Backend, BackendSession, OpenFlags, ProbeOutcome};
use crate::zone::{ReportingOptions, ZoneCondition, ZoneDescriptor, ZoneOpFlags, ZoneOperation, ZoneType};

const BLK_ZONE_REP_CAPACITY: usize = 4096;

#[repr(C)]
struct BlkZoneReport {
    sector: u64,
    nr_zones: u32,
    flags: u32,
    // `zones` trails here in the real kernel ABI; we allocate a raw byte
    // buffer sized for the header plus `nr_zones * 64` bytes instead of
    // modeling a DST, matching how the original treats the log page as a
    // flat byte buffer it walks by hand.
}

const BLK_ZONE_DESC_LEN: usize = 64;
const BLK_ZONE_REPORT_HDR_LEN: usize = 16;

mod ffi {
    use super::BlkZoneReport;

    // BLKREPORTZONE = _IOWR(0x12, 130, struct blk_zone_report)
    nix::ioctl_readwrite!(blkreportzone, 0x12, 130, BlkZoneReport);
    // BLKRESETZONE / BLKOPENZONE / BLKCLOSEZONE / BLKFINISHZONE take a
    // `struct blk_zone_range { u64 sector; u64 nr_sectors; }`.
    #[repr(C)]
    pub struct BlkZoneRange {
        pub sector: u64,
        pub nr_sectors: u64,
    }
    nix::ioctl_write_ptr!(blkresetzone, 0x12, 131, BlkZoneRange);
    nix::ioctl_write_ptr!(blkopenzone, 0x12, 134, BlkZoneRange);
    nix::ioctl_write_ptr!(blkclosezone, 0x12, 135, BlkZoneRange);
    nix::ioctl_write_ptr!(blkfinishzone, 0x12, 136, BlkZoneRange);

    nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);
    nix::ioctl_read!(blkgetzonesz, 0x12, 132, u32);
}

/// True if the host has no zoned-block ioctl surface at all (e.g. a
/// non-Linux build); in that case the registry skips this backend
/// regardless of the caller's driver filter.
pub fn available() -> bool {
    cfg!(target_os = "linux")
}

pub struct BlockBackend;

impl Backend for BlockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Block
    }

    fn driver_flag(&self) -> OpenFlags {
        OpenFlags::DRV_BLOCK
    }

    fn probe(&self, path: &Path, flags: OpenFlags) -> ZbcResult<ProbeOutcome> {
        if !available() {
            return Ok(ProbeOutcome::NotMine);
        }

        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ZbcError::Permission)
            }
            Err(e) => return Err(ZbcError::Io(e)),
        };
        if !meta.file_type().is_block_device() {
            return Ok(ProbeOutcome::NotMine);
        }

        let file = open_rw(path, flags)?;
        let fd = file.as_raw_fd();

        let mut zone_sectors: u32 = 0;
        // SAFETY: `zone_sectors` is a valid, appropriately-sized output
        // buffer for BLKGETZONESZ.
        let got = unsafe { ffi::blkgetzonesz(fd, &mut zone_sectors) };
        match got {
            Ok(_) if zone_sectors > 0 => {}
            _ => return Ok(ProbeOutcome::NotMine),
        }

        let mut capacity_bytes: u64 = 0;
        unsafe { ffi::blkgetsize64(fd, &mut capacity_bytes) }
            .map_err(|e| ZbcError::Io(std::io::Error::from_raw_os_error(e as i32)))?;

        let info = DeviceInfo {
            vendor_id: "Linux-block".to_string(),
            backend: BackendKind::Block,
            zone_model: ZoneModel::HostManaged,
            sectors: capacity_bytes / 512,
            logical_blocks: capacity_bytes / 512,
            physical_blocks: capacity_bytes / 512,
            logical_block_size: 512,
            physical_block_size: 512,
            max_rw_sectors: 65536,
            flags: DeviceFlags::UNRESTRICTED_READ,
            max_nr_open_seq_req: OpenZoneLimit::NotReported,
            opt_nr_open_seq_pref: OpenZoneLimit::NotReported,
            opt_nr_non_seq_write_seq_pref: OpenZoneLimit::NotReported,
        };

        Ok(ProbeOutcome::Accepted(Box::new(BlockSession {
            file,
            info,
            zone_sectors: zone_sectors as u64,
        })))
    }
}

fn open_rw(path: &Path, flags: OpenFlags) -> ZbcResult<File> {
    let mut opts = OpenOptions::new();
    if flags.contains(OpenFlags::O_RDONLY) {
        opts.read(true);
    } else {
        opts.read(true).write(true);
    }
    opts.custom_flags(0);
    opts.open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ZbcError::Permission
        } else {
            ZbcError::Io(e)
        }
    })
}

struct BlockSession {
    file: File,
    info: DeviceInfo,
    zone_sectors: u64,
}

impl std::fmt::Debug for BlockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSession")
            .field("fd", &self.file.as_raw_fd())
            .field("info", &self.info)
            .finish()
    }
}

impl BackendSession for BlockSession {
    fn kind(&self) -> BackendKind {
        BackendKind::Block
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn report_zones(
        &mut self,
        start_sector: u64,
        _options: ReportingOptions,
        out: Option<&mut [ZoneDescriptor]>,
    ) -> ZbcResult<u32> {
        let fd = self.file.as_raw_fd();
        let requested = out.as_ref().map(|b| b.len() as u32).unwrap_or(0);
        let buf_len = BLK_ZONE_REPORT_HDR_LEN + requested.max(1) as usize * BLK_ZONE_DESC_LEN;
        let buf_len = buf_len.min(BLK_ZONE_REP_CAPACITY.max(buf_len));
        let mut raw = vec![0u8; buf_len];

        {
            let hdr = unsafe { &mut *(raw.as_mut_ptr() as *mut BlkZoneReport) };
            hdr.sector = start_sector;
            hdr.nr_zones = requested;
            hdr.flags = 0;
        }

        // SAFETY: `raw` is sized for the header plus `requested` zone
        // descriptors; the kernel writes at most that many back.
        let ret = unsafe { ffi::blkreportzone(fd, raw.as_mut_ptr() as *mut BlkZoneReport) };
        ret.map_err(|e| ZbcError::Io(std::io::Error::from_raw_os_error(e as i32)))?;

        let nr = unsafe { (*(raw.as_ptr() as *const BlkZoneReport)).nr_zones };

        if let Some(out) = out {
            let n = (nr as usize).min(out.len());
            for i in 0..n {
                let base = BLK_ZONE_REPORT_HDR_LEN + i * BLK_ZONE_DESC_LEN;
                let d = &raw[base..base + BLK_ZONE_DESC_LEN];
                out[i] = ZoneDescriptor {
                    start: u64::from_le_bytes(d[24..32].try_into().unwrap()),
                    length: u64::from_le_bytes(d[0..8].try_into().unwrap()),
                    write_pointer: u64::from_le_bytes(d[32..40].try_into().unwrap()),
                    zone_type: ZoneType::from_nibble(d[16]),
                    condition: ZoneCondition::from_nibble(d[17] >> 4),
                    reset_recommended: d[17] & 0x01 != 0,
                    non_sequential_write: d[18] & 0x01 != 0,
                };
            }
            Ok(n as u32)
        } else {
            Ok(nr)
        }
    }

    fn zone_op(&mut self, sector: u64, op: ZoneOperation, flags: ZoneOpFlags) -> ZbcResult<()> {
        let fd = self.file.as_raw_fd();
        let range = ffi::BlkZoneRange {
            sector: if flags.contains(ZoneOpFlags::ALL_ZONES) {
                0
            } else {
                sector
            },
            nr_sectors: if flags.contains(ZoneOpFlags::ALL_ZONES) {
                u64::MAX
            } else {
                self.zone_sectors
            },
        };
        let ret = match op {
            ZoneOperation::Reset => unsafe { ffi::blkresetzone(fd, &range) },
            ZoneOperation::Open => unsafe { ffi::blkopenzone(fd, &range) },
            ZoneOperation::Close => unsafe { ffi::blkclosezone(fd, &range) },
            ZoneOperation::Finish => unsafe { ffi::blkfinishzone(fd, &range) },
        };
        ret.map(|_| ())
            .map_err(|e| ZbcError::Io(std::io::Error::from_raw_os_error(e as i32)))
    }

    fn preadv(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
        let fd = self.file.as_raw_fd();
        let mut total = 0u64;
        for seg in iov {
            // SAFETY: `seg` was derived from a caller-owned buffer valid for
            // `seg.len()` bytes for the duration of this call.
            let slice = unsafe { std::slice::from_raw_parts_mut(seg.as_ptr(), seg.len()) };
            let n = nix_pread(fd, slice, (offset * 512 + total) as i64)
                .map_err(|e| ZbcError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        Ok(total / 512)
    }

    fn pwritev(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
        let fd = self.file.as_raw_fd();
        let mut total = 0u64;
        for seg in iov {
            let slice = unsafe { std::slice::from_raw_parts(seg.as_ptr(), seg.len()) };
            let n = nix_pwrite(fd, slice, (offset * 512 + total) as i64)
                .map_err(|e| ZbcError::Io(std::io::Error::from_raw_os_error(e as i32)))?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        Ok(total / 512)
    }

    fn flush(&mut self) -> ZbcResult<()> {
        use std::io::Write;
        self.file.flush().map_err(ZbcError::Io)
    }
}
