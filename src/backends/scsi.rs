//! Minimal raw-SCSI ZBC backend: REPORT ZONES (opcode 0x95, service action
//! 0x00) and ZONE MANAGEMENT OUT (opcode 0x94, one service action per
//! operation), issued directly over `backends::transport::submit` with no
//! ATA tunnelling.
//!
//! Feature completeness beyond what ZBC requires is out of scope
//! (SPEC_FULL.md §1); this backend exists to make the registry's probe
//! order a real block->scsi->ata->fake chain.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::backends::transport::{self, Direction};
use crate::device::{BackendKind, DeviceFlags, DeviceInfo, OpenZoneLimit, ZoneModel};
use crate::error::{ZbcError, ZbcResult};
use crate::io_path::IoVec;
use crate::registry::{Backend, BackendSession, OpenFlags, ProbeOutcome};
use crate::zone::{ReportingOptions, ZoneCondition, ZoneDescriptor, ZoneOpFlags, ZoneOperation, ZoneType};

const REPORT_ZONES_OPCODE: u8 = 0x95;
const REPORT_ZONES_SA: u8 = 0x00;
const ZONE_MGMT_OUT_OPCODE: u8 = 0x94;
const READ_CAPACITY16_OPCODE: u8 = 0x9e;
const READ_CAPACITY16_SA: u8 = 0x10;

fn zone_mgmt_sa(op: ZoneOperation) -> u8 {
    match op {
        ZoneOperation::Close => 0x01,
        ZoneOperation::Finish => 0x02,
        ZoneOperation::Open => 0x03,
        ZoneOperation::Reset => 0x04,
    }
}

pub struct ScsiBackend;

impl Backend for ScsiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Scsi
    }

    fn driver_flag(&self) -> OpenFlags {
        OpenFlags::DRV_SCSI
    }

    fn probe(&self, path: &Path, flags: OpenFlags) -> ZbcResult<ProbeOutcome> {
        let file = match open_rw(path, flags) {
            Ok(f) => f,
            Err(ZbcError::Permission) => return Err(ZbcError::Permission),
            Err(_) => return Ok(ProbeOutcome::NotMine),
        };
        let fd = file.as_raw_fd();

        let mut cap = [0u8; 32];
        let mut cdb = [0u8; 16];
        cdb[0] = READ_CAPACITY16_OPCODE;
        cdb[1] = READ_CAPACITY16_SA;
        cdb[10..14].copy_from_slice(&(cap.len() as u32).to_be_bytes());

        let cap_result =
            transport::submit(fd, &cdb, Direction::FromDevice, Some(&mut cap), 30_000);
        if cap_result.is_err() {
            return Ok(ProbeOutcome::NotMine);
        }

        let sectors = (u64::from_be_bytes(cap[0..8].try_into().unwrap()) + 1) * 2;
        let logical_block_size = u32::from_be_bytes(cap[8..12].try_into().unwrap());
        let logical_per_physical = 1u32 << (cap[13] & 0x0f);

        // Probe REPORT ZONES to confirm this is actually a zoned SCSI
        // device, not a plain SCSI block device that merely answered
        // READ CAPACITY (16).
        let mut rz_buf = [0u8; 64];
        let mut rz_cdb = [0u8; 16];
        rz_cdb[0] = REPORT_ZONES_OPCODE;
        rz_cdb[1] = REPORT_ZONES_SA;
        rz_cdb[13] = rz_buf.len() as u8;
        let rz_result =
            transport::submit(fd, &rz_cdb, Direction::FromDevice, Some(&mut rz_buf), 30_000);
        if rz_result.is_err() {
            return Ok(ProbeOutcome::NotMine);
        }

        let info = DeviceInfo {
            vendor_id: "SCSI-ZBC".to_string(),
            backend: BackendKind::Scsi,
            zone_model: ZoneModel::HostManaged,
            sectors,
            logical_blocks: sectors,
            physical_blocks: sectors / logical_per_physical as u64,
            logical_block_size,
            physical_block_size: logical_block_size * logical_per_physical,
            max_rw_sectors: 65536,
            flags: DeviceFlags::empty(),
            max_nr_open_seq_req: OpenZoneLimit::NotReported,
            opt_nr_open_seq_pref: OpenZoneLimit::NotReported,
            opt_nr_non_seq_write_seq_pref: OpenZoneLimit::NotReported,
        };

        Ok(ProbeOutcome::Accepted(Box::new(ScsiSession { file, info })))
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

struct ScsiSession {
    file: File,
    info: DeviceInfo,
}

impl std::fmt::Debug for ScsiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScsiSession")
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

impl BackendSession for ScsiSession {
    fn kind(&self) -> BackendKind {
        BackendKind::Scsi
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn report_zones(
        &mut self,
        start_sector: u64,
        options: ReportingOptions,
        out: Option<&mut [ZoneDescriptor]>,
    ) -> ZbcResult<u32> {
        let fd = self.file.as_raw_fd();
        let requested = out.as_ref().map(|b| b.len()).unwrap_or(0);
        let buf_len = (64 + requested * 64).max(64);
        let mut buf = vec![0u8; buf_len];

        let mut cdb = [0u8; 16];
        cdb[0] = REPORT_ZONES_OPCODE;
        cdb[1] = REPORT_ZONES_SA;
        cdb[2..10].copy_from_slice(&start_sector.to_be_bytes());
        cdb[10..14].copy_from_slice(&(buf_len as u32).to_be_bytes());
        cdb[14] = (options.mask().bits() & 0xf) as u8;

        transport::submit(fd, &cdb, Direction::FromDevice, Some(&mut buf), 30_000)?;

        let nr_available = u32::from_be_bytes(buf[0..4].try_into().unwrap()) / 64;

        match out {
            None => Ok(nr_available),
            Some(out) => {
                let n = (nr_available as usize).min(out.len()).min(requested);
                for i in 0..n {
                    let base = 64 + i * 64;
                    let d = &buf[base..base + 64];
                    out[i] = ZoneDescriptor {
                        zone_type: ZoneType::from_nibble(d[0]),
                        condition: ZoneCondition::from_nibble(d[1] >> 4),
                        reset_recommended: d[1] & 0x01 != 0,
                        non_sequential_write: d[1] & 0x02 != 0,
                        length: u64::from_be_bytes(d[8..16].try_into().unwrap()),
                        start: u64::from_be_bytes(d[16..24].try_into().unwrap()),
                        write_pointer: u64::from_be_bytes(d[24..32].try_into().unwrap()),
                    };
                }
                Ok(n as u32)
            }
        }
    }

    fn zone_op(&mut self, sector: u64, op: ZoneOperation, flags: ZoneOpFlags) -> ZbcResult<()> {
        let fd = self.file.as_raw_fd();
        let mut cdb = [0u8; 16];
        cdb[0] = ZONE_MGMT_OUT_OPCODE;
        cdb[1] = zone_mgmt_sa(op);
        if !flags.contains(ZoneOpFlags::ALL_ZONES) {
            cdb[2..10].copy_from_slice(&sector.to_be_bytes());
        } else {
            cdb[14] = 0x01;
        }
        transport::submit(fd, &cdb, Direction::None, None, 30_000).map(|_| ())
    }

    fn preadv(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
        use nix::sys::uio::pread as nix_pread;
        let fd = self.file.as_raw_fd();
        let mut total = 0u64;
        for seg in iov {
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
        use nix::sys::uio::pwrite as nix_pwrite;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_mgmt_service_actions_match_zbc() {
        assert_eq!(zone_mgmt_sa(ZoneOperation::Close), 0x01);
        assert_eq!(zone_mgmt_sa(ZoneOperation::Finish), 0x02);
        assert_eq!(zone_mgmt_sa(ZoneOperation::Open), 0x03);
        assert_eq!(zone_mgmt_sa(ZoneOperation::Reset), 0x04);
    }
}
