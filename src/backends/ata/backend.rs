//! `AtaBackend`/`AtaSession`: ties the CDB builder, signature classifier,
//! and log-page parser together into a `Backend`/`BackendSession` pair.
//!
//! Grounded on `zbc_ata_ops` (`zbc_ata_open/close/pread/pwrite/flush/
//! report_zones/reset_write_pointer`) in `zbc_ata.c`.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use log::{debug, warn};

use super::{cdb, classify, log_page};
use crate::backends::transport::{self, Direction};
use crate::device::{BackendKind, DeviceFlags, DeviceInfo, OpenZoneLimit, ZoneModel};
use crate::error::{ZbcError, ZbcResult};
use crate::io_path::IoVec;
use crate::registry::{Backend, BackendSession, OpenFlags, ProbeOutcome};
use crate::zone::{ReportingOptions, ZoneDescriptor, ZoneOpFlags, ZoneOperation};

const READ_CAPACITY16_OPCODE: u8 = 0x9e;
const READ_CAPACITY16_SA: u8 = 0x10;
const GENERAL_PURPOSE_LOG: u8 = 0x00;

pub struct AtaBackend;

impl Backend for AtaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ata
    }

    fn driver_flag(&self) -> OpenFlags {
        OpenFlags::DRV_ATA
    }

    fn probe(&self, path: &Path, flags: OpenFlags) -> ZbcResult<ProbeOutcome> {
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ZbcError::Permission)
            }
            Err(e) => return Err(ZbcError::Io(e)),
        };
        if !(meta.file_type().is_block_device() || meta.file_type().is_char_device()) {
            return Ok(ProbeOutcome::NotMine);
        }

        let file = open_rw(path, flags)?;
        let fd = file.as_raw_fd();

        let diag = match transport::submit_tolerant(
            fd,
            &cdb::exec_dev_diagnostic(),
            Direction::None,
            None,
            30_000,
        ) {
            Ok(r) => r,
            Err(_) => return Ok(ProbeOutcome::NotMine),
        };

        let (sig_hi, sig_lo) = classify::device_signature(&diag.sense);
        let zone_model = match classify::classify_signature(sig_hi, sig_lo) {
            classify::Signature::HostManaged => ZoneModel::HostManaged,
            classify::Signature::StandardAmbiguous => {
                let mut dir = [0u8; log_page::LOG_PAGE_SIZE];
                let dir_cdb = cdb::read_log_dma_ext(GENERAL_PURPOSE_LOG, 0, 1, 0);
                match transport::submit(fd, &dir_cdb, Direction::FromDevice, Some(&mut dir), 30_000) {
                    Ok(_) => {
                        let pages = log_page::report_zones_log_page_count(&dir);
                        if pages > 0 {
                            debug!("{pages} report-zones log pages: host-aware");
                            ZoneModel::HostAware
                        } else {
                            debug!("no report-zones log pages: drive-managed, not ours");
                            return Ok(ProbeOutcome::NotMine);
                        }
                    }
                    Err(_) => return Ok(ProbeOutcome::NotMine),
                }
            }
            classify::Signature::Unsupported => return Ok(ProbeOutcome::NotMine),
        };

        let mut cap = [0u8; 32];
        let mut cap_cdb = [0u8; 16];
        cap_cdb[0] = READ_CAPACITY16_OPCODE;
        cap_cdb[1] = READ_CAPACITY16_SA;
        cap_cdb[10..14].copy_from_slice(&(cap.len() as u32).to_be_bytes());
        transport::submit(fd, &cap_cdb, Direction::FromDevice, Some(&mut cap), 30_000)?;
        let parsed = log_page::parse_read_capacity16(&cap)?;

        let sectors_per_block = (parsed.logical_block_size as u64 / 512).max(1);
        let sectors = parsed.logical_blocks * sectors_per_block;
        let physical_blocks = parsed.logical_blocks / parsed.logical_per_physical as u64;
        let physical_block_size = parsed.logical_block_size * parsed.logical_per_physical;

        let info = DeviceInfo {
            vendor_id: "ATA-ZAC".to_string(),
            backend: BackendKind::Ata,
            zone_model,
            sectors,
            logical_blocks: parsed.logical_blocks,
            physical_blocks,
            logical_block_size: parsed.logical_block_size,
            physical_block_size,
            max_rw_sectors: cdb::MAX_LBA_COUNT as u64,
            flags: DeviceFlags::empty(),
            max_nr_open_seq_req: OpenZoneLimit::NotReported,
            opt_nr_open_seq_pref: OpenZoneLimit::NotReported,
            opt_nr_non_seq_write_seq_pref: OpenZoneLimit::NotReported,
        };

        Ok(ProbeOutcome::Accepted(Box::new(AtaSession { file, info })))
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

struct AtaSession {
    file: File,
    info: DeviceInfo,
}

impl std::fmt::Debug for AtaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtaSession")
            .field("fd", &self.file.as_raw_fd())
            .field("zone_model", &self.info.zone_model)
            .finish()
    }
}

impl BackendSession for AtaSession {
    fn kind(&self) -> BackendKind {
        BackendKind::Ata
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
        let opt = (options.mask().bits() & 0xf) as u8;

        let mut page = 0u32;
        let mut buf_sz = log_page::LOG_PAGE_SIZE;
        let mut buf = vec![0u8; buf_sz];
        let first_cdb =
            cdb::read_log_dma_ext(log_page::REPORT_ZONES_LOG_PAGE, page as u16, (buf_sz / 512) as u32, opt);
        transport::submit(fd, &first_cdb, Direction::FromDevice, Some(&mut buf), 30_000)?;

        let total = log_page::total_zone_count(&buf);
        if total == 0 {
            return Ok(0);
        }
        if start_sector == 0 && out.is_none() {
            return Ok(total);
        }

        let want = out.as_ref().map(|o| o.len()).unwrap_or(usize::MAX);
        let mut matched: Vec<ZoneDescriptor> = Vec::with_capacity(want.min(total as usize));
        let mut remaining = total;
        let mut cursor = log_page::ZONE_DESCRIPTOR_OFFSET;

        'outer: loop {
            while cursor + log_page::ZONE_DESCRIPTOR_LEN <= buf.len() && remaining > 0 {
                let zd = log_page::decode_zone_descriptor(&buf[cursor..cursor + log_page::ZONE_DESCRIPTOR_LEN]);
                cursor += log_page::ZONE_DESCRIPTOR_LEN;
                remaining -= 1;
                if zd.start >= start_sector {
                    matched.push(zd);
                    if matched.len() >= want {
                        break 'outer;
                    }
                }
            }
            if remaining == 0 {
                break;
            }

            let (next_page, next_buf_sz) = log_page::next_read(page, buf_sz, remaining);
            page = next_page;
            buf_sz = next_buf_sz;
            buf = vec![0u8; buf_sz];
            let read_cdb = cdb::read_log_dma_ext(
                log_page::REPORT_ZONES_LOG_PAGE,
                page as u16,
                (buf_sz / 512) as u32,
                opt,
            );
            transport::submit(fd, &read_cdb, Direction::FromDevice, Some(&mut buf), 30_000)?;
            cursor = 0;
        }

        match out {
            None => Ok(matched.len() as u32),
            Some(slots) => {
                let n = matched.len().min(slots.len());
                slots[..n].copy_from_slice(&matched[..n]);
                Ok(n as u32)
            }
        }
    }

    fn zone_op(&mut self, sector: u64, op: ZoneOperation, flags: ZoneOpFlags) -> ZbcResult<()> {
        if !matches!(op, ZoneOperation::Reset) {
            warn!("{op:?} is not representable as an ATA ZAC command on this backend");
            return Err(ZbcError::Unsupported(
                "only Reset is supported by the ATA backend (open/close/finish require ZONE MANAGEMENT OUT, not modeled here)",
            ));
        }
        let fd = self.file.as_raw_fd();
        let cdb = if flags.contains(ZoneOpFlags::ALL_ZONES) {
            cdb::reset_write_pointer_ext(None)
        } else {
            cdb::reset_write_pointer_ext(Some(sector))
        };
        transport::submit(fd, &cdb, Direction::None, None, 30_000).map(|_| ())
    }

    fn preadv(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
        let fd = self.file.as_raw_fd();
        let mut transferred = 0u64;
        for seg in iov {
            let seg_sectors = (seg.len() as u64) / 512;
            if seg_sectors == 0 {
                continue;
            }
            let cdb = cdb::read_dma_ext(offset + transferred, seg_sectors as u32)?;
            let slice = unsafe { std::slice::from_raw_parts_mut(seg.as_ptr(), seg.len()) };
            transport::submit(fd, &cdb, Direction::FromDevice, Some(slice), 30_000)?;
            transferred += seg_sectors;
        }
        Ok(transferred)
    }

    fn pwritev(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
        let fd = self.file.as_raw_fd();
        let mut transferred = 0u64;
        for seg in iov {
            let seg_sectors = (seg.len() as u64) / 512;
            if seg_sectors == 0 {
                continue;
            }
            let cdb = cdb::write_dma_ext(offset + transferred, seg_sectors as u32)?;
            let slice = unsafe { std::slice::from_raw_parts_mut(seg.as_ptr(), seg.len()) };
            transport::submit(fd, &cdb, Direction::ToDevice, Some(slice), 30_000)?;
            transferred += seg_sectors;
        }
        Ok(transferred)
    }

    fn flush(&mut self) -> ZbcResult<()> {
        let fd = self.file.as_raw_fd();
        transport::submit(fd, &cdb::flush_cache_ext(), Direction::None, None, 30_000).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_zones_uses_feature_low_sentinel() {
        let cdb = cdb::reset_write_pointer_ext(None);
        assert_eq!(cdb[4], 0x01);
    }
}
