//! In-process software emulation backend, backed by a regular file.
//!
//! Always accepts a plain file (it is last in the registry's probe order),
//! and is the only backend implementing `set_zones`/`set_write_pointer` —
//! the emulation-only capabilities a test harness uses to configure zone
//! layout without real hardware (SPEC_FULL.md §3, §4.1).

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::device::{BackendKind, DeviceFlags, DeviceInfo, OpenZoneLimit, ZoneModel};
use crate::error::{ZbcError, ZbcResult};
use crate::io_path::IoVec;
use crate::registry::{Backend, BackendSession, OpenFlags, ProbeOutcome};
use crate::zone::{ReportingOptions, ZoneCondition, ZoneDescriptor, ZoneOpFlags, ZoneOperation, ZoneType};

/// Sector count used when a freshly-created, empty backing file is opened
/// with no prior size (64 MiB).
const DEFAULT_CAPACITY_SECTORS: u64 = 131_072;

pub struct FakeBackend;

impl Backend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fake
    }

    fn driver_flag(&self) -> OpenFlags {
        OpenFlags::DRV_FAKE
    }

    fn probe(&self, path: &Path, flags: OpenFlags) -> ZbcResult<ProbeOutcome> {
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ZbcError::Permission)
            }
            Err(e) => return Err(ZbcError::Io(e)),
        };
        if !meta.is_file() {
            return Ok(ProbeOutcome::NotMine);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(!flags.contains(OpenFlags::O_RDONLY))
            .open(path)
            .map_err(ZbcError::Io)?;

        let sectors = if meta.len() == 0 {
            file.set_len(DEFAULT_CAPACITY_SECTORS * 512)
                .map_err(ZbcError::Io)?;
            DEFAULT_CAPACITY_SECTORS
        } else {
            meta.len() / 512
        };

        let info = DeviceInfo {
            vendor_id: "Emulated".to_string(),
            backend: BackendKind::Fake,
            zone_model: ZoneModel::Standard,
            sectors,
            logical_blocks: sectors,
            physical_blocks: sectors,
            logical_block_size: 512,
            physical_block_size: 512,
            max_rw_sectors: 65536,
            flags: DeviceFlags::UNRESTRICTED_READ,
            max_nr_open_seq_req: OpenZoneLimit::NotReported,
            opt_nr_open_seq_pref: OpenZoneLimit::NotReported,
            opt_nr_non_seq_write_seq_pref: OpenZoneLimit::NotReported,
        };

        let zones = vec![ZoneDescriptor {
            start: 0,
            length: sectors,
            write_pointer: 0,
            zone_type: ZoneType::Conventional,
            condition: ZoneCondition::NotWritePointer,
            reset_recommended: false,
            non_sequential_write: false,
        }];

        Ok(ProbeOutcome::Accepted(Box::new(FakeSession {
            file,
            info,
            zones,
        })))
    }
}

struct FakeSession {
    file: File,
    info: DeviceInfo,
    zones: Vec<ZoneDescriptor>,
}

impl std::fmt::Debug for FakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeSession")
            .field("fd", &self.file.as_raw_fd())
            .field("zones", &self.zones.len())
            .finish()
    }
}

impl FakeSession {
    fn zone_index_at(&self, sector: u64) -> Option<usize> {
        self.zones.iter().position(|z| z.start == sector)
    }

    fn zone_index_containing(&self, sector: u64) -> Option<usize> {
        self.zones
            .iter()
            .position(|z| sector >= z.start && sector < z.end())
    }
}

impl BackendSession for FakeSession {
    fn kind(&self) -> BackendKind {
        BackendKind::Fake
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
        let start_idx = self
            .zones
            .iter()
            .position(|z| z.start >= start_sector)
            .unwrap_or(self.zones.len());

        match out {
            None => Ok((self.zones.len() - start_idx) as u32),
            Some(buf) => {
                let n = buf.len().min(self.zones.len() - start_idx);
                buf[..n].copy_from_slice(&self.zones[start_idx..start_idx + n]);
                Ok(n as u32)
            }
        }
    }

    fn zone_op(&mut self, sector: u64, op: ZoneOperation, flags: ZoneOpFlags) -> ZbcResult<()> {
        let indices: Vec<usize> = if flags.contains(ZoneOpFlags::ALL_ZONES) {
            (0..self.zones.len()).collect()
        } else {
            match self.zone_index_at(sector) {
                Some(i) => vec![i],
                None => {
                    return Err(ZbcError::invalid_argument(format!(
                        "no zone starts at sector {sector}"
                    )))
                }
            }
        };

        for i in indices {
            let z = &mut self.zones[i];
            if matches!(z.zone_type, ZoneType::Conventional) {
                continue;
            }
            match op {
                ZoneOperation::Reset => {
                    z.write_pointer = z.start;
                    z.condition = ZoneCondition::Empty;
                }
                ZoneOperation::Open => {
                    z.condition = ZoneCondition::ExplicitOpen;
                }
                ZoneOperation::Close => {
                    z.condition = ZoneCondition::Closed;
                }
                ZoneOperation::Finish => {
                    z.write_pointer = z.end();
                    z.condition = ZoneCondition::Full;
                }
            }
        }
        Ok(())
    }

    fn preadv(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
        let mut total = 0u64;
        for seg in iov {
            let slice = unsafe { std::slice::from_raw_parts_mut(seg.as_ptr(), seg.len()) };
            let n = self
                .file
                .read_at(slice, offset * 512 + total)
                .map_err(ZbcError::Io)?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        Ok(total / 512)
    }

    fn pwritev(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
        let mut total = 0u64;
        for seg in iov {
            let slice = unsafe { std::slice::from_raw_parts(seg.as_ptr(), seg.len()) };
            let n = self
                .file
                .write_at(slice, offset * 512 + total)
                .map_err(ZbcError::Io)?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        let sectors_written = total / 512;

        if let Some(idx) = self.zone_index_containing(offset) {
            let z = &mut self.zones[idx];
            if z.is_write_pointer_zone() {
                z.write_pointer = (z.write_pointer + sectors_written).min(z.end());
                z.condition = if z.write_pointer == z.end() {
                    ZoneCondition::Full
                } else if z.write_pointer == z.start {
                    ZoneCondition::Empty
                } else {
                    ZoneCondition::ImplicitOpen
                };
            }
        }

        Ok(sectors_written)
    }

    fn flush(&mut self) -> ZbcResult<()> {
        self.file.sync_data().map_err(ZbcError::Io)
    }

    fn set_zones(&mut self, conv_size: u64, zone_size: u64) -> ZbcResult<()> {
        if zone_size == 0 {
            return Err(ZbcError::invalid_argument("zone_size must be non-zero"));
        }
        let capacity = self.info.sectors;
        let mut zones = Vec::new();
        let mut cur = 0u64;

        if conv_size > 0 {
            let len = conv_size.min(capacity);
            zones.push(ZoneDescriptor {
                start: 0,
                length: len,
                write_pointer: 0,
                zone_type: ZoneType::Conventional,
                condition: ZoneCondition::NotWritePointer,
                reset_recommended: false,
                non_sequential_write: false,
            });
            cur = len;
        }

        while cur < capacity {
            let len = zone_size.min(capacity - cur);
            zones.push(ZoneDescriptor {
                start: cur,
                length: len,
                write_pointer: cur,
                zone_type: ZoneType::SequentialWriteRequired,
                condition: ZoneCondition::Empty,
                reset_recommended: false,
                non_sequential_write: false,
            });
            cur += len;
        }

        self.zones = zones;
        self.info.zone_model = ZoneModel::HostManaged;
        Ok(())
    }

    fn set_write_pointer(&mut self, sector: u64, wp_sector: u64) -> ZbcResult<()> {
        let idx = self
            .zone_index_at(sector)
            .ok_or_else(|| ZbcError::invalid_argument(format!("no zone starts at sector {sector}")))?;
        let z = &mut self.zones[idx];
        if wp_sector < z.start || wp_sector > z.end() {
            return Err(ZbcError::invalid_argument(
                "write pointer outside zone bounds",
            ));
        }
        z.write_pointer = wp_sector;
        z.condition = if wp_sector == z.start {
            ZoneCondition::Empty
        } else if wp_sector == z.end() {
            ZoneCondition::Full
        } else {
            ZoneCondition::ImplicitOpen
        };
        Ok(())
    }
}
