//! Backend registry and `open`/`is_zoned` dispatch.
//!
//! Mirrors `zbc_open`/`zbc_device_is_zoned` in the original library: resolve
//! symlinks, then walk an ordered, fixed list of backends until one accepts
//! the device file or a fatal error occurs.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use log::debug;

use crate::backends::ata::backend::AtaBackend;
use crate::backends::block::BlockBackend;
use crate::backends::fake::FakeBackend;
use crate::backends::scsi::ScsiBackend;
use crate::device::{BackendKind, DeviceInfo};
use crate::error::{ZbcError, ZbcResult};
use crate::io_path::IoVec;
use crate::zone::{ReportingOptions, ZoneDescriptor, ZoneOpFlags, ZoneOperation};

bitflags! {
    /// Open-flags bitmask: low bits select allowed backends, remaining bits
    /// are behavioral. A zero driver-filter means "all drivers allowed".
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const DRV_BLOCK = 0x0000_0001;
        const DRV_SCSI  = 0x0000_0002;
        const DRV_ATA   = 0x0000_0004;
        const DRV_FAKE  = 0x0000_0008;
        const DRV_MASK  = Self::DRV_BLOCK.bits() | Self::DRV_SCSI.bits()
            | Self::DRV_ATA.bits() | Self::DRV_FAKE.bits();

        /// Relaxes alignment and zero-length checks in the I/O path; also
        /// permits the sized report-zones call to run against a simulated
        /// backend without a real drive's capacity limits.
        const TEST_MODE = 0x0001_0000;

        const O_RDONLY = 0x0010_0000;
        const O_WRONLY = 0x0020_0000;
        const O_RDWR   = 0x0040_0000;
    }
}

impl OpenFlags {
    /// The driver-filter sub-mask, defaulting to "all drivers" when zero.
    pub fn allowed_drivers(self) -> OpenFlags {
        let allowed = self & OpenFlags::DRV_MASK;
        if allowed.is_empty() {
            OpenFlags::DRV_MASK
        } else {
            allowed
        }
    }

    pub fn test_mode(self) -> bool {
        self.contains(OpenFlags::TEST_MODE)
    }
}

/// Per-backend capability table. Every backend produces a boxed
/// `BackendSession` on acceptance; `registry::open` never inspects the
/// concrete type, only this trait.
pub trait BackendSession: Send + fmt::Debug {
    fn kind(&self) -> BackendKind;
    fn info(&self) -> &DeviceInfo;

    /// `out = None` asks for the total zone count reachable from
    /// `start_sector` only (no descriptors written).
    fn report_zones(
        &mut self,
        start_sector: u64,
        options: ReportingOptions,
        out: Option<&mut [ZoneDescriptor]>,
    ) -> ZbcResult<u32>;

    fn zone_op(&mut self, sector: u64, op: ZoneOperation, flags: ZoneOpFlags) -> ZbcResult<()>;

    /// `iov` lengths are in bytes; returns sectors transferred.
    fn preadv(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64>;
    fn pwritev(&mut self, iov: &[IoVec], offset: u64) -> ZbcResult<u64>;

    fn flush(&mut self) -> ZbcResult<()>;

    fn set_zones(&mut self, _conv_size: u64, _zone_size: u64) -> ZbcResult<()> {
        Err(ZbcError::Unsupported("set_zones"))
    }

    fn set_write_pointer(&mut self, _sector: u64, _wp_sector: u64) -> ZbcResult<()> {
        Err(ZbcError::Unsupported("set_write_pointer"))
    }
}

/// Outcome of a single backend's probe attempt.
pub enum ProbeOutcome {
    Accepted(Box<dyn BackendSession>),
    NotMine,
}

/// One entry in the static backend registry.
pub trait Backend: Sync {
    fn kind(&self) -> BackendKind;
    fn driver_flag(&self) -> OpenFlags;
    fn probe(&self, path: &Path, flags: OpenFlags) -> ZbcResult<ProbeOutcome>;
}

/// Ordered dispatch list: block -> scsi -> ata -> fake, matching the
/// original's static `zbc_drv[]` array.
fn registry() -> [&'static dyn Backend; 4] {
    static BLOCK: BlockBackend = BlockBackend;
    static SCSI: ScsiBackend = ScsiBackend;
    static ATA: AtaBackend = AtaBackend;
    static FAKE: FakeBackend = FakeBackend;
    [&BLOCK, &SCSI, &ATA, &FAKE]
}

fn real_path(path: &Path) -> ZbcResult<PathBuf> {
    fs::canonicalize(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ZbcError::Permission
        } else {
            ZbcError::Io(e)
        }
    })
}

/// An open device handle: the accepted backend's session plus the resolved
/// path. Owns exclusive access to whatever OS resource the backend session
/// holds; dropping it releases that resource (the session's own `Drop`).
#[derive(Debug)]
pub struct DeviceHandle {
    pub(crate) path: PathBuf,
    pub(crate) flags: OpenFlags,
    pub(crate) session: Box<dyn BackendSession>,
}

impl DeviceHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &DeviceInfo {
        self.session.info()
    }

    pub fn kind(&self) -> BackendKind {
        self.session.kind()
    }

    pub fn test_mode(&self) -> bool {
        self.flags.test_mode()
    }

    pub(crate) fn session_mut(&mut self) -> &mut dyn BackendSession {
        self.session.as_mut()
    }
}

/// Opens `path`, probing backends in registry order honoring `flags`'s
/// driver filter. The kernel-native block backend is skipped outright when
/// the host has no zoned-block ioctl surface, regardless of the filter mask.
pub fn open(path: &Path, flags: OpenFlags) -> ZbcResult<DeviceHandle> {
    let resolved = real_path(path)?;
    let allowed = flags.allowed_drivers();

    for backend in registry() {
        if !allowed.contains(backend.driver_flag()) {
            continue;
        }
        if backend.driver_flag() == OpenFlags::DRV_BLOCK && !crate::backends::block::available() {
            continue;
        }

        match backend.probe(&resolved, flags) {
            Ok(ProbeOutcome::Accepted(session)) => {
                debug!(
                    "{}: accepted by {:?} backend",
                    resolved.display(),
                    backend.kind()
                );
                return Ok(DeviceHandle {
                    path: resolved,
                    flags,
                    session,
                });
            }
            Ok(ProbeOutcome::NotMine) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(ZbcError::NoSuchDevice)
}

/// Closes a device handle. Since `DeviceHandle` has no public constructor
/// other than `open`, and `open` only ever returns a successfully-opened
/// handle, calling this twice on the same handle is impossible: the handle
/// is consumed by value.
pub fn close(handle: DeviceHandle) -> ZbcResult<()> {
    drop(handle);
    Ok(())
}

/// Probes `path` without returning a handle: `Ok(true)` if some backend
/// accepts it, `Ok(false)` if none does. Permission errors are coerced to
/// "not zoned" per the capability-table contract (§6).
pub fn is_zoned(path: &Path, allow_fake: bool) -> ZbcResult<bool> {
    let mut flags = OpenFlags::O_RDONLY;
    if !allow_fake {
        flags |= OpenFlags::DRV_BLOCK | OpenFlags::DRV_SCSI | OpenFlags::DRV_ATA;
    }
    match open(path, flags) {
        Ok(handle) => {
            let fake = matches!(handle.kind(), BackendKind::Fake);
            let zoned = !fake || allow_fake;
            drop(handle);
            Ok(zoned)
        }
        Err(e) if crate::error::is_permission_error(&e) => Ok(false),
        Err(ZbcError::NoSuchDevice) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_drivers_defaults_to_all_when_zero() {
        assert_eq!(OpenFlags::empty().allowed_drivers(), OpenFlags::DRV_MASK);
    }

    #[test]
    fn allowed_drivers_respects_explicit_filter() {
        let flags = OpenFlags::DRV_SCSI;
        assert_eq!(flags.allowed_drivers(), OpenFlags::DRV_SCSI);
    }

    #[test]
    fn fake_backend_accepts_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev0");
        std::fs::write(&path, []).unwrap();

        let handle = open(&path, OpenFlags::empty()).expect("fake backend should accept it");
        assert_eq!(handle.kind(), BackendKind::Fake);
    }

    #[test]
    fn driver_filter_excluding_fake_yields_no_such_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev0");
        std::fs::write(&path, []).unwrap();

        let err = open(&path, OpenFlags::DRV_SCSI).unwrap_err();
        assert!(matches!(err, ZbcError::NoSuchDevice));
    }
}
