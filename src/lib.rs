//! Zoned Block / Zoned ATA Command support for host-managed and host-aware
//! zoned storage devices.
//!
//! This crate dispatches to whichever of the native Linux zoned-block
//! ioctls, raw SCSI ZBC, or ATA-PASSTHROUGH ZAC command sets a device file
//! actually answers to (see [`registry`]), and exposes a single uniform API
//! over all of them: open a device, read its zone layout, read/write by
//! sector, and perform zone management (reset/open/close/finish).

#![allow(clippy::upper_case_acronyms)]

pub mod backends;
pub mod device;
pub mod error;
pub mod io_path;
pub mod registry;
pub mod reporter;
pub mod sense;
pub mod zone;

use std::path::Path;

pub use device::{BackendKind, DeviceFlags, DeviceInfo, OpenZoneLimit, ZoneModel};
pub use error::{ZbcError, ZbcResult};
pub use io_path::IoVec;
pub use registry::{DeviceHandle, OpenFlags};
pub use sense::{AscAscq, SenseKey, SenseRecord};
pub use zone::{ReportingOptions, ZoneCondition, ZoneDescriptor, ZoneOpFlags, ZoneOperation, ZoneType};

/// Opens `path`, probing backends in registry order (block, SCSI, ATA,
/// fake) honoring `flags`'s driver filter. Resets this thread's last-error
/// record first, matching every other top-level entry point.
pub fn open(path: &Path, flags: OpenFlags) -> ZbcResult<DeviceHandle> {
    sense::reset_last_error();
    registry::open(path, flags)
}

/// Closes a device handle.
pub fn close(handle: DeviceHandle) -> ZbcResult<()> {
    registry::close(handle)
}

/// `Ok(true)` if some backend accepts `path` as zoned, `Ok(false)` if none
/// does or permission is denied. `allow_fake` also accepts the in-process
/// emulation backend as "zoned" (used by tests and tooling, never by a
/// caller probing a real drive).
pub fn is_zoned(path: &Path, allow_fake: bool) -> ZbcResult<bool> {
    registry::is_zoned(path, allow_fake)
}

/// Reports up to `out.len()` zones starting at `start_sector`, returning the
/// number written. See [`reporter::report_zones`].
pub fn report_zones(
    handle: &mut DeviceHandle,
    start_sector: u64,
    options: ReportingOptions,
    out: &mut [ZoneDescriptor],
) -> ZbcResult<usize> {
    sense::reset_last_error();
    reporter::report_zones(handle, start_sector, options, out)
}

/// Reports every zone starting at `start_sector`, allocating the result
/// vector from the device-reported zone count. See [`reporter::list_zones`].
pub fn list_zones(
    handle: &mut DeviceHandle,
    start_sector: u64,
    options: ReportingOptions,
) -> ZbcResult<Vec<ZoneDescriptor>> {
    sense::reset_last_error();
    reporter::list_zones(handle, start_sector, options)
}

/// Performs `op` (reset/open/close/finish) on the zone starting at `sector`,
/// or on every zone if `flags` carries [`ZoneOpFlags::ALL_ZONES`].
pub fn zone_operation(
    handle: &mut DeviceHandle,
    sector: u64,
    op: ZoneOperation,
    flags: ZoneOpFlags,
) -> ZbcResult<()> {
    sense::reset_last_error();
    handle.session_mut().zone_op(sector, op, flags)
}

/// Scalar positioned read. `offset` is in 512-byte sectors; `buf.len()` must
/// be a multiple of 512.
pub fn pread(handle: &mut DeviceHandle, buf: &mut [u8], offset: u64) -> ZbcResult<u64> {
    sense::reset_last_error();
    io_path::pread(handle, buf, offset)
}

/// Scalar positioned write; see [`pread`] for units.
pub fn pwrite(handle: &mut DeviceHandle, buf: &[u8], offset: u64) -> ZbcResult<u64> {
    sense::reset_last_error();
    io_path::pwrite(handle, buf, offset)
}

/// Vectored positioned read; see [`io_path::preadv`].
pub fn preadv(handle: &mut DeviceHandle, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
    sense::reset_last_error();
    io_path::preadv(handle, iov, offset)
}

/// Vectored positioned write; see [`io_path::pwritev`].
pub fn pwritev(handle: &mut DeviceHandle, iov: &[IoVec], offset: u64) -> ZbcResult<u64> {
    sense::reset_last_error();
    io_path::pwritev(handle, iov, offset)
}

/// Flushes the device's write cache.
pub fn flush(handle: &mut DeviceHandle) -> ZbcResult<()> {
    sense::reset_last_error();
    handle.session_mut().flush()
}

/// Reshapes the fake backend's zone layout into a conventional region of
/// `conv_size` sectors followed by sequential zones of `zone_size` sectors.
/// `Err(ZbcError::Unsupported)` on every real backend.
pub fn set_zones(handle: &mut DeviceHandle, conv_size: u64, zone_size: u64) -> ZbcResult<()> {
    handle.session_mut().set_zones(conv_size, zone_size)
}

/// Forces the write pointer of the zone starting at `sector` to `wp_sector`,
/// for test fixtures built on the fake backend.
pub fn set_write_pointer(handle: &mut DeviceHandle, sector: u64, wp_sector: u64) -> ZbcResult<()> {
    handle.session_mut().set_write_pointer(sector, wp_sector)
}

/// Sets the process-wide log level. Accepts `"none"`, `"warning"`,
/// `"error"`, `"info"`, `"debug"`; any other value is left unchanged and
/// logged as a warning rather than rejected with an error, since producing
/// one more log line is itself a logging-layer concern, not a caller error.
pub fn set_log_level(name: &str) {
    let level = match name {
        "none" => log::LevelFilter::Off,
        "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        other => {
            log::warn!("unrecognized log level {other:?}, leaving level unchanged");
            return;
        }
    };
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_log_level_recognises_every_accepted_name() {
        for name in ["none", "warning", "error", "info", "debug"] {
            set_log_level(name);
        }
    }

    #[test]
    fn set_log_level_ignores_unknown_names() {
        let before = log::max_level();
        set_log_level("not-a-real-level");
        assert_eq!(log::max_level(), before);
    }

    #[test]
    fn fake_backend_round_trips_through_the_public_api() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev0");
        std::fs::write(&path, []).unwrap();

        let mut handle = open(&path, OpenFlags::empty()).unwrap();
        assert_eq!(handle.kind(), BackendKind::Fake);

        let zones = list_zones(&mut handle, 0, ReportingOptions::LIST_ALL).unwrap();
        assert_eq!(zones.len(), 1);

        let data = vec![0xab; 512];
        pwrite(&mut handle, &data, 0).unwrap();
        let mut readback = vec![0u8; 512];
        pread(&mut handle, &mut readback, 0).unwrap();
        assert_eq!(readback, data);

        flush(&mut handle).unwrap();
        close(handle).unwrap();
    }
}
