//! SCSI sense-key / ASC-ASCQ name tables and the task-local last-error record.
//!
//! The original library kept one global `errno`-style record updated by the
//! most recent failing command. Rust gives us real thread-local storage, so
//! the record here is scoped per-thread instead of process-wide (see
//! SPEC_FULL.md §9, §3 "Per-task error record").

use std::cell::Cell;

/// SCSI sense keys relevant to ZBC/ZAC command failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseKey {
    NoSense,
    IllegalRequest,
    DataProtect,
    AbortedCommand,
    Unknown(u8),
}

impl SenseKey {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => SenseKey::NoSense,
            0x05 => SenseKey::IllegalRequest,
            0x07 => SenseKey::DataProtect,
            0x0b => SenseKey::AbortedCommand,
            other => SenseKey::Unknown(other),
        }
    }

    pub fn name(&self) -> String {
        match self {
            SenseKey::NoSense => "No-sense".to_string(),
            SenseKey::IllegalRequest => "Illegal-request".to_string(),
            SenseKey::DataProtect => "Data-protect".to_string(),
            SenseKey::AbortedCommand => "Aborted-command".to_string(),
            SenseKey::Unknown(b) => format!("Unknown-sense-key {:#04x}", b),
        }
    }
}

/// Additional sense code / additional sense code qualifier pairs relevant to
/// ZBC/ZAC failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AscAscq {
    InvalidFieldInCdb,
    LogicalBlockAddressOutOfRange,
    UnalignedWriteCommand,
    WriteBoundaryViolation,
    AttemptToReadInvalidData,
    ReadBoundaryViolation,
    ZoneIsReadOnly,
    InsufficientZoneResources,
    Unknown(u8, u8),
}

impl AscAscq {
    pub fn from_bytes(asc: u8, ascq: u8) -> Self {
        match (asc, ascq) {
            (0x24, 0x00) => AscAscq::InvalidFieldInCdb,
            (0x21, 0x00) => AscAscq::LogicalBlockAddressOutOfRange,
            (0x21, 0x04) => AscAscq::UnalignedWriteCommand,
            (0x21, 0x05) => AscAscq::WriteBoundaryViolation,
            (0x21, 0x06) => AscAscq::AttemptToReadInvalidData,
            (0x21, 0x07) => AscAscq::ReadBoundaryViolation,
            (0x27, 0x00) => AscAscq::ZoneIsReadOnly,
            (0x55, 0x0e) => AscAscq::InsufficientZoneResources,
            (a, q) => AscAscq::Unknown(a, q),
        }
    }

    pub fn name(&self) -> String {
        match self {
            AscAscq::InvalidFieldInCdb => "Invalid-field-in-cdb".to_string(),
            AscAscq::LogicalBlockAddressOutOfRange => {
                "Logical-block-address-out-of-range".to_string()
            }
            AscAscq::UnalignedWriteCommand => "Unaligned-write-command".to_string(),
            AscAscq::WriteBoundaryViolation => "Write-boundary-violation".to_string(),
            AscAscq::AttemptToReadInvalidData => "Attempt-to-read-invalid-data".to_string(),
            AscAscq::ReadBoundaryViolation => "Read-boundary-violation".to_string(),
            AscAscq::ZoneIsReadOnly => "Zone-is-read-only".to_string(),
            AscAscq::InsufficientZoneResources => "Insufficient-zone-resources".to_string(),
            AscAscq::Unknown(a, q) => {
                format!("Unknown-additional-sense-code-qualifier {:#04x}/{:#04x}", a, q)
            }
        }
    }
}

/// Last-failure sense information for the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SenseRecord {
    pub sense_key: u8,
    pub asc: u8,
    pub ascq: u8,
}

thread_local! {
    static LAST_ERROR: Cell<SenseRecord> = Cell::new(SenseRecord::default());
}

/// Updates the current thread's last-error record. Called by transports
/// immediately after a failing command returns sense data.
pub fn set_last_error(record: SenseRecord) {
    LAST_ERROR.with(|cell| cell.set(record));
}

/// Reads the current thread's last-error record.
pub fn last_error() -> SenseRecord {
    LAST_ERROR.with(|cell| cell.get())
}

/// Resets the current thread's last-error record. Invoked implicitly at the
/// start of every new public operation.
pub fn reset_last_error() {
    LAST_ERROR.with(|cell| cell.set(SenseRecord::default()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sense_key_names() {
        assert_eq!(SenseKey::from_byte(0x05).name(), "Illegal-request");
        assert_eq!(SenseKey::from_byte(0x7f).name(), "Unknown-sense-key 0x7f");
    }

    #[test]
    fn asc_ascq_names() {
        assert_eq!(
            AscAscq::from_bytes(0x21, 0x00).name(),
            "Logical-block-address-out-of-range"
        );
        assert!(matches!(
            AscAscq::from_bytes(0x99, 0x01),
            AscAscq::Unknown(0x99, 0x01)
        ));
    }

    #[test]
    fn last_error_is_thread_local_and_resets() {
        reset_last_error();
        assert_eq!(last_error().sense_key, 0);
        set_last_error(SenseRecord {
            sense_key: 0x05,
            asc: 0x21,
            ascq: 0x00,
        });
        assert_eq!(last_error().sense_key, 0x05);
        reset_last_error();
        assert_eq!(last_error().sense_key, 0);
    }
}
