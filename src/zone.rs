//! Zone descriptors, zone taxonomy, and zone-management operations.
//!
//! Field layout and enum discriminants mirror the wire encoding parsed in
//! `backends::ata::log_page` (ZBC/ZAC report-zones log page, byte 0 / byte 1
//! nibbles) so that decoding is a direct match, not a translation table.

use bitflags::bitflags;

/// Write discipline of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Conventional,
    SequentialWriteRequired,
    SequentialWritePreferred,
    Unknown,
}

impl ZoneType {
    /// Decodes the low nibble of zone descriptor byte 0.
    pub fn from_nibble(n: u8) -> Self {
        match n & 0x0f {
            0x1 => ZoneType::Conventional,
            0x2 => ZoneType::SequentialWriteRequired,
            0x3 => ZoneType::SequentialWritePreferred,
            _ => ZoneType::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ZoneType::Conventional => "Conventional",
            ZoneType::SequentialWriteRequired => "Sequential-write-required",
            ZoneType::SequentialWritePreferred => "Sequential-write-preferred",
            ZoneType::Unknown => "Unknown-zone-type",
        }
    }
}

/// Current condition of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneCondition {
    NotWritePointer,
    Empty,
    ImplicitOpen,
    ExplicitOpen,
    Closed,
    ReadOnly,
    Full,
    Offline,
    Unknown,
}

impl ZoneCondition {
    /// Decodes the high nibble of zone descriptor byte 1.
    pub fn from_nibble(n: u8) -> Self {
        match n & 0x0f {
            0x0 => ZoneCondition::NotWritePointer,
            0x1 => ZoneCondition::Empty,
            0x2 => ZoneCondition::ImplicitOpen,
            0x3 => ZoneCondition::ExplicitOpen,
            0x4 => ZoneCondition::Closed,
            0xd => ZoneCondition::ReadOnly,
            0xe => ZoneCondition::Full,
            0xf => ZoneCondition::Offline,
            _ => ZoneCondition::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ZoneCondition::NotWritePointer => "Not-write-pointer",
            ZoneCondition::Empty => "Empty",
            ZoneCondition::ImplicitOpen => "Implicit-open",
            ZoneCondition::ExplicitOpen => "Explicit-open",
            ZoneCondition::Closed => "Closed",
            ZoneCondition::ReadOnly => "Read-only",
            ZoneCondition::Full => "Full",
            ZoneCondition::Offline => "Offline",
            ZoneCondition::Unknown => "Unknown-zone-condition",
        }
    }
}

/// A single zone descriptor, in 512-byte sector units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneDescriptor {
    pub start: u64,
    pub length: u64,
    pub write_pointer: u64,
    pub zone_type: ZoneType,
    pub condition: ZoneCondition,
    pub reset_recommended: bool,
    pub non_sequential_write: bool,
}

impl ZoneDescriptor {
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn is_write_pointer_zone(&self) -> bool {
        !matches!(self.zone_type, ZoneType::Conventional)
    }
}

/// Zone management operations issued via `zone_operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneOperation {
    Reset,
    Open,
    Close,
    Finish,
}

bitflags! {
    /// Flags accompanying a `zone_operation` call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ZoneOpFlags: u32 {
        /// Apply the operation to every zone; `sector` is ignored.
        const ALL_ZONES = 0x0000_0001;
    }
}

bitflags! {
    /// Low four bits select the zone-condition filter; higher bits are
    /// reserved for the reporter's internal partial-results flag (added by
    /// `reporter::report_zones`, never set by callers).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReportingOptions: u32 {
        const LIST_ALL            = 0x0;
        const EMPTY               = 0x1;
        const IMPLICIT_OPEN       = 0x2;
        const EXPLICIT_OPEN       = 0x3;
        const CLOSED              = 0x4;
        const FULL                = 0x5;
        const READ_ONLY           = 0x6;
        const OFFLINE             = 0x7;
        const RESET_RECOMMENDED   = 0x8;
        const NON_SEQUENTIAL      = 0x9;
        const NOT_WRITE_POINTER   = 0xa;
        /// Internal-only: backend should return as many zones as fit in the
        /// caller's buffer rather than failing when it is smaller than the
        /// total count.
        const PARTIAL             = 0x1_0000;
    }
}

impl ReportingOptions {
    /// Masks to the low four bits significant to backends, as the original
    /// `zbc_ro_mask` does, then re-adds `PARTIAL` if the caller asked for it.
    pub fn mask(self) -> ReportingOptions {
        let low = ReportingOptions::from_bits_truncate(self.bits() & 0xf);
        if self.contains(ReportingOptions::PARTIAL) {
            low | ReportingOptions::PARTIAL
        } else {
            low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_type_decodes_low_nibble() {
        assert_eq!(ZoneType::from_nibble(0x1), ZoneType::Conventional);
        assert_eq!(ZoneType::from_nibble(0x2), ZoneType::SequentialWriteRequired);
        assert_eq!(ZoneType::from_nibble(0xf1), ZoneType::Unknown);
    }

    #[test]
    fn zone_condition_decodes_high_nibble_already_shifted() {
        assert_eq!(ZoneCondition::from_nibble(0x1), ZoneCondition::Empty);
        assert_eq!(ZoneCondition::from_nibble(0xe), ZoneCondition::Full);
    }

    #[test]
    fn zone_end_is_start_plus_length() {
        let z = ZoneDescriptor {
            start: 100,
            length: 50,
            write_pointer: 100,
            zone_type: ZoneType::SequentialWriteRequired,
            condition: ZoneCondition::Empty,
            reset_recommended: false,
            non_sequential_write: false,
        };
        assert_eq!(z.end(), 150);
    }

    #[test]
    fn reporting_options_mask_keeps_low_nibble_and_partial() {
        let opts = ReportingOptions::CLOSED | ReportingOptions::PARTIAL;
        let masked = opts.mask();
        assert!(masked.contains(ReportingOptions::CLOSED));
        assert!(masked.contains(ReportingOptions::PARTIAL));
    }
}
