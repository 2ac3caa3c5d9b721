//! Device-info data model: transport/zone taxonomy and the immutable,
//! normalised device record every backend produces at `open` time.

use bitflags::bitflags;

/// Transport kind a device was opened through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Block,
    Scsi,
    Ata,
    Fake,
}

impl BackendKind {
    pub fn device_type_name(&self) -> &'static str {
        match self {
            BackendKind::Block => "Zoned block device",
            BackendKind::Scsi => "SCSI ZBC device",
            BackendKind::Ata => "ATA ZAC device",
            BackendKind::Fake => "Emulated zoned block device",
        }
    }
}

/// Zone model classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneModel {
    HostManaged,
    HostAware,
    DeviceManaged,
    Standard,
    Unknown,
}

impl ZoneModel {
    pub fn name(&self) -> &'static str {
        match self {
            ZoneModel::HostManaged => "Host-managed",
            ZoneModel::HostAware => "Host-aware",
            ZoneModel::DeviceManaged => "Device-managed",
            ZoneModel::Standard => "Standard block device",
            ZoneModel::Unknown => "Unknown-device-model",
        }
    }
}

/// A count that may be unlimited or simply not reported by the device,
/// replacing the original's `ZBC_NO_LIMIT`/`ZBC_NOT_REPORTED` sentinel
/// integers (SPEC_FULL.md §9 REDESIGN FLAGS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenZoneLimit {
    Reported(u32),
    Unlimited,
    NotReported,
}

bitflags! {
    /// Device-level capability/behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        /// Reads may cross into not-yet-written parts of a sequential zone
        /// without an error.
        const UNRESTRICTED_READ = 0x0000_0001;
    }
}

/// Normalised, immutable device information returned by every backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub vendor_id: String,
    pub backend: BackendKind,
    pub zone_model: ZoneModel,
    pub sectors: u64,
    pub logical_blocks: u64,
    pub physical_blocks: u64,
    pub logical_block_size: u32,
    pub physical_block_size: u32,
    pub max_rw_sectors: u64,
    pub flags: DeviceFlags,
    /// Host-managed: max concurrently open sequential-write-required zones.
    pub max_nr_open_seq_req: OpenZoneLimit,
    /// Host-aware: optimal number of open sequential-write-preferred zones.
    pub opt_nr_open_seq_pref: OpenZoneLimit,
    /// Host-aware: optimal number of non-sequentially-written
    /// sequential-write-preferred zones.
    pub opt_nr_non_seq_write_seq_pref: OpenZoneLimit,
}

impl DeviceInfo {
    /// `physical_block_size / logical_block_size`, always a power of two.
    pub fn logical_per_physical(&self) -> u32 {
        self.physical_block_size / self.logical_block_size
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.sectors * 512
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "    Vendor ID: {}", self.vendor_id)?;
        if matches!(self.zone_model, ZoneModel::Standard) {
            writeln!(
                f,
                "    {} interface, standard block device",
                self.backend.device_type_name()
            )?;
        } else {
            writeln!(
                f,
                "    {} interface, {} zone model",
                self.backend.device_type_name(),
                self.zone_model.name()
            )?;
        }
        writeln!(f, "    {} 512-byte sectors", self.sectors)?;
        writeln!(
            f,
            "    {} logical blocks of {} B",
            self.logical_blocks, self.logical_block_size
        )?;
        writeln!(
            f,
            "    {} physical blocks of {} B",
            self.physical_blocks, self.physical_block_size
        )?;
        writeln!(
            f,
            "    {:.03} GB capacity",
            self.capacity_bytes() as f64 / 1_000_000_000.0
        )?;

        if matches!(self.zone_model, ZoneModel::HostManaged | ZoneModel::HostAware) {
            writeln!(
                f,
                "    Read commands are {}",
                if self.flags.contains(DeviceFlags::UNRESTRICTED_READ) {
                    "unrestricted"
                } else {
                    "restricted"
                }
            )?;
        }

        writeln!(
            f,
            "    {} KiB max R/W size",
            (self.max_rw_sectors * 512) / 1024
        )?;

        match self.zone_model {
            ZoneModel::HostManaged => {
                writeln!(
                    f,
                    "    Maximum number of open sequential write required zones: {}",
                    fmt_limit(self.max_nr_open_seq_req, "unlimited")
                )?;
            }
            ZoneModel::HostAware => {
                writeln!(
                    f,
                    "    Optimal number of open sequential write preferred zones: {}",
                    fmt_limit(self.opt_nr_open_seq_pref, "not reported")
                )?;
                writeln!(
                    f,
                    "    Optimal number of non-sequentially written sequential write preferred zones: {}",
                    fmt_limit(self.opt_nr_non_seq_write_seq_pref, "not reported")
                )?;
            }
            _ => {}
        }

        Ok(())
    }
}

fn fmt_limit(limit: OpenZoneLimit, sentinel_name: &str) -> String {
    match limit {
        OpenZoneLimit::Reported(n) => n.to_string(),
        OpenZoneLimit::Unlimited | OpenZoneLimit::NotReported => sentinel_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> DeviceInfo {
        DeviceInfo {
            vendor_id: "TEST-VENDOR".to_string(),
            backend: BackendKind::Ata,
            zone_model: ZoneModel::HostManaged,
            sectors: 10_000,
            logical_blocks: 10_000,
            physical_blocks: 1_250,
            logical_block_size: 512,
            physical_block_size: 4096,
            max_rw_sectors: 2_048,
            flags: DeviceFlags::empty(),
            max_nr_open_seq_req: OpenZoneLimit::Unlimited,
            opt_nr_open_seq_pref: OpenZoneLimit::NotReported,
            opt_nr_non_seq_write_seq_pref: OpenZoneLimit::NotReported,
        }
    }

    #[test]
    fn logical_per_physical_ratio() {
        assert_eq!(sample_info().logical_per_physical(), 8);
    }

    #[test]
    fn display_mentions_host_managed_and_unlimited() {
        let out = sample_info().to_string();
        assert!(out.contains("Host-managed"));
        assert!(out.contains("unlimited"));
    }

    #[test]
    fn display_restricted_reads_by_default() {
        let out = sample_info().to_string();
        assert!(out.contains("restricted"));
    }
}
