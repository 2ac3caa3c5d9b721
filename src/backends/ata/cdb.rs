//! ATA-PASSTHROUGH-16 Command Descriptor Block builders.
//!
//! Every command is wrapped in a 16-byte CDB, opcode 0x85. The 48-bit LBA is
//! split across bytes 7-12 in the non-contiguous order ATA PASS-THROUGH (16)
//! mandates: `{31:24 -> 7, 7:0 -> 8, 39:32 -> 9, 15:8 -> 10, 47:40 -> 11,
//! 23:16 -> 12}`. Byte 13 bit 6 (LBA mode) is set for every LBA-bearing
//! command. All byte masks use `& 0xFF`, never the original's `% 0xff`.

use crate::error::{ZbcError, ZbcResult};

pub const OPCODE_ATA_PASSTHROUGH16: u8 = 0x85;

pub const CMD_IDENTIFY_DEVICE: u8 = 0xEC;
pub const CMD_EXEC_DEV_DIAGNOSTIC: u8 = 0x90;
pub const CMD_READ_LOG_DMA_EXT: u8 = 0x47;
pub const CMD_READ_DMA_EXT: u8 = 0x25;
pub const CMD_WRITE_DMA_EXT: u8 = 0x35;
pub const CMD_FLUSH_CACHE_EXT: u8 = 0xEA;
pub const CMD_RESET_WRITE_POINTER_EXT: u8 = 0x9F;

/// Largest transfer a single READ/WRITE DMA EXT CDB can request: a 16-bit
/// count field, 0 meaning 65536 on many drives. The library refuses larger
/// counts outright rather than return an uninitialised value, per §9.
pub const MAX_LBA_COUNT: u32 = 65536;

const LBA_MODE_BIT: u8 = 1 << 6;

fn set_lba(cdb: &mut [u8; 16], lba: u64) {
    cdb[7] = ((lba >> 24) & 0xFF) as u8;
    cdb[8] = (lba & 0xFF) as u8;
    cdb[9] = ((lba >> 32) & 0xFF) as u8;
    cdb[10] = ((lba >> 8) & 0xFF) as u8;
    cdb[11] = ((lba >> 40) & 0xFF) as u8;
    cdb[12] = ((lba >> 16) & 0xFF) as u8;
}

fn check_count(lba_count: u32) -> ZbcResult<()> {
    if lba_count > MAX_LBA_COUNT {
        return Err(ZbcError::invalid_argument(format!(
            "transfer of {lba_count} sectors exceeds the 65536-sector ATA passthrough limit"
        )));
    }
    Ok(())
}

/// READ DMA EXT: `lba` absolute, `lba_count` in 512-byte sectors (1..=65536).
pub fn read_dma_ext(lba: u64, lba_count: u32) -> ZbcResult<[u8; 16]> {
    check_count(lba_count)?;
    let mut cdb = [0u8; 16];
    cdb[0] = OPCODE_ATA_PASSTHROUGH16;
    cdb[1] = (0x6 << 1) | 0x01; // DMA protocol, ext=1
    cdb[2] = 0x1e; // off_line=0 ck_cond=0 t_type=1 t_dir=1(in) byt_blk=1 t_length=10
    cdb[5] = ((lba_count >> 8) & 0xFF) as u8;
    cdb[6] = (lba_count & 0xFF) as u8;
    set_lba(&mut cdb, lba);
    cdb[13] = LBA_MODE_BIT;
    cdb[14] = CMD_READ_DMA_EXT;
    Ok(cdb)
}

/// WRITE DMA EXT; see [`read_dma_ext`] for units.
pub fn write_dma_ext(lba: u64, lba_count: u32) -> ZbcResult<[u8; 16]> {
    check_count(lba_count)?;
    let mut cdb = [0u8; 16];
    cdb[0] = OPCODE_ATA_PASSTHROUGH16;
    cdb[1] = (0x6 << 1) | 0x01;
    cdb[2] = 0x16; // t_type=1 t_dir=0(out) byt_blk=1 t_length=10
    cdb[5] = ((lba_count >> 8) & 0xFF) as u8;
    cdb[6] = (lba_count & 0xFF) as u8;
    set_lba(&mut cdb, lba);
    cdb[13] = LBA_MODE_BIT;
    cdb[14] = CMD_WRITE_DMA_EXT;
    Ok(cdb)
}

/// FLUSH CACHE EXT: non-data, no LBA.
pub fn flush_cache_ext() -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = OPCODE_ATA_PASSTHROUGH16;
    cdb[1] = (0x3 << 1) | 0x01; // Non-data protocol, ext=1
    cdb[14] = CMD_FLUSH_CACHE_EXT;
    cdb
}

/// RESET WRITE POINTER EXT. `lba = None` resets every zone (feature-low bit
/// 0 set, LBA left zero); `Some(lba)` resets only the zone starting there.
pub fn reset_write_pointer_ext(lba: Option<u64>) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = OPCODE_ATA_PASSTHROUGH16;
    cdb[1] = (0x3 << 1) | 0x01;
    match lba {
        None => cdb[4] = 0x01,
        Some(lba) => set_lba(&mut cdb, lba),
    }
    cdb[13] = LBA_MODE_BIT;
    cdb[14] = CMD_RESET_WRITE_POINTER_EXT;
    cdb
}

/// EXECUTE DEVICE DIAGNOSTIC with `ck_cond=1`, so the device's ATA result
/// registers come back in descriptor-format sense data for classification.
pub fn exec_dev_diagnostic() -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = OPCODE_ATA_PASSTHROUGH16;
    cdb[1] = (0x3 << 1) | 0x01; // Non-data protocol, ext=1
    cdb[2] = 0x1 << 5; // ck_cond=1
    cdb[14] = CMD_EXEC_DEV_DIAGNOSTIC;
    cdb
}

/// READ LOG DMA EXT: `log` is the log address, `page` the page within it,
/// `buf_sectors` the transfer size in 512-byte sectors, `opt` an optional
/// feature-low reporting-options byte (0 for none).
pub fn read_log_dma_ext(log: u8, page: u16, buf_sectors: u32, opt: u8) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = OPCODE_ATA_PASSTHROUGH16;
    cdb[1] = (0x6 << 1) | 0x01;
    cdb[2] = 0x0e; // t_type=0 t_dir=1(in) byt_blk=1 t_length=10
    if opt != 0 {
        cdb[4] = opt;
    }
    cdb[5] = ((buf_sectors >> 8) & 0xFF) as u8;
    cdb[6] = (buf_sectors & 0xFF) as u8;
    cdb[8] = log;
    cdb[9] = ((page >> 8) & 0xFF) as u8;
    cdb[10] = (page & 0xFF) as u8;
    cdb[14] = CMD_READ_LOG_DMA_EXT;
    cdb
}

/// IDENTIFY DEVICE: PIO-in, fixed 1-sector (512 B) transfer.
pub fn identify_device() -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = OPCODE_ATA_PASSTHROUGH16;
    cdb[1] = (0x4 << 1) | 0x01; // PIO Data-in protocol, ext=1
    cdb[2] = 0x0e;
    cdb[6] = 1;
    cdb[14] = CMD_IDENTIFY_DEVICE;
    cdb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lba_bytes_land_in_the_non_contiguous_ata_passthrough_order() {
        let lba = 0x01_02_03_04_05_06u64;
        let cdb = read_dma_ext(lba, 1).unwrap();
        assert_eq!(cdb[7], 0x04); // bits 31:24
        assert_eq!(cdb[8], 0x06); // bits 7:0
        assert_eq!(cdb[9], 0x02); // bits 39:32
        assert_eq!(cdb[10], 0x05); // bits 15:8
        assert_eq!(cdb[11], 0x01); // bits 47:40
        assert_eq!(cdb[12], 0x03); // bits 23:16
    }

    #[test]
    fn lba_mode_bit_is_set_for_every_lba_bearing_command() {
        assert_eq!(read_dma_ext(0, 1).unwrap()[13], LBA_MODE_BIT);
        assert_eq!(write_dma_ext(0, 1).unwrap()[13], LBA_MODE_BIT);
        assert_eq!(reset_write_pointer_ext(Some(0))[13], LBA_MODE_BIT);
    }

    #[test]
    fn count_above_65536_is_rejected_before_any_cdb_is_built() {
        assert!(matches!(
            read_dma_ext(0, 65_537),
            Err(ZbcError::InvalidArgument(_))
        ));
        assert!(matches!(
            write_dma_ext(0, 65_537),
            Err(ZbcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn count_of_exactly_65536_is_accepted() {
        assert!(read_dma_ext(0, 65_536).is_ok());
    }

    #[test]
    fn reset_all_zones_sets_feature_low_and_zero_lba() {
        let cdb = reset_write_pointer_ext(None);
        assert_eq!(cdb[4], 0x01);
        assert_eq!(&cdb[7..13], &[0u8; 6]);
    }

    #[test]
    fn opcodes_match_the_ata_acs_command_set() {
        assert_eq!(exec_dev_diagnostic()[14], CMD_EXEC_DEV_DIAGNOSTIC);
        assert_eq!(flush_cache_ext()[14], CMD_FLUSH_CACHE_EXT);
        assert_eq!(identify_device()[14], CMD_IDENTIFY_DEVICE);
        assert_eq!(read_log_dma_ext(0x1a, 0, 1, 0)[14], CMD_READ_LOG_DMA_EXT);
    }

    #[test]
    fn read_log_encodes_log_address_and_page_number() {
        let cdb = read_log_dma_ext(0x1A, 0x0203, 4, 0x05);
        assert_eq!(cdb[4], 0x05);
        assert_eq!(cdb[8], 0x1A);
        assert_eq!(cdb[9], 0x02);
        assert_eq!(cdb[10], 0x03);
        assert_eq!(cdb[5], 0);
        assert_eq!(cdb[6], 4);
    }
}
