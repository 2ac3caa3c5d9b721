//! Report-zones log (0x1A) page parsing and READ CAPACITY (16) decoding.
//!
//! Zones are returned as a stream of 512-byte log pages: the first page's
//! leading dword gives the total zone count, and its descriptors start at
//! byte offset 64 (64 bytes each, 7 fit in a first page); every following
//! page starts its descriptors at offset 0 (8 per page).

use crate::error::{ZbcError, ZbcResult};
use crate::zone::{ZoneCondition, ZoneDescriptor, ZoneType};

pub const REPORT_ZONES_LOG_PAGE: u8 = 0x1A;
pub const ZONE_DESCRIPTOR_LEN: usize = 64;
pub const ZONE_DESCRIPTOR_OFFSET: usize = 64;
pub const LOG_PAGE_SIZE: usize = 512;
pub const MAX_LOG_BUF: usize = 65536;

/// Number of zone descriptors that fit in the first page, after its header.
pub const FIRST_PAGE_CAPACITY: usize = (LOG_PAGE_SIZE - ZONE_DESCRIPTOR_OFFSET) / ZONE_DESCRIPTOR_LEN;
/// Number of zone descriptors that fit in any subsequent full page.
pub const FULL_PAGE_CAPACITY: usize = LOG_PAGE_SIZE / ZONE_DESCRIPTOR_LEN;

/// Total zone count, from the leading little-endian dword of page 0.
pub fn total_zone_count(first_page: &[u8]) -> u32 {
    u32::from_le_bytes(first_page[0..4].try_into().unwrap())
}

/// Number of report-zones log pages the device exposes, from word 0x1A of
/// the general purpose log directory (log 0x00, page 0). A nonzero count
/// means the device supports report-zones (host-aware); zero means it does
/// not (drive-managed).
pub fn report_zones_log_page_count(log_directory_page: &[u8]) -> u16 {
    let offset = REPORT_ZONES_LOG_PAGE as usize * 2;
    u16::from_le_bytes([log_directory_page[offset], log_directory_page[offset + 1]])
}

/// Decodes one 64-byte zone descriptor.
pub fn decode_zone_descriptor(buf: &[u8]) -> ZoneDescriptor {
    ZoneDescriptor {
        zone_type: ZoneType::from_nibble(buf[0]),
        condition: ZoneCondition::from_nibble(buf[1] >> 4),
        reset_recommended: buf[1] & 0x01 != 0,
        non_sequential_write: false,
        length: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        start: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        write_pointer: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
    }
}

/// Given how many zone descriptors remain to be read, computes the next
/// page number and the byte size of the next log read, matching the
/// original's page-stepping arithmetic: `buf_sz = (nz / 8) * 512`, clamped
/// to a single page when that would be zero and to `MAX_LOG_BUF` otherwise.
pub fn next_read(current_page: u32, current_buf_sz: usize, zones_remaining: u32) -> (u32, usize) {
    let next_page = current_page + (current_buf_sz / LOG_PAGE_SIZE) as u32;
    let mut next_buf_sz = (zones_remaining as usize / FULL_PAGE_CAPACITY) * LOG_PAGE_SIZE;
    if next_buf_sz == 0 {
        next_buf_sz = LOG_PAGE_SIZE;
    } else if next_buf_sz > MAX_LOG_BUF {
        next_buf_sz = MAX_LOG_BUF;
    }
    (next_page, next_buf_sz)
}

/// Capacity and block-size fields from a SCSI READ CAPACITY (16) reply.
#[derive(Debug, Clone, Copy)]
pub struct ReadCapacity16 {
    pub logical_blocks: u64,
    pub logical_block_size: u32,
    pub logical_per_physical: u32,
}

/// Parses a READ CAPACITY (16) reply. Byte 13's low nibble is
/// `log2(logical blocks per physical block)`, computed as
/// `1 << (buf[13] & 0x0f)` — not `(1 << buf[13]) & 0x0f`, the operator
/// precedence the original's unparenthesized C expression accidentally
/// produces.
pub fn parse_read_capacity16(buf: &[u8]) -> ZbcResult<ReadCapacity16> {
    if buf.len() < 14 {
        return Err(ZbcError::invalid_argument(
            "READ CAPACITY (16) reply shorter than 14 bytes",
        ));
    }
    let last_lba = u64::from_be_bytes(buf[0..8].try_into().unwrap());
    let logical_block_size = u32::from_be_bytes(buf[8..12].try_into().unwrap());
    if logical_block_size == 0 {
        return Err(ZbcError::invalid_argument("invalid logical block size"));
    }
    let logical_per_physical = 1u32 << (buf[13] & 0x0f);
    Ok(ReadCapacity16 {
        logical_blocks: last_lba + 1,
        logical_block_size,
        logical_per_physical,
    })
}

/// Parses the ASCII model-number field (words 27-46) out of a 512-byte
/// IDENTIFY DEVICE response, trimming trailing spaces. ATA strings store
/// each word byte-swapped relative to host order.
pub fn parse_identify_model(buf: &[u8]) -> String {
    let mut s = String::with_capacity(40);
    for word in 27..47 {
        let base = word * 2;
        if base + 1 >= buf.len() {
            break;
        }
        s.push(buf[base + 1] as char);
        s.push(buf[base] as char);
    }
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_zone_count_reads_leading_little_endian_dword() {
        let mut page = [0u8; LOG_PAGE_SIZE];
        page[0..4].copy_from_slice(&130u32.to_le_bytes());
        assert_eq!(total_zone_count(&page), 130);
    }

    #[test]
    fn log_page_count_reads_word_at_0x1a_times_2() {
        let mut page = [0u8; LOG_PAGE_SIZE];
        page[0x1A * 2] = 0x05;
        page[0x1A * 2 + 1] = 0x00;
        assert_eq!(report_zones_log_page_count(&page), 5);
    }

    #[test]
    fn descriptor_decode_matches_byte_layout() {
        let mut d = [0u8; ZONE_DESCRIPTOR_LEN];
        d[0] = 0x02; // sequential-write-required
        d[1] = 0x31; // condition=3 (explicit-open), reset_recommended=1
        d[8..16].copy_from_slice(&1024u64.to_le_bytes());
        d[16..24].copy_from_slice(&2048u64.to_le_bytes());
        d[24..32].copy_from_slice(&2048u64.to_le_bytes());
        let z = decode_zone_descriptor(&d);
        assert_eq!(z.zone_type, ZoneType::SequentialWriteRequired);
        assert_eq!(z.condition, ZoneCondition::ExplicitOpen);
        assert!(z.reset_recommended);
        assert_eq!(z.length, 1024);
        assert_eq!(z.start, 2048);
        assert_eq!(z.write_pointer, 2048);
    }

    #[test]
    fn next_read_falls_back_to_one_page_when_remainder_is_small() {
        let (page, sz) = next_read(0, 512, 3);
        assert_eq!(page, 1);
        assert_eq!(sz, LOG_PAGE_SIZE);
    }

    #[test]
    fn next_read_clamps_to_max_log_buf() {
        let (_page, sz) = next_read(0, 512, 100_000);
        assert_eq!(sz, MAX_LOG_BUF);
    }

    #[test]
    fn read_capacity16_uses_precedence_correct_shift() {
        let mut buf = [0u8; 32];
        buf[0..8].copy_from_slice(&9_999u64.to_be_bytes());
        buf[8..12].copy_from_slice(&512u32.to_be_bytes());
        buf[13] = 0x03; // log2(ratio) = 3 -> ratio = 8
        let cap = parse_read_capacity16(&buf).unwrap();
        assert_eq!(cap.logical_blocks, 10_000);
        assert_eq!(cap.logical_block_size, 512);
        assert_eq!(cap.logical_per_physical, 8);
    }

    #[test]
    fn read_capacity16_rejects_zero_block_size() {
        let mut buf = [0u8; 32];
        buf[0..8].copy_from_slice(&0u64.to_be_bytes());
        assert!(parse_read_capacity16(&buf).is_err());
    }
}
