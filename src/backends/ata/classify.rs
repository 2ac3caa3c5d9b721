//! ATA signature classification: host-managed vs. (possibly) host-aware vs.
//! drive-managed, from an EXECUTE DEVICE DIAGNOSTIC result.
//!
//! Grounded on `zbc_ata_classify`: the ATA result registers come back at a
//! fixed offset into the descriptor-format sense data returned because the
//! command was issued with `ck_cond=1`.

use log::debug;

/// Byte offset of the ATA result-registers descriptor within the sense
/// buffer returned by a `ck_cond=1` EXECUTE DEVICE DIAGNOSTIC.
const DESC_OFFSET: usize = 8;

/// Extracts the two ATA signature bytes (registers at descriptor offsets 9
/// and 11) from the raw sense buffer of an EXECUTE DEVICE DIAGNOSTIC result.
pub fn device_signature(sense: &[u8]) -> (u8, u8) {
    let hi = sense.get(DESC_OFFSET + 9).copied().unwrap_or(0);
    let lo = sense.get(DESC_OFFSET + 11).copied().unwrap_or(0);
    (hi, lo)
}

/// What the signature alone tells us, before any log-page disambiguation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// `0xCD:0xAB` — unambiguously ZAC host-managed.
    HostManaged,
    /// `0x00:0x00` — a standard ATA signature; could be host-aware (has the
    /// report-zones log) or drive-managed (doesn't). Needs log page 0x00.
    StandardAmbiguous,
    /// Any other signature: not a device this backend recognises.
    Unsupported,
}

pub fn classify_signature(sig_hi: u8, sig_lo: u8) -> Signature {
    debug!("device signature is {sig_hi:#04x}:{sig_lo:#04x}");
    match (sig_hi, sig_lo) {
        (0xCD, 0xAB) => Signature::HostManaged,
        (0x00, 0x00) => Signature::StandardAmbiguous,
        _ => Signature::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zac_signature_bytes_at_descriptor_offsets_9_and_11() {
        let mut sense = [0u8; 32];
        sense[DESC_OFFSET + 9] = 0xCD;
        sense[DESC_OFFSET + 11] = 0xAB;
        assert_eq!(device_signature(&sense), (0xCD, 0xAB));
    }

    #[test]
    fn classify_recognises_all_three_outcomes() {
        assert_eq!(classify_signature(0xCD, 0xAB), Signature::HostManaged);
        assert_eq!(classify_signature(0x00, 0x00), Signature::StandardAmbiguous);
        assert_eq!(classify_signature(0x11, 0x22), Signature::Unsupported);
    }

    #[test]
    fn short_sense_buffer_reads_signature_bytes_as_zero() {
        assert_eq!(device_signature(&[0u8; 4]), (0, 0));
    }
}
