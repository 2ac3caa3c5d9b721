//! Scenario 6 (SPEC_FULL.md §8): a simulated EXECUTE DEVICE DIAGNOSTIC
//! result carrying the ZAC host-managed signature bytes classifies
//! unambiguously, with no need to fall back to a log-0x00 page read.

use zbc::backends::ata::classify::{classify_signature, device_signature, Signature};

#[test]
fn host_managed_signature_classifies_without_any_log_page_read() {
    let mut sense = [0u8; 32];
    // Descriptor-format sense from a ck_cond=1 EXEC DEV DIAGNOSTIC starts at
    // sense[8]; signature registers sit at descriptor offsets 9 and 11.
    sense[8 + 9] = 0xCD;
    sense[8 + 11] = 0xAB;

    let (hi, lo) = device_signature(&sense);
    assert_eq!(classify_signature(hi, lo), Signature::HostManaged);
}

#[test]
fn standard_signature_is_ambiguous_until_the_log_directory_is_consulted() {
    let sense = [0u8; 32];
    let (hi, lo) = device_signature(&sense);
    assert_eq!(classify_signature(hi, lo), Signature::StandardAmbiguous);
}

#[test]
fn unrelated_signature_is_unsupported() {
    let mut sense = [0u8; 32];
    sense[8 + 9] = 0x11;
    sense[8 + 11] = 0x22;
    let (hi, lo) = device_signature(&sense);
    assert_eq!(classify_signature(hi, lo), Signature::Unsupported);
}
