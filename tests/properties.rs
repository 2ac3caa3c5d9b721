//! Property tests for the invariants enumerated in SPEC_FULL.md §8:
//! little-endian round-tripping and the iovec re-slicer's exact-coverage
//! guarantee.

use proptest::prelude::*;
use zbc::IoVec;

proptest! {
    #[test]
    fn le_u16_round_trips(x: u16) {
        prop_assert_eq!(u16::from_le_bytes(x.to_le_bytes()), x);
    }

    #[test]
    fn le_u32_round_trips(x: u32) {
        prop_assert_eq!(u32::from_le_bytes(x.to_le_bytes()), x);
    }

    #[test]
    fn le_u64_round_trips(x: u64) {
        prop_assert_eq!(u64::from_le_bytes(x.to_le_bytes()), x);
    }
}

fn concat_reads(iov: &[IoVec]) -> Vec<u8> {
    let mut out = Vec::new();
    for seg in iov {
        let slice = unsafe { std::slice::from_raw_parts(seg.as_ptr(), seg.len()) };
        out.extend_from_slice(slice);
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn iov_convert_covers_exactly_the_requested_window(
        seg_lens in prop::collection::vec(1usize..=64, 1..6),
        start_frac in 0.0f64..1.0,
        len_frac in 0.0f64..1.0,
    ) {
        let mut bufs: Vec<Vec<u8>> = seg_lens
            .iter()
            .enumerate()
            .map(|(i, &len)| vec![(i + 1) as u8; len])
            .collect();
        let total: usize = seg_lens.iter().sum();

        let iov: Vec<IoVec> = bufs.iter_mut().map(|b| IoVec::from_mut_slice(b)).collect();

        let start = (start_frac * total as f64) as usize;
        let remaining = total - start;
        let len = (len_frac * remaining as f64) as usize;

        let sub = zbc::io_path::iov_convert(&iov, start as u64, len as u64);

        let sub_total: usize = sub.iter().map(|s| s.len()).sum();
        prop_assert_eq!(sub_total, len);

        let whole = concat_reads(&iov);
        let got = concat_reads(&sub);
        prop_assert_eq!(got, &whole[start..start + len]);
    }
}
