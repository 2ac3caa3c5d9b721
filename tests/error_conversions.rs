//! `ZbcError`'s conversions at the crate's two boundaries: from
//! `std::io::Error` (`#[from]`, used throughout the library) and to
//! `anyhow::Error` (used only at the CLI edge).

use std::io;
use zbc::ZbcError;

#[test]
fn io_error_round_trips_its_kind() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "no such device file");
    let err: ZbcError = io_err.into();
    match err {
        ZbcError::Io(inner) => assert_eq!(inner.kind(), io::ErrorKind::NotFound),
        other => panic!("expected ZbcError::Io, got {other:?}"),
    }
}

#[test]
fn converts_to_a_non_empty_anyhow_message_at_the_cli_boundary() {
    let err = ZbcError::InvalidArgument("count exceeds 65536 sectors".to_string());
    let any: anyhow::Error = err.into();
    assert!(any.to_string().contains("65536"));
}
