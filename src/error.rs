//! Error taxonomy shared by every backend and the public API surface.
//!
//! Mirrors the split used throughout this lineage: an internal, typed
//! `ZbcError` propagated with `?` everywhere in the library; `main.rs` uses
//! `anyhow`'s blanket `From<E: std::error::Error + Send + Sync + 'static>`
//! impl to convert it at the CLI boundary, since `ZbcError` derives
//! `thiserror::Error`.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ZbcResult<T> = Result<T, ZbcError>;

/// Errors produced by the zoned-device core.
///
/// `NotMine` never escapes the registry probe loop (`registry::open`) — it is
/// caught there and used to try the next backend.
#[derive(Error, Debug)]
pub enum ZbcError {
    #[error("device not recognized by this backend")]
    NotMine,

    #[error("no such device (no backend accepted it, or it is drive-managed)")]
    NoSuchDevice,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("operation unsupported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("out of memory allocating {0} zone descriptors")]
    OutOfMemory(usize),

    #[error("permission denied")]
    Permission,

    #[error("SCSI/ATA command failed: sense key {sense_key:#04x} asc/ascq {asc:#04x}/{ascq:#04x}")]
    CommandFailed {
        sense_key: u8,
        asc: u8,
        ascq: u8,
    },
}

impl ZbcError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ZbcError::InvalidArgument(msg.into())
    }
}

impl Clone for ZbcError {
    // std::io::Error is not Clone, so every variant carrying one is
    // re-derived from its (kind, message) pair instead of the original.
    fn clone(&self) -> Self {
        match self {
            ZbcError::NotMine => ZbcError::NotMine,
            ZbcError::NoSuchDevice => ZbcError::NoSuchDevice,
            ZbcError::InvalidArgument(s) => ZbcError::InvalidArgument(s.clone()),
            ZbcError::Io(e) => ZbcError::Io(io::Error::new(e.kind(), e.to_string())),
            ZbcError::Unsupported(s) => ZbcError::Unsupported(s),
            ZbcError::OutOfMemory(n) => ZbcError::OutOfMemory(*n),
            ZbcError::Permission => ZbcError::Permission,
            ZbcError::CommandFailed { sense_key, asc, ascq } => ZbcError::CommandFailed {
                sense_key: *sense_key,
                asc: *asc,
                ascq: *ascq,
            },
        }
    }
}

/// True iff `errno`-style permission errors should be coerced to "not zoned"
/// rather than propagated, matching `zbc_device_is_zoned`'s EPERM/EACCES
/// handling.
pub fn is_permission_error(e: &ZbcError) -> bool {
    matches!(e, ZbcError::Permission)
        || matches!(e, ZbcError::Io(io_err) if io_err.kind() == io::ErrorKind::PermissionDenied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_io_error_by_kind_and_message() {
        let e = ZbcError::Io(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let cloned = e.clone();
        match cloned {
            ZbcError::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::NotFound);
                assert_eq!(inner.to_string(), "missing");
            }
            _ => panic!("expected Io variant"),
        }
    }

    #[test]
    fn permission_error_detection() {
        assert!(is_permission_error(&ZbcError::Permission));
        assert!(is_permission_error(&ZbcError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied"
        ))));
        assert!(!is_permission_error(&ZbcError::NoSuchDevice));
    }

    #[test]
    fn converts_to_anyhow_at_boundary() {
        let e = ZbcError::InvalidArgument("bad offset".into());
        let any: anyhow::Error = e.into();
        assert!(any.to_string().contains("bad offset"));
    }
}
