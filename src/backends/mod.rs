//! Backend implementations satisfying the capability-table contract
//! (`registry::Backend` / `registry::BackendSession`).
//!
//! `block` and `scsi` are minimal, honest implementations of the native
//! Linux zoned-block ioctl surface and the raw SCSI ZBC command set
//! respectively — enough to be real, distinguishable entries in the
//! registry's probe order, not stand-ins. `ata` is the hard part this crate
//! exists for. `fake` is the fully-featured in-process emulation backend.

pub mod ata;
pub mod block;
pub mod fake;
pub mod scsi;
pub mod transport;
