//! zvclone application layer.
//!
//! Wires the CLI onto the lifecycle engines: clone orchestration, export and
//! restore of snapshot bundles, the RAM admission gate, and instance
//! listing. All storage access goes through the
//! [`zvclone_zfs::StorageBackend`] seam.

pub mod cli;
pub mod clone;
pub mod export;
pub mod instances;
pub mod metadata;
pub mod prompt;
pub mod ram;
pub mod restore;

pub use instances::ConfigRoot;
