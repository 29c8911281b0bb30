//! ZFS storage layer for zvclone.
//!
//! The engine never talks to the `zfs` binary directly: everything goes
//! through the [`StorageBackend`] trait, whose production implementation
//! shells out. Full-mode transfers run as a pipeline of independently
//! scheduled stages (source process, codec, progress meter, sink) joined on
//! every stage's exit status.

pub mod backend;
pub mod catalog;
pub mod codec;
pub mod pipeline;

pub use backend::{DatasetKind, StorageBackend, ZfsBackend};
pub use catalog::SnapshotRef;
pub use codec::Codec;
