//! Instance configuration handling for zvclone.
//!
//! Provides the tagged-line configuration model, resolution of storage-bus
//! entries into dataset identities, and the deterministic rewrite that
//! produces a new instance's configuration.

pub mod model;
pub mod resolver;
pub mod rewriter;

pub use model::{ConfigLine, InstanceConfig, InstanceKind, LineTag};
pub use resolver::{substitute_dataset_id, DiskEntry, DiskSet};
pub use rewriter::RewritePlan;
