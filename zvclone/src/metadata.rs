//! The bundle metadata record.
//!
//! A bundle must be self-describing: restore reconstructs the whole job
//! (disk map, dataset identities, codec) from this record plus the bundled
//! config, without access to the source host.

use serde::{Deserialize, Serialize};
use std::path::Path;
use zvclone_config::InstanceKind;
use zvclone_core::error::{Result, ZvError};
use zvclone_zfs::Codec;

pub const METADATA_SUFFIX: &str = ".meta.json";
pub const CONFIG_SUFFIX: &str = ".conf";

/// One exported disk: its storage-bus key, the source dataset it was taken
/// from, and the stream file holding its data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskRecord {
    pub key: String,
    pub dataset: String,
    pub stream_file: String,
}

/// Metadata record of one export bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub source_id: String,
    pub source_kind: InstanceKind,
    pub snapshot_suffix: String,
    pub pool_path: String,
    pub storage: String,
    pub codec: Codec,
    pub config_file: String,
    pub disks: Vec<DiskRecord>,
}

impl BundleMetadata {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ZvError::Serialization(format!("metadata record: {}", e)))?;
        zvclone_config::rewriter::write_atomic(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ZvError::CorruptBundle(format!(
                "unreadable metadata record {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ZvError::CorruptBundle(format!(
                "invalid metadata record {}: {}",
                path.display(),
                e
            ))
        })
    }
}
