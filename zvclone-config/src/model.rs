//! Tagged-line representation of an instance configuration.
//!
//! The configuration format is line oriented: top-level `key: value` fields,
//! storage-bus entries (`scsi0: local-zfs:vm-100-disk-0,size=32G`), and
//! bracketed snapshot sections whose body belongs to the snapshot, not to
//! the live instance. Every line is kept verbatim and carries a tag, so
//! filtering and rewriting are pure transforms over the sequence and
//! unrecognized content round-trips untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zvclone_core::error::{Result, ZvError};
use zvclone_core::units::parse_size_mb;

/// Kind of virtualization instance a configuration describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceKind {
    Vm,
    Container,
}

impl InstanceKind {
    /// Dataset naming prefix for this kind (`vm-100-disk-0`,
    /// `subvol-101-disk-0`).
    pub fn dataset_prefix(&self) -> &'static str {
        match self {
            InstanceKind::Vm => "vm-",
            InstanceKind::Container => "subvol-",
        }
    }

    /// Subdirectory of the configuration root holding this kind's files.
    pub fn config_dir(&self) -> &'static str {
        match self {
            InstanceKind::Vm => "qemu-server",
            InstanceKind::Container => "lxc",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstanceKind::Vm => "VM",
            InstanceKind::Container => "container",
        }
    }
}

/// Classification of one configuration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineTag {
    /// A recognized or pass-through `key: value` field of the live instance.
    TopLevelField { key: String },
    /// A storage-bus entry (`scsi0`, `virtio1`, `rootfs`, `mp0`, ...).
    StorageEntry { key: String },
    /// A bracketed snapshot section header.
    SnapshotSectionMarker,
    /// Any line inside a snapshot section.
    SnapshotBodyLine,
    /// Blank lines, comments, and anything else.
    Unrecognized,
}

/// One raw line plus its tag.
#[derive(Debug, Clone)]
pub struct ConfigLine {
    pub raw: String,
    pub tag: LineTag,
}

impl ConfigLine {
    /// The value part of a `key: value` line, if any.
    pub fn value(&self) -> Option<&str> {
        self.raw.split_once(':').map(|(_, v)| v.trim())
    }
}

static SECTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\]]*\]\s*$").expect("section marker regex"));
static VM_STORAGE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(scsi|ide|sata|virtio|efidisk|tpmstate)\d+$").expect("vm bus regex"));
static CT_STORAGE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(rootfs|mp\d+)$").expect("ct bus regex"));
static FIELD_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z][a-z0-9_]*):\s*\S").expect("field regex"));

/// An instance configuration as an ordered sequence of tagged lines.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub kind: InstanceKind,
    pub lines: Vec<ConfigLine>,
}

impl InstanceConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path, kind: InstanceKind) -> Result<Self> {
        if !path.is_file() {
            return Err(ZvError::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content, kind))
    }

    /// Parse configuration text into tagged lines.
    ///
    /// Top-level fields only occur before the first snapshot section; once a
    /// bracketed header is seen, every following line belongs to snapshot
    /// content.
    pub fn parse(content: &str, kind: InstanceKind) -> Self {
        let mut lines = Vec::new();
        let mut in_snapshot_section = false;

        for raw in content.lines() {
            let trimmed = raw.trim();

            let tag = if SECTION_MARKER.is_match(trimmed) {
                in_snapshot_section = true;
                LineTag::SnapshotSectionMarker
            } else if in_snapshot_section {
                LineTag::SnapshotBodyLine
            } else if let Some(key) = field_key(trimmed) {
                if is_storage_key(&key, kind) {
                    LineTag::StorageEntry { key }
                } else {
                    LineTag::TopLevelField { key }
                }
            } else {
                LineTag::Unrecognized
            };

            lines.push(ConfigLine {
                raw: raw.to_string(),
                tag,
            });
        }

        Self { kind, lines }
    }

    /// First top-level field with the given key.
    pub fn field(&self, key: &str) -> Option<&ConfigLine> {
        self.lines.iter().find(|l| match &l.tag {
            LineTag::TopLevelField { key: k } => k == key,
            _ => false,
        })
    }

    /// Display name of the instance: `name:` for VMs, falling back to
    /// `hostname:` for containers.
    pub fn display_name(&self) -> Option<String> {
        self.field("name")
            .or_else(|| self.field("hostname"))
            .and_then(|l| l.value())
            .map(|v| v.to_string())
    }

    /// Declared memory reservation in MB, if any.
    pub fn memory_mb(&self) -> Option<u64> {
        self.field("memory")
            .and_then(|l| l.value())
            .and_then(parse_size_mb)
    }

    /// Iterate over storage-bus entries of the live instance.
    pub fn storage_entries(&self) -> impl Iterator<Item = (&str, &ConfigLine)> {
        self.lines.iter().filter_map(|l| match &l.tag {
            LineTag::StorageEntry { key } => Some((key.as_str(), l)),
            _ => None,
        })
    }
}

fn field_key(line: &str) -> Option<String> {
    FIELD_LINE
        .captures(line)
        .map(|caps| caps[1].to_string())
}

fn is_storage_key(key: &str, kind: InstanceKind) -> bool {
    match kind {
        InstanceKind::Vm => VM_STORAGE_KEY.is_match(key),
        InstanceKind::Container => CT_STORAGE_KEY.is_match(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_CONFIG: &str = "\
boot: order=scsi0
cores: 2
memory: 8192
name: web01
net0: virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0
onboot: 1
scsi0: local-zfs:vm-100-disk-0,size=32G
scsi1: local-zfs:vm-100-disk-1,size=100G
unknownfield: keepme

[autosnap_2023]
memory: 4096
parent: older-snap
scsi0: local-zfs:vm-100-disk-0,size=32G
";

    #[test]
    fn test_line_classification() {
        let cfg = InstanceConfig::parse(VM_CONFIG, InstanceKind::Vm);

        assert_eq!(
            cfg.lines[0].tag,
            LineTag::TopLevelField {
                key: "boot".to_string()
            }
        );
        assert_eq!(
            cfg.lines[6].tag,
            LineTag::StorageEntry {
                key: "scsi0".to_string()
            }
        );
        // Blank line before the section header.
        assert_eq!(cfg.lines[9].tag, LineTag::Unrecognized);
        assert_eq!(cfg.lines[10].tag, LineTag::SnapshotSectionMarker);
        // Everything after the header belongs to the snapshot, even lines
        // that look like top-level fields.
        assert_eq!(cfg.lines[11].tag, LineTag::SnapshotBodyLine);
        assert_eq!(cfg.lines[13].tag, LineTag::SnapshotBodyLine);
    }

    #[test]
    fn test_fields_stop_at_snapshot_section() {
        let cfg = InstanceConfig::parse(VM_CONFIG, InstanceKind::Vm);
        // The snapshot section redeclares memory as 4096; the live value wins.
        assert_eq!(cfg.memory_mb(), Some(8192));
        assert_eq!(cfg.display_name(), Some("web01".to_string()));
    }

    #[test]
    fn test_container_storage_keys() {
        let content = "\
hostname: ct-build
memory: 1024
mp0: local-zfs:subvol-101-disk-1,mp=/data,size=8G
rootfs: local-zfs:subvol-101-disk-0,size=4G
";
        let cfg = InstanceConfig::parse(content, InstanceKind::Container);
        let keys: Vec<&str> = cfg.storage_entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["mp0", "rootfs"]);
        assert_eq!(cfg.display_name(), Some("ct-build".to_string()));
    }

    #[test]
    fn test_vm_bus_keys_not_valid_for_containers() {
        let cfg = InstanceConfig::parse("scsi0: local-zfs:vm-100-disk-0\n", InstanceKind::Container);
        assert_eq!(
            cfg.lines[0].tag,
            LineTag::TopLevelField {
                key: "scsi0".to_string()
            }
        );
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = InstanceConfig::load(Path::new("/nonexistent/9999.conf"), InstanceKind::Vm)
            .unwrap_err();
        assert!(matches!(err, ZvError::Config(_)));
    }
}
