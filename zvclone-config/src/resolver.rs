//! Resolution of storage-bus configuration entries into dataset identities.

use crate::model::{InstanceConfig, InstanceKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use zvclone_core::error::{Result, ZvError};

/// A storage-bus key bound to the full dataset path backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskEntry {
    pub key: String,
    pub dataset: String,
}

/// Disk entries of one instance, keyed by storage-bus key.
///
/// A `BTreeMap` so that every per-disk loop in the engine walks the entries
/// in the same order on every run.
pub type DiskSet = BTreeMap<String, DiskEntry>;

static STORAGE_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_.\-]+):([^,\s]+)").expect("storage value regex"));
static DATASET_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<pool>.+/)(?P<prefix>vm-|subvol-)(?P<id>\d+)(?P<rest>-.+)$")
        .expect("dataset shape regex")
});
static DISK_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-disk-?(\d+)$").expect("disk index regex"));

/// Extract the disk entries whose storage backend matches `storage_name`.
///
/// A line qualifies only when its value is a `storage:volume,...` reference
/// and the storage component equals `storage_name`; the volume component (up
/// to the first comma) names the dataset, joined onto `pool_path` unless it
/// already carries a pool segment.
///
/// An instance with no managed disks cannot be cloned by this engine, so an
/// empty result is a fatal precondition error.
pub fn extract_disk_entries(
    cfg: &InstanceConfig,
    storage_name: &str,
    pool_path: &str,
) -> Result<DiskSet> {
    let mut entries = DiskSet::new();

    for (key, line) in cfg.storage_entries() {
        let Some(value) = line.value() else { continue };
        let Some(caps) = STORAGE_VALUE.captures(value) else {
            continue;
        };
        if &caps[1] != storage_name {
            continue;
        }
        let volume = &caps[2];
        let dataset = if volume.contains('/') {
            volume.to_string()
        } else {
            format!("{}/{}", pool_path.trim_end_matches('/'), volume)
        };
        entries.insert(
            key.to_string(),
            DiskEntry {
                key: key.to_string(),
                dataset,
            },
        );
    }

    if entries.is_empty() {
        return Err(ZvError::Precondition(format!(
            "no disks on storage '{}' found in the configuration",
            storage_name
        )));
    }
    Ok(entries)
}

/// Numeric disk index from a dataset path ending in `-disk-<n>` or
/// `-disk<n>`.
pub fn disk_index(dataset: &str) -> Option<u32> {
    DISK_INDEX
        .captures(dataset)
        .and_then(|caps| caps[1].parse().ok())
}

/// Select the reference disk: the entry with the numerically smallest disk
/// index. Entries without a parseable index are excluded from candidacy but
/// still participate in cloning.
pub fn reference_entry(entries: &DiskSet) -> Result<&DiskEntry> {
    entries
        .values()
        .filter_map(|e| disk_index(&e.dataset).map(|idx| (idx, e)))
        .min_by_key(|(idx, _)| *idx)
        .map(|(_, e)| e)
        .ok_or_else(|| {
            ZvError::Precondition(
                "no usable reference disk: no dataset ends in a -disk-<n> suffix".to_string(),
            )
        })
}

/// Substitute the numeric instance-ID segment of a dataset path, leaving the
/// pool prefix and disk suffix untouched.
///
/// `rpool/data/vm-100-disk-0` with 100 -> 9100 yields
/// `rpool/data/vm-9100-disk-0`. The operation is reversible: substituting
/// back restores the original path.
pub fn substitute_dataset_id(dataset: &str, source_id: &str, target_id: &str) -> Result<String> {
    let caps = DATASET_SHAPE.captures(dataset).ok_or_else(|| {
        ZvError::Config(format!(
            "unexpected dataset shape '{}': expected <pool>/vm-<id>-disk-<n>",
            dataset
        ))
    })?;
    if &caps["id"] != source_id {
        return Err(ZvError::Config(format!(
            "unexpected dataset shape '{}': embedded ID does not match source ID {}",
            dataset, source_id
        )));
    }
    Ok(format!(
        "{}{}{}{}",
        &caps["pool"], &caps["prefix"], target_id, &caps["rest"]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceConfig;

    fn vm_config() -> InstanceConfig {
        InstanceConfig::parse(
            "\
name: web01
scsi0: local-zfs:vm-100-disk-0,size=32G
scsi1: local-zfs:vm-100-disk-1,size=100G
sata0: other-storage:vm-100-disk-5,size=8G
ide2: local:iso/debian-12.iso,media=cdrom
efidisk0: local-zfs:vm-100-disk-2,efitype=4m
",
            InstanceKind::Vm,
        )
    }

    #[test]
    fn test_extract_matches_only_target_storage() {
        let entries = extract_disk_entries(&vm_config(), "local-zfs", "rpool/data").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries["scsi0"].dataset,
            "rpool/data/vm-100-disk-0".to_string()
        );
        assert_eq!(
            entries["efidisk0"].dataset,
            "rpool/data/vm-100-disk-2".to_string()
        );
        assert!(!entries.contains_key("sata0"));
        assert!(!entries.contains_key("ide2"));
    }

    #[test]
    fn test_extract_empty_is_fatal() {
        let err = extract_disk_entries(&vm_config(), "missing-storage", "rpool/data").unwrap_err();
        assert!(matches!(err, ZvError::Precondition(_)));
    }

    #[test]
    fn test_volume_with_pool_segment_kept_verbatim() {
        let cfg = InstanceConfig::parse(
            "scsi0: local-zfs:tank/vm/vm-100-disk-0,size=32G\n",
            InstanceKind::Vm,
        );
        let entries = extract_disk_entries(&cfg, "local-zfs", "rpool/data").unwrap();
        assert_eq!(entries["scsi0"].dataset, "tank/vm/vm-100-disk-0");
    }

    #[test]
    fn test_reference_disk_is_lowest_index() {
        let mut entries = DiskSet::new();
        for (key, ds) in [
            ("scsi1", "rpool/data/vm-100-disk-2"),
            ("virtio0", "rpool/data/vm-100-disk-0"),
            ("scsi0", "rpool/data/vm-100-disk-1"),
        ] {
            entries.insert(
                key.to_string(),
                DiskEntry {
                    key: key.to_string(),
                    dataset: ds.to_string(),
                },
            );
        }
        assert_eq!(
            reference_entry(&entries).unwrap().dataset,
            "rpool/data/vm-100-disk-0"
        );
    }

    #[test]
    fn test_unparseable_suffix_excluded_from_candidacy() {
        let mut entries = DiskSet::new();
        entries.insert(
            "scsi0".to_string(),
            DiskEntry {
                key: "scsi0".to_string(),
                dataset: "rpool/data/vm-100-state".to_string(),
            },
        );
        entries.insert(
            "scsi1".to_string(),
            DiskEntry {
                key: "scsi1".to_string(),
                dataset: "rpool/data/vm-100-disk-3".to_string(),
            },
        );
        assert_eq!(
            reference_entry(&entries).unwrap().dataset,
            "rpool/data/vm-100-disk-3"
        );

        let mut none = DiskSet::new();
        none.insert(
            "scsi0".to_string(),
            DiskEntry {
                key: "scsi0".to_string(),
                dataset: "rpool/data/vm-100-state".to_string(),
            },
        );
        assert!(matches!(
            reference_entry(&none).unwrap_err(),
            ZvError::Precondition(_)
        ));
    }

    #[test]
    fn test_disk_index_suffix_variants() {
        assert_eq!(disk_index("rpool/data/vm-100-disk-0"), Some(0));
        assert_eq!(disk_index("rpool/data/vm-100-disk7"), Some(7));
        assert_eq!(disk_index("rpool/data/vm-100-state"), None);
    }

    #[test]
    fn test_substitution_is_reversible() {
        let forward = substitute_dataset_id("rpool/data/vm-100-disk-0", "100", "9100").unwrap();
        assert_eq!(forward, "rpool/data/vm-9100-disk-0");
        let back = substitute_dataset_id(&forward, "9100", "100").unwrap();
        assert_eq!(back, "rpool/data/vm-100-disk-0");
    }

    #[test]
    fn test_substitution_keeps_disk_suffix() {
        let out = substitute_dataset_id("rpool/data/subvol-101-disk-1", "101", "8101").unwrap();
        assert_eq!(out, "rpool/data/subvol-8101-disk-1");
    }

    #[test]
    fn test_substitution_rejects_unexpected_shapes() {
        assert!(substitute_dataset_id("vm-100-disk-0", "100", "9100").is_err());
        assert!(substitute_dataset_id("rpool/data/backup-100", "100", "9100").is_err());
        // Embedded ID differs from the declared source ID.
        assert!(substitute_dataset_id("rpool/data/vm-200-disk-0", "100", "9100").is_err());
    }
}
