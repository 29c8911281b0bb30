//! Shared test fixtures: an in-memory storage backend and a scratch
//! configuration tree.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tempfile::TempDir;
use zvclone::ConfigRoot;
use zvclone_config::InstanceKind;
use zvclone_core::error::{Result, ZvError};
use zvclone_zfs::{Codec, DatasetKind, SnapshotRef, StorageBackend};

/// In-memory stand-in for the snapshot/clone/send-receive subsystem.
pub struct FakeBackend {
    pub datasets: RefCell<BTreeMap<String, DatasetKind>>,
    /// Full snapshot name (`dataset@suffix`) -> creation time.
    pub snapshots: RefCell<BTreeMap<String, i64>>,
    /// Clones created with their automatic mount suppressed.
    pub noauto: RefCell<BTreeSet<String>>,
    /// Target dataset for which a send/receive should fail.
    pub fail_transfer_to: RefCell<Option<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            datasets: RefCell::new(BTreeMap::new()),
            snapshots: RefCell::new(BTreeMap::new()),
            noauto: RefCell::new(BTreeSet::new()),
            fail_transfer_to: RefCell::new(None),
        }
    }

    pub fn add_dataset(&self, name: &str, kind: DatasetKind) {
        self.datasets.borrow_mut().insert(name.to_string(), kind);
    }

    pub fn add_snapshot(&self, dataset: &str, suffix: &str, created_at: i64) {
        self.snapshots
            .borrow_mut()
            .insert(format!("{}@{}", dataset, suffix), created_at);
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        self.datasets.borrow().contains_key(name)
    }

    fn check_transfer_target(&self, target: &str) -> Result<()> {
        if self.fail_transfer_to.borrow().as_deref() == Some(target) {
            return Err(ZvError::Storage(format!(
                "simulated transfer failure for {}",
                target
            )));
        }
        Ok(())
    }

    fn source_kind_of(&self, snapshot: &str) -> DatasetKind {
        let dataset = snapshot.split('@').next().unwrap_or(snapshot);
        self.datasets
            .borrow()
            .get(dataset)
            .copied()
            .unwrap_or(DatasetKind::Volume)
    }
}

impl StorageBackend for FakeBackend {
    fn dataset_kind(&self, dataset: &str) -> Result<Option<DatasetKind>> {
        if self.snapshots.borrow().contains_key(dataset) {
            return Ok(Some(DatasetKind::Snapshot));
        }
        Ok(self.datasets.borrow().get(dataset).copied())
    }

    fn list_snapshots(&self, dataset: &str) -> Result<Vec<SnapshotRef>> {
        let prefix = format!("{}@", dataset);
        let mut refs: Vec<SnapshotRef> = self
            .snapshots
            .borrow()
            .iter()
            .filter_map(|(name, created_at)| {
                name.strip_prefix(&prefix).map(|suffix| SnapshotRef {
                    dataset: dataset.to_string(),
                    suffix: suffix.to_string(),
                    created_at: *created_at,
                })
            })
            .collect();
        refs.sort_by_key(|r| r.created_at);
        Ok(refs)
    }

    fn estimated_send_size(&self, _snapshot: &str) -> Option<u64> {
        Some(1024)
    }

    fn clone_snapshot(&self, snapshot: &str, target: &str, suppress_mount: bool) -> Result<()> {
        if !self.snapshots.borrow().contains_key(snapshot) {
            return Err(ZvError::Storage(format!(
                "snapshot {} does not exist",
                snapshot
            )));
        }
        let kind = self.source_kind_of(snapshot);
        self.datasets.borrow_mut().insert(target.to_string(), kind);
        if suppress_mount {
            self.noauto.borrow_mut().insert(target.to_string());
        }
        Ok(())
    }

    fn send_to_dataset(&self, snapshot: &str, target: &str, _label: &str) -> Result<u64> {
        if !self.snapshots.borrow().contains_key(snapshot) {
            return Err(ZvError::Storage(format!(
                "snapshot {} does not exist",
                snapshot
            )));
        }
        self.check_transfer_target(target)?;
        let kind = self.source_kind_of(snapshot);
        self.datasets.borrow_mut().insert(target.to_string(), kind);
        Ok(1024)
    }

    fn send_to_file(&self, snapshot: &str, file: &Path, _codec: Codec, _label: &str) -> Result<u64> {
        if !self.snapshots.borrow().contains_key(snapshot) {
            return Err(ZvError::Storage(format!(
                "snapshot {} does not exist",
                snapshot
            )));
        }
        let payload = format!("stream:{}", snapshot);
        std::fs::write(file, &payload)?;
        Ok(payload.len() as u64)
    }

    fn receive_from_file(
        &self,
        file: &Path,
        _codec: Codec,
        target: &str,
        _label: &str,
    ) -> Result<u64> {
        self.check_transfer_target(target)?;
        let payload = std::fs::read(file)?;
        self.datasets
            .borrow_mut()
            .insert(target.to_string(), DatasetKind::Volume);
        Ok(payload.len() as u64)
    }
}

/// Scratch configuration tree with both kind directories created.
pub struct Fixture {
    pub _tmp: TempDir,
    pub root: ConfigRoot,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let root = ConfigRoot::new(tmp.path().to_path_buf());
        for kind in [InstanceKind::Vm, InstanceKind::Container] {
            std::fs::create_dir_all(root.dir(kind)).expect("config dir");
        }
        Self { _tmp: tmp, root }
    }

    pub fn write_config(&self, kind: InstanceKind, id: &str, content: &str) {
        std::fs::write(self.root.config_path(kind, id), content).expect("write config");
    }

    pub fn read_config(&self, kind: InstanceKind, id: &str) -> String {
        std::fs::read_to_string(self.root.config_path(kind, id)).expect("read config")
    }
}

/// A two-disk VM with three snapshots on the reference disk and the chosen
/// one present on both disks.
pub const VM_100: &str = "\
boot: order=scsi0
cores: 2
memory: 8192
name: web01
net0: virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0
onboot: 1
scsi0: local-zfs:vm-100-disk-0,size=32G
scsi1: local-zfs:vm-100-disk-1,size=100G

[autosnap_2023]
memory: 4096
parent: older-snap
scsi0: local-zfs:vm-100-disk-0,size=32G
";

pub fn vm_backend() -> FakeBackend {
    let backend = FakeBackend::new();
    backend.add_dataset("rpool/data/vm-100-disk-0", DatasetKind::Volume);
    backend.add_dataset("rpool/data/vm-100-disk-1", DatasetKind::Volume);
    backend.add_snapshot("rpool/data/vm-100-disk-0", "auto-1", 1_700_000_000);
    backend.add_snapshot("rpool/data/vm-100-disk-0", "auto-2", 1_700_086_400);
    backend.add_snapshot("rpool/data/vm-100-disk-0", "manual-final", 1_700_172_800);
    backend.add_snapshot("rpool/data/vm-100-disk-1", "manual-final", 1_700_172_800);
    backend
}
