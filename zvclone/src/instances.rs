//! Instance configuration tree: locating and listing instances.

use std::path::{Path, PathBuf};
use zvclone_config::{InstanceConfig, InstanceKind};
use zvclone_core::error::Result;
use zvclone_core::zv_println;

pub const DEFAULT_CONFIG_ROOT: &str = "/etc/pve";
pub const DEFAULT_POOL_PATH: &str = "rpool/data";
pub const DEFAULT_STORAGE: &str = "local-zfs";

/// Root of the configuration tree holding `qemu-server/` and `lxc/`
/// subdirectories with one `<id>.conf` per instance.
#[derive(Debug, Clone)]
pub struct ConfigRoot {
    base: PathBuf,
}

/// ID and display name of one instance, for listings.
#[derive(Debug, Clone)]
pub struct InstanceSummary {
    pub id: u64,
    pub name: String,
}

impl ConfigRoot {
    pub fn new(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn dir(&self, kind: InstanceKind) -> PathBuf {
        self.base.join(kind.config_dir())
    }

    pub fn config_path(&self, kind: InstanceKind, id: &str) -> PathBuf {
        self.dir(kind).join(format!("{}.conf", id))
    }

    /// Locate an instance by ID, trying VMs first, then containers.
    pub fn find(&self, id: &str) -> Option<(PathBuf, InstanceKind)> {
        for kind in [InstanceKind::Vm, InstanceKind::Container] {
            let path = self.config_path(kind, id);
            if path.is_file() {
                return Some((path, kind));
            }
        }
        None
    }

    /// Does any instance (either kind) already use this ID?
    pub fn id_in_use(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// All instances of one kind, sorted by numeric ID.
    pub fn list(&self, kind: InstanceKind) -> Vec<InstanceSummary> {
        let mut instances = Vec::new();
        let Ok(entries) = std::fs::read_dir(self.dir(kind)) else {
            return instances;
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("conf") {
                continue;
            }
            let Some(id) = stem_id(&path) else { continue };
            let name = InstanceConfig::load(&path, kind)
                .ok()
                .and_then(|cfg| cfg.display_name())
                .unwrap_or_else(|| "<no name/hostname>".to_string());
            instances.push(InstanceSummary { id, name });
        }

        instances.sort_by_key(|i| i.id);
        instances
    }
}

impl Default for ConfigRoot {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_CONFIG_ROOT))
    }
}

fn stem_id(path: &Path) -> Option<u64> {
    path.file_stem()?.to_str()?.parse().ok()
}

/// Print all VMs and containers, one table per kind.
pub fn handle_list(root: &ConfigRoot) -> Result<()> {
    for (kind, heading) in [
        (InstanceKind::Vm, "VMs:"),
        (InstanceKind::Container, "Containers:"),
    ] {
        zv_println!("{}", heading);
        let instances = root.list(kind);
        if instances.is_empty() {
            zv_println!("  (none found)");
        } else {
            for instance in instances {
                zv_println!("  {:<8} {}", instance.id, instance.name);
            }
        }
        zv_println!();
    }
    Ok(())
}
