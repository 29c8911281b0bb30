//! Restore of an export bundle into a new instance identity.
//!
//! The bundle is self-describing: the metadata record plus the bundled
//! configuration are all that is needed. Every collision check (target
//! config path, every target dataset) runs before the first byte is
//! replayed; a codec/suffix disagreement or missing artifact is a corrupt
//! bundle, fatal to this restore only.

use crate::instances::ConfigRoot;
use crate::metadata::{BundleMetadata, METADATA_SUFFIX};
use crate::clone;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use zvclone_config::{resolver, rewriter, InstanceConfig, RewritePlan};
use zvclone_core::error::{Result, ZvError};
use zvclone_core::{zv_info, zv_success, zv_warning};
use zvclone_zfs::StorageBackend;

pub struct RestoreOptions {
    pub import_dir: PathBuf,
    pub target_id: Option<String>,
    /// Base path under which the restored datasets are created.
    pub pool_path: String,
}

/// Entry point for the restore mode.
pub fn handle_restore(
    root: &ConfigRoot,
    backend: &dyn StorageBackend,
    opts: &RestoreOptions,
) -> Result<()> {
    let dir = &opts.import_dir;
    if !dir.is_dir() {
        return Err(ZvError::UserInput(format!(
            "import directory {} not found",
            dir.display()
        )));
    }

    let meta = BundleMetadata::load(&find_metadata(dir)?)?;
    zv_info!(
        "bundle: {} {} at snapshot '{}', codec {}, {} disk(s)",
        meta.source_kind.label(),
        meta.source_id,
        meta.snapshot_suffix,
        meta.codec,
        meta.disks.len()
    );

    let config_path = dir.join(&meta.config_file);
    if !config_path.is_file() {
        return Err(ZvError::CorruptBundle(format!(
            "missing configuration file {} in bundle",
            meta.config_file
        )));
    }

    // The declared codec must agree with what each stream file actually
    // carries, and every artifact must be present, before anything happens.
    for disk in &meta.disks {
        if !disk.stream_file.ends_with(meta.codec.stream_suffix()) {
            return Err(ZvError::CorruptBundle(format!(
                "stream file {} does not match declared codec {} (expected suffix {})",
                disk.stream_file,
                meta.codec,
                meta.codec.stream_suffix()
            )));
        }
        if !dir.join(&disk.stream_file).is_file() {
            return Err(ZvError::CorruptBundle(format!(
                "missing stream file {} in bundle",
                disk.stream_file
            )));
        }
    }

    let target_id = clone::resolve_target_id(&opts.target_id, &meta.source_id, "8")?;
    if root.id_in_use(&target_id) {
        return Err(ZvError::UserInput(format!(
            "target ID {} is already in use",
            target_id
        )));
    }

    // Resolve every target dataset and check collisions before mutating.
    let mut targets = Vec::new();
    for disk in &meta.disks {
        let substituted =
            resolver::substitute_dataset_id(&disk.dataset, &meta.source_id, &target_id)
                .map_err(|e| ZvError::CorruptBundle(format!("disk {}: {}", disk.key, e)))?;
        let basename = substituted.rsplit('/').next().unwrap_or(&substituted);
        let target_dataset = format!("{}/{}", opts.pool_path.trim_end_matches('/'), basename);
        if backend.dataset_exists(&target_dataset)? {
            return Err(ZvError::UserInput(format!(
                "target dataset {} already exists",
                target_dataset
            )));
        }
        targets.push((disk, target_dataset));
    }

    if targets.is_empty() {
        zv_warning!("bundle contains no disk streams; restoring configuration only");
    }

    let mut restored = BTreeSet::new();
    for (disk, target_dataset) in &targets {
        zv_info!("restoring {} -> {}", disk.key, target_dataset);
        match backend.receive_from_file(
            &dir.join(&disk.stream_file),
            meta.codec,
            target_dataset,
            &disk.key,
        ) {
            Ok(_) => {
                zv_success!("  {}: restored", disk.key);
                restored.insert(disk.key.clone());
            }
            Err(e) => {
                let kept = if restored.is_empty() {
                    "none".to_string()
                } else {
                    restored.iter().cloned().collect::<Vec<_>>().join(", ")
                };
                return Err(ZvError::Storage(format!(
                    "restoring disk {} failed: {}; disks already restored and left in place: {}",
                    disk.key, e, kept
                )));
            }
        }
    }

    let cfg = InstanceConfig::load(&config_path, meta.source_kind)?;
    let plan = RewritePlan {
        source_id: &meta.source_id,
        target_id: Some(&target_id),
        cloned_keys: &restored,
        name_prefix: "restored-",
    };
    let target_conf = root.config_path(meta.source_kind, &target_id);
    rewriter::rewrite_to_file(&cfg, &plan, &target_conf)?;
    zv_success!("configuration written to {}", target_conf.display());
    zv_success!(
        "restored {} {} as new ID {}",
        meta.source_kind.label(),
        meta.source_id,
        target_id
    );
    Ok(())
}

/// Locate the bundle's metadata record. Exactly one is expected; with more
/// than one the lexicographically first is used, with a warning.
fn find_metadata(dir: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(METADATA_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(ZvError::CorruptBundle(format!(
            "no metadata record (*{}) found in {}",
            METADATA_SUFFIX,
            dir.display()
        ))),
        1 => Ok(candidates.remove(0)),
        _ => {
            zv_warning!(
                "multiple metadata records in {}; using {}",
                dir.display(),
                candidates[0].display()
            );
            Ok(candidates.remove(0))
        }
    }
}
