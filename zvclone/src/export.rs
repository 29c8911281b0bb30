//! Export of per-snapshot bundles.
//!
//! One directory per exported snapshot, holding a target-agnostic rewritten
//! configuration, a metadata record, and one data stream per disk produced
//! by the same transfer pipeline as a full clone, terminating in a file.

use crate::instances::ConfigRoot;
use crate::metadata::{BundleMetadata, DiskRecord, CONFIG_SUFFIX, METADATA_SUFFIX};
use crate::{clone, prompt};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use zvclone_config::{resolver, rewriter, InstanceConfig, InstanceKind, RewritePlan};
use zvclone_core::error::{Result, ZvError};
use zvclone_core::{zv_error, zv_info, zv_println, zv_success, zv_warning};
use zvclone_zfs::{Codec, StorageBackend};

pub struct ExportOptions {
    pub source_id: String,
    pub export_parent: PathBuf,
    pub codec: Codec,
    pub snapshot_indices: Vec<i64>,
    pub pool_path: String,
    pub storage: String,
}

/// Entry point for the export mode.
pub fn handle_export(
    root: &ConfigRoot,
    backend: &dyn StorageBackend,
    opts: &ExportOptions,
) -> Result<()> {
    clone::validate_instance_id(&opts.source_id)?;
    let (path, kind) = root.find(&opts.source_id).ok_or_else(|| {
        ZvError::UserInput(format!(
            "no VM or container with ID {} found",
            opts.source_id
        ))
    })?;
    let cfg = InstanceConfig::load(&path, kind)?;
    zv_info!(
        "source: {} {} ({})",
        kind.label(),
        opts.source_id,
        cfg.display_name().unwrap_or_else(|| "<no name>".to_string())
    );
    if opts.codec != Codec::None {
        zv_info!("compression codec: {}", opts.codec);
    }

    let entries = resolver::extract_disk_entries(&cfg, &opts.storage, &opts.pool_path)?;
    let reference = resolver::reference_entry(&entries)?;
    let snapshots = backend.list_snapshots(&reference.dataset)?;
    if snapshots.is_empty() {
        return Err(ZvError::Precondition(format!(
            "no snapshots found for {}",
            reference.dataset
        )));
    }
    let selected = prompt::choose_snapshots(&snapshots, &opts.snapshot_indices)?;

    std::fs::create_dir_all(&opts.export_parent)?;

    let mut failed = 0usize;
    for snapshot in &selected {
        zv_println!();
        let bundle_dir = opts
            .export_parent
            .join(format!("{}-{}", opts.source_id, snapshot.suffix));
        match export_bundle(
            backend,
            &cfg,
            kind,
            &entries,
            &opts.source_id,
            &snapshot.suffix,
            opts.codec,
            &bundle_dir,
            &opts.pool_path,
            &opts.storage,
        ) {
            Ok(()) => {}
            Err(e) => {
                zv_error!("export of snapshot '{}' failed: {}", snapshot.suffix, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        Err(ZvError::Storage(format!(
            "{} of {} export job(s) failed",
            failed,
            selected.len()
        )))
    } else {
        Ok(())
    }
}

/// Export one snapshot into one bundle directory.
#[allow(clippy::too_many_arguments)]
pub fn export_bundle(
    backend: &dyn StorageBackend,
    cfg: &InstanceConfig,
    kind: InstanceKind,
    entries: &resolver::DiskSet,
    source_id: &str,
    suffix: &str,
    codec: Codec,
    bundle_dir: &Path,
    pool_path: &str,
    storage: &str,
) -> Result<()> {
    // A pre-existing bundle directory would silently mix artifacts of two
    // exports; refuse it.
    if let Err(e) = std::fs::create_dir(bundle_dir) {
        return Err(match e.kind() {
            ErrorKind::AlreadyExists => ZvError::UserInput(format!(
                "export directory {} already exists; remove it or choose another parent",
                bundle_dir.display()
            )),
            _ => ZvError::Io(e),
        });
    }
    zv_info!(
        "exporting snapshot '{}' to {}",
        suffix,
        bundle_dir.display()
    );

    let mut records = Vec::new();
    for entry in entries.values() {
        let snapshot = format!("{}@{}", entry.dataset, suffix);
        if !backend.snapshot_exists(&snapshot)? {
            zv_warning!(
                "{}: snapshot {} does not exist, skipping",
                entry.key,
                snapshot
            );
            continue;
        }

        let stream_file = format!("{}{}", entry.key, codec.stream_suffix());
        backend.send_to_file(&snapshot, &bundle_dir.join(&stream_file), codec, &entry.key)?;
        zv_success!("  {}: stream written ({})", entry.key, stream_file);
        records.push(DiskRecord {
            key: entry.key.clone(),
            dataset: entry.dataset.clone(),
            stream_file,
        });
    }

    if records.is_empty() {
        zv_warning!(
            "no disk data exported: snapshot '{}' exists on no disk of this instance",
            suffix
        );
    }

    let bundled: BTreeSet<String> = records.iter().map(|r| r.key.clone()).collect();
    let plan = RewritePlan {
        source_id,
        target_id: None,
        cloned_keys: &bundled,
        name_prefix: "export-",
    };
    let config_file = format!("{}{}", source_id, CONFIG_SUFFIX);
    rewriter::rewrite_to_file(cfg, &plan, &bundle_dir.join(&config_file))?;

    let meta = BundleMetadata {
        source_id: source_id.to_string(),
        source_kind: kind,
        snapshot_suffix: suffix.to_string(),
        pool_path: pool_path.to_string(),
        storage: storage.to_string(),
        codec,
        config_file,
        disks: records,
    };
    meta.save(&bundle_dir.join(format!("{}{}", source_id, METADATA_SUFFIX)))?;

    zv_success!("bundle written to {}", bundle_dir.display());
    Ok(())
}
