//! Clone orchestration: drives one job per selected snapshot through the
//! `Resolved → SnapshotChosen → PerDiskCloning → ConfigWritten → Done`
//! state machine, with `Failed` absorbing from any non-terminal state.
//!
//! Per-disk policy: a missing snapshot or an unexpected dataset shape is a
//! soft skip (that disk is excluded, the job continues); a storage-engine
//! create/receive failure is a hard stop for the whole job, because the
//! engine is then in an unknown state. Nothing already created is rolled
//! back — the job reports exactly which disks reached which state.

use crate::instances::ConfigRoot;
use crate::{prompt, ram};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use zvclone_config::rewriter;
use zvclone_config::{resolver, InstanceConfig, InstanceKind, RewritePlan};
use zvclone_core::error::{Result, ZvError};
use zvclone_core::units::format_bytes;
use zvclone_core::{zv_error, zv_info, zv_println, zv_success, zv_warning};
use zvclone_zfs::{DatasetKind, StorageBackend};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneMode {
    /// Copy-on-write clone sharing blocks with the origin snapshot.
    Linked,
    /// Independent copy via a full send/receive stream.
    Full,
}

impl fmt::Display for CloneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneMode::Linked => write!(f, "linked"),
            CloneMode::Full => write!(f, "full"),
        }
    }
}

/// Final state of one disk within a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskOutcome {
    Cloned,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Resolved,
    SnapshotChosen,
    PerDiskCloning,
    ConfigWritten,
    Done,
    Failed,
}

/// Working set of one clone operation.
#[derive(Debug)]
pub struct CloneJob {
    pub source_id: String,
    pub target_id: String,
    pub suffix: String,
    pub mode: CloneMode,
    pub state: JobState,
    pub outcomes: BTreeMap<String, DiskOutcome>,
    pub failure: Option<String>,
}

impl CloneJob {
    fn new(source_id: &str, target_id: &str, suffix: &str, mode: CloneMode) -> Self {
        Self {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            suffix: suffix.to_string(),
            mode,
            state: JobState::Resolved,
            outcomes: BTreeMap::new(),
            failure: None,
        }
    }

    fn fail(&mut self, message: String) {
        self.state = JobState::Failed;
        self.failure = Some(message);
    }

    /// Keys of the disks that reached `cloned`.
    pub fn cloned_keys(&self) -> BTreeSet<String> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DiskOutcome::Cloned))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

pub struct CloneOptions {
    pub source_id: String,
    pub target_id: Option<String>,
    pub mode: CloneMode,
    pub snapshot_indices: Vec<i64>,
    pub pool_path: String,
    pub storage: String,
    pub assume_yes: bool,
}

/// Entry point for the clone mode.
pub fn handle_clone(
    root: &ConfigRoot,
    backend: &dyn StorageBackend,
    opts: &CloneOptions,
) -> Result<()> {
    validate_instance_id(&opts.source_id)?;
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

    let entries = resolver::extract_disk_entries(&cfg, &opts.storage, &opts.pool_path)?;
    for entry in entries.values() {
        zv_println!("  {} -> {}", entry.key, entry.dataset);
    }
    let reference = resolver::reference_entry(&entries)?;
    zv_info!(
        "reference disk for snapshot listing: {} ({})",
        reference.key,
        reference.dataset
    );

    let snapshots = backend.list_snapshots(&reference.dataset)?;
    if snapshots.is_empty() {
        return Err(ZvError::Precondition(format!(
            "no snapshots found for {}",
            reference.dataset
        )));
    }
    let selected = prompt::choose_snapshots(&snapshots, &opts.snapshot_indices)?;
    tracing::debug!(
        "selected {} snapshot(s) of {} available",
        selected.len(),
        snapshots.len()
    );

    let base_target = resolve_target_id(&opts.target_id, &opts.source_id, "9")?;
    let target_ids = derive_target_ids(&base_target, selected.len())?;
    for target_id in &target_ids {
        if root.id_in_use(target_id) {
            return Err(ZvError::UserInput(format!(
                "target ID {} is already in use",
                target_id
            )));
        }
    }

    if kind == InstanceKind::Vm {
        ram_gate(&cfg, &opts.source_id, opts.assume_yes)?;
    } else {
        zv_info!("skipping RAM check for containers");
    }

    let mut failed = 0usize;
    for (snapshot, target_id) in selected.iter().zip(&target_ids) {
        zv_println!();
        zv_info!(
            "cloning {} from snapshot '{}' to new ID {} ({} clone)",
            opts.source_id,
            snapshot.suffix,
            target_id,
            opts.mode
        );
        let job = run_job(
            backend,
            root,
            &cfg,
            kind,
            &entries,
            &opts.source_id,
            target_id,
            &snapshot.suffix,
            opts.mode,
        );
        report_job(&job);
        if job.state != JobState::Done {
            failed += 1;
        }
    }

    if failed > 0 {
        Err(ZvError::Storage(format!(
            "{} of {} clone job(s) failed; completed work was left in place",
            failed,
            selected.len()
        )))
    } else {
        Ok(())
    }
}

/// Run one clone job for one snapshot suffix. Never returns early on disk
/// failure: the job carries the per-disk outcome map either way.
#[allow(clippy::too_many_arguments)]
pub fn run_job(
    backend: &dyn StorageBackend,
    root: &ConfigRoot,
    cfg: &InstanceConfig,
    kind: InstanceKind,
    entries: &resolver::DiskSet,
    source_id: &str,
    target_id: &str,
    suffix: &str,
    mode: CloneMode,
) -> CloneJob {
    let mut job = CloneJob::new(source_id, target_id, suffix, mode);
    job.state = JobState::SnapshotChosen;

    job.state = JobState::PerDiskCloning;
    for entry in entries.values() {
        match clone_disk(backend, entry, source_id, target_id, suffix, mode) {
            Ok(outcome) => {
                job.outcomes.insert(entry.key.clone(), outcome);
            }
            Err(e) => {
                let message = format!("disk {}: {}", entry.key, e);
                job.outcomes
                    .insert(entry.key.clone(), DiskOutcome::Failed(e.to_string()));
                job.fail(message);
                return job;
            }
        }
    }

    let cloned = job.cloned_keys();
    if cloned.is_empty() {
        job.fail(
            "no disks were cloned; refusing to write a configuration that references no storage"
                .to_string(),
        );
        return job;
    }

    let plan = RewritePlan {
        source_id,
        target_id: Some(target_id),
        cloned_keys: &cloned,
        name_prefix: "clone-",
    };
    let target_conf = root.config_path(kind, target_id);
    match rewriter::rewrite_to_file(cfg, &plan, &target_conf) {
        Ok(()) => {
            job.state = JobState::ConfigWritten;
            zv_success!("configuration written to {}", target_conf.display());
            job.state = JobState::Done;
        }
        Err(e) => job.fail(format!(
            "writing configuration {}: {}",
            target_conf.display(),
            e
        )),
    }
    job
}

fn clone_disk(
    backend: &dyn StorageBackend,
    entry: &resolver::DiskEntry,
    source_id: &str,
    target_id: &str,
    suffix: &str,
    mode: CloneMode,
) -> Result<DiskOutcome> {
    let snapshot = format!("{}@{}", entry.dataset, suffix);

    if !backend.snapshot_exists(&snapshot)? {
        zv_warning!("{}: snapshot {} does not exist, skipping", entry.key, snapshot);
        return Ok(DiskOutcome::Skipped(format!(
            "snapshot {} does not exist",
            snapshot
        )));
    }

    let target_dataset = match resolver::substitute_dataset_id(&entry.dataset, source_id, target_id)
    {
        Ok(dataset) => dataset,
        Err(e) => {
            zv_warning!("{}: {}, skipping", entry.key, e);
            return Ok(DiskOutcome::Skipped(e.to_string()));
        }
    };

    if backend.dataset_exists(&target_dataset)? {
        // Lenient short-circuit kept for compatibility: a pre-existing
        // target counts as already cloned. This can mask a prior partial
        // failure; see DESIGN.md.
        zv_warning!(
            "{}: target dataset {} already exists, treating disk as cloned",
            entry.key,
            target_dataset
        );
        return Ok(DiskOutcome::Cloned);
    }

    match mode {
        CloneMode::Linked => {
            let suppress_mount = matches!(
                backend.dataset_kind(&entry.dataset)?,
                Some(DatasetKind::Filesystem)
            );
            backend.clone_snapshot(&snapshot, &target_dataset, suppress_mount)?;
        }
        CloneMode::Full => {
            backend.send_to_dataset(&snapshot, &target_dataset, &entry.key)?;
        }
    }
    Ok(DiskOutcome::Cloned)
}

fn report_job(job: &CloneJob) {
    for (key, outcome) in &job.outcomes {
        match outcome {
            DiskOutcome::Cloned => zv_success!("  {}: cloned", key),
            DiskOutcome::Skipped(reason) => zv_warning!("  {}: skipped ({})", key, reason),
            DiskOutcome::Failed(reason) => zv_error!("  {}: failed ({})", key, reason),
        }
    }
    if job.state == JobState::Done {
        zv_success!(
            "new {} created from snapshot '{}' as ID {}",
            job.mode,
            job.suffix,
            job.target_id
        );
    } else {
        zv_error!(
            "clone job for snapshot '{}' failed: {}",
            job.suffix,
            job.failure.as_deref().unwrap_or("unknown failure")
        );
    }
}

fn ram_gate(cfg: &InstanceConfig, source_id: &str, assume_yes: bool) -> Result<()> {
    zv_info!("checking host RAM usage...");
    let Some(total_mb) = ram::total_host_mb() else {
        zv_warning!("could not determine host memory; proceeding without RAM check");
        return Ok(());
    };
    let Some(running_mb) = ram::sum_running_mb() else {
        zv_warning!("could not sum memory of running VMs; proceeding without RAM check");
        return Ok(());
    };

    let instance_mb = match cfg.memory_mb() {
        Some(mb) if mb > 0 => mb,
        _ => {
            zv_warning!(
                "VM {} declares no memory reservation; assuming {} MB",
                source_id,
                ram::FALLBACK_INSTANCE_MB
            );
            ram::FALLBACK_INSTANCE_MB
        }
    };

    let result = ram::check(total_mb, running_mb, instance_mb, ram::RAM_THRESHOLD_PERCENT);
    zv_println!("  total host RAM:    {}", format_bytes(total_mb * 1024 * 1024));
    zv_println!("  running VMs:       {}", format_bytes(running_mb * 1024 * 1024));
    zv_println!("  source VM:         {}", format_bytes(instance_mb * 1024 * 1024));
    zv_println!(
        "  projected:         {} (threshold {})",
        format_bytes(result.projected_mb * 1024 * 1024),
        format_bytes(result.threshold_mb * 1024 * 1024)
    );

    if result.ok {
        zv_success!("RAM check passed");
        return Ok(());
    }

    zv_warning!(
        "starting the clone could exceed {}% of host RAM",
        ram::RAM_THRESHOLD_PERCENT
    );
    if assume_yes {
        zv_info!("--yes given; continuing despite RAM warning");
        return Ok(());
    }
    if prompt::confirm("Continue cloning anyway?")? {
        Ok(())
    } else {
        Err(ZvError::UserInput(
            "cloning aborted after RAM warning".to_string(),
        ))
    }
}

/// Instance IDs are positive integers.
pub(crate) fn validate_instance_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.chars().all(|c| c.is_ascii_digit())
        && id.parse::<u64>().map(|v| v > 0).unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ZvError::UserInput(format!(
            "invalid instance ID '{}': must be a positive integer",
            id
        )))
    }
}

/// Target ID as given, or `<default_prefix><source_id>` when omitted.
pub(crate) fn resolve_target_id(
    given: &Option<String>,
    source_id: &str,
    default_prefix: &str,
) -> Result<String> {
    match given {
        Some(id) => {
            validate_instance_id(id)?;
            Ok(id.clone())
        }
        None => {
            let id = format!("{}{}", default_prefix, source_id);
            zv_warning!("no target ID given; using default {}", id);
            validate_instance_id(&id)?;
            Ok(id)
        }
    }
}

/// One target ID per job: `base`, `base+1`, ... for a multi-snapshot batch.
pub(crate) fn derive_target_ids(base: &str, count: usize) -> Result<Vec<String>> {
    let base_num: u64 = base
        .parse()
        .map_err(|_| ZvError::UserInput(format!("invalid target ID '{}'", base)))?;
    Ok((0..count as u64).map(|i| (base_num + i).to_string()).collect())
}
