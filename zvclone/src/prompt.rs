//! Interactive prompts for snapshot selection and confirmation gates.

use chrono::DateTime;
use dialoguer::{Confirm, Select};
use zvclone_core::error::{Result, ZvError};
use zvclone_zfs::SnapshotRef;

fn format_creation(epoch_secs: i64) -> String {
    match DateTime::from_timestamp(epoch_secs, 0) {
        Some(dt) if epoch_secs > 0 => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "unknown time".to_string(),
    }
}

/// Let the operator pick one snapshot from the catalog. Defaults to the
/// newest entry.
pub fn select_snapshot(snapshots: &[SnapshotRef]) -> Result<usize> {
    let items: Vec<String> = snapshots
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {} ({})", i, s.suffix, format_creation(s.created_at)))
        .collect();

    Select::new()
        .with_prompt("Select a snapshot")
        .items(&items)
        .default(items.len().saturating_sub(1))
        .interact()
        .map_err(|e| ZvError::UserInput(format!("snapshot selection aborted: {}", e)))
}

/// Resolve the operator's snapshot choice: explicit indices when given
/// (duplicates collapsed, each validated), otherwise an interactive pick of
/// a single snapshot.
pub fn choose_snapshots<'a>(
    snapshots: &'a [SnapshotRef],
    indices: &[i64],
) -> Result<Vec<&'a SnapshotRef>> {
    if indices.is_empty() {
        let idx = select_snapshot(snapshots)?;
        Ok(vec![&snapshots[idx]])
    } else {
        zvclone_zfs::catalog::select_indices(snapshots, indices)
    }
}

/// Yes/no gate, defaulting to no.
pub fn confirm(prompt: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| ZvError::UserInput(format!("confirmation aborted: {}", e)))
}
