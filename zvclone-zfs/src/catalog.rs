//! Snapshot enumeration, ordering, and index selection.

use tracing::warn;
use zvclone_core::error::{Result, ZvError};

/// One snapshot of a dataset: the dataset path plus the suffix after `@`,
/// ordered by creation time ascending (oldest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRef {
    pub dataset: String,
    pub suffix: String,
    /// Creation time as epoch seconds; 0 when the listing did not carry a
    /// parseable timestamp.
    pub created_at: i64,
}

impl SnapshotRef {
    pub fn full_name(&self) -> String {
        format!("{}@{}", self.dataset, self.suffix)
    }
}

/// Parse the tab-separated output of
/// `zfs list -t snapshot -o name,creation -s creation -H -p <dataset>`.
///
/// The listing is already creation-ordered; lines for other datasets are
/// ignored and a malformed timestamp degrades to 0 rather than dropping the
/// snapshot.
pub fn parse_listing(dataset: &str, output: &str) -> Vec<SnapshotRef> {
    let prefix = format!("{}@", dataset);
    let mut snapshots = Vec::new();

    for line in output.lines() {
        if !line.starts_with(&prefix) {
            continue;
        }
        let (name, created_at) = match line.split_once('\t') {
            Some((name, ts)) => match ts.trim().parse::<i64>() {
                Ok(ts) => (name, ts),
                Err(_) => {
                    warn!("unparseable creation time in snapshot listing: {}", line);
                    (name, 0)
                }
            },
            None => {
                warn!("unparseable snapshot listing line: {}", line);
                (line.trim(), 0)
            }
        };
        if let Some(suffix) = name.strip_prefix(&prefix) {
            snapshots.push(SnapshotRef {
                dataset: dataset.to_string(),
                suffix: suffix.trim().to_string(),
                created_at,
            });
        }
    }

    snapshots
}

/// Select one snapshot by catalog index. Anything outside `[0, len)` is an
/// invalid selection.
pub fn select_index(snapshots: &[SnapshotRef], index: i64) -> Result<&SnapshotRef> {
    if index < 0 || index as usize >= snapshots.len() {
        return Err(ZvError::UserInput(format!(
            "snapshot index {} out of range (valid: 0 to {})",
            index,
            snapshots.len().saturating_sub(1)
        )));
    }
    Ok(&snapshots[index as usize])
}

/// Select a set of snapshots by index, collapsing duplicates. The result is
/// in ascending index order, one clone/export job per entry.
pub fn select_indices<'a>(
    snapshots: &'a [SnapshotRef],
    indices: &[i64],
) -> Result<Vec<&'a SnapshotRef>> {
    let unique: std::collections::BTreeSet<i64> = indices.iter().copied().collect();
    unique
        .into_iter()
        .map(|idx| select_index(snapshots, idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
rpool/data/vm-100-disk-0@auto-1\t1700000000
rpool/data/vm-100-disk-0@auto-2\t1700086400
rpool/data/vm-100-disk-1@stray\t1700000000
rpool/data/vm-100-disk-0@manual-final\t1700172800
";

    fn snapshots() -> Vec<SnapshotRef> {
        parse_listing("rpool/data/vm-100-disk-0", LISTING)
    }

    #[test]
    fn test_parse_listing_filters_and_orders() {
        let snaps = snapshots();
        assert_eq!(snaps.len(), 3);
        assert_eq!(snaps[0].suffix, "auto-1");
        assert_eq!(snaps[2].suffix, "manual-final");
        assert_eq!(
            snaps[2].full_name(),
            "rpool/data/vm-100-disk-0@manual-final"
        );
        assert!(snaps[0].created_at < snaps[2].created_at);
    }

    #[test]
    fn test_parse_listing_tolerates_missing_timestamp() {
        let snaps = parse_listing("rpool/data/vm-100-disk-0", "rpool/data/vm-100-disk-0@odd\n");
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].suffix, "odd");
        assert_eq!(snaps[0].created_at, 0);
    }

    #[test]
    fn test_select_index_bounds() {
        let snaps = snapshots();
        assert!(matches!(
            select_index(&snaps, -1).unwrap_err(),
            ZvError::UserInput(_)
        ));
        assert!(matches!(
            select_index(&snaps, 3).unwrap_err(),
            ZvError::UserInput(_)
        ));
        // Index 2 is the newest entry by creation time.
        assert_eq!(select_index(&snaps, 2).unwrap().suffix, "manual-final");
    }

    #[test]
    fn test_select_indices_collapses_duplicates() {
        let snaps = snapshots();
        let picked = select_indices(&snaps, &[2, 0, 2, 0]).unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].suffix, "auto-1");
        assert_eq!(picked[1].suffix, "manual-final");
    }

    #[test]
    fn test_select_indices_propagates_invalid() {
        let snaps = snapshots();
        assert!(select_indices(&snaps, &[0, 9]).is_err());
    }
}
