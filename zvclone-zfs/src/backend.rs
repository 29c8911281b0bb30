//! The storage backend seam.
//!
//! [`StorageBackend`] is the contract between the lifecycle engines and the
//! snapshot/clone/send-receive subsystem. The production implementation
//! shells out to `zfs`; tests substitute an in-memory backend.

use crate::catalog::{self, SnapshotRef};
use crate::codec::Codec;
use crate::pipeline;
use std::path::Path;
use zvclone_core::command::{probe, probe_with_stderr, run_capture};
use zvclone_core::error::{Result, ZvError};

/// Backing type of a dataset, from the storage engine's `type` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Filesystem,
    Volume,
    Snapshot,
}

impl DatasetKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "filesystem" => Some(DatasetKind::Filesystem),
            "volume" => Some(DatasetKind::Volume),
            "snapshot" => Some(DatasetKind::Snapshot),
            _ => None,
        }
    }
}

/// Contract for the snapshot/clone/send-receive subsystem.
pub trait StorageBackend {
    /// Backing type of a dataset or snapshot, `None` when it does not exist.
    fn dataset_kind(&self, dataset: &str) -> Result<Option<DatasetKind>>;

    /// Snapshots of a dataset, oldest first. A dataset without snapshots
    /// (or one that does not exist) yields an empty list.
    fn list_snapshots(&self, dataset: &str) -> Result<Vec<SnapshotRef>>;

    /// Estimated size in bytes of a full send of the snapshot, when the
    /// engine can provide one.
    fn estimated_send_size(&self, snapshot: &str) -> Option<u64>;

    /// Create a lightweight copy-on-write clone of a snapshot.
    fn clone_snapshot(&self, snapshot: &str, target: &str, suppress_mount: bool) -> Result<()>;

    /// Stream a snapshot's full content into a fresh dataset.
    fn send_to_dataset(&self, snapshot: &str, target: &str, label: &str) -> Result<u64>;

    /// Stream a snapshot's full content into a bundle file.
    fn send_to_file(&self, snapshot: &str, file: &Path, codec: Codec, label: &str) -> Result<u64>;

    /// Replay a bundle file into a fresh dataset.
    fn receive_from_file(&self, file: &Path, codec: Codec, target: &str, label: &str)
        -> Result<u64>;

    fn dataset_exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.dataset_kind(dataset)?.is_some())
    }

    fn snapshot_exists(&self, snapshot: &str) -> Result<bool> {
        Ok(self.dataset_kind(snapshot)? == Some(DatasetKind::Snapshot))
    }
}

/// The production backend: shells out to the `zfs` command-line tool.
#[derive(Debug, Default)]
pub struct ZfsBackend;

impl StorageBackend for ZfsBackend {
    fn dataset_kind(&self, dataset: &str) -> Result<Option<DatasetKind>> {
        let result = probe("zfs", &["get", "-H", "-p", "-o", "value", "type", dataset])?;
        Ok(result.and_then(|(stdout, _)| DatasetKind::parse(stdout.trim())))
    }

    fn list_snapshots(&self, dataset: &str) -> Result<Vec<SnapshotRef>> {
        let args = [
            "list", "-t", "snapshot", "-o", "name,creation", "-s", "creation", "-H", "-p", dataset,
        ];
        match probe_with_stderr("zfs", &args)? {
            Ok(output) => Ok(catalog::parse_listing(dataset, &output)),
            Err(stderr) if stderr.contains("does not exist") => Ok(Vec::new()),
            Err(stderr) => Err(ZvError::Storage(format!(
                "listing snapshots of {} failed: {}",
                dataset, stderr
            ))),
        }
    }

    fn estimated_send_size(&self, snapshot: &str) -> Option<u64> {
        let output = probe("zfs", &["send", "-nP", snapshot]).ok()??;
        // `-nP` reports both on stdout and (for some versions) stderr.
        for text in [&output.0, &output.1] {
            for line in text.lines() {
                let mut parts = line.split_whitespace();
                if parts.next() == Some("size") {
                    if let Some(size) = parts.next().and_then(|v| v.parse().ok()) {
                        return Some(size);
                    }
                }
            }
        }
        None
    }

    fn clone_snapshot(&self, snapshot: &str, target: &str, suppress_mount: bool) -> Result<()> {
        let mut args = vec!["clone"];
        if suppress_mount {
            // Instance disks must not be auto-mounted by the host.
            args.extend(["-o", "canmount=noauto"]);
        }
        args.extend([snapshot, target]);
        run_capture("zfs", &args)
            .map(|_| ())
            .map_err(|e| ZvError::Storage(format!("cloning {} to {}: {}", snapshot, target, e)))
    }

    fn send_to_dataset(&self, snapshot: &str, target: &str, label: &str) -> Result<u64> {
        let estimated = self.estimated_send_size(snapshot);
        let source = pipeline::spawn_source("zfs", &["send", snapshot])?;
        let sink = pipeline::spawn_sink("zfs", &["receive", "-o", "readonly=off", target])?;
        pipeline::stream_to_sink(source, "zfs send", sink, "zfs receive", label, estimated)
    }

    fn send_to_file(&self, snapshot: &str, file: &Path, codec: Codec, label: &str) -> Result<u64> {
        let estimated = self.estimated_send_size(snapshot);
        let source = pipeline::spawn_source("zfs", &["send", snapshot])?;
        pipeline::stream_to_file(source, "zfs send", file, codec, label, estimated)
    }

    fn receive_from_file(
        &self,
        file: &Path,
        codec: Codec,
        target: &str,
        label: &str,
    ) -> Result<u64> {
        let sink = pipeline::spawn_sink("zfs", &["receive", "-o", "readonly=off", target])?;
        pipeline::stream_from_file(file, codec, sink, "zfs receive", label)
    }
}
