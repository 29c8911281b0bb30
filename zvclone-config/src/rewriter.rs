//! Deterministic rewrite of an instance configuration for a new identity.
//!
//! The transform walks the tagged line sequence exactly once. Snapshot
//! content and `parent:` references are dropped, storage-bus lines are
//! rewritten or dropped depending on the per-disk outcome, and a set of
//! unconditional safety edits makes the new instance safe to boot: autoboot
//! off, network links down, display name prefixed.

use crate::model::{InstanceConfig, LineTag};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use zvclone_core::error::{Result, ZvError};

/// Prefixes this tool stamps onto display names; stripped before applying a
/// new one so repeated operations do not stack labels.
const NAME_LABELS: [&str; 3] = ["clone-", "restored-", "export-"];

static NET_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^net\d+$").expect("net key regex"));

/// Inputs of one rewrite pass.
pub struct RewritePlan<'a> {
    pub source_id: &'a str,
    /// `None` for a target-agnostic rewrite (export): storage lines of the
    /// bundled disks keep the source identity for later substitution.
    pub target_id: Option<&'a str>,
    /// Storage-bus keys whose disks reached `cloned` (or were bundled);
    /// every other storage-bus line is dropped.
    pub cloned_keys: &'a BTreeSet<String>,
    /// Display-name label, e.g. `clone-` or `restored-`.
    pub name_prefix: &'a str,
}

/// Produce the new configuration text.
pub fn rewrite(cfg: &InstanceConfig, plan: &RewritePlan) -> String {
    let id_pattern = Regex::new(&format!(
        r"\b(vm|subvol)-{}-",
        regex::escape(plan.source_id)
    ))
    .expect("id substitution regex");

    let mut out = Vec::new();
    for line in &cfg.lines {
        match &line.tag {
            LineTag::SnapshotSectionMarker | LineTag::SnapshotBodyLine => continue,
            LineTag::TopLevelField { key } => match key.as_str() {
                "parent" => continue,
                "onboot" => out.push("onboot: 0".to_string()),
                "name" | "hostname" => {
                    out.push(prefixed_name_line(key, line.value().unwrap_or(""), plan.name_prefix))
                }
                k if NET_KEY.is_match(k) => out.push(with_link_down(&line.raw)),
                _ => out.push(line.raw.clone()),
            },
            LineTag::StorageEntry { key } => {
                if !plan.cloned_keys.contains(key) {
                    continue;
                }
                match plan.target_id {
                    Some(target_id) => out.push(
                        id_pattern
                            .replace_all(&line.raw, format!("${{1}}-{}-", target_id))
                            .into_owned(),
                    ),
                    None => out.push(line.raw.clone()),
                }
            }
            LineTag::Unrecognized => out.push(line.raw.clone()),
        }
    }

    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Rewrite and atomically publish the result to `path`.
pub fn rewrite_to_file(cfg: &InstanceConfig, plan: &RewritePlan, path: &Path) -> Result<()> {
    write_atomic(path, &rewrite(cfg, plan))
}

/// Write `contents` to `path` via a scratch file in the same directory and
/// an atomic rename, so a failure mid-write never leaves a corrupt or empty
/// target file behind.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_file = tempfile::Builder::new()
        .prefix(".zvclone-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            ZvError::Storage(format!(
                "failed to create scratch file in {}: {}",
                dir.display(),
                e
            ))
        })?;

    temp_file
        .as_file()
        .write_all(contents.as_bytes())
        .map_err(|e| {
            ZvError::Storage(format!(
                "failed to write scratch configuration {}: {}",
                temp_file.path().display(),
                e
            ))
        })?;

    temp_file.persist(path).map_err(|e| {
        ZvError::Storage(format!(
            "failed to publish configuration {}: {}",
            path.display(),
            e.error
        ))
    })?;

    Ok(())
}

fn prefixed_name_line(key: &str, value: &str, prefix: &str) -> String {
    let mut base = value;
    loop {
        let mut stripped = false;
        for label in NAME_LABELS {
            if let Some(rest) = base.strip_prefix(label) {
                base = rest;
                stripped = true;
            }
        }
        if !stripped {
            break;
        }
    }
    format!("{}: {}{}", key, prefix, base)
}

fn with_link_down(raw: &str) -> String {
    let (main, comment) = match raw.split_once('#') {
        Some((m, c)) => (m.trim_end(), Some(c)),
        None => (raw.trim_end(), None),
    };

    if main.contains("link_down=") {
        return raw.to_string();
    }

    let mut line = main.to_string();
    if !line.ends_with(',') {
        line.push(',');
    }
    line.push_str("link_down=1");
    if let Some(c) = comment {
        line.push_str(" #");
        line.push_str(c);
    }
    line
}
