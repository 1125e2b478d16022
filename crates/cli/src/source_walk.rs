//! Enumerating the files and folders of a source tree.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use treeidx_core::TreeConfig;
use walkdir::WalkDir;

/// One entry below the source folder.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    /// Path relative to the source folder, `/`-separated.
    pub path: String,
    pub absolute: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Compiled `ignore_patterns`. A pattern matches either the relative path or
/// the bare file name.
pub struct IgnoreSet {
    patterns: Vec<Pattern>,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p).with_context(|| format!("Invalid ignore pattern {}", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_ignored(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        self.patterns
            .iter()
            .any(|p| p.matches(relative) || p.matches(name))
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Every non-ignored entry of the tree, parents before children and
/// siblings by name. Unreadable entries are logged and left out.
pub fn collect_entries(tree: &TreeConfig) -> Result<Vec<SourceEntry>> {
    let ignore = IgnoreSet::new(&tree.ignore_patterns)?;
    let root = &tree.source_folder;
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            relative_path(root, e.path())
                .map(|rel| !ignore.is_ignored(&rel))
                .unwrap_or(false)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", root.display(), e);
                continue;
            }
        };
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            debug!("Skipping special file {}", entry.path().display());
            continue;
        }
        let Some(path) = relative_path(root, entry.path()) else {
            continue;
        };
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        entries.push(SourceEntry {
            path,
            absolute: entry.path().to_path_buf(),
            is_dir: file_type.is_dir(),
            size: if file_type.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    Ok(entries)
}
