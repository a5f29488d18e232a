//! File discovery for library directories.
//!
//! Performance characteristics:
//! - Early directory pruning via `WalkDir::filter_entry` (O(1) subtree skip)
//! - Parallel extension checks via Rayon's `par_bridge`
//!
//! Output is sorted so repeated runs see files in the same order.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::MacvisError;
use crate::scope::FileRole;

/// Directories to exclude by default (build output and VCS metadata).
const EXCLUDED_DIRS: &[&str] = &[".git", "build", "target", "node_modules", "CMakeFiles"];

#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

/// Gathers all C/C++ headers and sources below `root`, tagged with their role.
///
/// Automatically excludes `.git/`, `build/`, `target/`, `node_modules/` and
/// `CMakeFiles/`. A missing root is a [`MacvisError::MissingFile`].
pub fn gather_sources(root: &Path) -> Result<Vec<(PathBuf, FileRole)>> {
    gather_sources_with_excludes(root, &[])
}

/// Gathers headers and sources with additional directory exclusions.
pub fn gather_sources_with_excludes(
    root: &Path,
    excludes: &[&str],
) -> Result<Vec<(PathBuf, FileRole)>> {
    if !root.exists() {
        return Err(MacvisError::missing(root).into());
    }

    let all_excludes: HashSet<&str> = EXCLUDED_DIRS
        .iter()
        .copied()
        .chain(excludes.iter().copied())
        .collect();

    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &all_excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) => {
                let path = e.path();
                if !e.file_type().is_file() {
                    return None;
                }
                FileRole::from_path(path).map(|role| Ok((path.to_path_buf(), role)))
            }
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to gather sources from {}", root.display()))?;

    files.sort();
    Ok(files)
}
