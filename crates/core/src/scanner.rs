//! Enumerates files under a root directory.

use crate::config::ScanConfig;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// A traversal problem. `fatal` errors mean the enumeration itself failed
/// (e.g. the root is missing); the rest concern a single entry.
#[derive(Debug, Clone)]
pub struct WalkError {
    pub path: Option<PathBuf>,
    pub fatal: bool,
    pub message: String,
}

pub type WalkIter = Box<dyn Iterator<Item = Result<WalkEntry, WalkError>> + Send>;

/// Source of directory entries, local or remote. Implementations block; the
/// orchestrator drives them from a blocking task.
pub trait DirectorySource: Send + Sync {
    fn walk(&self, root: &Path) -> WalkIter;
}

/// Walks the local filesystem with `walkdir`.
#[derive(Debug, Clone)]
pub struct LocalSource {
    excludes: GlobSet,
    skip_hidden: bool,
    follow_links: bool,
}

impl LocalSource {
    pub fn new(excludes: &[String], skip_hidden: bool, follow_links: bool) -> anyhow::Result<Self> {
        Ok(Self {
            excludes: build_globset(excludes)?,
            skip_hidden,
            follow_links,
        })
    }

    pub fn from_config(cfg: &ScanConfig) -> anyhow::Result<Self> {
        Self::new(&cfg.exclude, cfg.skip_hidden, cfg.follow_links)
    }
}

impl DirectorySource for LocalSource {
    fn walk(&self, root: &Path) -> WalkIter {
        let excludes = self.excludes.clone();
        let skip_hidden = self.skip_hidden;
        let iter = WalkDir::new(root)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_entry(move |e| {
                e.depth() == 0 || should_descend(e.path(), skip_hidden, &excludes)
            })
            .map(|entry| -> Result<WalkEntry, WalkError> {
                let entry = entry.map_err(|e| WalkError {
                    path: e.path().map(Path::to_path_buf),
                    fatal: e.depth() == 0,
                    message: e.to_string(),
                })?;
                let meta = entry.metadata().map_err(|e| WalkError {
                    path: Some(entry.path().to_path_buf()),
                    fatal: entry.depth() == 0,
                    message: e.to_string(),
                })?;
                let modified = modified_time(entry.path(), meta.is_dir(), meta.modified())?;
                Ok(WalkEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path().to_path_buf(),
                    is_dir: meta.is_dir(),
                    size: meta.len(),
                    modified,
                })
            });
        Box::new(iter)
    }
}

/// Files without a readable mtime are reported rather than stamped with the
/// epoch. Directories are never recorded, so theirs may be missing.
fn modified_time(
    path: &Path,
    is_dir: bool,
    modified: std::io::Result<SystemTime>,
) -> Result<DateTime<Utc>, WalkError> {
    match modified {
        Ok(t) => Ok(DateTime::<Utc>::from(t)),
        Err(_) if is_dir => Ok(DateTime::<Utc>::default()),
        Err(e) => Err(WalkError {
            path: Some(path.to_path_buf()),
            fatal: false,
            message: format!("modification time unavailable: {e}"),
        }),
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, skip_hidden: bool, excludes: &GlobSet) -> bool {
    if excludes.is_match(path) {
        return false;
    }
    if skip_hidden && is_hidden(path) {
        return false;
    }
    true
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
