//! Turns the paths given to `dg ingest` into a list of documents.
//!
//! A file argument is taken as-is. A directory argument is walked and
//! filtered through `ingest.include_globs` / `ingest.exclude_globs`,
//! matched against paths relative to that directory. VCS and build
//! directories are always skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::IngestConfig;

/// A document found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the scanned directory, or the bare file name for
    /// file arguments. Used as the chunk `doc_id`.
    pub doc_id: String,
}

pub fn scan_paths(paths: &[PathBuf], config: &IngestConfig) -> Result<Vec<SourceFile>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for root in paths {
        if !root.exists() {
            bail!("Path does not exist: {}", root.display());
        }

        if root.is_file() {
            let doc_id = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| root.display().to_string());
            if seen.insert(root.clone()) {
                files.push(source_file(root, doc_id));
            }
            continue;
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }
            if seen.insert(path.to_path_buf()) {
                found.push(source_file(path, rel_str));
            }
        }

        // Sort for deterministic ordering
        found.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        files.extend(found);
    }

    Ok(files)
}

fn source_file(path: &Path, doc_id: String) -> SourceFile {
    SourceFile {
        path: path.to_path_buf(),
        doc_id,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
