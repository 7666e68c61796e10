//! Project directory scanner for `index-dir`.
//!
//! Walks `ProjectConfig.path`, keeps files whose extension is listed in
//! `include_extensions` and drops anything matched by `exclude_patterns`.
//! A plain exclude pattern (`node_modules`) matches any path component;
//! a pattern containing glob metacharacters (`**/*.min.js`) is matched
//! against the relative path with `globset`.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::ProjectConfig;

/// A readable source file found under the project root.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the project root, `/`-separated.
    pub relative_path: String,
    pub body: String,
}

struct ExcludeRules {
    components: Vec<String>,
    globs: GlobSet,
}

impl ExcludeRules {
    fn new(patterns: &[String]) -> Result<Self> {
        let mut components = Vec::new();
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            if pattern.contains(['*', '?', '[', '{']) {
                builder.add(
                    Glob::new(pattern)
                        .with_context(|| format!("Invalid exclude pattern: {}", pattern))?,
                );
            } else {
                components.push(pattern.trim_matches('/').to_string());
            }
        }
        Ok(Self {
            components,
            globs: builder.build()?,
        })
    }

    fn excludes(&self, relative: &Path) -> bool {
        relative.components().any(|c| {
            let c = c.as_os_str().to_string_lossy();
            self.components.iter().any(|p| *p == c)
        }) || self.globs.is_match(relative)
    }
}

fn has_included_extension(path: &Path, include_extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy();
    include_extensions
        .iter()
        .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

/// Scan `root` with the project's include and exclude rules.
///
/// Files that are not valid UTF-8 are skipped. Output is sorted by
/// relative path so repeated scans produce the same document order.
pub fn scan_project_dir(root: &Path, project: &ProjectConfig) -> Result<Vec<ScannedFile>> {
    let excludes = ExcludeRules::new(&project.exclude_patterns)?;
    let relative_of = |entry: &DirEntry| -> PathBuf {
        entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf()
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !excludes.excludes(&relative_of(e)));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !has_included_extension(entry.path(), &project.include_extensions) {
            continue;
        }

        let body = match std::fs::read_to_string(entry.path()) {
            Ok(body) => body,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let relative_path = relative_of(&entry)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push(ScannedFile {
            relative_path,
            body,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!(root = %root.display(), files = files.len(), "scanned project directory");
    Ok(files)
}
