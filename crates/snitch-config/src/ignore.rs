//! Which paths may trigger a reconcile pass.
//!
//! Patterns come from `.gitignore` and `.snitchignore` in the repo root. Each
//! line that names something that exists becomes a glob: directories expand to
//! `dir/**/*`, files to `**/name`. Git's own directory is always excluded since
//! every `git status` we run touches it.

use std::fs;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::ConfigError;

pub const IGNORE_FILES: &[&str] = &[".gitignore", ".snitchignore"];

/// Always present, first in the list.
pub const GIT_DIR_PATTERN: &str = ".git/**/*";

/// Expand ignore files under `repo_root` into glob patterns.
pub fn ignore_patterns(repo_root: &Path) -> Vec<String> {
    let mut patterns = vec![GIT_DIR_PATTERN.to_string()];
    for name in IGNORE_FILES {
        let Ok(content) = fs::read_to_string(repo_root.join(name)) else {
            continue;
        };
        for line in content.lines() {
            if let Some(pattern) = expand_line(repo_root, line) {
                if !patterns.contains(&pattern) {
                    patterns.push(pattern);
                }
            }
        }
    }
    tracing::debug!(count = patterns.len(), "ignore patterns");
    patterns
}

fn expand_line(repo_root: &Path, line: &str) -> Option<String> {
    let entry = line.trim();
    if entry.is_empty() || entry.starts_with('#') || entry.starts_with('!') {
        return None;
    }
    let entry = entry.trim_start_matches('/').trim_end_matches('/');
    if entry.is_empty() {
        return None;
    }
    let meta = fs::metadata(repo_root.join(entry)).ok()?;
    if meta.is_dir() {
        Some(format!("{entry}/**/*"))
    } else if meta.is_file() {
        Some(format!("**/{entry}"))
    } else {
        None
    }
}

/// Compiled ignore patterns, matched against repo-relative paths.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    set: GlobSet,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| ConfigError::Pattern {
            pattern: patterns.join(","),
            source,
        })?;
        Ok(Self { set })
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let normalized = rel_path.replace('\\', "/");
        self.set.is_match(normalized.trim_start_matches('/'))
    }
}
