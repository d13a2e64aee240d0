//! Filesystem events for the watch loop.
//!
//! Bridges the synchronous `notify` callback into the async side via a
//! caller-supplied sink. Paths are reported relative to the watched root and
//! filtered through the ignore set before they reach the sink.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::EventKind;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use snitch_config::IgnoreSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Changed,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    /// Repo-relative, forward slashes.
    pub path: String,
}

/// Map a raw notify kind. Access and unknown events do not count as changes.
pub fn classify(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Modify(_) => Some(FsEventKind::Changed),
        EventKind::Remove(_) => Some(FsEventKind::Removed),
        _ => None,
    }
}

/// `path` relative to `root`, or `None` if it lies outside.
pub fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let s = rel.to_string_lossy().replace('\\', "/");
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Keeps the underlying watcher alive; dropping it stops delivery.
pub struct FsWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Watch `root` recursively. `sink` runs on notify's thread and must not
    /// block.
    pub fn start<F>(root: &Path, ignore: IgnoreSet, sink: F) -> Result<Self>
    where
        F: Fn(FsEvent) + Send + 'static,
    {
        let root = root
            .canonicalize()
            .with_context(|| format!("cannot watch {}", root.display()))?;
        let cb_root = root.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let Some(kind) = classify(&event.kind) else {
                        return;
                    };
                    for path in &event.paths {
                        let Some(rel) = relative(&cb_root, path) else {
                            continue;
                        };
                        if ignore.is_ignored(&rel) {
                            continue;
                        }
                        tracing::trace!(path = %rel, ?kind, "fs event");
                        sink(FsEvent { kind, path: rel });
                    }
                }
                Err(e) => tracing::warn!(error = %e, "watch error"),
            },
            Config::default(),
        )
        .context("failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", root.display()))?;

        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    /// Canonical path being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
