use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::file_fingerprint;

/// Wire marker for uncommitted changes.
pub const WORKING_TREE: &str = "working";

/// Scope of a change: the uncommitted working tree, or one committed revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RevisionContext {
    WorkingTree,
    /// Short commit hash.
    Commit(String),
}

impl RevisionContext {
    pub fn as_str(&self) -> &str {
        match self {
            RevisionContext::WorkingTree => WORKING_TREE,
            RevisionContext::Commit(hash) => hash,
        }
    }
}

impl From<String> for RevisionContext {
    fn from(s: String) -> Self {
        if s == WORKING_TREE {
            RevisionContext::WorkingTree
        } else {
            RevisionContext::Commit(s)
        }
    }
}

impl From<RevisionContext> for String {
    fn from(rev: RevisionContext) -> Self {
        rev.as_str().to_string()
    }
}

impl fmt::Display for RevisionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
}

impl ChangeStatus {
    /// Map a two-column status code (porcelain or `--name-status`).
    /// Renames, copies, conflicts, and anything else map to `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "M" => Some(ChangeStatus::Modified),
            "D" => Some(ChangeStatus::Deleted),
            "A" | "??" => Some(ChangeStatus::Added),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
        }
    }
}

/// One observed change to one file at one point of reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Commit time in unix seconds; `None` for working-tree changes.
    pub when: Option<i64>,
    pub git_hash: RevisionContext,
    pub file_hash: String,
    pub file_path: String,
    pub status: ChangeStatus,
    #[serde(default)]
    pub is_new: bool,
    /// Set on ledger-removal events only. Not the same thing as `status: deleted`.
    #[serde(default)]
    pub delete_item: bool,
}

impl ChangeRecord {
    pub fn new(
        file_path: &str,
        status: ChangeStatus,
        git_hash: RevisionContext,
        when: Option<i64>,
    ) -> Self {
        let file_path = normalize_path(file_path);
        Self {
            when,
            git_hash,
            file_hash: file_fingerprint(&file_path),
            file_path,
            status,
            is_new: false,
            delete_item: false,
        }
    }

    pub fn working(file_path: &str, status: ChangeStatus) -> Self {
        Self::new(file_path, status, RevisionContext::WorkingTree, None)
    }

    pub fn committed(file_path: &str, status: ChangeStatus, hash: &str, when: Option<i64>) -> Self {
        Self::new(
            file_path,
            status,
            RevisionContext::Commit(hash.to_string()),
            when,
        )
    }

    /// fingerprint ++ revision context. The ledger's identity for this change.
    pub fn compound_key(&self) -> String {
        format!("{}{}", self.file_hash, self.git_hash.as_str())
    }
}

/// Repo-relative with no leading slash. Paths arrive already unquoted; a
/// backslash is part of the file name.
pub fn normalize_path(raw: &str) -> String {
    raw.trim().trim_start_matches('/').to_string()
}
