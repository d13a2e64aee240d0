use std::path::{Path, PathBuf};

use crate::command::{run_git, GitError};
use crate::parse::{parse_log, parse_porcelain, CommitBlock, RawEntry, LOG_FORMAT};

/// Upstream range used when none is configured: everything on HEAD that the
/// tracking branch does not have yet.
pub const DEFAULT_UPSTREAM: &str = "@{upstream}";

/// `-c` setting for path-printing queries: non-ASCII names come out verbatim.
const UNQUOTED_PATHS: &str = "core.quotePath=false";

/// Version-control queries the pipeline depends on. Implemented by
/// [`GitInspector`] (real) and by fakes in tests.
#[async_trait::async_trait]
pub trait RevisionSource: Send + Sync {
    /// Short branch name of HEAD.
    async fn current_branch(&self) -> Result<String, GitError>;
    /// Short hash of HEAD.
    async fn current_revision(&self) -> Result<String, GitError>;
    async fn working_tree_status(&self) -> Result<Vec<RawEntry>, GitError>;
    /// Commits on HEAD not yet on the upstream, with their changed files.
    async fn unpushed_commit_log(&self) -> Result<Vec<CommitBlock>, GitError>;
}

/// Runs `git` in a working directory.
#[derive(Debug, Clone)]
pub struct GitInspector {
    cwd: PathBuf,
    upstream: String,
}

impl GitInspector {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            upstream: DEFAULT_UPSTREAM.to_string(),
        }
    }

    /// Compare against a fixed ref (e.g. `origin/master`) instead of the
    /// tracking branch.
    pub fn with_upstream(mut self, upstream: impl Into<String>) -> Self {
        self.upstream = upstream.into();
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    async fn has_tracking_branch(&self) -> bool {
        run_git(
            &self.cwd,
            &["rev-parse", "--abbrev-ref", "--symbolic-full-name", DEFAULT_UPSTREAM],
        )
        .await
        .is_ok()
    }
}

#[async_trait::async_trait]
impl RevisionSource for GitInspector {
    async fn current_branch(&self) -> Result<String, GitError> {
        let out = run_git(&self.cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    async fn current_revision(&self) -> Result<String, GitError> {
        let out = run_git(&self.cwd, &["rev-parse", "--short", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    async fn working_tree_status(&self) -> Result<Vec<RawEntry>, GitError> {
        let out = run_git(&self.cwd, &["-c", UNQUOTED_PATHS, "status", "--porcelain"]).await?;
        Ok(parse_porcelain(&out))
    }

    async fn unpushed_commit_log(&self) -> Result<Vec<CommitBlock>, GitError> {
        if self.upstream == DEFAULT_UPSTREAM && !self.has_tracking_branch().await {
            tracing::debug!(
                cwd = %self.cwd.display(),
                "no upstream configured, no unpushed commits"
            );
            return Ok(Vec::new());
        }
        let range = format!("{}..HEAD", self.upstream);
        let out = run_git(
            &self.cwd,
            &["-c", UNQUOTED_PATHS, "log", "--name-status", LOG_FORMAT, &range],
        )
        .await?;
        Ok(parse_log(&out))
    }
}

/// Root of the working tree containing `cwd`.
pub async fn toplevel(cwd: &Path) -> Result<PathBuf, GitError> {
    let out = run_git(cwd, &["rev-parse", "--show-toplevel"]).await?;
    Ok(PathBuf::from(out.trim()))
}

/// `remote.origin.url` of the repository at `cwd`.
pub async fn origin_url(cwd: &Path) -> Result<String, GitError> {
    let out = run_git(cwd, &["config", "--get", "remote.origin.url"]).await?;
    Ok(out.trim().to_string())
}

/// `user.name` as git sees it from `cwd`.
pub async fn user_name(cwd: &Path) -> Result<String, GitError> {
    let out = run_git(cwd, &["config", "user.name"]).await?;
    Ok(out.trim().to_string())
}
