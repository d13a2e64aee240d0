use std::path::Path;

use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git not available: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("`git {args}` failed: {stderr}")]
    Failed { args: String, stderr: String },
}

/// Run `git <args>` in `cwd` and return stdout. Non-zero exit is an error
/// carrying the trimmed stderr.
pub async fn run_git(cwd: &Path, args: &[&str]) -> Result<String, GitError> {
    tracing::trace!(?args, "git");
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(GitError::Failed {
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outside_a_repo_fails_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_git(dir.path(), &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .unwrap_err();
        match err {
            GitError::Failed { args, stderr } => {
                assert_eq!(args, "rev-parse --abbrev-ref HEAD");
                assert!(!stderr.is_empty());
            }
            GitError::Spawn(e) => panic!("git should be installed: {e}"),
        }
    }

    #[tokio::test]
    async fn version_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_git(dir.path(), &["--version"]).await.unwrap();
        assert!(out.starts_with("git version"));
    }
}
