use snitch_core::{compose, ChangeRecord, Envelope, Ledger};
use snitch_git::parse::{commit_records, working_tree_records};
use snitch_git::RevisionSource;

/// Outcome of one completed reconcile pass.
#[derive(Debug, Clone)]
pub struct Cycle {
    pub branch: String,
    /// Records observed this pass, before diffing.
    pub observed: usize,
    /// `None` when the delta was empty.
    pub envelope: Option<Envelope>,
}

/// Branch query, status query, log query, reconcile, compose. Owns the ledger;
/// a pass needs `&mut self`, so two passes can never interleave.
pub struct Pipeline<S> {
    source: S,
    ledger: Ledger,
    developer: String,
    author_filter: Option<String>,
}

impl<S: RevisionSource> Pipeline<S> {
    pub fn new(source: S, developer: impl Into<String>, author_filter: Option<String>) -> Self {
        Self {
            source,
            ledger: Ledger::new(),
            developer: developer.into(),
            author_filter,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Session boundary: forget what was reported so the next pass resends all.
    pub fn reset(&mut self) {
        tracing::debug!(dropped = self.ledger.len(), "ledger reset");
        self.ledger.reset();
    }

    /// Working-tree and unpushed-commit records, or `None` if either query
    /// failed. The ledger never sees a partial view, so a failed query cannot
    /// turn earlier reports into removals.
    pub async fn observe(&self) -> Option<Vec<ChangeRecord>> {
        let entries = match self.source.working_tree_status().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "working tree status unavailable; skipping pass");
                return None;
            }
        };
        let blocks = match self.source.unpushed_commit_log().await {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::error!(error = %e, "unpushed commit log unavailable; skipping pass");
                return None;
            }
        };
        let mut observations = working_tree_records(&entries);
        observations.extend(commit_records(&blocks, self.author_filter.as_deref()));
        Some(observations)
    }

    /// Run one pass. Returns `None` when any git query fails, in which case
    /// the ledger is left untouched.
    pub async fn run_pass(&mut self) -> Option<Cycle> {
        let branch = match self.source.current_branch().await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "current branch unavailable; skipping pass");
                return None;
            }
        };
        let observations = self.observe().await?;
        let observed = observations.len();
        let delta = self.ledger.reconcile(observations);
        let envelope = compose(&branch, &self.developer, delta);

        Some(Cycle {
            branch,
            observed,
            envelope,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use snitch_git::{CommitBlock, GitError, RawEntry, RevisionSource};

    #[derive(Default)]
    pub struct FakeState {
        pub branch: Option<String>,
        pub status: Option<Vec<RawEntry>>,
        pub log: Option<Vec<CommitBlock>>,
    }

    /// Scriptable stand-in for git. `None` in a field makes that query fail.
    #[derive(Clone, Default)]
    pub struct FakeSource {
        pub state: Arc<Mutex<FakeState>>,
        pub branch_calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub fn new(branch: &str) -> Self {
            let source = Self::default();
            {
                let mut s = source.state.lock().unwrap();
                s.branch = Some(branch.to_string());
                s.status = Some(Vec::new());
                s.log = Some(Vec::new());
            }
            source
        }

        pub fn set_status(&self, lines: &[(&str, &str)]) {
            self.state.lock().unwrap().status = Some(entries(lines));
        }

        pub fn set_log(&self, blocks: Vec<CommitBlock>) {
            self.state.lock().unwrap().log = Some(blocks);
        }

        pub fn passes(&self) -> usize {
            self.branch_calls.load(Ordering::SeqCst)
        }
    }

    pub fn entries(lines: &[(&str, &str)]) -> Vec<RawEntry> {
        lines
            .iter()
            .map(|(code, path)| RawEntry {
                code: code.to_string(),
                path: path.to_string(),
            })
            .collect()
    }

    fn failed(what: &str) -> GitError {
        GitError::Failed {
            args: what.to_string(),
            stderr: "fatal: simulated".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl RevisionSource for FakeSource {
        async fn current_branch(&self) -> Result<String, GitError> {
            self.branch_calls.fetch_add(1, Ordering::SeqCst);
            self.state
                .lock()
                .unwrap()
                .branch
                .clone()
                .ok_or_else(|| failed("rev-parse --abbrev-ref HEAD"))
        }

        async fn current_revision(&self) -> Result<String, GitError> {
            Ok("abc1234".to_string())
        }

        async fn working_tree_status(&self) -> Result<Vec<RawEntry>, GitError> {
            self.state
                .lock()
                .unwrap()
                .status
                .clone()
                .ok_or_else(|| failed("status --porcelain"))
        }

        async fn unpushed_commit_log(&self) -> Result<Vec<CommitBlock>, GitError> {
            self.state
                .lock()
                .unwrap()
                .log
                .clone()
                .ok_or_else(|| failed("log"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{entries, FakeSource};
    use super::*;
    use snitch_git::CommitBlock;

    fn pipeline(source: &FakeSource) -> Pipeline<FakeSource> {
        Pipeline::new(source.clone(), "Ada", Some("Ada".to_string()))
    }

    #[tokio::test]
    async fn first_pass_reports_everything_then_nothing() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "src/lib.rs"), ("??", "notes.md")]);
        let mut p = pipeline(&source);

        let cycle = p.run_pass().await.unwrap();
        assert_eq!(cycle.branch, "main");
        assert_eq!(cycle.observed, 2);
        let env = cycle.envelope.unwrap();
        assert_eq!(env.dev, "Ada");
        assert_eq!(env.changes.len(), 2);
        assert!(env.changes.iter().all(|c| c.is_new));

        let again = p.run_pass().await.unwrap();
        assert!(again.envelope.is_none());
        assert_eq!(p.ledger().len(), 2);
    }

    #[tokio::test]
    async fn unknown_codes_do_not_touch_ledger() {
        let source = FakeSource::new("main");
        source.set_status(&[("UU", "conflict.rs"), ("R ", "a -> b")]);
        let mut p = pipeline(&source);
        let cycle = p.run_pass().await.unwrap();
        assert_eq!(cycle.observed, 0);
        assert!(cycle.envelope.is_none());
        assert!(p.ledger().is_empty());
    }

    #[tokio::test]
    async fn commits_filtered_by_author_and_unioned_with_status() {
        let source = FakeSource::new("feat");
        source.set_status(&[(" M", "a.rs")]);
        source.set_log(vec![
            CommitBlock {
                hash: "1111111".into(),
                when: Some(1700000000),
                author: "Ada".into(),
                entries: entries(&[("M", "a.rs"), ("A", "b.rs")]),
            },
            CommitBlock {
                hash: "2222222".into(),
                when: Some(1700000100),
                author: "Bob".into(),
                entries: entries(&[("M", "c.rs")]),
            },
        ]);
        let mut p = pipeline(&source);
        let env = p.run_pass().await.unwrap().envelope.unwrap();
        let keys: Vec<_> = env
            .changes
            .iter()
            .map(|c| format!("{}@{}", c.file_path, c.git_hash))
            .collect();
        assert_eq!(keys, vec!["a.rs@working", "a.rs@1111111", "b.rs@1111111"]);
        assert_eq!(env.changes[1].when, Some(1700000000));
    }

    #[tokio::test]
    async fn pushed_commit_becomes_removal() {
        let source = FakeSource::new("main");
        source.set_log(vec![CommitBlock {
            hash: "1111111".into(),
            when: None,
            author: "Ada".into(),
            entries: entries(&[("M", "a.rs")]),
        }]);
        let mut p = pipeline(&source);
        p.run_pass().await.unwrap();

        source.set_log(Vec::new());
        let env = p.run_pass().await.unwrap().envelope.unwrap();
        assert_eq!(env.changes.len(), 1);
        assert!(env.changes[0].delete_item);
        assert!(p.ledger().is_empty());
    }

    #[tokio::test]
    async fn failed_queries_keep_earlier_reports() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "w.rs")]);
        source.set_log(vec![CommitBlock {
            hash: "1111111".into(),
            when: None,
            author: "Ada".into(),
            entries: entries(&[("M", "a.rs")]),
        }]);
        let mut p = pipeline(&source);
        assert_eq!(p.run_pass().await.unwrap().envelope.unwrap().changes.len(), 2);

        let log = source.state.lock().unwrap().log.take();
        assert!(p.run_pass().await.is_none());
        assert_eq!(p.ledger().len(), 2);
        source.state.lock().unwrap().log = log;

        let status = source.state.lock().unwrap().status.take();
        assert!(p.run_pass().await.is_none());
        assert_eq!(p.ledger().len(), 2);
        source.state.lock().unwrap().status = status;

        // Back to normal: nothing was removed, so nothing is re-sent.
        assert!(p.run_pass().await.unwrap().envelope.is_none());
    }

    #[tokio::test]
    async fn failed_branch_query_skips_pass() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs")]);
        source.state.lock().unwrap().branch = None;
        let mut p = pipeline(&source);
        assert!(p.run_pass().await.is_none());
        assert!(p.ledger().is_empty());
    }

    #[tokio::test]
    async fn reset_resends_current_state() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs")]);
        let mut p = pipeline(&source);
        p.run_pass().await.unwrap();
        assert!(p.run_pass().await.unwrap().envelope.is_none());

        p.reset();
        let env = p.run_pass().await.unwrap().envelope.unwrap();
        assert_eq!(env.changes.len(), 1);
        assert!(env.changes[0].is_new);
    }
}
