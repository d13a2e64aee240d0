use std::path::{Path, PathBuf};
use std::time::Duration;

use snitch_core::hash::project_key;
use snitch_core::{connections_channel, filestat_channel};

use crate::file::{PubNubKeys, SnitchConfig};
use crate::ignore::ignore_patterns;
use crate::ConfigError;

/// Everything the agent needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub repo_root: PathBuf,
    /// Actor identity put into every envelope.
    pub developer: String,
    pub project_key: String,
    pub ignore_patterns: Vec<String>,
    pub pubnub: Option<PubNubKeys>,
    pub debounce: Duration,
    pub throttle: Duration,
    pub upstream: Option<String>,
    pub filter_author: bool,
}

impl Settings {
    pub fn resolve(
        repo_root: &Path,
        config: &SnitchConfig,
        origin_url: &str,
    ) -> Result<Self, ConfigError> {
        let developer = config.developer.name.trim().to_string();
        if developer.is_empty() {
            return Err(ConfigError::Invalid("developer.name is empty".into()));
        }
        let secret = config.security.password.as_deref().unwrap_or_default();

        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            developer,
            project_key: project_key(origin_url, secret),
            ignore_patterns: ignore_patterns(repo_root),
            pubnub: config.pubnub_keys.clone(),
            debounce: Duration::from_millis(config.timing.debounce_ms),
            throttle: Duration::from_millis(config.timing.throttle_ms),
            upstream: config.upstream.clone(),
            filter_author: config.filter_author,
        })
    }

    pub fn filestat_channel(&self) -> String {
        filestat_channel(&self.project_key)
    }

    pub fn connections_channel(&self) -> String {
        connections_channel(&self.project_key)
    }

    /// Author to keep when filtering unpushed commits, if filtering is on.
    pub fn author_filter(&self) -> Option<&str> {
        self.filter_author.then_some(self.developer.as_str())
    }
}
