use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Config file name, looked up in the repo root and then in the home directory.
pub const CONFIG_FILENAME: &str = ".snitchConfig";

const DEFAULT_WINDOW_MS: u64 = 50;
const DEFAULT_ORIGIN: &str = "ps.pndsn.com";
const PASSWORD_LEN: usize = 12;

/// On-disk configuration (`.snitchConfig`, JSON).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnitchConfig {
    pub developer: Developer,
    #[serde(default)]
    pub security: Security,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubnub_keys: Option<PubNubKeys>,
    #[serde(default)]
    pub timing: Timing,
    /// Ref to compare HEAD against. Defaults to the tracking branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    /// Only report unpushed commits made under `developer.name`.
    #[serde(default = "default_true")]
    pub filter_author: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Developer {
    /// Must match `git config user.name` for commit filtering to work.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_user: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Security {
    /// Salt for the project key. Shared with everyone on the project.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PubNubKeys {
    pub pub_key: String,
    pub sub_key: String,
    #[serde(default = "default_origin")]
    pub origin: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    #[serde(default = "default_window_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_window_ms")]
    pub throttle_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_WINDOW_MS,
            throttle_ms: DEFAULT_WINDOW_MS,
        }
    }
}

impl Default for SnitchConfig {
    fn default() -> Self {
        Self {
            developer: Developer::default(),
            security: Security::default(),
            pubnub_keys: None,
            timing: Timing::default(),
            upstream: None,
            filter_author: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

impl PubNubKeys {
    pub fn new(pub_key: &str, sub_key: &str) -> Self {
        Self {
            pub_key: pub_key.to_string(),
            sub_key: sub_key.to_string(),
            origin: default_origin(),
        }
    }
}

impl SnitchConfig {
    /// `~/.snitchConfig`, shared by every repository without its own file.
    pub fn global_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILENAME))
    }

    /// Find the config for `repo_root`: the repo's own file wins over the
    /// one in the home directory.
    pub fn locate(repo_root: &Path) -> Option<PathBuf> {
        let local = repo_root.join(CONFIG_FILENAME);
        if local.is_file() {
            return Some(local);
        }
        Self::global_path().filter(|p| p.is_file())
    }

    /// Locate and parse. Missing config is an error; callers treat it as fatal.
    pub fn load(repo_root: &Path) -> Result<(Self, PathBuf), ConfigError> {
        let path = Self::locate(repo_root).ok_or_else(|| ConfigError::NotFound {
            repo: repo_root.to_path_buf(),
        })?;
        let config = Self::load_from(&path)?;
        Ok((config, path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Pretty JSON, written atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut data = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        data.push(b'\n');
        write_atomic(path, &data).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Random alphanumeric project password for `snitch init`.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Atomic write: write to temp file in same dir, then rename.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
