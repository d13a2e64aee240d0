pub mod file;
pub mod ignore;
pub mod settings;

use std::path::PathBuf;

pub use file::{
    generate_password, Developer, PubNubKeys, Security, SnitchConfig, Timing, CONFIG_FILENAME,
};
pub use ignore::{ignore_patterns, IgnoreSet, IGNORE_FILES};
pub use settings::Settings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no .snitchConfig in {} or the home directory (run `snitch init`)", .repo.display())]
    NotFound { repo: PathBuf },
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid ignore pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
