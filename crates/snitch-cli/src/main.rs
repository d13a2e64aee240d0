mod cmd_config;
mod cmd_init;
mod cmd_status;
mod cmd_watch;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use snitch_config::{Settings, SnitchConfig};
use snitch_git::GitInspector;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SNITCH_LOG";

#[derive(Parser)]
#[command(
    name = "snitch",
    version,
    about = "Tell your team which files you are touching before you push"
)]
struct Cli {
    /// Debug logging (SNITCH_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the repository and publish change deltas
    Watch {
        /// Print envelopes to stdout instead of publishing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one reconcile pass and print the resulting envelope as JSON
    Status,
    /// Write a .snitchConfig for this repository (or the home directory)
    Init(cmd_init::InitArgs),
    /// Show the resolved configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let cwd = std::env::current_dir()?;

    match cli.cmd {
        Command::Watch { dry_run } => cmd_watch::execute(&cwd, dry_run),
        Command::Status => cmd_status::execute(&cwd),
        Command::Init(args) => cmd_init::execute(&cwd, args),
        Command::Config { json } => cmd_config::execute(&cwd, json),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,snitch=debug"
    } else {
        "warn,snitch=info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Locate the repository around `cwd`, load its config and derive the
/// project identity. A missing config is fatal.
pub(crate) async fn resolve_settings(cwd: &Path) -> anyhow::Result<Settings> {
    let repo_root = snitch_git::toplevel(cwd)
        .await
        .context("not inside a git repository")?;
    let (config, path) = SnitchConfig::load(&repo_root)?;
    tracing::debug!(path = %path.display(), "config loaded");

    let origin = match snitch_git::origin_url(&repo_root).await {
        Ok(url) if !url.is_empty() => url,
        Ok(_) | Err(_) => {
            tracing::warn!("no origin remote, deriving the project key from the repository path");
            repo_root.display().to_string()
        }
    };
    Ok(Settings::resolve(&repo_root, &config, &origin)?)
}

pub(crate) fn inspector_for(settings: &Settings) -> GitInspector {
    let inspector = GitInspector::new(&settings.repo_root);
    match &settings.upstream {
        Some(upstream) => inspector.with_upstream(upstream.clone()),
        None => inspector,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_schema_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_watch_flags() {
        let cli = Cli::try_parse_from(["snitch", "-v", "watch", "--dry-run"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.cmd, Command::Watch { dry_run: true }));
    }

    #[test]
    fn parses_init_flags() {
        let cli = Cli::try_parse_from([
            "snitch", "init", "--name", "Ada", "--pub-key", "p", "--sub-key", "s", "--global",
        ])
        .unwrap();
        let Command::Init(args) = cli.cmd else {
            panic!("expected init");
        };
        assert_eq!(args.name.as_deref(), Some("Ada"));
        assert!(args.global);
        assert!(!args.force);
    }
}
