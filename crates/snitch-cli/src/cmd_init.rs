use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use snitch_config::{
    generate_password, Developer, PubNubKeys, Security, SnitchConfig, CONFIG_FILENAME,
};

#[derive(Args)]
pub struct InitArgs {
    /// Developer name (defaults to `git config user.name`)
    #[arg(long)]
    pub name: Option<String>,
    /// GitHub user name
    #[arg(long)]
    pub github_user: Option<String>,
    /// PubNub publish key
    #[arg(long, requires = "sub_key")]
    pub pub_key: Option<String>,
    /// PubNub subscribe key
    #[arg(long, requires = "pub_key")]
    pub sub_key: Option<String>,
    /// Project password shared with the team (generated if omitted)
    #[arg(long)]
    pub password: Option<String>,
    /// Write ~/.snitchConfig instead of the repository's file
    #[arg(long)]
    pub global: bool,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(cwd: &Path, args: InitArgs) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let (repo_root, git_name) = rt.block_on(async {
        (
            snitch_git::toplevel(cwd).await.ok(),
            snitch_git::user_name(cwd).await.ok(),
        )
    });

    let path = target_path(repo_root, args.global)?;
    if path.exists() && !args.force {
        println!("Already initialized at {} (use --force to overwrite)", path.display());
        return Ok(());
    }

    let config = build_config(args, git_name)?;
    config.save(&path)?;
    println!("Wrote {}", path.display());
    if let Some(password) = &config.security.password {
        println!("  Project password: {password} (share it with your team)");
    }
    if config.pubnub_keys.is_none() {
        println!("  No PubNub keys given; `snitch watch` will print deltas locally.");
    }
    Ok(())
}

fn target_path(repo_root: Option<PathBuf>, global: bool) -> anyhow::Result<PathBuf> {
    if global {
        return SnitchConfig::global_path().context("cannot determine the home directory");
    }
    let root = repo_root.context("not inside a git repository (use --global)")?;
    Ok(root.join(CONFIG_FILENAME))
}

fn build_config(args: InitArgs, git_name: Option<String>) -> anyhow::Result<SnitchConfig> {
    let name = args
        .name
        .or(git_name)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let Some(name) = name else {
        bail!("no developer name: pass --name or set `git config user.name`");
    };

    let pubnub_keys = match (args.pub_key, args.sub_key) {
        (Some(pub_key), Some(sub_key)) => Some(PubNubKeys::new(&pub_key, &sub_key)),
        _ => None,
    };

    Ok(SnitchConfig {
        developer: Developer {
            name,
            github_user: args.github_user,
        },
        security: Security {
            password: Some(args.password.unwrap_or_else(generate_password)),
        },
        pubnub_keys,
        ..Default::default()
    })
}
