use std::path::Path;

use serde_json::json;
use snitch_git::RevisionSource;
use snitch_watch::Pipeline;

/// One pass from an empty ledger: everything pending is reported as new.
/// Nothing is published.
pub fn execute(cwd: &Path) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cwd))
}

async fn run(cwd: &Path) -> anyhow::Result<()> {
    let settings = crate::resolve_settings(cwd).await?;
    let inspector = crate::inspector_for(&settings);
    let revision = inspector.current_revision().await.ok();

    let mut pipeline = Pipeline::new(
        inspector,
        settings.developer.clone(),
        settings.author_filter().map(str::to_string),
    );
    let cycle = pipeline
        .run_pass()
        .await
        .ok_or_else(|| anyhow::anyhow!("git queries failed, see the log for details"))?;

    let out = json!({
        "branch": cycle.branch,
        "revision": revision,
        "channel": settings.filestat_channel(),
        "envelope": cycle.envelope,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
