use std::path::Path;
use std::sync::Arc;

use snitch_notify::{PubNubTransport, StdoutTransport, Transport};
use tokio_util::sync::CancellationToken;

/// Watch until Ctrl-C.
pub fn execute(cwd: &Path, dry_run: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cwd, dry_run, cancel))
}

async fn run(cwd: &Path, dry_run: bool, cancel: CancellationToken) -> anyhow::Result<()> {
    let settings = crate::resolve_settings(cwd).await?;
    let inspector = crate::inspector_for(&settings);

    let transport: Arc<dyn Transport> = match (&settings.pubnub, dry_run) {
        (Some(keys), false) => Arc::new(PubNubTransport::new(
            &keys.pub_key,
            &keys.sub_key,
            &keys.origin,
        )),
        (None, false) => {
            tracing::warn!("no pubnubKeys configured, printing envelopes instead");
            Arc::new(StdoutTransport::new())
        }
        (_, true) => Arc::new(StdoutTransport::new()),
    };

    eprintln!(
        "snitch: watching {} as {} (Ctrl-C to stop)",
        settings.repo_root.display(),
        settings.developer
    );

    let mut passes = 0usize;
    snitch_watch::start(&settings, inspector, transport, cancel, |cycle| {
        passes += 1;
        match &cycle.envelope {
            Some(envelope) => tracing::info!(
                branch = %cycle.branch,
                changes = envelope.changes.len(),
                "delta sent"
            ),
            None => tracing::debug!(branch = %cycle.branch, observed = cycle.observed, "nothing new"),
        }
    })
    .await?;

    tracing::info!(passes, "stopped");
    Ok(())
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
