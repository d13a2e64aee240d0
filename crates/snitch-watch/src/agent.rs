//! The watch loop: one task owns the pipeline and serializes every trigger.
//!
//! File events go through the debouncer, then the throttle. Resync signals
//! from the transport clear the ledger at once and go straight to the
//! throttle. A pass is awaited inline, so the next trigger is only looked at
//! after the previous pass has reconciled and published.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use snitch_config::{IgnoreSet, Settings};
use snitch_git::RevisionSource;
use snitch_notify::{publish_envelope, ChannelEvent, Transport};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::debounce::Debouncer;
use crate::fs::{FsEvent, FsWatcher};
use crate::pipeline::{Cycle, Pipeline};
use crate::throttle::Throttle;

const TRIGGER_BUFFER: usize = 256;
/// Placeholder deadline for a disabled sleep branch.
const IDLE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    File(FsEvent),
    /// A new observer needs the full state.
    Resync { reason: &'static str },
}

/// Map a transport event to a trigger. Inbound change broadcasts are only
/// traced.
pub fn route(event: &ChannelEvent, filestat: &str, connections: &str) -> Option<Trigger> {
    match event {
        ChannelEvent::Connected { channel } if channel == filestat => Some(Trigger::Resync {
            reason: "filestat subscription connected",
        }),
        ChannelEvent::Message { channel, .. } if channel == connections => Some(Trigger::Resync {
            reason: "peer connected",
        }),
        ChannelEvent::Message { channel, payload } if channel == filestat => {
            tracing::trace!(%payload, "filestat message");
            None
        }
        _ => None,
    }
}

pub struct Agent<S> {
    pipeline: Pipeline<S>,
    transport: Arc<dyn Transport>,
    filestat: String,
    debounce: Debouncer<FsEvent>,
    throttle: Throttle<Trigger>,
}

impl<S: RevisionSource> Agent<S> {
    pub fn new(
        pipeline: Pipeline<S>,
        transport: Arc<dyn Transport>,
        filestat: String,
        debounce: Duration,
        throttle: Duration,
    ) -> Self {
        Self {
            pipeline,
            transport,
            filestat,
            debounce: Debouncer::new(debounce),
            throttle: Throttle::new(throttle),
        }
    }

    /// Drive triggers until cancelled or until every sender is gone. On a
    /// closed channel, pending work still gets one final pass.
    pub async fn run<F>(
        mut self,
        mut triggers: mpsc::Receiver<Trigger>,
        cancel: CancellationToken,
        mut on_cycle: F,
    ) where
        F: FnMut(&Cycle) + Send,
    {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("watch loop cancelled");
                    return;
                }
                received = triggers.recv() => match received {
                    Some(trigger) => self.accept(Instant::now(), trigger),
                    None => {
                        self.drain(&mut on_cycle).await;
                        tracing::debug!("trigger channel closed");
                        return;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(|| Instant::now() + IDLE)), if deadline.is_some() => {}
            }
            self.advance(Instant::now(), &mut on_cycle).await;
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce.deadline(), self.throttle.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn accept(&mut self, now: Instant, trigger: Trigger) {
        match trigger {
            Trigger::File(event) => self.debounce.push(now, event),
            Trigger::Resync { reason } => {
                tracing::info!(reason, "resync requested");
                self.pipeline.reset();
                self.throttle.call(now, Trigger::Resync { reason });
            }
        }
    }

    async fn advance<F: FnMut(&Cycle)>(&mut self, now: Instant, on_cycle: &mut F) {
        if let Some(event) = self.debounce.poll(now) {
            self.throttle.call(now, Trigger::File(event));
        }
        if let Some(trigger) = self.throttle.poll(now) {
            self.run_cycle(trigger, on_cycle).await;
        }
    }

    async fn drain<F: FnMut(&Cycle)>(&mut self, on_cycle: &mut F) {
        if let Some(event) = self.debounce.flush() {
            self.throttle.call(Instant::now(), Trigger::File(event));
        }
        if let Some(trigger) = self.throttle.flush() {
            self.run_cycle(trigger, on_cycle).await;
        }
    }

    async fn run_cycle<F: FnMut(&Cycle)>(&mut self, trigger: Trigger, on_cycle: &mut F) {
        tracing::debug!(?trigger, "reconcile pass");
        let Some(cycle) = self.pipeline.run_pass().await else {
            return;
        };
        if let Some(envelope) = &cycle.envelope {
            publish_envelope(self.transport.as_ref(), &self.filestat, envelope).await;
        }
        on_cycle(&cycle);
    }
}

/// Watch `settings.repo_root` and publish deltas until `cancel` fires.
/// `on_cycle` runs after every completed pass, including ones with nothing
/// to send.
pub async fn start<S, F>(
    settings: &Settings,
    source: S,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    on_cycle: F,
) -> Result<()>
where
    S: RevisionSource,
    F: FnMut(&Cycle) + Send,
{
    let ignore = IgnoreSet::new(&settings.ignore_patterns)?;
    let (tx, rx) = mpsc::channel(TRIGGER_BUFFER);

    let fs_tx = tx.clone();
    let watcher = FsWatcher::start(&settings.repo_root, ignore, move |event| {
        if fs_tx.try_send(Trigger::File(event)).is_err() {
            tracing::trace!("trigger queue full, file event dropped");
        }
    })?;

    let filestat = settings.filestat_channel();
    let connections = settings.connections_channel();
    for channel in [&filestat, &connections] {
        let mut events = match transport.subscribe(channel).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "subscribe failed");
                continue;
            }
        };
        let tx = tx.clone();
        let cancel = cancel.clone();
        let (filestat, connections) = (filestat.clone(), connections.clone());
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };
                if let Some(trigger) = route(&event, &filestat, &connections) {
                    if tx.send(trigger).await.is_err() {
                        break;
                    }
                }
            }
        });
    }

    // Report the current state once without waiting for a file event.
    if let Err(e) = tx.try_send(Trigger::Resync { reason: "startup" }) {
        tracing::warn!(error = %e, "startup resync not queued");
    }
    drop(tx);

    tracing::info!(
        developer = %settings.developer,
        root = %watcher.root().display(),
        channel = %filestat,
        "agent started"
    );
    let pipeline = Pipeline::new(
        source,
        settings.developer.clone(),
        settings.author_filter().map(str::to_string),
    );
    Agent::new(
        pipeline,
        transport,
        filestat,
        settings.debounce,
        settings.throttle,
    )
    .run(rx, cancel, on_cycle)
    .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsEventKind;
    use crate::pipeline::testing::FakeSource;
    use serde_json::json;
    use snitch_notify::MemoryTransport;
    use std::sync::Mutex;

    const FILESTAT: &str = "k-filestat";
    const CONNECTIONS: &str = "k-connections";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn file(path: &str) -> Trigger {
        Trigger::File(FsEvent {
            kind: FsEventKind::Changed,
            path: path.to_string(),
        })
    }

    fn resync() -> Trigger {
        Trigger::Resync { reason: "test" }
    }

    struct Harness {
        source: FakeSource,
        transport: Arc<MemoryTransport>,
        cycles: Arc<Mutex<Vec<Cycle>>>,
        tx: mpsc::Sender<Trigger>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_agent(source: FakeSource) -> Harness {
        let transport = Arc::new(MemoryTransport::new());
        let cycles = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let agent = Agent::new(
            Pipeline::new(source.clone(), "Ada", Some("Ada".to_string())),
            transport.clone(),
            FILESTAT.to_string(),
            ms(50),
            ms(50),
        );
        let sink = cycles.clone();
        let handle = tokio::spawn(agent.run(rx, cancel.clone(), move |c: &Cycle| {
            sink.lock().unwrap().push(c.clone())
        }));
        Harness {
            source,
            transport,
            cycles,
            tx,
            cancel,
            handle,
        }
    }

    #[test]
    fn routing() {
        let connected = |ch: &str| ChannelEvent::Connected {
            channel: ch.to_string(),
        };
        let message = |ch: &str| ChannelEvent::Message {
            channel: ch.to_string(),
            payload: json!({"dev": "Bob"}),
        };
        assert!(matches!(
            route(&connected(FILESTAT), FILESTAT, CONNECTIONS),
            Some(Trigger::Resync { .. })
        ));
        assert!(matches!(
            route(&message(CONNECTIONS), FILESTAT, CONNECTIONS),
            Some(Trigger::Resync { .. })
        ));
        assert_eq!(route(&connected(CONNECTIONS), FILESTAT, CONNECTIONS), None);
        assert_eq!(route(&message(FILESTAT), FILESTAT, CONNECTIONS), None);
        assert_eq!(route(&message("other"), FILESTAT, CONNECTIONS), None);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_pass() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs")]);
        let h = spawn_agent(source);

        for i in 0..20 {
            h.tx.send(file(&format!("f{i}.rs"))).await.unwrap();
            tokio::time::sleep(ms(5)).await;
        }
        tokio::time::sleep(ms(500)).await;

        assert_eq!(h.source.passes(), 1);
        let published = h.transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, FILESTAT);
        assert_eq!(published[0].1["head"], "main");
        assert_eq!(published[0].1["dev"], "Ada");

        drop(h.tx);
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_delta_completes_cycle_without_publish() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs")]);
        let h = spawn_agent(source);

        h.tx.send(file("a.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;
        h.tx.send(file("a.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;

        let cycles = h.cycles.lock().unwrap().clone();
        assert_eq!(cycles.len(), 2);
        assert!(cycles[0].envelope.is_some());
        assert!(cycles[1].envelope.is_none());
        assert_eq!(h.transport.published().len(), 1);
        h.cancel.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn resync_resends_everything_as_new() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs"), ("??", "b.rs")]);
        let h = spawn_agent(source);

        h.tx.send(file("a.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;
        h.tx.send(resync()).await.unwrap();
        tokio::time::sleep(ms(300)).await;

        let published = h.transport.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].1, published[1].1);
        let changes = published[1].1["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c["isNew"] == true));
        h.cancel.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_is_not_retried() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs")]);
        let h = spawn_agent(source);
        h.transport.set_fail_publish(true);

        h.tx.send(file("a.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;
        h.transport.set_fail_publish(false);
        h.tx.send(file("a.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;

        assert!(h.transport.published().is_empty());
        let cycles = h.cycles.lock().unwrap().clone();
        assert_eq!(cycles.len(), 2);
        assert!(cycles[0].envelope.is_some());
        assert!(cycles[1].envelope.is_none());
        h.cancel.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closing_channel_flushes_pending_work() {
        let source = FakeSource::new("main");
        source.set_status(&[("A ", "new.rs")]);
        let h = spawn_agent(source);

        h.tx.send(file("new.rs")).await.unwrap();
        drop(h.tx);
        h.handle.await.unwrap();

        assert_eq!(h.source.passes(), 1);
        assert_eq!(h.transport.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_skips_pending_work() {
        let source = FakeSource::new("main");
        source.set_status(&[("A ", "new.rs")]);
        let h = spawn_agent(source);

        h.tx.send(file("new.rs")).await.unwrap();
        h.cancel.cancel();
        h.handle.await.unwrap();

        assert_eq!(h.source.passes(), 0);
        assert!(h.cycles.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_branch_query_skips_cycle() {
        let source = FakeSource::new("main");
        source.set_status(&[("A ", "new.rs")]);
        source.state.lock().unwrap().branch = None;
        let h = spawn_agent(source);

        h.tx.send(file("new.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;

        assert_eq!(h.source.passes(), 1);
        assert!(h.cycles.lock().unwrap().is_empty());
        assert!(h.transport.published().is_empty());
        h.cancel.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_query_publishes_no_removals() {
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs")]);
        let h = spawn_agent(source);

        h.tx.send(file("a.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;
        h.source.state.lock().unwrap().status = None;
        h.tx.send(file("a.rs")).await.unwrap();
        tokio::time::sleep(ms(300)).await;

        assert_eq!(h.source.passes(), 2);
        assert_eq!(h.cycles.lock().unwrap().len(), 1);
        let published = h.transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1["changes"][0]["deleteItem"], json!(false));
        h.cancel.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_reports_on_startup_and_on_peer_connect() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            repo_root: dir.path().to_path_buf(),
            developer: "Ada".into(),
            project_key: "k".into(),
            ignore_patterns: vec![".git/**/*".into()],
            pubnub: None,
            debounce: ms(50),
            throttle: ms(50),
            upstream: None,
            filter_author: true,
        };
        let source = FakeSource::new("main");
        source.set_status(&[(" M", "a.rs")]);
        let transport = Arc::new(MemoryTransport::new());
        let cancel = CancellationToken::new();
        let cycles = Arc::new(Mutex::new(0usize));

        let task = {
            let (settings, source, transport, cancel, cycles) = (
                settings.clone(),
                source.clone(),
                transport.clone(),
                cancel.clone(),
                cycles.clone(),
            );
            tokio::spawn(async move {
                start(&settings, source, transport, cancel, move |_| {
                    *cycles.lock().unwrap() += 1
                })
                .await
            })
        };

        tokio::time::sleep(ms(300)).await;
        let first = transport.published();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, "k-filestat");

        transport.inject("k-connections", json!({"dev": "Bob"}));
        tokio::time::sleep(ms(300)).await;
        let published = transport.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].1["changes"][0]["isNew"], true);
        assert_eq!(*cycles.lock().unwrap(), 2);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
