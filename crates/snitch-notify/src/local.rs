//! Transports that never leave the process: stdout for dry runs, memory for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{ChannelEvent, Transport, TransportError};

const BUFFER: usize = 64;

/// Prints each published message as pretty JSON. Subscriptions connect
/// immediately and then stay silent.
#[derive(Default)]
pub struct StdoutTransport {
    subscribers: Mutex<Vec<mpsc::Sender<ChannelEvent>>>,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Transport for StdoutTransport {
    async fn publish(&self, channel: &str, message: &Value) -> Result<(), TransportError> {
        let pretty = serde_json::to_string_pretty(message)?;
        println!("[{channel}] {pretty}");
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(BUFFER);
        let _ = tx.try_send(ChannelEvent::Connected {
            channel: channel.to_string(),
        });
        lock(&self.subscribers).push(tx);
        Ok(rx)
    }
}

/// Records published messages and echoes them to subscribers of the same
/// channel, the way a broker would.
#[derive(Default)]
pub struct MemoryTransport {
    published: Mutex<Vec<(String, Value)>>,
    subscribers: Mutex<Vec<(String, mpsc::Sender<ChannelEvent>)>>,
    fail_publish: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything successfully published so far, in order.
    pub fn published(&self) -> Vec<(String, Value)> {
        lock(&self.published).clone()
    }

    /// Make every following publish fail until switched back.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Simulate a peer (re)connecting on `channel`.
    pub fn connect_peer(&self, channel: &str) {
        self.deliver(
            channel,
            ChannelEvent::Connected {
                channel: channel.to_string(),
            },
        );
    }

    /// Deliver a message from elsewhere on `channel`.
    pub fn inject(&self, channel: &str, payload: Value) {
        self.deliver(
            channel,
            ChannelEvent::Message {
                channel: channel.to_string(),
                payload,
            },
        );
    }

    fn deliver(&self, channel: &str, event: ChannelEvent) {
        let mut subs = lock(&self.subscribers);
        subs.retain(|(_, tx)| !tx.is_closed());
        for (ch, tx) in subs.iter() {
            if ch == channel {
                let _ = tx.try_send(event.clone());
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, channel: &str, message: &Value) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("simulated publish failure".into()));
        }
        lock(&self.published).push((channel.to_string(), message.clone()));
        self.inject(channel, message.clone());
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(BUFFER);
        let _ = tx.try_send(ChannelEvent::Connected {
            channel: channel.to_string(),
        });
        lock(&self.subscribers).push((channel.to_string(), tx));
        Ok(rx)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
