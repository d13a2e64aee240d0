pub mod local;
pub mod pubnub;

use serde_json::Value;
use snitch_core::Envelope;
use tokio::sync::mpsc;

pub use local::{MemoryTransport, StdoutTransport};
pub use pubnub::PubNubTransport;

/// Something that happened on a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Subscription established, or re-established after an outage.
    Connected { channel: String },
    Message { channel: String, payload: Value },
}

impl ChannelEvent {
    pub fn channel(&self) -> &str {
        match self {
            ChannelEvent::Connected { channel } => channel,
            ChannelEvent::Message { channel, .. } => channel,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http: {0}")]
    Http(#[from] ureq::Error),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Pub/sub seam. No ordering or delivery guarantee is assumed by callers.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, channel: &str, message: &Value) -> Result<(), TransportError>;

    /// Events for `channel` until the receiver is dropped.
    async fn subscribe(&self, channel: &str)
        -> Result<mpsc::Receiver<ChannelEvent>, TransportError>;
}

/// Publish an envelope once. Failures are logged and never retried; the
/// caller treats the delta as reported either way.
pub async fn publish_envelope(transport: &dyn Transport, channel: &str, envelope: &Envelope) -> bool {
    let message = match serde_json::to_value(envelope) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(channel, error = %e, "failed to encode envelope");
            return false;
        }
    };
    match transport.publish(channel, &message).await {
        Ok(()) => {
            tracing::debug!(channel, changes = envelope.changes.len(), "published");
            true
        }
        Err(e) => {
            tracing::error!(channel, error = %e, "publish failed");
            false
        }
    }
}
