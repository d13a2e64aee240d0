//! PubNub over its plain REST API.
//!
//! Publish is a single JSON POST. Subscribe is a long-poll loop on a
//! background task: the first successful poll (timetoken `0`) is the
//! handshake and is surfaced as [`ChannelEvent::Connected`]; after an outage
//! the next successful poll is surfaced as `Connected` again.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{ChannelEvent, Transport, TransportError};

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
/// Server holds a subscribe request for up to ~280s.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(310);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct PubNubTransport {
    publish_key: String,
    subscribe_key: String,
    origin: String,
}

impl PubNubTransport {
    /// `origin` is a host name such as `ps.pndsn.com`.
    pub fn new(publish_key: &str, subscribe_key: &str, origin: &str) -> Self {
        Self {
            publish_key: publish_key.to_string(),
            subscribe_key: subscribe_key.to_string(),
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    fn publish_url(&self, channel: &str) -> String {
        format!(
            "https://{}/publish/{}/{}/0/{}/0",
            self.origin, self.publish_key, self.subscribe_key, channel
        )
    }

    fn subscribe_url(&self, channel: &str, timetoken: &str) -> String {
        format!(
            "https://{}/subscribe/{}/{}/0/{}",
            self.origin, self.subscribe_key, channel, timetoken
        )
    }
}

#[async_trait::async_trait]
impl Transport for PubNubTransport {
    async fn publish(&self, channel: &str, message: &Value) -> Result<(), TransportError> {
        let url = self.publish_url(channel);
        let body = serde_json::to_string(message)?;
        let reply = tokio::task::spawn_blocking(move || post_json(&url, body)).await??;
        check_publish_reply(&reply)
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::Receiver<ChannelEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(BUFFER);
        let this = self.clone();
        let channel = channel.to_string();
        tokio::spawn(async move { this.poll_loop(channel, tx).await });
        Ok(rx)
    }
}

impl PubNubTransport {
    async fn poll_loop(self, channel: String, tx: mpsc::Sender<ChannelEvent>) {
        let mut timetoken = "0".to_string();
        let mut connected = false;

        while !tx.is_closed() {
            let url = self.subscribe_url(&channel, &timetoken);
            let polled = tokio::task::spawn_blocking(move || get_text(&url)).await;
            let reply = match polled {
                Ok(Ok(text)) => parse_subscribe_reply(&text),
                Ok(Err(e)) => Err(e),
                Err(e) => {
                    tracing::error!(channel = %channel, error = %e, "subscribe task died");
                    return;
                }
            };

            match reply {
                Ok((messages, next)) => {
                    if !connected {
                        connected = true;
                        tracing::info!(channel = %channel, "subscribed");
                        let ev = ChannelEvent::Connected {
                            channel: channel.clone(),
                        };
                        if tx.send(ev).await.is_err() {
                            return;
                        }
                    }
                    for payload in messages {
                        let ev = ChannelEvent::Message {
                            channel: channel.clone(),
                            payload,
                        };
                        if tx.send(ev).await.is_err() {
                            return;
                        }
                    }
                    timetoken = next;
                }
                Err(e) => {
                    if connected {
                        tracing::warn!(channel = %channel, error = %e, "subscription lost");
                    } else {
                        tracing::debug!(channel = %channel, error = %e, "subscribe failed");
                    }
                    connected = false;
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

fn post_json(url: &str, body: String) -> Result<String, TransportError> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(PUBLISH_TIMEOUT))
        .build()
        .new_agent();
    let mut resp = agent
        .post(url)
        .header("Content-Type", "application/json")
        .send(body)?;
    Ok(resp.body_mut().read_to_string()?)
}

fn get_text(url: &str) -> Result<String, TransportError> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(SUBSCRIBE_TIMEOUT))
        .build()
        .new_agent();
    let mut resp = agent.get(url).call()?;
    Ok(resp.body_mut().read_to_string()?)
}

/// Publish replies look like `[1,"Sent","17000000000000000"]`.
fn check_publish_reply(text: &str) -> Result<(), TransportError> {
    let v: Value = serde_json::from_str(text)?;
    match v.get(0).and_then(Value::as_i64) {
        Some(1) => Ok(()),
        _ => Err(TransportError::Protocol(format!("publish rejected: {text}"))),
    }
}

/// Subscribe replies look like `[[msg, ...], "timetoken"]`.
fn parse_subscribe_reply(text: &str) -> Result<(Vec<Value>, String), TransportError> {
    let v: Value = serde_json::from_str(text)?;
    let messages = v
        .get(0)
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| TransportError::Protocol(format!("no message array: {text}")))?;
    let timetoken = v
        .get(1)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TransportError::Protocol(format!("no timetoken: {text}")))?;
    Ok((messages, timetoken))
}
