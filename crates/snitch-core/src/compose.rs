use serde::{Deserialize, Serialize};

use crate::types::ChangeRecord;

/// Message broadcast to subscribers after a reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Branch the developer is on.
    pub head: String,
    /// Developer identity. Opaque to the core.
    pub dev: String,
    pub changes: Vec<ChangeRecord>,
}

/// Channel carrying change envelopes for a project.
pub fn filestat_channel(project_key: &str) -> String {
    format!("{project_key}-filestat")
}

/// Presence channel: any traffic here means a peer wants a full resync.
pub fn connections_channel(project_key: &str) -> String {
    format!("{project_key}-connections")
}

/// Wrap a ledger delta for publishing. An empty delta yields `None`, and the
/// caller must not send anything.
pub fn compose(branch: &str, actor: &str, delta: Vec<ChangeRecord>) -> Option<Envelope> {
    if delta.is_empty() {
        return None;
    }
    Some(Envelope {
        head: branch.to_string(),
        dev: actor.to_string(),
        changes: delta,
    })
}
