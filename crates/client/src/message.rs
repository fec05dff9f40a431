//! Transcript entries owned by the conversation client.

use serde_json::{Map, Value};

use memora_protocol::{HistoryEntry, ResponseKind, Role};

/// One entry in the conversation transcript.
///
/// Entries are append-only: once in the log they are never edited. Ids are
/// client-generated (the wire carries no message ids) and unique within a
/// session.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// ISO-8601. Server timestamp when the entry came off the wire with one,
    /// otherwise the local clock at creation.
    pub timestamp: String,
    /// Tag on assistant messages: plain conversation, assessment question,
    /// follow-up, or evaluation-complete marker.
    pub response_kind: Option<ResponseKind>,
    /// Opaque pass-through bag forwarded to presentation unchanged.
    pub metadata: Map<String, Value>,
}

impl Message {
    /// Projection carried in the `conversation_history` field of outbound
    /// chat frames.
    pub(crate) fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role,
            content: self.content.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}
