//! JSON frames exchanged over the conversation channel.
//!
//! Frames are tagged by their `type` field. Outbound and inbound directions
//! use separate enums because the two vocabularies do not overlap: the client
//! produces `chat_message` and `ping`, the server produces
//! `conversation_response`, `conversation_error`, room membership events, and
//! `pong`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::{Role, SessionInfo};

/// One transcript entry carried in the `conversation_history` field of an
/// outbound chat frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

/// Frames produced by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    ChatMessage(ChatMessage),
    Ping,
}

/// Payload of an outbound `chat_message` frame.
///
/// Carries enough local context for the server to answer statelessly: the
/// selected photo, the recent transcript (bounded to cap payload size), and
/// the client's current view of the assessment maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_context: Option<String>,
    pub photo_ids: Vec<String>,
    pub conversation_history: Vec<HistoryEntry>,
    pub cist_progress: BTreeMap<String, bool>,
    pub cist_scores: BTreeMap<String, f64>,
    pub turn_count: u32,
    pub timestamp: String,
}

/// Frames consumed from the server.
///
/// Unknown `type` tags decode to [`Unknown`] so newer servers cannot break
/// older clients; the state machine treats that variant as a no-op.
///
/// [`Unknown`]: ServerFrame::Unknown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConversationResponse(ConversationResponse),
    ConversationError(ConversationError),
    UserJoined(RoomEvent),
    UserLeft(RoomEvent),
    Pong,
    #[serde(other)]
    Unknown,
}

/// Payload of an inbound `conversation_response` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    /// Open-ended bag forwarded to presentation verbatim; the client never
    /// assumes a closed key set here.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,
}

/// Payload of an inbound `conversation_error` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable fallback text some server builds send alongside the
    /// error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Payload of `user_joined` / `user_left` room membership frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
