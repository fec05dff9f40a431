//! The conversation state machine: user intents in, protocol frames out,
//! inbound frames reconciled into local state.

use std::collections::VecDeque;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use memora_protocol::{
    ChatMessage, ClientFrame, ConversationError, ConversationResponse, ResponseKind, Role,
    ServerFrame,
};
use memora_transport::{ChannelError, ChannelHandle, ChannelStatus};

use crate::message::Message;
use crate::session::Session;

/// Outbound history is bounded to cap payload size.
const HISTORY_LIMIT: usize = 10;

const WELCOME_TEXT: &str = "Hello! Let's look through your photos together and share the \
     memories they hold. Tell me whatever comes to mind as you look at them.";

const SESSION_ENDED_TEXT: &str =
    "The conversation has ended. Thank you for sharing your memories today.";

/// A photo under discussion, as handed over by the caller.
#[derive(Debug, Clone)]
pub struct PhotoContext {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl PhotoContext {
    /// Text describing this photo in outbound frames: the description when
    /// one exists, otherwise the name.
    fn context_text(&self) -> String {
        self.description.clone().unwrap_or_else(|| self.name.clone())
    }
}

/// Readiness of the state machine itself, as opposed to the server-driven
/// session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Readiness {
    #[default]
    Idle,
    /// A session exists locally but the server has not confirmed it yet.
    AwaitingSession,
    /// At least one server response has been reconciled.
    Live,
    Ended,
}

/// Notifications raised toward the presentation layer.
#[derive(Debug, Clone)]
pub enum Notification {
    /// The server marked the session complete. Raised exactly once per
    /// session.
    SessionComplete(Session),
    /// The server reported a conversation error; the session stays alive.
    ConversationError(String),
}

/// Sink half of the transport, as seen by the state machine.
///
/// Implemented by the real [`ChannelHandle`] and by the in-memory
/// [`FakeChannel`](crate::fake::FakeChannel) used in tests.
pub trait ChatChannel {
    fn status(&self) -> ChannelStatus;
    fn send(&self, frame: ClientFrame) -> Result<(), ChannelError>;
}

impl ChatChannel for ChannelHandle {
    fn status(&self) -> ChannelStatus {
        ChannelHandle::status(self)
    }

    fn send(&self, frame: ClientFrame) -> Result<(), ChannelError> {
        ChannelHandle::send(self, frame)
    }
}

/// Client-side view of one conversation session.
///
/// Owns the transcript and the session snapshot exclusively; everything else
/// observes them through the accessors. All methods are synchronous: the
/// caller (normally [`drive`](crate::runner::drive)) serializes user actions
/// and transport events onto one logical task queue, so no locking happens
/// here.
pub struct ConversationClient<C: ChatChannel> {
    user_id: String,
    channel: C,
    notifications: mpsc::UnboundedSender<Notification>,
    photos: Vec<PhotoContext>,
    current_photo: usize,
    session: Option<Session>,
    /// Session id used in outbound frames. Cleared by `end_session` so a
    /// late server frame cannot resurrect a finished session.
    wire_session_id: Option<String>,
    messages: Vec<Message>,
    readiness: Readiness,
    typing: bool,
    last_error: Option<String>,
    /// Texts accumulated while disconnected, flushed strictly FIFO on the
    /// next successful reconnection and never by a timer.
    retry_queue: VecDeque<String>,
    complete_notified: bool,
    next_id: u64,
}

impl<C: ChatChannel> ConversationClient<C> {
    /// Creates a client bound to `channel`, returning the notification
    /// stream for the presentation layer.
    pub fn new(
        user_id: impl Into<String>,
        channel: C,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (notifications, notification_rx) = mpsc::unbounded_channel();
        (
            Self {
                user_id: user_id.into(),
                channel,
                notifications,
                photos: Vec::new(),
                current_photo: 0,
                session: None,
                wire_session_id: None,
                messages: Vec::new(),
                readiness: Readiness::Idle,
                typing: false,
                last_error: None,
                retry_queue: VecDeque::new(),
                complete_notified: false,
                next_id: 0,
            },
            notification_rx,
        )
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn current_photo(&self) -> Option<&PhotoContext> {
        self.photos.get(self.current_photo)
    }

    pub fn queued_message_count(&self) -> usize {
        self.retry_queue.len()
    }

    /// Starts a new session over `photos`, fully replacing any prior one.
    ///
    /// Resets the transcript, synthesizes the welcome message, and does not
    /// require the channel to be connected.
    pub fn start_session(&mut self, photos: Vec<PhotoContext>) {
        let session = Session::new(&self.user_id, photos.iter().map(|p| p.id.clone()).collect());
        debug!(
            target: "chat.session",
            session_id = %session.session_id,
            photos = photos.len(),
            "starting session"
        );
        self.wire_session_id = Some(session.session_id.clone());
        self.session = Some(session);
        self.photos = photos;
        self.current_photo = 0;
        self.messages.clear();
        self.retry_queue.clear();
        self.typing = false;
        self.last_error = None;
        self.complete_notified = false;
        self.readiness = Readiness::AwaitingSession;

        let mut metadata = Map::new();
        metadata.insert("conversation_type".into(), Value::String("welcome".into()));
        let welcome = self.synthesize(
            Role::Assistant,
            WELCOME_TEXT,
            Some(ResponseKind::PhotoConversation),
            metadata,
        );
        self.messages.push(welcome);
    }

    /// Sends a user message, appending it to the transcript immediately.
    ///
    /// Empty or whitespace-only input is a no-op. While disconnected the
    /// text goes on the retry queue instead of failing: delivery is
    /// deferred, not refused.
    pub fn send_message(&mut self, content: &str) {
        let text = content.trim();
        if text.is_empty() {
            return;
        }

        let message = self.synthesize(Role::User, text, None, Map::new());
        self.messages.push(message);
        if let Some(session) = &mut self.session {
            session.touch();
        }
        self.typing = true;

        if self.channel.status() != ChannelStatus::Connected {
            debug!(
                target: "chat.session",
                queued = self.retry_queue.len() + 1,
                "channel offline; deferring delivery"
            );
            self.retry_queue.push_back(text.to_string());
            self.typing = false;
            return;
        }

        if let Err(err) = self.transmit(text) {
            warn!(target: "chat.session", error = %err, "send failed; deferring delivery");
            self.retry_queue.push_back(text.to_string());
            self.typing = false;
        }
    }

    /// Ends the session locally: synthesizes the farewell, marks the session
    /// complete, and clears the outbound session-id reference. No server
    /// acknowledgement is needed.
    pub fn end_session(&mut self) {
        if self.session.is_none() {
            return;
        }
        let farewell = self.synthesize(
            Role::System,
            SESSION_ENDED_TEXT,
            Some(ResponseKind::EvaluationComplete),
            Map::new(),
        );
        self.messages.push(farewell);
        if let Some(session) = &mut self.session {
            session.is_complete = true;
            session.touch();
        }
        self.wire_session_id = None;
        self.readiness = Readiness::Ended;
        debug!(target: "chat.session", "session ended locally");
    }

    /// Selects which photo is current for display and for the next outbound
    /// frame. Out-of-range indices are absorbed as a no-op.
    pub fn select_photo(&mut self, index: usize) {
        if index >= self.photos.len() {
            trace!(target: "chat.session", index, "photo index out of range");
            return;
        }
        self.current_photo = index;
    }

    /// Feeds one transport status transition into the machine.
    pub fn on_status(&mut self, status: ChannelStatus) {
        match status {
            ChannelStatus::Connected => self.flush_retry_queue(),
            ChannelStatus::Disconnected | ChannelStatus::Error => self.typing = false,
            ChannelStatus::Connecting => {}
        }
    }

    /// Reconciles one inbound frame into local state.
    pub fn on_event(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::ConversationResponse(response) => self.on_response(response),
            ServerFrame::ConversationError(error) => self.on_error(error),
            ServerFrame::UserJoined(event) | ServerFrame::UserLeft(event) => {
                trace!(target: "chat.session", user = ?event.user_id, "room membership event");
            }
            ServerFrame::Pong => trace!(target: "chat.session", "keep-alive reply"),
            ServerFrame::Unknown => {
                debug!(target: "chat.session", "ignoring unknown event kind");
            }
        }
    }

    fn on_response(&mut self, response: ConversationResponse) {
        let id = self.next_message_id("assistant");
        let kind = response
            .response_type
            .as_deref()
            .and_then(ResponseKind::parse);
        self.messages.push(Message {
            id,
            role: Role::Assistant,
            content: response.content,
            timestamp: response
                .timestamp
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
            response_kind: kind,
            metadata: response.metadata,
        });
        self.typing = false;

        let Some(session) = &mut self.session else {
            return;
        };
        if let Some(info) = &response.session_info {
            session.apply(info);
            if self.readiness == Readiness::AwaitingSession {
                self.readiness = Readiness::Live;
            }
            if self.wire_session_id.is_some() {
                if let Some(server_id) = &info.session_id {
                    self.wire_session_id = Some(server_id.clone());
                }
            }
            if session.is_complete && !self.complete_notified {
                self.complete_notified = true;
                let _ = self
                    .notifications
                    .send(Notification::SessionComplete(session.clone()));
            }
        } else {
            session.touch();
        }
    }

    fn on_error(&mut self, error: ConversationError) {
        self.typing = false;
        if let Some(session) = &mut self.session {
            session.touch();
        }
        let text = error
            .error
            .or(error.content)
            .unwrap_or_else(|| "unknown conversation error".to_string());
        warn!(target: "chat.session", error = %text, "server reported conversation error");
        self.last_error = Some(text.clone());
        let _ = self
            .notifications
            .send(Notification::ConversationError(text));
    }

    /// Replays queued texts in FIFO order, transmit-only: the transcript
    /// already holds them from the optimistic append, so a replay must never
    /// duplicate log entries.
    fn flush_retry_queue(&mut self) {
        if self.retry_queue.is_empty() {
            return;
        }
        debug!(
            target: "chat.session",
            queued = self.retry_queue.len(),
            "replaying deferred messages"
        );
        while let Some(text) = self.retry_queue.pop_front() {
            if let Err(err) = self.transmit(&text) {
                warn!(target: "chat.session", error = %err, "replay failed; keeping remainder queued");
                self.retry_queue.push_front(text);
                break;
            }
        }
    }

    fn transmit(&self, text: &str) -> Result<(), ChannelError> {
        self.channel
            .send(ClientFrame::ChatMessage(self.chat_payload(text)))
    }

    fn chat_payload(&self, text: &str) -> ChatMessage {
        let history_start = self.messages.len().saturating_sub(HISTORY_LIMIT);
        ChatMessage {
            content: text.to_string(),
            session_id: self.wire_session_id.clone(),
            user_id: self.user_id.clone(),
            photo_context: self.current_photo().map(PhotoContext::context_text),
            photo_ids: self
                .session
                .as_ref()
                .map(|s| s.photo_ids.clone())
                .unwrap_or_default(),
            conversation_history: self.messages[history_start..]
                .iter()
                .map(Message::history_entry)
                .collect(),
            cist_progress: self
                .session
                .as_ref()
                .map(Session::progress_wire)
                .unwrap_or_default(),
            cist_scores: self
                .session
                .as_ref()
                .map(Session::scores_wire)
                .unwrap_or_default(),
            turn_count: self.session.as_ref().map(|s| s.turn_count).unwrap_or(0),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn synthesize(
        &mut self,
        role: Role,
        content: &str,
        response_kind: Option<ResponseKind>,
        metadata: Map<String, Value>,
    ) -> Message {
        let label = match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        Message {
            id: self.next_message_id(label),
            role,
            content: content.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            response_kind,
            metadata,
        }
    }

    fn next_message_id(&mut self, label: &str) -> String {
        self.next_id += 1;
        format!("msg_{}_{}", label, self.next_id)
    }
}
