//! The reconnecting WebSocket channel and its supervisor task.
//!
//! # Architecture
//!
//! [`Channel::connect`] spawns a single supervisor task that owns the socket
//! for its whole life: connect, read/write, keep-alive, backoff, reconnect.
//! Callers interact through two halves:
//!
//! * [`ChannelHandle`] - issues sends and lifecycle commands over an
//!   in-process command channel.
//! * [`ChannelEvents`] - typed event streams, one per event kind: a `watch`
//!   channel for connectivity status and an `mpsc` channel for decoded
//!   inbound frames.
//!
//! The supervisor never parks a failure inside a callback: every outcome is
//! either a status transition or a dropped frame with a diagnostic.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use memora_protocol::{ClientFrame, ServerFrame};

use crate::config::ChannelConfig;
use crate::error::ChannelError;

/// Observable connectivity state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    /// Construction failed (malformed endpoint). The channel stays parked
    /// here until an explicit [`ChannelHandle::reconnect`].
    Error,
}

/// Delay before the next automatic reconnect attempt: `base * 2^attempt`,
/// capped at `max`.
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

enum Command {
    Send(ClientFrame),
    Disconnect,
    Reconnect,
}

/// Handle for issuing sends and lifecycle commands to a running channel.
///
/// Cheap to clone. Dropping the last handle tears the supervisor down:
/// the socket is closed and any pending reconnect timer is cancelled.
#[derive(Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChannelStatus>,
}

impl ChannelHandle {
    /// Current connectivity status.
    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    /// Serializes and transmits a frame if the channel is connected.
    ///
    /// This layer deliberately does not queue: a send while disconnected is
    /// a [`ChannelError::NotConnected`] the caller must handle (the session
    /// layer owns deferred delivery).
    pub fn send(&self, frame: ClientFrame) -> Result<(), ChannelError> {
        if self.status() != ChannelStatus::Connected {
            return Err(ChannelError::NotConnected);
        }
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| ChannelError::Closed)
    }

    /// User-initiated disconnect: closes with a normal-closure code, cancels
    /// any pending reconnect timer, and suppresses automatic reconnection
    /// until [`reconnect`](Self::reconnect) is called.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Re-enables automatic reconnection, resets the attempt counter, and
    /// forces a fresh connect cycle even if the channel is torn down.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }
}

/// Event streams surfaced by a channel, one per event kind.
pub struct ChannelEvents {
    /// Connectivity transitions. `watch` semantics: observers see the latest
    /// status, intermediate flaps may coalesce.
    pub status: watch::Receiver<ChannelStatus>,
    /// Decoded inbound frames, in transport arrival order.
    pub inbound: mpsc::UnboundedReceiver<ServerFrame>,
}

/// A real-time channel to one conversation server endpoint.
pub struct Channel;

impl Channel {
    /// Spawns the supervisor task and begins the first connect cycle.
    ///
    /// Construction itself cannot fail: a malformed endpoint surfaces as the
    /// [`ChannelStatus::Error`] status rather than an early return, so the
    /// caller's wiring is the same either way.
    pub fn connect(config: ChannelConfig) -> (ChannelHandle, ChannelEvents) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let supervisor = Supervisor {
            config,
            commands: command_rx,
            status: status_tx,
            inbound: inbound_tx,
            attempts: 0,
        };
        tokio::spawn(supervisor.run());

        (
            ChannelHandle {
                commands: command_tx,
                status: status_rx.clone(),
            },
            ChannelEvents {
                status: status_rx,
                inbound: inbound_rx,
            },
        )
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why an established connection ended.
enum SessionEnd {
    UserDisconnect,
    UserReconnect,
    Lost,
    HandleDropped,
}

/// How a backoff wait ended.
enum Backoff {
    Elapsed,
    Reconnect,
    Cancelled,
    HandleDropped,
}

/// What woke the supervisor out of the parked state.
enum Parked {
    Reconnect,
    HandleDropped,
}

struct Supervisor {
    config: ChannelConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ChannelStatus>,
    inbound: mpsc::UnboundedSender<ServerFrame>,
    attempts: u32,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            self.set_status(ChannelStatus::Connecting);

            let url = match self.config.connect_url() {
                Ok(url) => url,
                Err(err) => {
                    warn!(target: "chat.transport", error = %err, "cannot build endpoint url");
                    self.set_status(ChannelStatus::Error);
                    match self.park().await {
                        Parked::Reconnect => {
                            self.attempts = 0;
                            continue;
                        }
                        Parked::HandleDropped => return,
                    }
                }
            };

            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    debug!(target: "chat.transport", endpoint = %url, "connected");
                    self.attempts = 0;
                    self.set_status(ChannelStatus::Connected);
                    match self.drive(stream).await {
                        SessionEnd::UserDisconnect => {
                            self.set_status(ChannelStatus::Disconnected);
                            match self.park().await {
                                Parked::Reconnect => {
                                    self.attempts = 0;
                                    continue;
                                }
                                Parked::HandleDropped => return,
                            }
                        }
                        SessionEnd::UserReconnect => {
                            self.attempts = 0;
                            continue;
                        }
                        SessionEnd::Lost => {
                            self.set_status(ChannelStatus::Disconnected);
                        }
                        SessionEnd::HandleDropped => {
                            self.set_status(ChannelStatus::Disconnected);
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(target: "chat.transport", error = %err, "connect failed");
                    self.set_status(ChannelStatus::Disconnected);
                }
            }

            if !self.config.auto_reconnect || self.attempts >= self.config.max_reconnect_attempts {
                debug!(
                    target: "chat.transport",
                    attempts = self.attempts,
                    "automatic reconnection exhausted; parked until explicit reconnect"
                );
                match self.park().await {
                    Parked::Reconnect => {
                        self.attempts = 0;
                        continue;
                    }
                    Parked::HandleDropped => return,
                }
            }

            let delay = reconnect_delay(
                self.attempts,
                self.config.reconnect_base_delay,
                self.config.reconnect_max_delay,
            );
            self.attempts += 1;
            debug!(
                target: "chat.transport",
                attempt = self.attempts,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            match self.backoff(delay).await {
                Backoff::Elapsed => {}
                Backoff::Reconnect => self.attempts = 0,
                Backoff::Cancelled => match self.park().await {
                    Parked::Reconnect => self.attempts = 0,
                    Parked::HandleDropped => return,
                },
                Backoff::HandleDropped => return,
            }
        }
    }

    /// Services one established connection until it ends.
    async fn drive(&mut self, stream: WsStream) -> SessionEnd {
        let (mut sink, mut source) = stream.split();
        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(frame)) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(err) => {
                                warn!(target: "chat.transport", error = %err, "dropping unserializable frame");
                                continue;
                            }
                        };
                        if let Err(err) = sink.send(WsMessage::Text(text)).await {
                            warn!(target: "chat.transport", error = %err, "send failed; connection lost");
                            return SessionEnd::Lost;
                        }
                    }
                    Some(Command::Disconnect) => {
                        let _ = sink
                            .send(WsMessage::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "user disconnect".into(),
                            })))
                            .await;
                        return SessionEnd::UserDisconnect;
                    }
                    Some(Command::Reconnect) => {
                        let _ = sink.close().await;
                        return SessionEnd::UserReconnect;
                    }
                    None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        return SessionEnd::HandleDropped;
                    }
                },
                message = source.next() => match message {
                    Some(Ok(WsMessage::Text(text))) => self.forward(&text),
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = sink.send(WsMessage::Pong(payload)).await;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(target: "chat.transport", frame = ?frame, "server closed connection");
                        return SessionEnd::Lost;
                    }
                    // Binary and pong frames are not part of this protocol.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(target: "chat.transport", error = %err, "read failed; connection lost");
                        return SessionEnd::Lost;
                    }
                    None => return SessionEnd::Lost,
                },
                _ = ping.tick() => {
                    if let Ok(text) = serde_json::to_string(&ClientFrame::Ping) {
                        if let Err(err) = sink.send(WsMessage::Text(text)).await {
                            warn!(target: "chat.transport", error = %err, "keep-alive send failed");
                            return SessionEnd::Lost;
                        }
                        trace!(target: "chat.transport", "keep-alive probe sent");
                    }
                }
            }
        }
    }

    /// Decodes one inbound text frame. Undecodable payloads are dropped with
    /// a diagnostic; they never close the connection.
    fn forward(&self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => {
                if self.inbound.send(frame).is_err() {
                    debug!(target: "chat.transport", "inbound receiver dropped");
                }
            }
            Err(err) => {
                warn!(target: "chat.transport", error = %err, "dropping undecodable frame");
            }
        }
    }

    /// Waits out a reconnect delay while staying responsive to commands.
    async fn backoff(&mut self, delay: Duration) -> Backoff {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Backoff::Elapsed,
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => return Backoff::Reconnect,
                    Some(Command::Disconnect) => return Backoff::Cancelled,
                    Some(Command::Send(_)) => {
                        warn!(target: "chat.transport", "dropping send while disconnected");
                    }
                    None => return Backoff::HandleDropped,
                },
            }
        }
    }

    /// Waits in the torn-down state for an explicit reconnect.
    async fn park(&mut self) -> Parked {
        loop {
            match self.commands.recv().await {
                Some(Command::Reconnect) => return Parked::Reconnect,
                Some(Command::Disconnect) => {}
                Some(Command::Send(_)) => {
                    warn!(target: "chat.transport", "dropping send while disconnected");
                }
                None => return Parked::HandleDropped,
            }
        }
    }

    fn set_status(&self, status: ChannelStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                trace!(target: "chat.transport", from = ?current, to = ?status, "status change");
                *current = status;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Identity;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_millis(30_000);
        assert_eq!(reconnect_delay(0, base, max), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(1, base, max), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(2, base, max), Duration::from_millis(4000));
        assert_eq!(reconnect_delay(3, base, max), Duration::from_millis(8000));
        assert_eq!(reconnect_delay(4, base, max), Duration::from_millis(16_000));
        assert_eq!(reconnect_delay(5, base, max), Duration::from_millis(30_000));
        assert_eq!(reconnect_delay(20, base, max), Duration::from_millis(30_000));
        // Shift widths past 63 must not wrap.
        assert_eq!(reconnect_delay(70, base, max), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn send_while_not_connected_is_rejected() {
        let config = ChannelConfig::new("ws://127.0.0.1:1/ws", Identity::new("alice"))
            .with_auto_reconnect(false);
        let (handle, _events) = Channel::connect(config);
        // Port 1 refuses immediately; regardless of timing the status is
        // never Connected, so the send must fail without queueing.
        let result = handle.send(ClientFrame::Ping);
        assert!(matches!(result, Err(ChannelError::NotConnected)));
    }

    #[tokio::test]
    async fn malformed_endpoint_parks_in_error_status() {
        let config = ChannelConfig::new("not a url", Identity::new("alice"));
        let (_handle, mut events) = Channel::connect(config);
        while *events.status.borrow() != ChannelStatus::Error {
            events.status.changed().await.unwrap();
        }
    }
}
