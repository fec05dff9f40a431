//! Transport error type.

use thiserror::Error;

/// Failures surfaced to callers of the channel handle.
///
/// Connection-level failures (refused connects, abnormal closes, undecodable
/// frames) are not represented here: those recover locally through the
/// reconnect policy and reach the caller only as status changes.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(String),

    /// A send was attempted while the channel was not connected. The channel
    /// does not queue on the caller's behalf; deferred delivery is owned by
    /// the session layer.
    #[error("channel is not connected")]
    NotConnected,

    /// The supervisor task has shut down and no further commands can be
    /// delivered.
    #[error("channel has shut down")]
    Closed,
}
