//! Reconnecting real-time channel to the conversation server.
//!
//! One [`Channel`] owns one WebSocket connection and the supervisor task
//! that keeps it alive: automatic reconnection with capped exponential
//! backoff, a periodic keep-alive probe, and JSON marshalling in both
//! directions. The channel knows nothing about conversation semantics;
//! decoded inbound frames are handed to the session layer through typed
//! event streams.

pub mod channel;
pub mod config;
pub mod error;

pub use channel::{Channel, ChannelEvents, ChannelHandle, ChannelStatus, reconnect_delay};
pub use config::{ChannelConfig, Identity};
pub use error::ChannelError;
