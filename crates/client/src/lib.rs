//! Client-side core of the photo conversation assessment flow.
//!
//! The conversation client tracks one multi-turn session at a time. Local
//! state splits into two clearly separated regions:
//!
//! * a locally-owned, append-only transcript, mutated optimistically the
//!   moment the user acts, and
//! * server-owned session fields (turn count, lifecycle, assessment maps),
//!   touched only by the reconciliation function at the inbound-event
//!   boundary.
//!
//! The client never invents assessment results: it is a faithful mirror of
//! whatever the server last reported. Transient disconnection is masked by
//! a FIFO retry queue flushed on reconnection.

pub mod client;
pub mod fake;
pub mod message;
pub mod runner;
pub mod session;

pub use client::{ChatChannel, ConversationClient, Notification, PhotoContext, Readiness};
pub use fake::FakeChannel;
pub use message::Message;
pub use runner::{Action, drive};
pub use session::Session;
