//! Wire types for the Memora conversation protocol.
//!
//! This crate contains the serde-serializable types used for communication
//! with the conversation server over its JSON-over-WebSocket channel. These
//! types represent the "protocol layer" - the shapes of data as they appear
//! on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with protocol: Match the server's frame schema
//! * Forward compatible: Unknown inbound frame kinds decode to an explicit
//!   catch-all variant, and open-ended metadata is carried verbatim
//!
//! The reconnecting channel and the session state machine are built on top
//! of these types in `memora-transport` and `memora-client`.

pub mod frames;
pub mod session;

pub use frames::*;
pub use session::*;
