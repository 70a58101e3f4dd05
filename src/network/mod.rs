//! Network Module Implementation
//!
//! Wire-level pieces of the chat transport: the frame codec and the read side
//! of a TCP connection.
//!
//! # Components
//!
//! - `MessageCodec`: encodes and decodes a `Message` to and from its frame
//! - `MessageFrame`: cuts delimited frames out of the inbound buffer
//! - `Connection`: reads frames from a TCP stream into a reusable buffer
//!
//! # Frame Format
//!
//! A 17-byte fixed header (kind, identifier, timestamp) followed by the
//! newline-terminated content. There is no length prefix; the first newline
//! after the header ends the frame.

pub use codec::MessageCodec;
pub use connection::Connection;
pub use frame::MessageFrame;
mod codec;
mod connection;
mod frame;
