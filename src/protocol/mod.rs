//! Wire protocol of the speech WebSocket
//!
//! - `messages`: inbound frames and JSON control frames in both directions
//! - `sink`: the outbound half of a connection, with best-effort delivery

pub mod messages;
pub mod sink;

pub use messages::{ClientMessage, InboundFrame, ServerMessage};
pub use sink::{notify, ChannelSink, EventSink};
