//! Connection: transport ownership and the connection state machine.
//!
//! A dedicated I/O thread is the sole reader and writer of the WebSocket.
//! Outgoing frames from any caller thread are queued to it over a
//! channel; incoming frames are decoded and handed to a [`FrameSink`]
//! synchronously on the I/O thread. Clock-sync pings ride the same loop.

mod state;
mod transport;

pub use state::ConnectionStatus;
pub use transport::{Connection, FrameSink};
