//! WebSocket Session Management
//!
//! Each WebSocket connection is one conversation session:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the connection lifecycle and relays between the socket
//!   and the session's orchestrator.

pub mod protocol;
pub mod session;

pub use session::ws_handler;
