//! Server client adapter trait.
//!
//! The wire websocket client is assumed to provide typed send/receive and
//! an opaque interaction handle, and is injected rather than constructed
//! here, so it can be swapped for a scripted double in tests.

use async_trait::async_trait;

use crate::error::ConnectError;
use crate::frames::InteractionHandle;

use super::messages::{ClientMessage, ServerMessage};

/// Typed request/response adapter over a persistent duplex channel to the
/// persona server.
#[async_trait]
pub trait ServerClient: Send + Sync {
    /// Establishes the connection. May fail with a transient
    /// [`ConnectError::Transient`] (network refusal — retryable by
    /// [`crate::connect::connect_with_retry`]) or a fatal
    /// [`ConnectError::Fatal`] (protocol mismatch — not retryable).
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Starts a new interaction and returns the server-issued handle.
    async fn start_interaction(&self) -> InteractionHandle;

    /// Sends a message to the server.
    async fn send_message(&self, msg: ClientMessage);

    /// Receives the next message from the server, or `None` if the
    /// connection has no message ready without blocking further than the
    /// implementation's own polling cadence.
    async fn receive_message(&self) -> Option<ServerMessage>;

    /// Closes the connection.
    async fn close(&self);
}
