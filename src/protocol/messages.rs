//! Wire message types exchanged with the persona server.
//!
//! The websocket transport itself is out of scope here; these types
//! describe the payloads a [`super::client::ServerClient`] sends and
//! receives over whatever duplex channel the transport provides.

use bytes::Bytes;

/// Parameters accompanying an [`InteractionInput`].
#[derive(Debug, Clone)]
pub struct InteractionInputParams {
    /// Lookahead frame index the server should assume the client is about
    /// to display (`played_frame_idx + extra_frames_lat`). Absent on the
    /// idle-priming request.
    pub client_frame_index: Option<i64>,
    pub filter_amount: f32,
    pub mouth_opening_scale: f32,
    /// Set on the idle-priming request sent right after `start_interaction`.
    pub generate_idle_frames: bool,
}

/// Client -> server: audio input for the current interaction.
#[derive(Debug, Clone)]
pub struct InteractionInput {
    pub audio_int16_bytes: Bytes,
    pub params: InteractionInputParams,
}

/// Client -> server: cancels the current interaction.
///
/// No handle is required — the server associates the cancellation with the
/// connection's current session.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelInteraction;

/// Server -> client: the persona server is ready for a new session.
#[derive(Debug, Clone, Copy)]
pub struct SessionReady {
    /// Whether the idle loop should be played back with ping-pong mirroring.
    /// Defaults to mirrored when the server omits the parameter.
    pub is_mirrored_loop: bool,
}

impl Default for SessionReady {
    fn default() -> Self {
        Self {
            is_mirrored_loop: true,
        }
    }
}

/// Server -> client: one produced frame, either an idle frame (while
/// `Initializing`) or a speech frame bundled with audio.
#[derive(Debug, Clone)]
pub struct InteractionResponse {
    pub index: u64,
    pub video_frame_bytes: Bytes,
    pub audio_bytes: Bytes,
    pub is_final_response: bool,
}

/// Server -> client: an error occurred processing the current interaction.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub code: String,
}

/// Envelope for any message the server may send.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    SessionReady(SessionReady),
    InteractionResponse(InteractionResponse),
    ErrorResponse(ErrorResponse),
}

/// Envelope for any message the client may send.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    InteractionInput(InteractionInput),
    CancelInteraction(CancelInteraction),
}
