//! Interrupt protocol.
//!
//! The eager `Idle` transition happens without waiting for the server's
//! cancel acknowledgement: user-perceived latency between
//! intent-to-interrupt and idle behavior dominates, and any stale response
//! frames still in flight are filtered by the dispatcher discarding
//! non-matching-state responses while `Idle`.

use crate::fsm::PersonaState;
use crate::protocol::{CancelInteraction, ClientMessage, ServerClient};
use crate::state::PersonaShared;

/// Runs the five-step interrupt sequence in response to an external
/// `StartInterruption`.
///
/// A no-op while `Initializing` (`Any -> Interrupting` fires only while
/// state ≠ `Initializing`). Otherwise always sends `CancelInteraction` and
/// round-trips through `Interrupting` back to `Idle` — including when
/// already `Idle`, where it leaves no client-observable state change.
pub async fn handle_interrupt(shared: &PersonaShared, client: &dyn ServerClient) {
    if shared.fsm.state() == PersonaState::Initializing {
        log::debug!("[Interrupt] StartInterruption ignored while Initializing");
        return;
    }

    client
        .send_message(ClientMessage::CancelInteraction(CancelInteraction))
        .await;
    shared.fsm.transition(PersonaState::Interrupting);
    shared.speech_buffer.lock().clear();
    shared.pending_audio.lock().clear();
    shared.fsm.transition(PersonaState::Idle);
}
