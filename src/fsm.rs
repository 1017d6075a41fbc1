//! Persona finite-state machine.

use tokio::sync::watch;

/// States the persona session moves through. No terminal state — the
/// session ends via external close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaState {
    /// Caching idle frames from the server.
    Initializing,
    /// Playing the idle animation loop.
    Idle,
    /// Playing speech frames as they arrive.
    Speaking,
    /// Interrupting in-flight speech.
    Interrupting,
}

impl std::fmt::Display for PersonaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "Initializing",
            Self::Idle => "Idle",
            Self::Speaking => "Speaking",
            Self::Interrupting => "Interrupting",
        };
        f.write_str(s)
    }
}

/// Owns the single source of truth for [`PersonaState`].
///
/// Writes happen only through [`PersonaFsm::transition`], which is the
/// single designated owner; any task may cheaply observe the current value,
/// or subscribe to changes, via [`PersonaFsm::subscribe`].
pub struct PersonaFsm {
    tx: watch::Sender<PersonaState>,
}

impl PersonaFsm {
    /// Creates a new FSM, starting in `Initializing`.
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<PersonaState>) {
        let (tx, rx) = watch::channel(PersonaState::Initializing);
        (Self { tx }, rx)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> PersonaState {
        *self.tx.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PersonaState> {
        self.tx.subscribe()
    }

    /// Transitions to `new`. A same-state transition is a no-op. All
    /// transitions log old -> new.
    pub fn transition(&self, new: PersonaState) {
        let old = self.state();
        if old == new {
            return;
        }
        log::debug!("[FSM] PersonaState changed from {old} to {new}");
        // A send error means every receiver was dropped; harmless here since
        // `self.tx.borrow()` above remains the source of truth for `state()`.
        let _ = self.tx.send(new);
    }
}

impl Default for PersonaFsm {
    fn default() -> Self {
        Self::new().0
    }
}
