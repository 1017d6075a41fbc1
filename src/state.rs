//! Shared session state.
//!
//! Bundles every structure the cooperative tasks (ingress, playback clock,
//! dispatcher, interrupt handler) touch, behind `Arc` so it is cloned
//! cheaply into each task. Each field's single-writer discipline is
//! documented at the field.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::fsm::PersonaFsm;
use crate::frames::InteractionHandle;
use crate::idle_cache::IdleFrameCache;
use crate::jitter_buffer::SpeechJitterBuffer;
use crate::metrics::FpsTracker;

/// Sentinel for "no frame played/queued yet".
pub const NO_FRAME_YET: i64 = -1;

/// All mutable state shared between the engine's cooperative tasks.
pub struct PersonaShared {
    /// Engine-wide configuration, immutable for the session.
    pub config: EngineConfig,

    /// Single source of truth for the persona state. Writes only through
    /// `fsm.transition`.
    pub fsm: PersonaFsm,

    /// Written only by the dispatcher during `Initializing`; read only by
    /// the playback clock once `Idle` is reached.
    pub idle_cache: RwLock<IdleFrameCache>,

    /// Written by the dispatcher (enqueue) and the interrupt handler
    /// (clear); read and popped only by the playback clock.
    pub speech_buffer: Mutex<SpeechJitterBuffer>,

    /// Pending audio awaiting the next send cycle. Written by the ingress
    /// pipeline, drained atomically by the audio-sender task.
    pub pending_audio: Mutex<Vec<u8>>,

    /// Signaled whenever `pending_audio` becomes non-empty, so the
    /// audio-sender task can block until there is work instead of polling.
    pub pending_audio_notify: Notify,

    /// The currently-valid interaction handle. Responses not tagged with
    /// this handle are discarded. Written by the dispatcher and the
    /// interrupt handler.
    pub handle: RwLock<Option<InteractionHandle>>,

    /// Whether the idle loop plays back with ping-pong mirroring
    /// (`SessionReady.is_mirrored_loop`). Set once by the dispatcher before
    /// any idle frames are cached.
    pub is_mirrored_loop: AtomicBool,

    /// The frame index the server should assume the client is about to
    /// display. Sole writer: the playback clock. Readers: the ingress
    /// pipeline and audio-sender task, to compute `client_frame_index`.
    pub played_frame_idx: AtomicI64,

    /// Frame index of the most recently enqueued speech frame. Sole writer:
    /// the dispatcher.
    pub last_queued_frame_idx: AtomicI64,

    /// Count of speech frames played since the last `Idle` entry. Sole
    /// writer: the playback clock, which resets it to 0 whenever it
    /// observes a transition into `Idle`.
    pub num_speech_frames_played: AtomicU64,

    /// Diagnostic tick-rate tracker, started by the dispatcher on
    /// `SessionReady` and fed by the playback clock.
    pub metrics: FpsTracker,

    /// Signaled once to tear down every cooperative task of a session:
    /// dispatcher, audio sender, upstream loop, playback clock.
    pub shutdown: CancellationToken,
}

impl PersonaShared {
    /// Creates a fresh session state for a new connection.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let (fsm, _rx) = PersonaFsm::new();
        Self {
            config,
            fsm,
            idle_cache: RwLock::new(IdleFrameCache::new(true)),
            speech_buffer: Mutex::new(SpeechJitterBuffer::new()),
            pending_audio: Mutex::new(Vec::new()),
            pending_audio_notify: Notify::new(),
            handle: RwLock::new(None),
            is_mirrored_loop: AtomicBool::new(true),
            played_frame_idx: AtomicI64::new(NO_FRAME_YET),
            last_queued_frame_idx: AtomicI64::new(NO_FRAME_YET),
            num_speech_frames_played: AtomicU64::new(0),
            metrics: FpsTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Computes the lookahead index sent as `client_frame_index` on any
    /// outbound audio message: `played_frame_idx + extra_frames_lat`.
    #[must_use]
    pub fn lookahead_frame_index(&self) -> i64 {
        self.played_frame_idx.load(Ordering::Acquire) + self.config.extra_frames_lat
    }

    /// Resets the idle cache for a brand-new session: the idle cache is
    /// populated exactly once per session, and a subsequent `Initializing`
    /// entry restarts the session from scratch.
    pub fn reset_idle_cache(&self, mirrored: bool) {
        *self.idle_cache.write() = IdleFrameCache::new(mirrored);
        self.is_mirrored_loop.store(mirrored, Ordering::Release);
    }
}
