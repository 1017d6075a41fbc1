//! Engine configuration.
//!
//! Supports construction from any source (file, environment, hardcoded
//! defaults) — loading itself is the caller's responsibility; CLI parsing
//! and environment resolution live outside this crate.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Output frame rate of the playback clock.
pub const TARGET_FPS: u32 = 25;

/// Sample rate the server and playback clock operate at.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// `filter_amount` sent with speech audio.
pub const SPEECH_FILTER_AMOUNT: f32 = 1000.0;

/// `filter_amount` sent with the idle-priming request.
pub const IDLE_FILTER_AMOUNT: f32 = 1000.0;

/// `mouth_opening_scale` sent with the idle-priming request.
pub const IDLE_MOUTH_OPENING_SCALE: f32 = 0.0;

/// `mouth_opening_scale` sent with speech audio.
pub const SPEECH_MOUTH_OPENING_SCALE: f32 = 1.0;

/// Configuration for the persona streaming engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Credential for the persona server.
    pub api_key: String,

    /// Persona server websocket endpoint.
    pub ws_url: String,

    /// Bounded retries for initial connection.
    pub client_connect_max_retries: u32,

    /// Inter-retry pause, in seconds.
    pub client_reconnect_delay_secs: f64,

    /// Identifies the avatar on the server.
    pub persona_config_id: String,

    /// Advertised output frame dimensions, `(width, height)`.
    pub image_size: (u32, u32),

    /// Whether raw TTS audio is forwarded downstream in addition to the
    /// server-bundled audio (diagnostic mode).
    pub tts_audio_passthrough: bool,

    /// Lookahead, in frames, added to `played_frame_idx` when computing
    /// `client_frame_index`.
    pub extra_frames_lat: i64,

    /// Optional alternate server mode, plumbed through to the server client
    /// adapter. The engine itself never reads environment variables — the
    /// caller resolves this and passes it in.
    pub server_mode: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            ws_url: String::new(),
            client_connect_max_retries: 3,
            client_reconnect_delay_secs: 3.0,
            persona_config_id: String::new(),
            image_size: (1920, 1080),
            tts_audio_passthrough: false,
            extra_frames_lat: 15,
            server_mode: None,
        }
    }
}

impl EngineConfig {
    /// Validates configuration values that would otherwise cause confusing
    /// runtime behavior.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if any value is out of range.
    pub fn validate(&self) -> EngineResult<()> {
        if self.client_connect_max_retries == 0 {
            return Err(EngineError::Config(
                "client_connect_max_retries must be >= 1".to_string(),
            ));
        }
        if self.client_reconnect_delay_secs < 0.0 {
            return Err(EngineError::Config(
                "client_reconnect_delay_secs must be >= 0".to_string(),
            ));
        }
        if self.extra_frames_lat < 0 {
            return Err(EngineError::Config(
                "extra_frames_lat must be >= 0".to_string(),
            ));
        }
        if self.image_size.0 == 0 || self.image_size.1 == 0 {
            return Err(EngineError::Config(
                "image_size dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
