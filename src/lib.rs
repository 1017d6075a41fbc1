//! Persona Stream Engine - client-side real-time avatar streaming engine.
//!
//! Drives the playback clock, jitter buffer, and interaction lifecycle for
//! a lip-synced persona talking to a remote video-generation server over a
//! typed [`protocol::ServerClient`] adapter. The engine has no `main`, does
//! not parse CLI arguments or load environment variables, and does not
//! implement the websocket transport itself — those are the embedding
//! application's responsibility.
//!
//! # Architecture
//!
//! - [`config`]: engine configuration and its tunable constants
//! - [`error`]: centralized error types
//! - [`frames`]: the data model and the upstream/downstream frame contract
//! - [`protocol`]: wire message shapes and the [`protocol::ServerClient`] seam
//! - [`resampler`]: pure PCM resampling to the server's target rate
//! - [`idle_cache`]: the mirrored idle-animation frame cache
//! - [`jitter_buffer`]: the ordered speech-frame queue
//! - [`fsm`]: the persona state machine
//! - [`ingress`]: resamples and queues incoming TTS audio
//! - [`playback_clock`]: the 25 fps image/audio emission loop
//! - [`connect`]: bounded-retry connection supervisor
//! - [`dispatcher`]: the long-running server-message handling task
//! - [`interrupt`]: the interrupt-and-resume-idle sequence
//! - [`state`]: [`state::PersonaShared`], the bundle of state the
//!   cooperative tasks above share
//! - [`engine`]: [`engine::PersonaEngine`], the public entry point wiring
//!   everything together
//!
//! # Abstraction traits
//!
//! - [`runtime::TaskSpawner`]: spawning background tasks without hardcoding
//!   `tokio::spawn`
//! - [`protocol::ServerClient`]: the server connection, injected rather than
//!   constructed here

pub mod config;
pub mod connect;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod frames;
pub mod fsm;
pub mod idle_cache;
pub mod ingress;
pub mod interrupt;
pub mod jitter_buffer;
pub mod metrics;
pub mod playback_clock;
pub mod protocol;
pub mod resampler;
pub mod runtime;
pub mod state;

pub use config::EngineConfig;
pub use engine::PersonaEngine;
pub use error::{ConnectError, EngineError, EngineResult, ServerErrorCode};
pub use frames::{DownstreamFrame, InteractionHandle, UpstreamFrame};
pub use fsm::PersonaState;
pub use protocol::{ClientMessage, ServerClient, ServerMessage};
pub use runtime::{TaskSpawner, TokioSpawner};
