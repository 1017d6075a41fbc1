//! Top-level engine wiring.
//!
//! Owns [`PersonaShared`] and spawns the engine's cooperative tasks: the
//! message dispatcher (which itself spawns the playback clock once `Idle`
//! is reached), the audio-sender task (blocks on the pending-audio buffer),
//! and an upstream-frame loop that drives ingress and the interrupt
//! protocol. Shared state is `Arc`-bundled and cloned cheaply into each
//! task; tasks are spawned through [`TaskSpawner`] rather than a hardcoded
//! `tokio::spawn` so tests can run them on a deterministic executor.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::config::{EngineConfig, SPEECH_FILTER_AMOUNT, SPEECH_MOUTH_OPENING_SCALE};
use crate::connect::connect_with_retry;
use crate::dispatcher::run_dispatcher;
use crate::error::EngineResult;
use crate::frames::{DownstreamFrame, UpstreamFrame};
use crate::fsm::PersonaState;
use crate::ingress::handle_tts_audio;
use crate::interrupt::handle_interrupt;
use crate::protocol::{ClientMessage, InteractionInput, InteractionInputParams, ServerClient};
use crate::runtime::TaskSpawner;
use crate::state::PersonaShared;

/// Public handle to a running persona streaming session.
///
/// Constructed by [`PersonaEngine::start`], which connects (with retry)
/// before spawning any background task — a failed connect aborts session
/// start, and no dispatcher or clock is ever spawned for a session that
/// never connected.
pub struct PersonaEngine {
    shared: Arc<PersonaShared>,
    upstream_tx: mpsc::Sender<UpstreamFrame>,
    downstream_rx: Option<mpsc::Receiver<DownstreamFrame>>,
}

/// Capacity of the engine's public upstream/downstream channels.
const CHANNEL_CAPACITY: usize = 64;

impl PersonaEngine {
    /// Validates `config`, connects `client` (with retry), and spawns the
    /// engine's background tasks via `spawner`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation or the connect
    /// supervisor exhausts its retries; in the latter case a
    /// [`DownstreamFrame::End`] has already been pushed to whatever
    /// receiver the caller later takes with
    /// [`PersonaEngine::take_downstream_receiver`] — though since `start`
    /// itself failed, callers should simply abort rather than read it.
    pub async fn start<S>(
        config: EngineConfig,
        client: Arc<dyn ServerClient>,
        spawner: S,
    ) -> EngineResult<Self>
    where
        S: TaskSpawner + Clone + 'static,
    {
        config.validate()?;
        let shared = Arc::new(PersonaShared::new(config));

        let (downstream_tx, downstream_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (upstream_tx, upstream_rx) = mpsc::channel(CHANNEL_CAPACITY);

        connect_with_retry(client.as_ref(), &shared.config, &downstream_tx).await?;

        {
            let shared = Arc::clone(&shared);
            let client = Arc::clone(&client);
            let downstream_tx = downstream_tx.clone();
            let clock_spawner = spawner.clone();
            spawner.spawn(async move {
                run_dispatcher(shared, client, downstream_tx, clock_spawner).await;
            });
        }

        {
            let shared = Arc::clone(&shared);
            let client = Arc::clone(&client);
            spawner.spawn(async move {
                run_audio_sender(shared, client).await;
            });
        }

        {
            let shared = Arc::clone(&shared);
            let client = Arc::clone(&client);
            let downstream_tx = downstream_tx.clone();
            spawner.spawn(async move {
                run_upstream_loop(shared, client, upstream_rx, downstream_tx).await;
            });
        }

        Ok(Self {
            shared,
            upstream_tx,
            downstream_rx: Some(downstream_rx),
        })
    }

    /// A cloneable sender for feeding [`UpstreamFrame`]s into the engine.
    #[must_use]
    pub fn upstream_sender(&self) -> mpsc::Sender<UpstreamFrame> {
        self.upstream_tx.clone()
    }

    /// Takes ownership of the downstream receiver. Returns `None` if
    /// already taken.
    pub fn take_downstream_receiver(&mut self) -> Option<mpsc::Receiver<DownstreamFrame>> {
        self.downstream_rx.take()
    }

    /// Subscribes to [`PersonaState`] changes — the mechanism an upstream
    /// TTS producer uses to gate on the first `Idle` (see `dispatcher`
    /// module docs for why this is a watch subscription rather than a
    /// frame variant).
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<PersonaState> {
        self.shared.fsm.subscribe()
    }

    /// The current persona state.
    #[must_use]
    pub fn state(&self) -> PersonaState {
        self.shared.fsm.state()
    }

    /// Tears down every background task of this session. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }
}

/// Drains upstream frames and dispatches them to ingress/interrupt
/// handling, or tears the session down on `End`/`Cancel`.
async fn run_upstream_loop(
    shared: Arc<PersonaShared>,
    client: Arc<dyn ServerClient>,
    mut upstream_rx: mpsc::Receiver<UpstreamFrame>,
    downstream: mpsc::Sender<DownstreamFrame>,
) {
    loop {
        let frame = tokio::select! {
            () = shared.shutdown.cancelled() => {
                log::debug!("[Engine] shutdown requested, stopping upstream loop");
                return;
            }
            frame = upstream_rx.recv() => frame,
        };
        let Some(frame) = frame else {
            return;
        };

        match frame {
            UpstreamFrame::Start => {
                log::debug!("[Engine] Start received (connection already established)");
            }
            UpstreamFrame::TtsAudioRaw {
                audio,
                sample_rate,
                num_channels,
            } => {
                let outcome = handle_tts_audio(&shared, &audio, sample_rate, num_channels);
                if let Some(passthrough) = outcome.passthrough {
                    let _ = downstream
                        .send(DownstreamFrame::TtsAudioPassthrough {
                            audio: passthrough,
                            sample_rate,
                            num_channels,
                        })
                        .await;
                }
            }
            UpstreamFrame::StartInterruption => {
                handle_interrupt(&shared, client.as_ref()).await;
            }
            UpstreamFrame::TtsStopped => {
                log::debug!("[Engine] TtsStopped received; finality comes from the server instead");
            }
            UpstreamFrame::End => {
                log::info!("[Engine] End received, closing connection");
                client.close().await;
                shared.shutdown.cancel();
                break;
            }
            UpstreamFrame::Cancel => {
                log::info!("[Engine] Cancel received, closing connection immediately");
                client.close().await;
                shared.shutdown.cancel();
                break;
            }
        }
    }
}

/// Blocks on the pending-audio buffer and forwards drained chunks to the
/// server as `InteractionInput` carrying the current lookahead index.
async fn run_audio_sender(shared: Arc<PersonaShared>, client: Arc<dyn ServerClient>) {
    loop {
        let notified = shared.pending_audio_notify.notified();

        let batch = {
            let mut pending = shared.pending_audio.lock();
            if pending.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut *pending))
            }
        };

        let Some(batch) = batch else {
            tokio::select! {
                () = shared.shutdown.cancelled() => {
                    log::debug!("[AudioSender] shutdown requested, stopping");
                    return;
                }
                () = notified => {}
            }
            continue;
        };

        let msg = ClientMessage::InteractionInput(InteractionInput {
            audio_int16_bytes: Bytes::from(batch),
            params: InteractionInputParams {
                client_frame_index: Some(shared.lookahead_frame_index()),
                filter_amount: SPEECH_FILTER_AMOUNT,
                mouth_opening_scale: SPEECH_MOUTH_OPENING_SCALE,
                generate_idle_frames: false,
            },
        });
        client.send_message(msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use crate::frames::InteractionHandle;
    use crate::protocol::ServerMessage;
    use crate::runtime::TokioSpawner;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeClient {
        connect_result: Mutex<Option<Result<(), ConnectError>>>,
        sent: Mutex<Vec<ClientMessage>>,
    }

    #[async_trait]
    impl ServerClient for FakeClient {
        async fn connect(&self) -> Result<(), ConnectError> {
            self.connect_result.lock().unwrap().take().unwrap_or(Ok(()))
        }
        async fn start_interaction(&self) -> InteractionHandle {
            InteractionHandle("h".to_string())
        }
        async fn send_message(&self, msg: ClientMessage) {
            self.sent.lock().unwrap().push(msg);
        }
        async fn receive_message(&self) -> Option<ServerMessage> {
            std::future::pending().await
        }
        async fn close(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn start_fails_on_invalid_config() {
        let mut config = EngineConfig::default();
        config.client_connect_max_retries = 0;
        let client = Arc::new(FakeClient {
            connect_result: Mutex::new(Some(Ok(()))),
            sent: Mutex::new(Vec::new()),
        });
        let spawner = TokioSpawner::current();
        let result = PersonaEngine::start(config, client, spawner).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_fails_when_connect_is_fatal() {
        let config = EngineConfig::default();
        let client = Arc::new(FakeClient {
            connect_result: Mutex::new(Some(Err(ConnectError::Fatal("nope".into())))),
            sent: Mutex::new(Vec::new()),
        });
        let spawner = TokioSpawner::current();
        let result = PersonaEngine::start(config, client, spawner).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn start_succeeds_and_exposes_initializing_state() {
        let config = EngineConfig::default();
        let client = Arc::new(FakeClient {
            connect_result: Mutex::new(Some(Ok(()))),
            sent: Mutex::new(Vec::new()),
        });
        let spawner = TokioSpawner::current();
        let engine = PersonaEngine::start(config, client, spawner).await.unwrap();
        assert_eq!(engine.state(), PersonaState::Initializing);
    }
}
