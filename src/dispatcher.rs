//! Message dispatcher.
//!
//! The long-running task that owns `receive_message()`. It is the sole
//! writer of the idle cache and the only task that appends to the speech
//! buffer, and it is what spawns the Playback Clock the moment the session
//! first reaches `Idle`.
//!
//! `PersonaInitialized` is delivered downstream as
//! [`DownstreamFrame::PersonaInitialized`](crate::frames::DownstreamFrame).
//! It also needs to reach upstream callers so a TTS producer can gate on it;
//! rather than invent a matching `UpstreamFrame` variant (the upstream
//! direction only ever carries caller input), that gate is the existing
//! [`crate::fsm::PersonaFsm`] watch channel — an upstream TTS producer
//! subscribes via `PersonaFsm::subscribe` and waits for the first `Idle` to
//! know it is safe to start sending audio.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::{IDLE_FILTER_AMOUNT, IDLE_MOUTH_OPENING_SCALE};
use crate::error::ServerErrorCode;
use crate::frames::{DownstreamFrame, VideoFrame};
use crate::fsm::PersonaState;
use crate::protocol::{
    ClientMessage, ErrorResponse, InteractionInput, InteractionInputParams, InteractionResponse,
    ServerClient, ServerMessage, SessionReady,
};
use crate::runtime::TaskSpawner;
use crate::state::PersonaShared;

/// Runs the dispatcher until the server connection closes or the session's
/// `shutdown` token fires.
///
/// Generic over `S` rather than `Arc<dyn TaskSpawner>`: [`TaskSpawner::spawn`]
/// is itself generic, so the trait isn't object-safe, and this is never
/// spawned through a trait object.
pub async fn run_dispatcher<S>(
    shared: Arc<PersonaShared>,
    client: Arc<dyn ServerClient>,
    downstream: mpsc::Sender<DownstreamFrame>,
    spawner: S,
) where
    S: TaskSpawner + Clone + 'static,
{
    loop {
        let msg = tokio::select! {
            () = shared.shutdown.cancelled() => {
                log::info!("[Dispatcher] shutdown requested, stopping");
                return;
            }
            msg = client.receive_message() => msg,
        };

        let Some(msg) = msg else {
            log::info!("[Dispatcher] server connection closed, stopping");
            return;
        };

        match msg {
            ServerMessage::SessionReady(ready) => {
                handle_session_ready(&shared, client.as_ref(), ready).await;
            }
            ServerMessage::InteractionResponse(resp) => {
                handle_interaction_response(&shared, &downstream, &spawner, resp).await;
            }
            ServerMessage::ErrorResponse(err) => {
                handle_error_response(&downstream, err).await;
            }
        }
    }
}

async fn handle_session_ready(shared: &PersonaShared, client: &dyn ServerClient, ready: SessionReady) {
    log::info!(
        "[Dispatcher] SessionReady, is_mirrored_loop={}",
        ready.is_mirrored_loop
    );
    shared.fsm.transition(PersonaState::Initializing);
    shared.reset_idle_cache(ready.is_mirrored_loop);
    shared.metrics.start();

    let handle = client.start_interaction().await;
    *shared.handle.write() = Some(handle);

    let priming = ClientMessage::InteractionInput(InteractionInput {
        audio_int16_bytes: Bytes::new(),
        params: InteractionInputParams {
            client_frame_index: None,
            filter_amount: IDLE_FILTER_AMOUNT,
            mouth_opening_scale: IDLE_MOUTH_OPENING_SCALE,
            generate_idle_frames: true,
        },
    });
    client.send_message(priming).await;
}

async fn handle_interaction_response<S>(
    shared: &Arc<PersonaShared>,
    downstream: &mpsc::Sender<DownstreamFrame>,
    spawner: &S,
    resp: InteractionResponse,
) where
    S: TaskSpawner + Clone + 'static,
{
    match shared.fsm.state() {
        PersonaState::Initializing => {
            shared
                .idle_cache
                .write()
                .append(resp.index, resp.video_frame_bytes);

            if resp.is_final_response {
                shared.fsm.transition(PersonaState::Idle);
                log::info!(
                    "[Dispatcher] idle cache finalized with {} frames",
                    shared.idle_cache.read().len()
                );
                let _ = downstream.send(DownstreamFrame::PersonaInitialized).await;

                let clock_shared = Arc::clone(shared);
                let clock_downstream = downstream.clone();
                spawner.spawn(async move {
                    crate::playback_clock::run(clock_shared, clock_downstream).await;
                });
            }
        }
        PersonaState::Speaking => {
            enqueue_speech_frame(shared, resp);
        }
        PersonaState::Interrupting => {
            let is_final = resp.is_final_response;
            enqueue_speech_frame(shared, resp);
            if is_final {
                shared.pending_audio.lock().clear();
                shared.speech_buffer.lock().clear();
                shared.fsm.transition(PersonaState::Idle);
            }
        }
        PersonaState::Idle => {
            log::debug!(
                "[Dispatcher] discarding stale InteractionResponse index={} received while Idle",
                resp.index
            );
        }
    }
}

fn enqueue_speech_frame(shared: &PersonaShared, resp: InteractionResponse) {
    shared
        .last_queued_frame_idx
        .store(resp.index as i64, Ordering::Release);
    shared.speech_buffer.lock().push_back(VideoFrame {
        frame_idx: resp.index,
        image_bytes: resp.video_frame_bytes,
        audio_bytes: resp.audio_bytes,
        is_final: resp.is_final_response,
    });
}

async fn handle_error_response(downstream: &mpsc::Sender<DownstreamFrame>, err: ErrorResponse) {
    let code = ServerErrorCode::parse(&err.code);
    if code.is_fatal() {
        log::error!("[Dispatcher] fatal server error: {}", code.code());
        let _ = downstream.send(DownstreamFrame::End).await;
    } else {
        log::warn!("[Dispatcher] survivable server error: {}", code.code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::frames::InteractionHandle;
    use crate::runtime::TokioSpawner;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedClient {
        inbox: Mutex<Vec<ServerMessage>>,
        sent: Mutex<Vec<ClientMessage>>,
    }

    #[async_trait]
    impl ServerClient for ScriptedClient {
        async fn connect(&self) -> Result<(), crate::error::ConnectError> {
            Ok(())
        }
        async fn start_interaction(&self) -> InteractionHandle {
            InteractionHandle("interaction-1".to_string())
        }
        async fn send_message(&self, msg: ClientMessage) {
            self.sent.lock().unwrap().push(msg);
        }
        async fn receive_message(&self) -> Option<ServerMessage> {
            let mut inbox = self.inbox.lock().unwrap();
            if inbox.is_empty() {
                None
            } else {
                Some(inbox.remove(0))
            }
        }
        async fn close(&self) {}
    }

    fn interaction_response(index: u64, is_final: bool) -> ServerMessage {
        ServerMessage::InteractionResponse(InteractionResponse {
            index,
            video_frame_bytes: Bytes::from(vec![index as u8]),
            audio_bytes: Bytes::new(),
            is_final_response: is_final,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cold_start_primes_server_and_builds_idle_cache() {
        let shared = Arc::new(PersonaShared::new(EngineConfig::default()));
        let mut inbox = vec![ServerMessage::SessionReady(SessionReady {
            is_mirrored_loop: true,
        })];
        for i in 0..3u64 {
            inbox.push(interaction_response(i, i == 2));
        }
        let client = Arc::new(ScriptedClient {
            inbox: Mutex::new(inbox),
            sent: Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::channel(16);
        let spawner = TokioSpawner::current();

        run_dispatcher(Arc::clone(&shared), client.clone(), tx, spawner).await;

        assert_eq!(shared.fsm.state(), PersonaState::Idle);
        assert_eq!(shared.idle_cache.read().len(), 3);
        assert!(matches!(
            rx.recv().await,
            Some(DownstreamFrame::PersonaInitialized)
        ));
        let sent = client.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], ClientMessage::InteractionInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn responses_while_idle_are_discarded() {
        let shared = Arc::new(PersonaShared::new(EngineConfig::default()));
        shared.fsm.transition(PersonaState::Idle);
        let client = Arc::new(ScriptedClient {
            inbox: Mutex::new(vec![interaction_response(99, false)]),
            sent: Mutex::new(Vec::new()),
        });
        let (tx, _rx) = mpsc::channel(16);
        let spawner = TokioSpawner::current();

        run_dispatcher(Arc::clone(&shared), client, tx, spawner).await;

        assert!(shared.speech_buffer.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn final_response_while_interrupting_clears_buffers_and_returns_idle() {
        let shared = Arc::new(PersonaShared::new(EngineConfig::default()));
        shared.fsm.transition(PersonaState::Idle);
        shared.fsm.transition(PersonaState::Speaking);
        shared.fsm.transition(PersonaState::Interrupting);
        shared.pending_audio.lock().extend_from_slice(&[0u8; 4]);

        let client = Arc::new(ScriptedClient {
            inbox: Mutex::new(vec![interaction_response(5, true)]),
            sent: Mutex::new(Vec::new()),
        });
        let (tx, _rx) = mpsc::channel(16);
        let spawner = TokioSpawner::current();

        run_dispatcher(Arc::clone(&shared), client, tx, spawner).await;

        assert_eq!(shared.fsm.state(), PersonaState::Idle);
        assert!(shared.pending_audio.lock().is_empty());
        assert!(shared.speech_buffer.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_emits_end_frame() {
        let shared = Arc::new(PersonaShared::new(EngineConfig::default()));
        let client = Arc::new(ScriptedClient {
            inbox: Mutex::new(vec![ServerMessage::ErrorResponse(ErrorResponse {
                code: "NO_BACKEND_SERVER_AVAILABLE".to_string(),
            })]),
            sent: Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::channel(16);
        let spawner = TokioSpawner::current();

        run_dispatcher(shared, client, tx, spawner).await;

        assert!(matches!(rx.recv().await, Some(DownstreamFrame::End)));
    }

    #[tokio::test(start_paused = true)]
    async fn survivable_error_does_not_emit_end_frame() {
        let shared = Arc::new(PersonaShared::new(EngineConfig::default()));
        let client = Arc::new(ScriptedClient {
            inbox: Mutex::new(vec![ServerMessage::ErrorResponse(ErrorResponse {
                code: "FRAME_SIZE_TOO_BIG".to_string(),
            })]),
            sent: Mutex::new(Vec::new()),
        });
        let (tx, mut rx) = mpsc::channel(16);
        let spawner = TokioSpawner::current();

        run_dispatcher(shared, client, tx, spawner).await;
        assert!(rx.try_recv().is_err());
    }
}
