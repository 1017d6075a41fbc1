//! Playback clock.
//!
//! Fixed-cadence loop at [`crate::config::TARGET_FPS`] that selects an idle
//! or speech frame each tick and emits image+audio downstream. Uses an
//! explicit sleep-then-spin wait rather than a plain `tokio::time::interval`,
//! since `interval` alone cannot reliably hit single-digit-millisecond jitter
//! under load.
//!
//! `current_frame_idx` is owned entirely by this task — it is never placed
//! in [`PersonaShared`] because no other task reads or writes it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::TARGET_FPS;
use crate::fsm::PersonaState;
use crate::frames::{silence_frame, DownstreamFrame};
use crate::state::PersonaShared;

/// How far ahead of a deadline the clock switches from sleeping to spinning.
const SPIN_MARGIN: Duration = Duration::from_millis(5);

/// Re-check interval while stalled on a starvation tick.
const STARVATION_RETRY_DELAY: Duration = Duration::from_millis(5);

/// One tick's emitted image+audio pair.
struct ClockFrame {
    image: Bytes,
    audio: Bytes,
}

/// Outcome of one call to [`tick_once`].
enum TickOutcome {
    Emitted(ClockFrame),
    /// Speech buffer empty mid-utterance; the clock stalled rather than
    /// advance.
    Starved,
}

/// Sleeps until `deadline`, sleeping the OS thread down to
/// [`SPIN_MARGIN`] before it, then cooperatively spinning the rest of the
/// way for tighter precision than `tokio::time::sleep` alone provides.
async fn sleep_until_deadline(deadline: Instant) {
    let coarse_target = deadline.checked_sub(SPIN_MARGIN);
    if let Some(coarse_target) = coarse_target {
        if coarse_target > Instant::now() {
            tokio::time::sleep_until(coarse_target).await;
        }
    }
    while Instant::now() < deadline {
        tokio::task::yield_now().await;
    }
}

/// Performs one tick: increments `current_frame_idx`, then selects a due
/// speech frame, a starvation stall, or an idle frame, in that priority
/// order.
fn tick_once(shared: &PersonaShared, current_frame_idx: &mut u64) -> TickOutcome {
    *current_frame_idx += 1;

    let due_speech_frame = {
        let speech = shared.speech_buffer.lock();
        speech
            .peek_front()
            .is_some_and(|f| f.frame_idx <= *current_frame_idx)
    };

    if due_speech_frame {
        let frame = shared
            .speech_buffer
            .lock()
            .pop_front()
            .expect("checked non-empty above");

        let audio = if frame.audio_bytes.is_empty() {
            silence_frame()
        } else {
            frame.audio_bytes
        };

        shared
            .played_frame_idx
            .store(frame.frame_idx as i64, Ordering::Release);
        shared
            .num_speech_frames_played
            .fetch_add(1, Ordering::AcqRel);

        if frame.is_final && shared.speech_buffer.lock().is_empty() {
            shared.fsm.transition(PersonaState::Idle);
        }

        return TickOutcome::Emitted(ClockFrame {
            image: frame.image_bytes,
            audio,
        });
    }

    let speaking_mid_utterance = shared.num_speech_frames_played.load(Ordering::Acquire) > 0
        && shared.fsm.state() == PersonaState::Speaking;

    if speaking_mid_utterance {
        *current_frame_idx -= 1;
        return TickOutcome::Starved;
    }

    let played = shared.played_frame_idx.fetch_add(1, Ordering::AcqRel) + 1;
    let cache = shared.idle_cache.read();
    let idle_frame = cache.get(played as u64);
    TickOutcome::Emitted(ClockFrame {
        image: idle_frame.image_bytes.clone(),
        audio: silence_frame(),
    })
}

/// Builds the tick stream: one `ClockFrame` per emitted tick, with
/// starvation stalls retried internally and never surfaced to the
/// consumer.
fn tick_stream(shared: Arc<PersonaShared>) -> impl Stream<Item = ClockFrame> {
    stream! {
        let tick_duration = Duration::from_secs_f64(1.0 / f64::from(TARGET_FPS));
        let mut current_frame_idx: u64 = 0;
        let mut last_state = shared.fsm.state();
        let mut next_deadline = Instant::now() + tick_duration;

        loop {
            tokio::select! {
                () = shared.shutdown.cancelled() => {
                    log::debug!("[Clock] shutdown requested, stopping");
                    return;
                }
                () = sleep_until_deadline(next_deadline) => {}
            }

            let state = shared.fsm.state();
            if state == PersonaState::Idle && last_state != PersonaState::Idle {
                shared.num_speech_frames_played.store(0, Ordering::Release);
            }
            last_state = state;

            let mut outcome = tick_once(&shared, &mut current_frame_idx);
            while let TickOutcome::Starved = outcome {
                tokio::time::sleep(STARVATION_RETRY_DELAY).await;
                outcome = tick_once(&shared, &mut current_frame_idx);
            }

            if let TickOutcome::Emitted(frame) = outcome {
                shared.metrics.record_tick();
                yield frame;
            }

            next_deadline += tick_duration;
        }
    }
}

/// Runs the playback clock until `downstream` is closed by its receiver.
///
/// Spawned once, when the dispatcher observes `Initializing -> Idle`.
pub async fn run(shared: Arc<PersonaShared>, downstream: mpsc::Sender<DownstreamFrame>) {
    let image_size = shared.config.image_size;
    let ticks = tick_stream(shared);
    pin_mut!(ticks);

    while let Some(frame) = ticks.next().await {
        if downstream
            .send(DownstreamFrame::OutputImageRaw {
                image: frame.image,
                size: image_size,
                format: "RGB",
            })
            .await
            .is_err()
        {
            log::debug!("[Clock] downstream receiver closed, stopping");
            return;
        }
        if downstream
            .send(DownstreamFrame::OutputAudioRaw {
                audio: frame.audio,
                sample_rate: crate::config::TARGET_SAMPLE_RATE,
                num_channels: 1,
            })
            .await
            .is_err()
        {
            log::debug!("[Clock] downstream receiver closed, stopping");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::frames::VideoFrame;

    fn shared_with_idle_frames(n: u64) -> PersonaShared {
        let shared = PersonaShared::new(EngineConfig::default());
        {
            let mut cache = shared.idle_cache.write();
            for i in 0..n {
                cache.append(i, Bytes::from(vec![i as u8]));
            }
        }
        shared.fsm.transition(PersonaState::Idle);
        shared
    }

    #[test]
    fn idle_tick_advances_played_frame_idx_and_emits_silence() {
        let shared = shared_with_idle_frames(5);
        let mut current = 0u64;
        match tick_once(&shared, &mut current) {
            TickOutcome::Emitted(frame) => {
                assert_eq!(frame.audio, silence_frame());
            }
            TickOutcome::Starved => panic!("idle tick should never starve"),
        }
        assert_eq!(shared.played_frame_idx.load(Ordering::Acquire), 0);
        assert_eq!(current, 1);
    }

    #[test]
    fn due_speech_frame_is_popped_and_advances_played_frame_idx() {
        let shared = shared_with_idle_frames(1);
        shared.fsm.transition(PersonaState::Speaking);
        shared.speech_buffer.lock().push_back(VideoFrame {
            frame_idx: 1,
            image_bytes: Bytes::from_static(b"img"),
            audio_bytes: Bytes::from_static(b"aud"),
            is_final: false,
        });

        let mut current = 0u64;
        match tick_once(&shared, &mut current) {
            TickOutcome::Emitted(frame) => assert_eq!(frame.audio.as_ref(), b"aud"),
            TickOutcome::Starved => panic!("due frame should not starve"),
        }
        assert_eq!(shared.played_frame_idx.load(Ordering::Acquire), 1);
        assert_eq!(shared.num_speech_frames_played.load(Ordering::Acquire), 1);
    }

    #[test]
    fn final_frame_with_empty_buffer_returns_to_idle() {
        let shared = shared_with_idle_frames(1);
        shared.fsm.transition(PersonaState::Speaking);
        shared.speech_buffer.lock().push_back(VideoFrame {
            frame_idx: 1,
            image_bytes: Bytes::from_static(b"img"),
            audio_bytes: Bytes::from_static(b"aud"),
            is_final: true,
        });

        let mut current = 0u64;
        tick_once(&shared, &mut current);
        assert_eq!(shared.fsm.state(), PersonaState::Idle);
    }

    #[test]
    fn starvation_stall_does_not_advance_current_frame_idx() {
        let shared = shared_with_idle_frames(1);
        shared.fsm.transition(PersonaState::Speaking);
        shared
            .num_speech_frames_played
            .store(1, Ordering::Release);

        let mut current = 10u64;
        match tick_once(&shared, &mut current) {
            TickOutcome::Starved => {}
            TickOutcome::Emitted(_) => panic!("expected a starvation stall"),
        }
        assert_eq!(current, 10, "starvation must leave current_frame_idx unchanged");
    }

    #[tokio::test(start_paused = true)]
    async fn cold_start_emits_sequential_idle_frames() {
        let shared = Arc::new(shared_with_idle_frames(3));
        let (tx, mut rx) = mpsc::channel(16);
        let clock_shared = Arc::clone(&shared);
        tokio::spawn(run(clock_shared, tx));

        let tick = Duration::from_secs_f64(1.0 / f64::from(TARGET_FPS));
        let mut images = Vec::new();
        for _ in 0..3 {
            tokio::time::advance(tick).await;
            if let Some(DownstreamFrame::OutputImageRaw { image, .. }) = rx.recv().await {
                images.push(image);
            }
            rx.recv().await; // audio frame
        }
        assert_eq!(images.len(), 3);
    }
}
