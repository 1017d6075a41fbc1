//! Audio ingress pipeline.
//!
//! Resamples incoming TTS audio, queues it for the audio-sender task, and
//! drives the `Idle -> Speaking` transition on first acceptance.

use bytes::Bytes;

use crate::fsm::PersonaState;
use crate::resampler::resample_to_16k_mono;
use crate::state::PersonaShared;

/// Result of submitting one chunk of TTS audio.
pub struct IngestOutcome {
    /// Raw, pre-resample audio to forward downstream when
    /// `tts_audio_passthrough` is enabled.
    pub passthrough: Option<Bytes>,
}

/// Handles one `UpstreamFrame::TtsAudioRaw`.
///
/// Resamples to mono 16kHz, appends the result to `shared.pending_audio`,
/// and wakes the audio-sender task. While the session is `Initializing` the
/// server cannot yet accept interaction input, so the chunk is dropped with
/// a warning instead of buffered.
pub fn handle_tts_audio(
    shared: &PersonaShared,
    audio: &[u8],
    sample_rate: u32,
    num_channels: u16,
) -> IngestOutcome {
    if shared.fsm.state() == PersonaState::Initializing {
        log::warn!(
            "[Ingress] dropping {} bytes of TTS audio received during Initializing",
            audio.len()
        );
        return IngestOutcome { passthrough: None };
    }

    let resampled = resample_to_16k_mono(audio, sample_rate, num_channels);

    {
        let mut pending = shared.pending_audio.lock();
        pending.extend_from_slice(&resampled);
    }
    shared.pending_audio_notify.notify_one();

    if shared.fsm.state() == PersonaState::Idle {
        shared.fsm.transition(PersonaState::Speaking);
    }

    let passthrough = shared
        .config
        .tts_audio_passthrough
        .then(|| Bytes::copy_from_slice(audio));

    IngestOutcome { passthrough }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn pcm_silence(num_samples: usize) -> Vec<u8> {
        vec![0u8; num_samples * 2]
    }

    #[test]
    fn drops_audio_during_initializing() {
        let shared = PersonaShared::new(EngineConfig::default());
        let out = handle_tts_audio(&shared, &pcm_silence(10), 16_000, 1);
        assert!(out.passthrough.is_none());
        assert!(shared.pending_audio.lock().is_empty());
        assert_eq!(shared.fsm.state(), PersonaState::Initializing);
    }

    #[test]
    fn transitions_idle_to_speaking_and_buffers_audio() {
        let shared = PersonaShared::new(EngineConfig::default());
        shared.fsm.transition(PersonaState::Idle);
        handle_tts_audio(&shared, &pcm_silence(10), 16_000, 1);
        assert_eq!(shared.fsm.state(), PersonaState::Speaking);
        assert!(!shared.pending_audio.lock().is_empty());
    }

    #[test]
    fn already_speaking_stays_speaking() {
        let shared = PersonaShared::new(EngineConfig::default());
        shared.fsm.transition(PersonaState::Idle);
        shared.fsm.transition(PersonaState::Speaking);
        handle_tts_audio(&shared, &pcm_silence(10), 16_000, 1);
        assert_eq!(shared.fsm.state(), PersonaState::Speaking);
    }

    #[test]
    fn passthrough_disabled_by_default() {
        let shared = PersonaShared::new(EngineConfig::default());
        shared.fsm.transition(PersonaState::Idle);
        let out = handle_tts_audio(&shared, &pcm_silence(10), 16_000, 1);
        assert!(out.passthrough.is_none());
    }

    #[test]
    fn passthrough_forwards_raw_pre_resample_audio() {
        let mut config = EngineConfig::default();
        config.tts_audio_passthrough = true;
        let shared = PersonaShared::new(config);
        shared.fsm.transition(PersonaState::Idle);
        let raw = pcm_silence(10);
        let out = handle_tts_audio(&shared, &raw, 48_000, 2);
        assert_eq!(out.passthrough.unwrap().as_ref(), raw.as_slice());
    }
}
