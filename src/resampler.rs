//! Audio resampling.
//!
//! Converts arbitrary-rate incoming PCM to mono 16-bit at
//! [`crate::config::TARGET_SAMPLE_RATE`]. Deterministic between calls — no
//! filter memory is kept across invocations, so each chunk is resampled
//! independently of the ones before it.

use rubato::{FftFixedIn, Resampler};

/// Chunk size (in samples) fed to the FFT resampler per call. Input shorter
/// than this is zero-padded; the padded tail is then discarded
/// proportionally from the output (see [`resample_mono`]).
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per FFT resample window, trading a little latency for
/// smoother output — mirrors `gglib-voice`'s capture-side resampler.
const SUB_CHUNKS: usize = 2;

/// Resamples interleaved 16-bit PCM to mono at the target rate.
///
/// Downmixes to mono first (when `source_channels > 1`) by averaging
/// channels, then resamples through an FFT-based resampler. Preserves
/// integer-sample alignment at the output boundary: the returned buffer's
/// length is always an even number of bytes.
#[must_use]
pub fn resample_to_16k_mono(pcm_bytes: &[u8], source_rate: u32, source_channels: u16) -> Vec<u8> {
    resample_to_mono(
        pcm_bytes,
        source_rate,
        source_channels,
        crate::config::TARGET_SAMPLE_RATE,
    )
}

/// Resamples interleaved 16-bit PCM to mono at an arbitrary target rate.
///
/// Exposed separately from [`resample_to_16k_mono`] so tests can exercise
/// the resampling path at rates other than the engine's fixed target.
#[must_use]
pub fn resample_to_mono(
    pcm_bytes: &[u8],
    source_rate: u32,
    source_channels: u16,
    target_rate: u32,
) -> Vec<u8> {
    let mono = downmix_to_mono(pcm_bytes, source_channels.max(1));

    if source_rate == target_rate || mono.is_empty() {
        return samples_to_bytes(&mono);
    }

    let resampled = resample_mono(&mono, source_rate, target_rate);
    samples_to_bytes(&resampled)
}

/// Averages interleaved channels down to a single mono channel of `i16`
/// samples. Frames with fewer than `channels` trailing samples are dropped.
fn downmix_to_mono(pcm_bytes: &[u8], channels: u16) -> Vec<i16> {
    let channels = channels as usize;
    let samples: Vec<i16> = pcm_bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    if channels <= 1 {
        return samples;
    }

    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Resamples mono `i16` samples from `source_rate` to `target_rate` through
/// `rubato`'s FFT resampler, matching `gglib-voice`'s chunk-then-pad
/// approach: process full `CHUNK_SIZE` windows, then handle any remainder by
/// zero-padding it to a full window and truncating the output proportionally.
///
/// Falls back to returning `samples` unresampled (logging the failure) if
/// the resampler can't be constructed for the given rate pair — this should
/// only happen for degenerate rates the caller should not be passing.
fn resample_mono(samples: &[i16], source_rate: u32, target_rate: u32) -> Vec<i16> {
    let floats: Vec<f32> = samples.iter().map(|&s| f32::from(s) / 32768.0).collect();

    let mut resampler = match FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    ) {
        Ok(r) => r,
        Err(e) => {
            log::error!(
                "[Resampler] failed to build {source_rate}Hz -> {target_rate}Hz resampler: {e}"
            );
            return samples.to_vec();
        }
    };

    let mut output = Vec::with_capacity(floats.len() * target_rate as usize / source_rate.max(1) as usize);
    let mut pos = 0;

    while pos + CHUNK_SIZE <= floats.len() {
        let chunk = &floats[pos..pos + CHUNK_SIZE];
        match resampler.process(&[chunk], None) {
            Ok(result) => {
                if let Some(channel) = result.first() {
                    output.extend_from_slice(channel);
                }
            }
            Err(e) => {
                log::error!("[Resampler] resample failed: {e}");
                return samples.to_vec();
            }
        }
        pos += CHUNK_SIZE;
    }

    if pos < floats.len() {
        let remaining = &floats[pos..];
        let mut padded = vec![0.0f32; CHUNK_SIZE];
        padded[..remaining.len()].copy_from_slice(remaining);

        match resampler.process(&[&padded], None) {
            Ok(result) => {
                if let Some(channel) = result.first() {
                    let out_len = (remaining.len() as f64 * f64::from(target_rate)
                        / f64::from(source_rate))
                    .ceil() as usize;
                    let take = out_len.min(channel.len());
                    output.extend_from_slice(&channel[..take]);
                }
            }
            Err(e) => {
                log::error!("[Resampler] resample failed on final chunk: {e}");
                return samples.to_vec();
            }
        }
    }

    output
        .iter()
        .map(|&f| (f * 32768.0).round() as i16)
        .collect()
}

fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}
