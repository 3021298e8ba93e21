//! Handcrafted energy-profile signature extraction.
//!
//! Produces a 10-dimensional vector of per-segment mean absolute amplitudes
//! taken from a window centered on the peak-energy region of the track,
//! normalized to [0, 1]. Cheap, no model required, and good enough as a
//! fallback when the embedding backend is not configured.

use super::provider::{ExtractionError, SignatureProvider};
use super::{Signature, SignatureScheme};
use async_trait::async_trait;
use tracing::debug;

/// Number of segments in the profile, one vector dimension each.
const SEGMENTS: usize = 10;

/// Analysis window as a fraction of the whole track, centered on the
/// loudest sample.
const WINDOW_FRACTION: f64 = 0.5;

/// Minimum number of samples needed for a meaningful profile.
const MIN_SAMPLES: usize = SEGMENTS * 16;

/// Extracts energy-profile signatures from 16-bit little-endian PCM audio.
/// A RIFF/WAVE header is skipped if present; anything else is treated as
/// headerless PCM.
#[derive(Debug, Default)]
pub struct EnergyProfileExtractor;

impl EnergyProfileExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignatureProvider for EnergyProfileExtractor {
    async fn extract(&self, audio: &[u8]) -> Result<Signature, ExtractionError> {
        let samples = decode_pcm16(audio)?;
        if samples.len() < MIN_SAMPLES {
            return Err(ExtractionError::TooShort {
                samples: samples.len(),
            });
        }

        let profile = energy_profile(&samples);
        debug!(samples = samples.len(), "Extracted energy profile");
        Ok(Signature::new(SignatureScheme::EnergyProfile, profile))
    }
}

/// Interpret bytes as 16-bit LE PCM, skipping a RIFF header when present.
fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, ExtractionError> {
    let data = strip_wav_header(bytes)?;
    if data.len() < 2 {
        return Err(ExtractionError::Decode("no PCM data".to_string()));
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
        .collect())
}

fn strip_wav_header(bytes: &[u8]) -> Result<&[u8], ExtractionError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" {
        return Ok(bytes);
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(ExtractionError::Decode(
            "RIFF container is not WAVE".to_string(),
        ));
    }

    // Walk the chunk list to the "data" chunk.
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let chunk_id = &bytes[offset..offset + 4];
        let chunk_len = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body_start = offset + 8;
        if chunk_id == b"data" {
            let end = (body_start + chunk_len).min(bytes.len());
            return Ok(&bytes[body_start..end]);
        }
        // Chunks are word-aligned.
        offset = body_start + chunk_len + (chunk_len & 1);
    }
    Err(ExtractionError::Decode(
        "WAVE file has no data chunk".to_string(),
    ))
}

/// Segment-wise mean absolute amplitude around the peak-energy region,
/// normalized by the loudest segment.
fn energy_profile(samples: &[f32]) -> Vec<f32> {
    let peak_index = samples
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.abs()
                .partial_cmp(&b.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let window_len = ((samples.len() as f64 * WINDOW_FRACTION) as usize).max(MIN_SAMPLES);
    let half = window_len / 2;
    let start = peak_index.saturating_sub(half);
    let end = (start + window_len).min(samples.len());
    let start = end.saturating_sub(window_len);
    let window = &samples[start..end];

    let segment_len = window.len() / SEGMENTS;
    let mut profile: Vec<f32> = (0..SEGMENTS)
        .map(|i| {
            let segment = &window[i * segment_len..(i + 1) * segment_len];
            segment.iter().map(|s| s.abs()).sum::<f32>() / segment_len as f32
        })
        .collect();

    let max = profile.iter().cloned().fold(0f32, f32::max);
    if max > 0.0 {
        for v in &mut profile {
            *v /= max;
        }
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::distance;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn tone(len: usize, period: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let phase = (i % period) as f32 / period as f32;
                ((phase * std::f32::consts::TAU).sin() * amplitude * i16::MAX as f32) as i16
            })
            .collect()
    }

    #[tokio::test]
    async fn test_extracts_ten_dimensions() {
        let extractor = EnergyProfileExtractor::new();
        let sig = extractor
            .extract(&pcm_bytes(&tone(4096, 64, 0.8)))
            .await
            .unwrap();
        assert_eq!(sig.scheme, SignatureScheme::EnergyProfile);
        assert_eq!(sig.values.len(), 10);
        assert!(sig.values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_extraction_is_idempotent() {
        let extractor = EnergyProfileExtractor::new();
        let bytes = pcm_bytes(&tone(4096, 100, 0.5));
        let a = extractor.extract(&bytes).await.unwrap();
        let b = extractor.extract(&bytes).await.unwrap();
        assert!(distance(&a, &b) < 1e-9);
    }

    #[tokio::test]
    async fn test_different_audio_yields_different_profiles() {
        let extractor = EnergyProfileExtractor::new();
        // A steady tone vs a tone with a loud burst in the middle.
        let steady = pcm_bytes(&tone(8192, 64, 0.5));
        let mut bursty = tone(8192, 64, 0.2);
        for s in &mut bursty[4000..4400] {
            *s = s.saturating_mul(4);
        }
        let a = extractor.extract(&steady).await.unwrap();
        let b = extractor.extract(&pcm_bytes(&bursty)).await.unwrap();
        assert!(distance(&a, &b) > 0.01);
    }

    #[tokio::test]
    async fn test_too_short_audio_fails() {
        let extractor = EnergyProfileExtractor::new();
        let err = extractor.extract(&pcm_bytes(&tone(32, 8, 0.5))).await;
        assert!(matches!(err, Err(ExtractionError::TooShort { .. })));
    }

    #[tokio::test]
    async fn test_wav_header_is_skipped() {
        let samples = tone(4096, 64, 0.8);
        let pcm = pcm_bytes(&samples);

        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&((36 + pcm.len()) as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&[0u8; 16]);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        wav.extend_from_slice(&pcm);

        let extractor = EnergyProfileExtractor::new();
        let from_wav = extractor.extract(&wav).await.unwrap();
        let from_pcm = extractor.extract(&pcm).await.unwrap();
        assert!(distance(&from_wav, &from_pcm) < 1e-9);
    }

    #[tokio::test]
    async fn test_riff_without_wave_is_decode_error() {
        let mut bytes = b"RIFF\x00\x00\x00\x00JUNK".to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        let extractor = EnergyProfileExtractor::new();
        assert!(matches!(
            extractor.extract(&bytes).await,
            Err(ExtractionError::Decode(_))
        ));
    }
}
