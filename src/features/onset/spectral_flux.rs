//! Onset strength envelope from log-mel spectral flux
//!
//! Algorithm:
//! 1. Power STFT of the (percussive) signal
//! 2. Project onto a mel filterbank
//! 3. Convert to dB with an 80 dB floor below the loudest band
//! 4. Half-wave rectified first difference along time, averaged over bands
//!
//! The result has one value per STFT frame; peaks mark likely onsets.
//!
//! # Reference
//!
//! Böck, S., & Widmer, G. (2013). Maximum Filter Vibrato Suppression for Onset Detection.
//! *Proceedings of the 16th International Conference on Digital Audio Effects (DAFx-13)*.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::features::onset::spectral_flux::{onset_strength, OnsetStrengthConfig};
//!
//! let samples = vec![0.0f32; 22050 * 10];
//! let envelope = onset_strength(&samples, 22050, &OnsetStrengthConfig::default())?;
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use crate::error::AnalysisError;
use crate::features::stft::{bin_frequencies, power, stft};

/// Floor for power before taking logarithms
const AMIN: f32 = 1e-10;

/// Onset strength parameters
#[derive(Debug, Clone)]
pub struct OnsetStrengthConfig {
    /// STFT frame size (default: 2048)
    pub frame_size: usize,

    /// STFT hop size; sets the envelope frame rate (default: 512)
    pub hop_size: usize,

    /// Number of mel bands (default: 128)
    pub n_mels: usize,

    /// Dynamic range kept below the loudest band, in dB (default: 80.0)
    pub top_db: f32,
}

impl Default for OnsetStrengthConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            n_mels: 128,
            top_db: 80.0,
        }
    }
}

/// One triangular mel filter, stored over its non-zero support
#[derive(Debug, Clone)]
pub struct MelFilter {
    /// First STFT bin with non-zero weight
    pub start_bin: usize,

    /// Weights for bins `start_bin..start_bin + weights.len()`
    pub weights: Vec<f32>,
}

impl MelFilter {
    fn apply(&self, spectrum: &[f32]) -> f32 {
        spectrum[self.start_bin..]
            .iter()
            .zip(self.weights.iter())
            .map(|(&p, &w)| p * w)
            .sum()
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Build an area-normalized triangular mel filterbank
///
/// Filters whose support falls between two STFT bins end up empty; they simply
/// contribute nothing to the envelope.
pub fn mel_filterbank(
    sample_rate: u32,
    frame_size: usize,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
) -> Vec<MelFilter> {
    let freqs = bin_frequencies(sample_rate, frame_size);
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let norm = 2.0 / (upper - lower);
            let weights: Vec<(usize, f32)> = freqs
                .iter()
                .enumerate()
                .filter_map(|(k, &f)| {
                    let rising = (f - lower) / (center - lower);
                    let falling = (upper - f) / (upper - center);
                    let w = rising.min(falling);
                    (w > 0.0).then_some((k, w * norm))
                })
                .collect();
            MelFilter {
                start_bin: weights.first().map(|&(k, _)| k).unwrap_or(0),
                weights: weights.into_iter().map(|(_, w)| w).collect(),
            }
        })
        .collect()
}

/// Compute the onset strength envelope of `samples`
///
/// # Returns
///
/// One non-negative value per STFT frame (`1 + samples.len() / hop_size`).
/// The first value is always 0.
///
/// # Errors
///
/// Returns `AnalysisError` if the signal is empty or parameters are invalid
pub fn onset_strength(
    samples: &[f32],
    sample_rate: u32,
    config: &OnsetStrengthConfig,
) -> Result<Vec<f32>, AnalysisError> {
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate: 0".to_string()));
    }
    if config.n_mels == 0 {
        return Err(AnalysisError::InvalidInput("n_mels must be > 0".to_string()));
    }

    let spectrogram = power(&stft(samples, config.frame_size, config.hop_size)?);
    let filters = mel_filterbank(
        sample_rate,
        config.frame_size,
        config.n_mels,
        0.0,
        sample_rate as f32 / 2.0,
    );

    let mut mel_db: Vec<Vec<f32>> = spectrogram
        .iter()
        .map(|frame| {
            filters
                .iter()
                .map(|filter| 10.0 * filter.apply(frame).max(AMIN).log10())
                .collect()
        })
        .collect();

    let peak_db = mel_db
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    let floor_db = peak_db - config.top_db;
    for value in mel_db.iter_mut().flat_map(|frame| frame.iter_mut()) {
        *value = value.max(floor_db);
    }

    let mut envelope = Vec::with_capacity(mel_db.len());
    envelope.push(0.0);
    for pair in mel_db.windows(2) {
        let rise: f32 = pair[1]
            .iter()
            .zip(pair[0].iter())
            .map(|(&curr, &prev)| (curr - prev).max(0.0))
            .sum();
        envelope.push(rise / config.n_mels as f32);
    }

    log::debug!(
        "Onset strength: {} frames at hop {} ({:.2} frames/s)",
        envelope.len(),
        config.hop_size,
        sample_rate as f32 / config.hop_size as f32
    );

    Ok(envelope)
}
