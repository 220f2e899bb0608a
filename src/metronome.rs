//! Metronome click synthesis
//!
//! Renders a short sine burst on every beat of a given tempo and mixes it into
//! a waveform. Useful for auditioning a detected tempo against the source and
//! for building synthetic test material with a known BPM.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::metronome::{overlay_click_track, ClickConfig};
//! use stratum_tempo::preprocessing::Waveform;
//!
//! let song = Waveform::new(vec![0.0f32; 22050 * 30], 22050)?;
//! let with_clicks = overlay_click_track(&song, 120.0, &ClickConfig::default())?;
//! assert_eq!(with_clicks.len(), song.len());
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use crate::error::AnalysisError;
use crate::preprocessing::Waveform;

/// Click sound parameters
#[derive(Debug, Clone)]
pub struct ClickConfig {
    /// Tone frequency in Hz (default: 1000.0)
    pub frequency_hz: f32,

    /// Click length in milliseconds (default: 50.0)
    pub duration_ms: f32,

    /// Peak amplitude (default: 0.8)
    pub amplitude: f32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            duration_ms: 50.0,
            amplitude: 0.8,
        }
    }
}

/// Sample index of every click that fits in `duration_seconds`
///
/// Only whole beat intervals are rendered: a track of 2.9 intervals has 2 clicks.
pub fn click_positions(bpm: f32, duration_seconds: f32, sample_rate: u32) -> Result<Vec<usize>, AnalysisError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!("Invalid click tempo: {}", bpm)));
    }
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate: 0".to_string()));
    }
    if duration_seconds < 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid duration: {}",
            duration_seconds
        )));
    }

    let interval_seconds = 60.0 / bpm as f64;
    let count = (duration_seconds as f64 / interval_seconds).floor() as usize;
    let interval_samples = interval_seconds * sample_rate as f64;
    Ok((0..count)
        .map(|k| (k as f64 * interval_samples).round() as usize)
        .collect())
}

/// Render a click track
///
/// Returns `round(duration_seconds * sample_rate)` samples with a sine burst at
/// every beat.
pub fn click_track(
    bpm: f32,
    duration_seconds: f32,
    sample_rate: u32,
    click: &ClickConfig,
) -> Result<Vec<f32>, AnalysisError> {
    let positions = click_positions(bpm, duration_seconds, sample_rate)?;
    let len = (duration_seconds as f64 * sample_rate as f64).round() as usize;
    let click_len = (click.duration_ms / 1000.0 * sample_rate as f32).round() as usize;
    let phase_step = 2.0 * std::f32::consts::PI * click.frequency_hz / sample_rate as f32;

    let mut track = vec![0.0f32; len];
    for start in positions {
        for (i, sample) in track.iter_mut().skip(start).take(click_len).enumerate() {
            *sample = click.amplitude * (phase_step * i as f32).sin();
        }
    }

    log::debug!(
        "Click track: {:.2} BPM, {:.2}s at {} Hz",
        bpm,
        duration_seconds,
        sample_rate
    );

    Ok(track)
}

/// Mix a click track into `waveform`
///
/// The sum is clamped to [-1.0, 1.0]. Output length equals input length.
pub fn overlay_click_track(waveform: &Waveform, bpm: f32, click: &ClickConfig) -> Result<Waveform, AnalysisError> {
    let clicks = click_track(bpm, waveform.duration_seconds(), waveform.sample_rate, click)?;
    let samples = waveform
        .samples
        .iter()
        .enumerate()
        .map(|(i, &x)| (x + clicks.get(i).copied().unwrap_or(0.0)).clamp(-1.0, 1.0))
        .collect();
    Waveform::new(samples, waveform.sample_rate)
}
