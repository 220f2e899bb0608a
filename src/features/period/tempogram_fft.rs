//! FFT-based tempogram for BPM detection
//!
//! Applies an FFT to the onset strength envelope and reads tempo straight off
//! the modulation spectrum: a component at `f` Hz is a pulse at `60 * f` BPM.
//!
//! # Reference
//!
//! Grosche, P., Müller, M., & Serrà, J. (2012). Robust Local Features for Remote Folk Music Identification.
//! *IEEE Transactions on Audio, Speech, and Language Processing*.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::features::period::tempogram_fft::{fft_tempogram, find_best_bpm_fft};
//!
//! let envelope = vec![0.0f32; 1000];
//! let tempogram = fft_tempogram(&envelope, 22050.0 / 512.0, 40.0, 200.0)?;
//! let best = find_best_bpm_fft(&tempogram);
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use crate::error::AnalysisError;
use crate::features::stft::hann_window;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Zero-padding factor; finer BPM bins than the raw envelope length gives
const PAD_FACTOR: usize = 4;

/// BPM estimate with confidence from FFT tempogram
#[derive(Debug, Clone)]
pub struct FftTempogramResult {
    /// BPM estimate
    pub bpm: f32,

    /// Confidence score (0.0-1.0) based on peak prominence
    pub confidence: f32,

    /// FFT power at this BPM
    pub power: f32,
}

/// Compute FFT tempogram
///
/// # Arguments
///
/// * `envelope` - Onset strength envelope
/// * `frame_rate` - Envelope frames per second
/// * `min_bpm` - Minimum BPM to consider
/// * `max_bpm` - Maximum BPM to consider
///
/// # Returns
///
/// Tempogram as vector of (BPM, power) pairs restricted to `[min_bpm, max_bpm]`,
/// sorted by power (highest first)
///
/// # Errors
///
/// Returns `AnalysisError` if the envelope is empty or parameters are invalid
pub fn fft_tempogram(
    envelope: &[f32],
    frame_rate: f32,
    min_bpm: f32,
    max_bpm: f32,
) -> Result<Vec<(f32, f32)>, AnalysisError> {
    if envelope.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "Onset envelope is empty".to_string(),
        ));
    }

    if frame_rate <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Frame rate must be > 0, got {}",
            frame_rate
        )));
    }

    if min_bpm <= 0.0 || max_bpm <= min_bpm {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid BPM range: min={}, max={}",
            min_bpm, max_bpm
        )));
    }

    log::debug!(
        "Computing FFT tempogram: {} frames, frame_rate={:.2} Hz, BPM range=[{:.1}, {:.1}]",
        envelope.len(),
        frame_rate,
        min_bpm,
        max_bpm
    );

    // Remove DC so the 0 Hz component doesn't dominate, window against leakage
    let mean = envelope.iter().copied().sum::<f32>() / envelope.len() as f32;
    let n = envelope.len();
    let fft_size = (n * PAD_FACTOR).next_power_of_two();
    let window = hann_window(n);

    let mut fft_input: Vec<Complex<f32>> = envelope
        .iter()
        .zip(window.iter())
        .map(|(&x, &w)| Complex::new((x - mean) * w, 0.0))
        .collect();
    fft_input.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut fft_input);

    let freq_resolution = frame_rate / fft_size as f32;
    let mut tempogram: Vec<(f32, f32)> = fft_input
        .iter()
        .take(fft_size / 2 + 1)
        .enumerate()
        .map(|(bin, x)| (bin as f32 * freq_resolution * 60.0, x.norm_sqr()))
        .filter(|&(bpm, _)| bpm >= min_bpm && bpm <= max_bpm)
        .collect();

    tempogram.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    log::debug!(
        "FFT tempogram: {} BPM bins, top BPM={:.1} (power={:.6})",
        tempogram.len(),
        tempogram.first().map(|(bpm, _)| *bpm).unwrap_or(0.0),
        tempogram.first().map(|(_, power)| *power).unwrap_or(0.0)
    );

    Ok(tempogram)
}

/// Find best BPM estimate from FFT tempogram
///
/// Confidence is prominence-style: `(best - second) / best`.
///
/// Returns `None` if the tempogram is empty or carries no energy
pub fn find_best_bpm_fft(tempogram: &[(f32, f32)]) -> Option<FftTempogramResult> {
    let &(best_bpm, best_power) = tempogram.first()?;
    if best_power <= EPSILON {
        return None;
    }

    let confidence = match tempogram.get(1) {
        Some(&(_, second_power)) => ((best_power - second_power).max(0.0) / best_power).clamp(0.0, 1.0),
        None => 0.5,
    };

    Some(FftTempogramResult {
        bpm: best_bpm,
        confidence,
        power: best_power,
    })
}
