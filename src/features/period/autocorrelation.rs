//! Autocorrelation-based BPM estimation
//!
//! Finds periodicity in an onset strength envelope using FFT-accelerated autocorrelation.
//!
//! # Algorithm
//!
//! This module implements the autocorrelation-based tempo estimation algorithm
//! described in Ellis & Pikrakis (2006). The process:
//!
//! 1. Remove the mean of the onset envelope
//! 2. Compute autocorrelation using FFT acceleration: `ACF = IFFT(|FFT(signal)|²)`
//! 3. Find peaks in autocorrelation function
//! 4. Convert lag values to BPM: `BPM = 60 * frame_rate / lag`
//! 5. Filter candidates within BPM range
//!
//! # Reference
//!
//! Ellis, D. P. W., & Pikrakis, A. (2006). Real-time Beat Induction.
//! *Proceedings of the International Conference on Music Information Retrieval*.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::features::period::autocorrelation::estimate_bpm_from_autocorrelation;
//!
//! let envelope = vec![0.0f32; 2000];
//! let candidates = estimate_bpm_from_autocorrelation(&envelope, 22050.0 / 512.0, 40.0, 200.0)?;
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use super::BpmCandidate;
use crate::error::AnalysisError;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const EPSILON: f32 = 1e-10;

/// Estimate BPM candidates from the global autocorrelation of an onset envelope
///
/// # Arguments
///
/// * `envelope` - Onset strength envelope (one value per frame)
/// * `frame_rate` - Envelope frames per second (`sample_rate / hop_size`)
/// * `min_bpm` - Minimum BPM to consider
/// * `max_bpm` - Maximum BPM to consider
///
/// # Returns
///
/// Vector of BPM candidates ranked by confidence (highest first). Empty when
/// the envelope carries no periodicity in range.
///
/// # Errors
///
/// Returns `AnalysisError` if the envelope is empty or parameters are invalid
///
/// # Algorithm Details
///
/// 1. **Centering**: the envelope mean is removed so the zero-lag DC term does
///    not leak into every lag
///
/// 2. **Autocorrelation**: Compute using FFT acceleration
///    - `ACF[lag] = IFFT(|FFT(signal)|²)`
///    - Complexity: O(n log n) instead of O(n²)
///
/// 3. **Peak Detection**: Find local maxima in ACF
///    - Filter by BPM range (min_lag, max_lag)
///    - Compute prominence (height relative to neighbors)
///
/// 4. **BPM Conversion**: `BPM = 60 * frame_rate / lag`
pub fn estimate_bpm_from_autocorrelation(
    envelope: &[f32],
    frame_rate: f32,
    min_bpm: f32,
    max_bpm: f32,
) -> Result<Vec<BpmCandidate>, AnalysisError> {
    log::debug!(
        "Estimating BPM from autocorrelation: {} frames at {:.2} Hz, range=[{:.1}, {:.1}] BPM",
        envelope.len(),
        frame_rate,
        min_bpm,
        max_bpm
    );

    if envelope.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "Empty onset envelope".to_string(),
        ));
    }

    if frame_rate <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid frame rate: {}",
            frame_rate
        )));
    }

    if min_bpm <= 0.0 || max_bpm <= 0.0 || min_bpm >= max_bpm {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid BPM range: [{:.1}, {:.1}]",
            min_bpm, max_bpm
        )));
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centered: Vec<f32> = envelope.iter().map(|&x| x - mean).collect();

    let acf = compute_autocorrelation_fft(&centered)?;

    // BPM = 60 * frame_rate / lag
    let lag_min = ((60.0 * frame_rate) / max_bpm).ceil().max(1.0) as usize;
    let lag_max = ((60.0 * frame_rate) / min_bpm).floor() as usize;

    if lag_min >= lag_max || lag_max >= acf.len() {
        log::warn!(
            "Invalid lag range: [{}, {}] for ACF length {}",
            lag_min,
            lag_max,
            acf.len()
        );
        return Ok(vec![]);
    }

    let peaks = find_peaks_in_acf(&acf[lag_min..=lag_max], lag_min)?;

    let max_acf = acf[lag_min..=lag_max].iter().copied().fold(0.0f32, f32::max);
    let mut candidates: Vec<BpmCandidate> = peaks
        .into_iter()
        .map(|(lag, value)| BpmCandidate {
            bpm: 60.0 * frame_rate / lag as f32,
            confidence: if max_acf > EPSILON {
                (value / max_acf).min(1.0)
            } else {
                0.0
            },
        })
        .filter(|c| c.bpm >= min_bpm && c.bpm <= max_bpm)
        .collect();

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    log::debug!("Autocorrelation found {} BPM candidates", candidates.len());

    Ok(candidates)
}

/// Compute autocorrelation using FFT acceleration
///
/// Uses the identity: ACF = IFFT(|FFT(signal)|²). Negative lags are clipped to 0.
///
/// # Returns
///
/// Autocorrelation function (same length as input)
pub(crate) fn compute_autocorrelation_fft(signal: &[f32]) -> Result<Vec<f32>, AnalysisError> {
    let n = signal.len();
    if n == 0 {
        return Err(AnalysisError::InvalidInput(
            "Cannot autocorrelate an empty signal".to_string(),
        ));
    }

    // Zero-pad to 2n to avoid circular wrap-around
    let fft_size = (2 * n).next_power_of_two();

    let mut fft_input: Vec<Complex<f32>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    fft_input.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut fft_input);

    for x in &mut fft_input {
        *x = *x * x.conj();
    }

    let ifft = planner.plan_fft_inverse(fft_size);
    ifft.process(&mut fft_input);

    let scale = 1.0 / (fft_size as f32);
    let acf: Vec<f32> = fft_input[..n]
        .iter()
        .map(|x| (x.re * scale).max(0.0))
        .collect();

    if acf.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::NumericalError(
            "Non-finite autocorrelation value".to_string(),
        ));
    }

    Ok(acf)
}

/// Find peaks in autocorrelation function
///
/// Finds local maxima with minimum prominence.
///
/// # Arguments
///
/// * `acf_slice` - Slice of ACF to search (already filtered to lag range)
/// * `offset` - Offset to add to indices (lag_min)
///
/// # Returns
///
/// Vector of (lag, value) pairs for detected peaks, highest first
pub(crate) fn find_peaks_in_acf(
    acf_slice: &[f32],
    offset: usize,
) -> Result<Vec<(usize, f32)>, AnalysisError> {
    if acf_slice.len() < 3 {
        return Ok(vec![]);
    }

    let max_value = acf_slice.iter().copied().fold(0.0f32, f32::max);
    if max_value < EPSILON {
        return Ok(vec![]);
    }

    // Minimum prominence: 10% of maximum
    let min_prominence = max_value * 0.1;
    let min_distance = 2;

    let mut peaks: Vec<(usize, f32)> = Vec::new();

    for i in 1..(acf_slice.len() - 1) {
        let value = acf_slice[i];
        if value <= acf_slice[i - 1] || value < acf_slice[i + 1] {
            continue;
        }

        // Prominence against the higher of the two surrounding valleys
        let left_min = valley_floor(acf_slice[..i].iter().rev().copied(), value);
        let right_min = valley_floor(acf_slice[i + 1..].iter().copied(), value);
        let prominence = value - left_min.max(right_min);
        if prominence < min_prominence {
            continue;
        }

        let lag = i + offset;
        match peaks.last_mut() {
            Some(last) if lag - last.0 < min_distance => {
                // Keep the higher peak if too close
                if value > last.1 {
                    *last = (lag, value);
                }
            }
            _ => peaks.push((lag, value)),
        }
    }

    peaks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(peaks)
}

/// Lowest value reached before the signal climbs above `peak`
fn valley_floor(values: impl Iterator<Item = f32>, peak: f32) -> f32 {
    let mut floor = peak;
    for v in values {
        if v > peak {
            break;
        }
        floor = floor.min(v);
    }
    floor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_train(len: usize, period: usize) -> Vec<f32> {
        (0..len).map(|i| if i % period == 0 { 1.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_autocorrelation_basic_120bpm() {
        // 43 frames per beat at 86.13 frames/s is 120.2 BPM
        let frame_rate = 44100.0 / 512.0;
        let envelope = impulse_train(1000, 43);

        let candidates = estimate_bpm_from_autocorrelation(&envelope, frame_rate, 60.0, 180.0).unwrap();

        assert!(!candidates.is_empty(), "Should find at least one candidate");
        let best = &candidates[0];
        assert!(
            (best.bpm - 120.0).abs() < 5.0,
            "Best BPM should be close to 120, got {:.2}",
            best.bpm
        );
        assert!(best.confidence > 0.0, "Confidence should be positive");
    }

    #[test]
    fn test_autocorrelation_128bpm() {
        // 22050 Hz, hop 512: 43.07 frames/s; 20 frames per beat is 129.2 BPM
        let frame_rate = 22050.0 / 512.0;
        let envelope = impulse_train(1200, 20);

        let candidates = estimate_bpm_from_autocorrelation(&envelope, frame_rate, 90.0, 180.0).unwrap();

        assert!(!candidates.is_empty());
        assert!(
            (candidates[0].bpm - 129.2).abs() < 1.0,
            "Best BPM should be close to 129.2, got {:.2}",
            candidates[0].bpm
        );
    }

    #[test]
    fn test_autocorrelation_empty_envelope() {
        let result = estimate_bpm_from_autocorrelation(&[], 43.0, 60.0, 180.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_autocorrelation_flat_envelope() {
        let candidates = estimate_bpm_from_autocorrelation(&vec![0.3; 1000], 43.0, 60.0, 180.0).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_autocorrelation_short_envelope() {
        // Too short to hold a 60 BPM lag
        let candidates = estimate_bpm_from_autocorrelation(&impulse_train(20, 5), 43.0, 60.0, 180.0).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_autocorrelation_invalid_params() {
        let envelope = impulse_train(500, 20);
        assert!(estimate_bpm_from_autocorrelation(&envelope, 0.0, 60.0, 180.0).is_err());
        assert!(estimate_bpm_from_autocorrelation(&envelope, 43.0, 180.0, 60.0).is_err());
    }

    #[test]
    fn test_compute_autocorrelation_fft() {
        let signal = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let acf = compute_autocorrelation_fft(&signal).unwrap();

        assert_eq!(acf.len(), signal.len());
        // Zero lag is the maximum, period-2 lag is strong, odd lags vanish
        assert!((acf[0] - 3.0).abs() < 1e-4);
        assert!((acf[2] - 2.0).abs() < 1e-4);
        assert!(acf[1].abs() < 1e-4);
    }

    #[test]
    fn test_find_peaks_in_acf() {
        let acf = vec![0.1, 0.2, 0.5, 0.3, 0.4, 0.6, 0.2, 0.1];
        let peaks = find_peaks_in_acf(&acf, 0).unwrap();

        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].0, 5);
        assert_eq!(peaks[1].0, 2);
    }
}
