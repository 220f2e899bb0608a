//! Short-time Fourier transform and its inverse
//!
//! Frames are centered: the signal is zero-padded by `frame_size / 2` on both
//! sides, so frame `t` is centered on sample `t * hop_size`. A periodic Hann
//! window is used for analysis and synthesis; the inverse transform divides by
//! the summed squared window, so an unmodified STFT reconstructs the input.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::features::stft::{istft, stft};
//!
//! let samples = vec![0.0f32; 22050];
//! let spectrum = stft(&samples, 2048, 512)?;
//! let restored = istft(&spectrum, 2048, 512, samples.len())?;
//! assert_eq!(restored.len(), samples.len());
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::AnalysisError;

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Complex spectrogram, one `frame_size / 2 + 1` bin vector per frame
pub type Spectrogram = Vec<Vec<Complex<f32>>>;

/// Periodic Hann window of length `n`
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
            0.5 * (1.0 - t.cos())
        })
        .collect()
}

fn validate(frame_size: usize, hop_size: usize) -> Result<(), AnalysisError> {
    if frame_size < 2 {
        return Err(AnalysisError::InvalidInput(format!(
            "Frame size must be >= 2, got {}",
            frame_size
        )));
    }
    if hop_size == 0 || hop_size > frame_size {
        return Err(AnalysisError::InvalidInput(format!(
            "Hop size must be in [1, {}], got {}",
            frame_size, hop_size
        )));
    }
    Ok(())
}

/// Compute the centered STFT of `samples`
///
/// Returns `1 + samples.len() / hop_size` frames of `frame_size / 2 + 1` bins.
pub fn stft(samples: &[f32], frame_size: usize, hop_size: usize) -> Result<Spectrogram, AnalysisError> {
    validate(frame_size, hop_size)?;
    if samples.is_empty() {
        return Err(AnalysisError::EmptySignal("Empty audio samples".to_string()));
    }

    let pad = frame_size / 2;
    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let num_frames = 1 + (padded.len() - frame_size) / hop_size;
    let n_bins = frame_size / 2 + 1;
    let window = hann_window(frame_size);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0, 0.0); frame_size];

    let mut frames = Vec::with_capacity(num_frames);
    for t in 0..num_frames {
        let start = t * hop_size;
        for (slot, (&x, &w)) in buffer
            .iter_mut()
            .zip(padded[start..start + frame_size].iter().zip(window.iter()))
        {
            *slot = Complex::new(x * w, 0.0);
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        frames.push(buffer[..n_bins].to_vec());
    }

    log::debug!(
        "STFT: {} samples -> {} frames x {} bins (frame={}, hop={})",
        samples.len(),
        num_frames,
        n_bins,
        frame_size,
        hop_size
    );

    Ok(frames)
}

/// Invert a centered STFT by weighted overlap-add
///
/// `length` is the number of output samples (normally the original signal
/// length). Bins beyond Nyquist are rebuilt by Hermitian symmetry.
pub fn istft(
    spectrogram: &[Vec<Complex<f32>>],
    frame_size: usize,
    hop_size: usize,
    length: usize,
) -> Result<Vec<f32>, AnalysisError> {
    validate(frame_size, hop_size)?;
    let n_bins = frame_size / 2 + 1;
    if let Some((i, frame)) = spectrogram.iter().enumerate().find(|(_, f)| f.len() != n_bins) {
        return Err(AnalysisError::InvalidInput(format!(
            "Frame {} has {} bins, expected {}",
            i,
            frame.len(),
            n_bins
        )));
    }

    let pad = frame_size / 2;
    let total = (spectrogram.len().saturating_sub(1)) * hop_size + frame_size;
    let mut output = vec![0.0f32; total.max(length + 2 * pad)];
    let mut window_sum = vec![0.0f32; output.len()];
    let window = hann_window(frame_size);

    let mut planner = FftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(frame_size);
    let mut scratch = vec![Complex::new(0.0, 0.0); ifft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0, 0.0); frame_size];
    let scale = 1.0 / frame_size as f32;

    for (t, frame) in spectrogram.iter().enumerate() {
        buffer[..n_bins].copy_from_slice(frame);
        for k in 1..(frame_size - n_bins + 1) {
            buffer[frame_size - k] = frame[k].conj();
        }
        ifft.process_with_scratch(&mut buffer, &mut scratch);

        let start = t * hop_size;
        for (i, (value, &w)) in buffer.iter().zip(window.iter()).enumerate() {
            output[start + i] += value.re * scale * w;
            window_sum[start + i] += w * w;
        }
    }

    for (y, &norm) in output.iter_mut().zip(window_sum.iter()) {
        if norm > EPSILON {
            *y /= norm;
        }
    }

    Ok(output[pad..pad + length].to_vec())
}

/// Magnitude of every bin
pub fn magnitude(spectrogram: &[Vec<Complex<f32>>]) -> Vec<Vec<f32>> {
    spectrogram
        .iter()
        .map(|frame| frame.iter().map(|c| c.norm()).collect())
        .collect()
}

/// Power (squared magnitude) of every bin
pub fn power(spectrogram: &[Vec<Complex<f32>>]) -> Vec<Vec<f32>> {
    spectrogram
        .iter()
        .map(|frame| frame.iter().map(|c| c.norm_sqr()).collect())
        .collect()
}

/// Center frequency in Hz of each bin
pub fn bin_frequencies(sample_rate: u32, frame_size: usize) -> Vec<f32> {
    (0..=frame_size / 2)
        .map(|k| k as f32 * sample_rate as f32 / frame_size as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, sr: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect()
    }

    #[test]
    fn test_stft_shape() {
        let samples = vec![0.1f32; 4096];
        let spec = stft(&samples, 2048, 512).unwrap();
        assert_eq!(spec.len(), 1 + 4096 / 512);
        assert!(spec.iter().all(|f| f.len() == 1025));
    }

    #[test]
    fn test_round_trip_reconstruction() {
        let samples = sine(10000, 440.0, 22050.0);
        let spec = stft(&samples, 1024, 256).unwrap();
        let restored = istft(&spec, 1024, 256, samples.len()).unwrap();

        assert_eq!(restored.len(), samples.len());
        let max_err = samples
            .iter()
            .zip(restored.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max reconstruction error {}", max_err);
    }

    #[test]
    fn test_sine_peak_bin() {
        let sr = 22050.0;
        let samples = sine(8192, 1000.0, sr);
        let spec = stft(&samples, 2048, 512).unwrap();
        let mags = magnitude(&spec);
        let middle = &mags[mags.len() / 2];
        let (peak_bin, _) = middle
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc });
        let freqs = bin_frequencies(22050, 2048);
        assert!((freqs[peak_bin] - 1000.0).abs() < 22050.0 / 2048.0 * 1.5);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(stft(&[0.0; 100], 1, 1).is_err());
        assert!(stft(&[0.0; 100], 1024, 0).is_err());
        assert!(stft(&[], 1024, 256).is_err());
    }
}
