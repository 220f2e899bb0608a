//! Harmonic-percussive source separation (HPSS)
//!
//! Separates tonal (harmonic) and transient (percussive) content by median
//! filtering the magnitude spectrogram. Harmonic energy is smooth along time,
//! percussive energy is smooth along frequency. Soft masks derived from the two
//! filtered spectrograms are applied to the complex STFT and inverted.
//!
//! # Reference
//!
//! Fitzgerald, D. (2010). Harmonic/Percussive Separation using Median Filtering.
//! *Proceedings of the 13th International Conference on Digital Audio Effects (DAFx-10)*.
//!
//! Driedger, J., Müller, M., & Disch, S. (2014). Extending Harmonic-Percussive
//! Separation of Audio Signals. *Proceedings of ISMIR*.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::features::onset::hpss::{percussive, HpssConfig};
//!
//! let samples = vec![0.0f32; 22050 * 10];
//! let drums = percussive(&samples, &HpssConfig::default())?;
//! assert_eq!(drums.len(), samples.len());
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use rayon::prelude::*;
use rustfft::num_complex::Complex;

use crate::error::AnalysisError;
use crate::features::stft::{istft, magnitude, stft};

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// HPSS parameters
#[derive(Debug, Clone)]
pub struct HpssConfig {
    /// STFT frame size (default: 2048)
    pub frame_size: usize,

    /// STFT hop size (default: 512)
    pub hop_size: usize,

    /// Median filter length in frames (harmonic) and bins (percussive) (default: 31)
    pub kernel_size: usize,

    /// Soft-mask exponent; 2.0 gives Wiener-style masks (default: 2.0)
    pub power: f32,
}

impl Default for HpssConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            kernel_size: 31,
            power: 2.0,
        }
    }
}

/// Harmonic and percussive time-domain components
#[derive(Debug, Clone)]
pub struct Separated {
    /// Tonal component (sustained partials)
    pub harmonic: Vec<f32>,

    /// Transient component (onsets, drums)
    pub percussive: Vec<f32>,
}

fn median_in_place(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| {
        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
    });
    *median
}

/// Decompose a magnitude spectrogram into harmonic and percussive enhanced spectrograms
///
/// # Arguments
///
/// * `magnitude_spec` - Magnitude spectrogram (n_frames × n_bins)
/// * `kernel_size` - Median filter length; windows are truncated at the edges
///
/// # Returns
///
/// Tuple of (harmonic, percussive) spectrograms with the input's shape
pub fn hpss_decompose(
    magnitude_spec: &[Vec<f32>],
    kernel_size: usize,
) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>), AnalysisError> {
    if magnitude_spec.is_empty() {
        return Err(AnalysisError::InvalidInput("Empty spectrogram".to_string()));
    }
    if kernel_size == 0 {
        return Err(AnalysisError::InvalidInput(
            "Median kernel size must be > 0".to_string(),
        ));
    }

    let n_frames = magnitude_spec.len();
    let n_bins = magnitude_spec[0].len();
    if magnitude_spec.iter().any(|frame| frame.len() != n_bins) {
        return Err(AnalysisError::InvalidInput(
            "Inconsistent frame lengths in spectrogram".to_string(),
        ));
    }

    log::debug!(
        "Decomposing spectrogram with HPSS: {} frames x {} bins, kernel={}",
        n_frames,
        n_bins,
        kernel_size
    );

    let half = kernel_size / 2;

    // Harmonic: median along time for each bin
    let harmonic: Vec<Vec<f32>> = (0..n_frames)
        .into_par_iter()
        .map(|t| {
            let lo = t.saturating_sub(half);
            let hi = (t + half + 1).min(n_frames);
            let mut window = Vec::with_capacity(hi - lo);
            (0..n_bins)
                .map(|k| {
                    window.clear();
                    window.extend(magnitude_spec[lo..hi].iter().map(|frame| frame[k]));
                    median_in_place(&mut window)
                })
                .collect()
        })
        .collect();

    // Percussive: median along frequency within each frame
    let percussive: Vec<Vec<f32>> = magnitude_spec
        .par_iter()
        .map(|frame| {
            let mut window = Vec::with_capacity(kernel_size);
            (0..n_bins)
                .map(|k| {
                    let lo = k.saturating_sub(half);
                    let hi = (k + half + 1).min(n_bins);
                    window.clear();
                    window.extend_from_slice(&frame[lo..hi]);
                    median_in_place(&mut window)
                })
                .collect()
        })
        .collect();

    Ok((harmonic, percussive))
}

/// Soft mask selecting `target` against `reference`: `t^p / (t^p + r^p)`
///
/// Bins where both inputs vanish get a zero mask.
pub fn soft_mask(target: &[Vec<f32>], reference: &[Vec<f32>], power: f32) -> Vec<Vec<f32>> {
    target
        .iter()
        .zip(reference.iter())
        .map(|(t_frame, r_frame)| {
            t_frame
                .iter()
                .zip(r_frame.iter())
                .map(|(&t, &r)| {
                    let tp = t.powf(power);
                    let denom = tp + r.powf(power);
                    if denom > EPSILON {
                        tp / denom
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

fn apply_mask(spectrogram: &[Vec<Complex<f32>>], mask: &[Vec<f32>]) -> Vec<Vec<Complex<f32>>> {
    spectrogram
        .iter()
        .zip(mask.iter())
        .map(|(frame, m)| frame.iter().zip(m.iter()).map(|(&c, &g)| c * g).collect())
        .collect()
}

/// STFT of `samples` with its harmonic- and percussive-enhanced magnitudes
type Decomposition = (Vec<Vec<Complex<f32>>>, Vec<Vec<f32>>, Vec<Vec<f32>>);

fn decompose(samples: &[f32], config: &HpssConfig) -> Result<Decomposition, AnalysisError> {
    if config.power <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "HPSS power must be > 0, got {}",
            config.power
        )));
    }
    let spectrogram = stft(samples, config.frame_size, config.hop_size)?;
    let mags = magnitude(&spectrogram);
    let (harmonic, percussive) = hpss_decompose(&mags, config.kernel_size)?;
    Ok((spectrogram, harmonic, percussive))
}

/// Separate `samples` into harmonic and percussive waveforms
///
/// The harmonic part is not used for tempo; it is exposed for key detection
/// and other tonal analysis.
pub fn separate(samples: &[f32], config: &HpssConfig) -> Result<Separated, AnalysisError> {
    let (spectrogram, harmonic, percussive) = decompose(samples, config)?;
    let mask_h = soft_mask(&harmonic, &percussive, config.power);
    let mask_p = soft_mask(&percussive, &harmonic, config.power);
    let harmonic = istft(
        &apply_mask(&spectrogram, &mask_h),
        config.frame_size,
        config.hop_size,
        samples.len(),
    )?;
    let percussive = istft(
        &apply_mask(&spectrogram, &mask_p),
        config.frame_size,
        config.hop_size,
        samples.len(),
    )?;
    Ok(Separated {
        harmonic,
        percussive,
    })
}

/// Percussive component only
///
/// Builds just the percussive mask; the harmonic waveform is never resynthesized.
pub fn percussive(samples: &[f32], config: &HpssConfig) -> Result<Vec<f32>, AnalysisError> {
    let (spectrogram, harmonic, percussive) = decompose(samples, config)?;
    let mask_p = soft_mask(&percussive, &harmonic, config.power);
    let output = istft(
        &apply_mask(&spectrogram, &mask_p),
        config.frame_size,
        config.hop_size,
        samples.len(),
    )?;
    log::debug!("HPSS percussive component: {} samples", output.len());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy(x: &[f32]) -> f32 {
        x.iter().map(|&v| v * v).sum()
    }

    #[test]
    fn test_median_in_place() {
        let mut values = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(median_in_place(&mut values), 3.0);
    }

    #[test]
    fn test_decompose_shapes() {
        let spec = vec![vec![0.5f32; 64]; 20];
        let (h, p) = hpss_decompose(&spec, 7).unwrap();
        assert_eq!(h.len(), 20);
        assert_eq!(p.len(), 20);
        assert!(h.iter().all(|f| f.len() == 64));
    }

    #[test]
    fn test_decompose_separates_lines() {
        // Horizontal line (steady tone in bin 10) and vertical line (click at frame 10)
        let mut spec = vec![vec![0.0f32; 64]; 21];
        for frame in spec.iter_mut() {
            frame[10] = 1.0;
        }
        for bin in spec[10].iter_mut() {
            *bin = 1.0;
        }

        let (h, p) = hpss_decompose(&spec, 5).unwrap();

        // Steady tone survives the time-median, the click survives the frequency-median
        assert_eq!(h[3][10], 1.0);
        assert_eq!(h[10][40], 0.0);
        assert_eq!(p[10][40], 1.0);
        assert_eq!(p[3][10], 0.0);
    }

    #[test]
    fn test_soft_mask_complementary() {
        let a = vec![vec![1.0f32, 2.0, 0.0]];
        let b = vec![vec![1.0f32, 1.0, 0.0]];
        let ma = soft_mask(&a, &b, 2.0);
        let mb = soft_mask(&b, &a, 2.0);
        assert!((ma[0][0] - 0.5).abs() < 1e-6);
        assert!((ma[0][1] + mb[0][1] - 1.0).abs() < 1e-6);
        assert_eq!(ma[0][2], 0.0);
    }

    #[test]
    fn test_separate_tone_goes_harmonic() {
        let sr = 22050.0;
        let samples: Vec<f32> = (0..22050)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr).sin())
            .collect();

        let separated = separate(&samples, &HpssConfig::default()).unwrap();

        assert_eq!(separated.harmonic.len(), samples.len());
        assert!(energy(&separated.harmonic) > 4.0 * energy(&separated.percussive));
    }

    #[test]
    fn test_percussive_keeps_clicks() {
        let mut samples = vec![0.0f32; 22050];
        for start in (0..22050).step_by(5512) {
            samples[start] = 1.0;
        }

        let drums = percussive(&samples, &HpssConfig::default()).unwrap();
        let separated = separate(&samples, &HpssConfig::default()).unwrap();

        assert_eq!(drums.len(), samples.len());
        assert!(energy(&separated.percussive) > energy(&separated.harmonic));
    }

    #[test]
    fn test_percussive_matches_full_separation() {
        let samples: Vec<f32> = (0..22050)
            .map(|i| {
                let click = if i % 5512 == 0 { 1.0 } else { 0.0 };
                click + 0.3 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22050.0).sin()
            })
            .collect();

        let drums = percussive(&samples, &HpssConfig::default()).unwrap();
        let separated = separate(&samples, &HpssConfig::default()).unwrap();
        assert_eq!(drums, separated.percussive);
    }
}
