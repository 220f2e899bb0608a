//! Silence detection and trimming utilities
//!
//! Leading and trailing silence biases onset statistics, so it is removed
//! before any tempo analysis. Trimming is relative: a frame is silent when its
//! RMS level lies more than `top_db` below the loudest frame of the track. A
//! track whose loudest frame stays under an absolute floor (`floor_dbfs`) is
//! silent as a whole, so low-level hiss is never analysed for tempo.

use super::Waveform;
use crate::error::AnalysisError;

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Silence detection configuration
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    /// Threshold in dB below the loudest frame (default: 20.0)
    pub top_db: f32,

    /// Absolute level in dBFS the loudest frame must exceed (default: -60.0)
    pub floor_dbfs: f32,

    /// Frame size for analysis (default: 2048)
    pub frame_size: usize,

    /// Hop between analysis frames (default: 512)
    pub hop_size: usize,
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self {
            top_db: 20.0,
            floor_dbfs: -60.0,
            frame_size: 2048,
            hop_size: 512,
        }
    }
}

/// Compute RMS level per frame
///
/// Frames start at multiples of `hop_size`. A signal shorter than one frame
/// yields a single partial frame.
pub fn frame_rms(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<f32> {
    if samples.is_empty() || frame_size == 0 || hop_size == 0 {
        return Vec::new();
    }

    let num_frames = if samples.len() > frame_size {
        (samples.len() - frame_size) / hop_size + 1
    } else {
        1
    };

    (0..num_frames)
        .map(|i| {
            let start = i * hop_size;
            let end = (start + frame_size).min(samples.len());
            let frame = &samples[start..end];
            let sum_sq: f32 = frame.iter().map(|&x| x * x).sum();
            (sum_sq / frame.len() as f32).sqrt()
        })
        .collect()
}

/// Detect leading and trailing silence and trim it
///
/// # Arguments
///
/// * `waveform` - Input audio
/// * `detector` - Silence detection configuration
///
/// # Returns
///
/// A new waveform spanning from the first to the last non-silent frame
///
/// # Errors
///
/// - `EmptySignal` if the input has no samples
/// - `SilentSignal` if the loudest frame does not exceed `floor_dbfs`
pub fn trim_silence(
    waveform: &Waveform,
    detector: &SilenceDetector,
) -> Result<Waveform, AnalysisError> {
    if waveform.is_empty() {
        return Err(AnalysisError::EmptySignal("Empty audio samples".to_string()));
    }

    if detector.frame_size == 0 || detector.hop_size == 0 {
        return Err(AnalysisError::InvalidInput(
            "Silence frame and hop sizes must be > 0".to_string(),
        ));
    }

    log::debug!(
        "Detecting silence in {} samples (top_db={:.1})",
        waveform.len(),
        detector.top_db
    );

    let rms = frame_rms(&waveform.samples, detector.frame_size, detector.hop_size);
    let peak_rms = rms.iter().copied().fold(0.0f32, f32::max);

    if !peak_rms.is_finite() {
        return Err(AnalysisError::NumericalError(
            "Non-finite sample values".to_string(),
        ));
    }

    let peak_dbfs = 20.0 * peak_rms.max(EPSILON).log10();
    if peak_dbfs <= detector.floor_dbfs {
        log::warn!(
            "Loudest frame at {:.1} dBFS does not exceed the {:.1} dBFS floor; treating as silence",
            peak_dbfs,
            detector.floor_dbfs
        );
        return Err(AnalysisError::SilentSignal {
            floor_dbfs: detector.floor_dbfs,
        });
    }

    // Level relative to the loudest frame: 0 dB at the peak, negative elsewhere
    let is_loud = |level: f32| -> bool {
        level > EPSILON && 20.0 * (level / peak_rms).log10() > -detector.top_db
    };

    let first = rms.iter().position(|&r| is_loud(r));
    let last = rms.iter().rposition(|&r| is_loud(r));

    let (first, last) = match (first, last) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(AnalysisError::SilentSignal {
                floor_dbfs: detector.floor_dbfs,
            })
        }
    };

    let start = first * detector.hop_size;
    let end = (last * detector.hop_size + detector.frame_size).min(waveform.len());

    log::debug!(
        "Silence trim: kept samples [{}, {}) of {}",
        start,
        end,
        waveform.len()
    );

    Ok(waveform.with_samples(waveform.samples[start..end].to_vec()))
}
