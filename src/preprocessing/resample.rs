//! Sample rate conversion using Rubato
//!
//! Hop-length based frame computations assume a fixed rate-to-frame ratio, so
//! everything downstream runs at one canonical rate (22050 Hz by default).

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::Waveform;
use crate::error::AnalysisError;

/// Samples fed to the resampler per call
const CHUNK_SIZE: usize = 1024;

/// Resample a waveform to `target_rate`
///
/// Uses Rubato's `SincFixedIn`. When the source rate already equals the
/// target the samples are returned unchanged.
pub fn resample(waveform: &Waveform, target_rate: u32) -> Result<Waveform, AnalysisError> {
    if target_rate == 0 {
        return Err(AnalysisError::InvalidInput(
            "Invalid target sample rate: 0".to_string(),
        ));
    }

    if waveform.sample_rate == target_rate {
        return Ok(waveform.clone());
    }

    if waveform.is_empty() {
        return Err(AnalysisError::EmptySignal(
            "Nothing to resample".to_string(),
        ));
    }

    log::debug!(
        "Resampling {} samples: {} Hz -> {} Hz",
        waveform.len(),
        waveform.sample_rate,
        target_rate
    );

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / waveform.sample_rate as f64;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1)
        .map_err(|e| AnalysisError::Resample(format!("Failed to create resampler: {}", e)))?;

    let expected_len = (waveform.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected_len + CHUNK_SIZE);
    let mut chunk = vec![0.0f32; CHUNK_SIZE];

    for block in waveform.samples.chunks(CHUNK_SIZE) {
        chunk[..block.len()].copy_from_slice(block);
        // Zero-pad the final partial chunk
        chunk[block.len()..].fill(0.0);

        let input = [chunk.as_slice()];
        let resampled = resampler
            .process(&input[..], None)
            .map_err(|e| AnalysisError::Resample(format!("Resample failed: {}", e)))?;

        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
    }

    output.truncate(expected_len);

    Ok(Waveform {
        samples: output,
        sample_rate: target_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate_is_noop() {
        let waveform = Waveform::new(vec![0.1, -0.2, 0.3, -0.4], 22050).unwrap();
        let result = resample(&waveform, 22050).unwrap();
        assert_eq!(result, waveform);
    }

    #[test]
    fn test_resample_duration_preserved() {
        // 1 second of 440 Hz at 44.1 kHz
        let sr = 44100;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let waveform = Waveform::new(samples, sr as u32).unwrap();

        let result = resample(&waveform, 22050).unwrap();

        assert_eq!(result.sample_rate, 22050);
        let ratio = result.len() as f32 / 22050.0;
        assert!(
            (ratio - 1.0).abs() < 0.05,
            "Duration should be preserved: got {} samples",
            result.len()
        );
    }

    #[test]
    fn test_resample_invalid_target() {
        let waveform = Waveform::new(vec![0.0; 16], 44100).unwrap();
        assert!(resample(&waveform, 0).is_err());
    }
}
