//! Central segment extraction
//!
//! Intros and outros often carry atypical or absent rhythm; the middle of a
//! track is the most representative part for tempo.

use super::Waveform;
use crate::error::AnalysisError;

/// Keep samples between two fractional positions of the waveform
///
/// Retains indices `[floor(start * n), floor(end * n))`. With the default
/// `0.25..0.75` this is the middle half of the track.
pub fn central_segment(waveform: &Waveform, start: f32, end: f32) -> Result<Waveform, AnalysisError> {
    if !(0.0..1.0).contains(&start) || end <= start || end > 1.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid segment bounds: [{}, {}]",
            start, end
        )));
    }

    let n = waveform.len();
    let first = (n as f64 * start as f64).floor() as usize;
    let last = ((n as f64 * end as f64).floor() as usize).min(n);

    if last <= first {
        return Err(AnalysisError::EmptySignal(format!(
            "Central segment of {} samples is empty",
            n
        )));
    }

    log::debug!("Central segment: samples [{}, {}) of {}", first, last, n);

    Ok(waveform.with_samples(waveform.samples[first..last].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_half() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let waveform = Waveform::new(samples, 22050).unwrap();

        let segment = central_segment(&waveform, 0.25, 0.75).unwrap();

        assert_eq!(segment.len(), 50);
        assert_eq!(segment.samples[0], 25.0);
        assert_eq!(segment.samples[49], 74.0);
    }

    #[test]
    fn test_tiny_input_is_empty_segment() {
        let waveform = Waveform::new(vec![1.0], 22050).unwrap();
        let result = central_segment(&waveform, 0.25, 0.75);
        assert!(matches!(result, Err(AnalysisError::EmptySignal(_))));
    }

    #[test]
    fn test_invalid_bounds() {
        let waveform = Waveform::new(vec![0.0; 10], 22050).unwrap();
        assert!(central_segment(&waveform, 0.75, 0.25).is_err());
        assert!(central_segment(&waveform, -0.1, 0.5).is_err());
    }
}
