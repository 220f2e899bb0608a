//! Period estimation modules
//!
//! Convert an onset strength envelope to tempo using:
//! - Global autocorrelation peaks
//! - Windowed autocorrelation tempogram with a log-normal tempo prior
//! - FFT tempogram

pub mod autocorrelation;
pub mod tempogram_autocorr;
pub mod tempogram_fft;

/// BPM candidate with confidence
#[derive(Debug, Clone)]
pub struct BpmCandidate {
    /// BPM estimate
    pub bpm: f32,

    /// Confidence score (0.0-1.0)
    pub confidence: f32,
}
