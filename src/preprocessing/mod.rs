//! Audio preprocessing modules
//!
//! This module prepares a raw mono waveform for tempo analysis:
//! - Silence trimming
//! - Resampling to the canonical analysis rate
//! - Central segment extraction
//! - Harmonic/percussive separation (see [`crate::features::onset::hpss`])
//! - Optional band-pass filtering of the percussive signal

pub mod bandpass;
pub mod resample;
pub mod segment;
pub mod silence;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::features::onset::hpss::{self, HpssConfig};

/// Mono audio samples with their sample rate
///
/// Transform steps never mutate a waveform in place; each one produces a new
/// `Waveform`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples, nominally in [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    /// Create a waveform, rejecting a zero sample rate
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, AnalysisError> {
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidInput("Invalid sample rate: 0".to_string()));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the waveform holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Same sample rate, new samples
    pub(crate) fn with_samples(&self, samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }
}

/// Output of the preprocessing chain
#[derive(Debug, Clone)]
pub struct PreparedSignal {
    /// Percussive component of the central segment, optionally band-passed
    pub percussive: Waveform,

    /// Duration after silence trimming, in seconds
    pub trimmed_seconds: f32,

    /// Duration of the analysed central segment, in seconds
    pub segment_seconds: f32,
}

/// Run the full preprocessing chain
///
/// Steps, in order: silence trim, resample, central segment, percussive
/// separation, optional band-pass. Any failing step aborts the chain.
pub fn prepare(waveform: &Waveform, config: &AnalysisConfig) -> Result<PreparedSignal, AnalysisError> {
    let detector = silence::SilenceDetector {
        top_db: config.silence_top_db,
        floor_dbfs: config.silence_floor_dbfs,
        frame_size: config.silence_frame_size,
        hop_size: config.silence_hop_size,
    };
    let trimmed = silence::trim_silence(waveform, &detector)?;
    let trimmed_seconds = trimmed.duration_seconds();

    let resampled = resample::resample(&trimmed, config.target_sample_rate)?;

    let segment = segment::central_segment(&resampled, config.segment_start, config.segment_end)?;
    let segment_seconds = segment.duration_seconds();

    let hpss_config = HpssConfig {
        frame_size: config.frame_size,
        hop_size: config.hop_size,
        kernel_size: config.hpss_kernel_size,
        power: config.hpss_power,
    };
    let percussive = segment.with_samples(hpss::percussive(&segment.samples, &hpss_config)?);

    let percussive = match config.band_pass {
        Some(band) => bandpass::band_pass(&percussive, &band, config.frame_size, config.hop_size)?,
        None => percussive,
    };

    log::debug!(
        "Preprocessed: {:.2}s trimmed, {:.2}s segment at {} Hz (band-pass: {})",
        trimmed_seconds,
        segment_seconds,
        percussive.sample_rate,
        config.band_pass.is_some()
    );

    Ok(PreparedSignal {
        percussive,
        trimmed_seconds,
        segment_seconds,
    })
}
