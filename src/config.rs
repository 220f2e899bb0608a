//! Configuration parameters for tempo analysis

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::aggregate::{FusionStrategy, MAX_PLAUSIBLE_BPM, MIN_PLAUSIBLE_BPM};
use crate::error::AnalysisError;

/// Canonical analysis sample rate in Hz
pub const CANONICAL_SAMPLE_RATE: u32 = 22050;

/// Beat tracker seeding parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatTrackParams {
    /// Initial tempo guess in BPM, center of the log-normal tempo prior
    pub start_bpm: f32,

    /// How strictly beats must follow the estimated period
    pub tightness: f32,
}

/// Band-pass restriction applied to the percussive signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPassConfig {
    /// Lower cutoff in Hz (default: 150.0)
    pub low_hz: f32,

    /// Upper cutoff in Hz (default: 5000.0)
    pub high_hz: f32,
}

impl Default for BandPassConfig {
    fn default() -> Self {
        Self {
            low_hz: 150.0,
            high_hz: 5000.0,
        }
    }
}

/// Analysis configuration parameters
///
/// Unknown fields are rejected; missing fields fall back to [`Default`], so a
/// JSON file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    // Preprocessing
    /// Silence threshold in dB below the loudest frame (default: 20.0)
    pub silence_top_db: f32,

    /// Absolute level in dBFS the loudest frame must exceed (default: -60.0)
    pub silence_floor_dbfs: f32,

    /// Frame size for silence detection (default: 2048)
    pub silence_frame_size: usize,

    /// Hop size for silence detection (default: 512)
    pub silence_hop_size: usize,

    /// Sample rate all analysis runs at (default: 22050)
    pub target_sample_rate: u32,

    /// Start of the retained central segment, as a fraction of length (default: 0.25)
    pub segment_start: f32,

    /// End of the retained central segment, as a fraction of length (default: 0.75)
    pub segment_end: f32,

    /// Median filter length for harmonic/percussive separation (default: 31)
    pub hpss_kernel_size: usize,

    /// Soft-mask exponent for harmonic/percussive separation (default: 2.0)
    pub hpss_power: f32,

    /// Optional band-pass on the percussive signal (default: disabled)
    pub band_pass: Option<BandPassConfig>,

    // STFT parameters
    /// Frame size for STFT (default: 2048)
    pub frame_size: usize,

    /// Standard hop size (default: 512)
    pub hop_size: usize,

    /// Fine hop size for the high-resolution onset tempo estimator (default: 256)
    pub fine_hop_size: usize,

    /// Number of mel bands in the onset strength envelope (default: 128)
    pub n_mels: usize,

    // Tempo estimation
    /// Lowest tempo any generator searches (default: 30.0)
    pub search_min_bpm: f32,

    /// Highest tempo any generator searches (default: 300.0)
    pub search_max_bpm: f32,

    /// Autocorrelation window length in seconds (default: 8.0)
    pub tempogram_window_seconds: f32,

    /// Center of the onset tempo prior in BPM (default: 120.0)
    pub onset_prior_bpm: f32,

    /// Width of every log-normal tempo prior in octaves (default: 1.0)
    pub prior_std_octaves: f32,

    /// Fast-prior beat tracker seed (default: 90 BPM, tightness 100)
    pub beat_fast: BeatTrackParams,

    /// Slow-prior beat tracker seed (default: 60 BPM, tightness 80)
    pub beat_slow: BeatTrackParams,

    // Aggregation
    /// Lower bound of the plausible range (default: 40.0)
    ///
    /// May narrow, but never widen, `[MIN_PLAUSIBLE_BPM, MAX_PLAUSIBLE_BPM]`.
    pub min_bpm: f32,

    /// Upper bound of the plausible range (default: 200.0)
    pub max_bpm: f32,

    /// How candidates are fused (default: weighted voting)
    pub fusion: FusionStrategy,

    /// Time budget per candidate generator in milliseconds (default: 60000)
    /// `None` waits for every generator.
    pub generator_timeout_ms: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            silence_top_db: 20.0,
            silence_floor_dbfs: -60.0,
            silence_frame_size: 2048,
            silence_hop_size: 512,
            target_sample_rate: CANONICAL_SAMPLE_RATE,
            segment_start: 0.25,
            segment_end: 0.75,
            hpss_kernel_size: 31,
            hpss_power: 2.0,
            band_pass: None,
            frame_size: 2048,
            hop_size: 512,
            fine_hop_size: 256,
            n_mels: 128,
            search_min_bpm: 30.0,
            search_max_bpm: 300.0,
            tempogram_window_seconds: 8.0,
            onset_prior_bpm: 120.0,
            prior_std_octaves: 1.0,
            beat_fast: BeatTrackParams {
                start_bpm: 90.0,
                tightness: 100.0,
            },
            beat_slow: BeatTrackParams {
                start_bpm: 60.0,
                tightness: 80.0,
            },
            min_bpm: 40.0,
            max_bpm: 200.0,
            fusion: FusionStrategy::WeightedVoting,
            generator_timeout_ms: Some(60_000),
        }
    }
}

impl AnalysisConfig {
    /// Parse a configuration from JSON, filling unspecified fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self, AnalysisError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded analysis config from {}", path.as_ref().display());
        Self::from_json_str(&text)
    }

    /// Check that all parameters are mutually consistent
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let invalid = |msg: String| Err(AnalysisError::InvalidConfig(msg));

        if self.target_sample_rate == 0 {
            return invalid("target_sample_rate must be > 0".to_string());
        }
        if self.silence_top_db <= 0.0 {
            return invalid(format!("silence_top_db must be > 0, got {}", self.silence_top_db));
        }
        if !self.silence_floor_dbfs.is_finite() || self.silence_floor_dbfs >= 0.0 {
            return invalid(format!(
                "silence_floor_dbfs must be finite and < 0, got {}",
                self.silence_floor_dbfs
            ));
        }
        if self.silence_frame_size == 0 || self.silence_hop_size == 0 {
            return invalid("silence frame and hop sizes must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.segment_start)
            || self.segment_end <= self.segment_start
            || self.segment_end > 1.0
        {
            return invalid(format!(
                "segment bounds must satisfy 0 <= start < end <= 1, got [{}, {}]",
                self.segment_start, self.segment_end
            ));
        }
        if self.hpss_kernel_size == 0 {
            return invalid("hpss_kernel_size must be > 0".to_string());
        }
        if self.hpss_power <= 0.0 {
            return invalid(format!("hpss_power must be > 0, got {}", self.hpss_power));
        }
        if self.frame_size < 2 || !self.frame_size.is_power_of_two() {
            return invalid(format!(
                "frame_size must be a power of two >= 2, got {}",
                self.frame_size
            ));
        }
        if self.hop_size == 0 || self.fine_hop_size == 0 {
            return invalid("hop sizes must be > 0".to_string());
        }
        if self.hop_size > self.frame_size || self.fine_hop_size > self.frame_size {
            return invalid("hop sizes must not exceed frame_size".to_string());
        }
        if self.n_mels == 0 {
            return invalid("n_mels must be > 0".to_string());
        }
        if self.search_min_bpm <= 0.0 || self.search_max_bpm <= self.search_min_bpm {
            return invalid(format!(
                "invalid search range [{}, {}]",
                self.search_min_bpm, self.search_max_bpm
            ));
        }
        if self.min_bpm < MIN_PLAUSIBLE_BPM || self.max_bpm > MAX_PLAUSIBLE_BPM || self.max_bpm <= self.min_bpm {
            return invalid(format!(
                "plausible range [{}, {}] must satisfy {} <= min < max <= {}",
                self.min_bpm, self.max_bpm, MIN_PLAUSIBLE_BPM, MAX_PLAUSIBLE_BPM
            ));
        }
        if self.tempogram_window_seconds <= 0.0 {
            return invalid("tempogram_window_seconds must be > 0".to_string());
        }
        if self.onset_prior_bpm <= 0.0 || self.prior_std_octaves <= 0.0 {
            return invalid("tempo prior must have positive center and width".to_string());
        }
        for (name, params) in [("beat_fast", self.beat_fast), ("beat_slow", self.beat_slow)] {
            if params.start_bpm <= 0.0 || params.tightness <= 0.0 {
                return invalid(format!(
                    "{} needs positive start_bpm and tightness, got {:?}",
                    name, params
                ));
            }
        }
        if let Some(band) = self.band_pass {
            if band.low_hz < 0.0 || band.high_hz <= band.low_hz {
                return invalid(format!(
                    "band-pass cutoffs must satisfy 0 <= low < high, got [{}, {}]",
                    band.low_hz, band.high_hz
                ));
            }
        }
        if self.generator_timeout_ms == Some(0) {
            return invalid("generator_timeout_ms must be > 0 when set".to_string());
        }
        Ok(())
    }
}
