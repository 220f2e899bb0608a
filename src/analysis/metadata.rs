//! Analysis metadata structures

use serde::{Deserialize, Serialize};

use super::aggregate::FusionStrategy;
use super::candidates::CandidateSource;

/// Analysis metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Input duration in seconds
    pub duration_seconds: f32,

    /// Input sample rate in Hz
    pub sample_rate: u32,

    /// Duration left after silence trimming, in seconds
    pub trimmed_seconds: f32,

    /// Duration of the analysed central segment, in seconds
    pub segment_seconds: f32,

    /// Processing time in milliseconds
    pub processing_time_ms: f32,

    /// Algorithm version
    pub algorithm_version: String,

    /// Fusion strategy applied
    pub fusion: FusionStrategy,

    /// Whether the percussive signal was band-passed
    pub band_pass: bool,

    /// Generators that produced a candidate
    pub methods_used: Vec<CandidateSource>,

    /// Generators that missed their time budget
    pub timed_out: Vec<CandidateSource>,

    /// Degraded conditions worth surfacing (dropped or missing candidates)
    pub warnings: Vec<String>,
}

impl Default for AnalysisMetadata {
    fn default() -> Self {
        Self {
            duration_seconds: 0.0,
            sample_rate: 0,
            trimmed_seconds: 0.0,
            segment_seconds: 0.0,
            processing_time_ms: 0.0,
            algorithm_version: env!("CARGO_PKG_VERSION").to_string(),
            fusion: FusionStrategy::default(),
            band_pass: false,
            methods_used: vec![],
            timed_out: vec![],
            warnings: vec![],
        }
    }
}
