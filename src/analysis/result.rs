//! Analysis result types

use serde::{Deserialize, Serialize, Serializer};

use super::candidates::Candidate;
use crate::error::AnalysisError;
use crate::features::beat_tracking::BeatPosition;

pub use super::metadata::AnalysisMetadata;

/// Value reported in place of a tempo when detection fails
pub const FAILURE_SENTINEL: &str = "BPM detection failed or is unreliable";

/// Why a detection failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The input held no samples, or too few to analyse
    EmptyInput,
    /// The input never rose above the silence threshold
    Silent,
    /// Every candidate fell outside the plausible range
    NoPlausibleCandidates,
    /// The fused tempo failed the final range check
    ImplausibleTempo,
    /// A candidate generator failed
    GeneratorFailed,
    /// Invalid input or configuration
    InvalidInput,
    /// Any other processing failure
    ProcessingFailed,
}

impl From<&AnalysisError> for FailureReason {
    fn from(err: &AnalysisError) -> Self {
        match err {
            AnalysisError::EmptySignal(_) => FailureReason::EmptyInput,
            AnalysisError::SilentSignal { .. } => FailureReason::Silent,
            AnalysisError::NoPlausibleCandidates { .. } => FailureReason::NoPlausibleCandidates,
            AnalysisError::ImplausibleTempo(_) => FailureReason::ImplausibleTempo,
            AnalysisError::Generator { .. } => FailureReason::GeneratorFailed,
            AnalysisError::InvalidInput(_)
            | AnalysisError::InvalidConfig(_)
            | AnalysisError::Config(_) => FailureReason::InvalidInput,
            AnalysisError::ProcessingError(_)
            | AnalysisError::NumericalError(_)
            | AnalysisError::Resample(_)
            | AnalysisError::Cancelled
            | AnalysisError::Io(_) => FailureReason::ProcessingFailed,
        }
    }
}

/// Outcome of one detection call
///
/// Serializes as a JSON number on success and as [`FAILURE_SENTINEL`] on
/// failure, so it can stand in a `bpm` field directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionResult {
    /// Tempo in BPM, rounded to 2 decimals and within the plausible range
    Detected(f32),
    /// No reliable tempo
    Failed(FailureReason),
}

impl DetectionResult {
    /// Tempo if detected
    pub fn bpm(&self) -> Option<f32> {
        match self {
            DetectionResult::Detected(bpm) => Some(*bpm),
            DetectionResult::Failed(_) => None,
        }
    }

    /// True on success
    pub fn is_detected(&self) -> bool {
        matches!(self, DetectionResult::Detected(_))
    }
}

impl Serialize for DetectionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DetectionResult::Detected(bpm) => serializer.serialize_f32(*bpm),
            DetectionResult::Failed(_) => serializer.serialize_str(FAILURE_SENTINEL),
        }
    }
}

/// Complete tempo analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Fused tempo in BPM, rounded to 2 decimals
    pub bpm: f32,

    /// Candidates that took part in fusion, in generator order
    pub candidates: Vec<Candidate>,

    /// Candidates dropped as implausible
    pub rejected: Vec<Candidate>,

    /// Beats from the fast-prior beat tracker, relative to the analysed segment
    pub beats: Vec<BeatPosition>,

    /// Analysis metadata
    pub metadata: AnalysisMetadata,
}
