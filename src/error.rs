//! Error types for the tempo detection pipeline

use thiserror::Error;

use crate::analysis::candidates::CandidateSource;

/// Errors that can occur during tempo analysis
///
/// Every stage returns these typed errors. They are only collapsed into a
/// single failure outcome at the boundary (see [`crate::detect_bpm`]).
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The waveform contains no samples (before or after a transform step)
    #[error("Empty signal: {0}")]
    EmptySignal(String),

    /// The loudest frame of the waveform does not reach the silence floor
    #[error("Audio is silent (loudest frame below {floor_dbfs:.1} dBFS)")]
    SilentSignal {
        /// Absolute floor that was applied, in dBFS
        floor_dbfs: f32,
    },

    /// Processing error during analysis
    #[error("Processing error: {0}")]
    ProcessingError(String),

    /// Numerical error (overflow, NaN, degenerate normalization, etc.)
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// Sample rate conversion failed
    #[error("Resampling error: {0}")]
    Resample(String),

    /// A candidate generator failed
    #[error("Candidate generator {generator} failed: {message}")]
    Generator {
        /// Generator that failed
        generator: CandidateSource,
        /// Underlying failure
        message: String,
    },

    /// Every candidate was outside the plausible range (or missing)
    #[error("No plausible BPM candidate in [{min_bpm:.1}, {max_bpm:.1}]")]
    NoPlausibleCandidates {
        /// Lower bound of the plausible range
        min_bpm: f32,
        /// Upper bound of the plausible range
        max_bpm: f32,
    },

    /// The fused tempo failed the final validation gate
    #[error("Implausible tempo: {0:.2} BPM")]
    ImplausibleTempo(f32),

    /// A generator stopped early because its result was no longer wanted
    #[error("Analysis cancelled")]
    Cancelled,

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// I/O error while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
