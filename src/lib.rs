//! # Stratum Tempo
//!
//! Multi-estimator tempo (BPM) detection for raw mono audio.
//!
//! ## Features
//!
//! - **Preprocessing**: silence trimming, resampling to 22050 Hz, central segment
//!   extraction, harmonic/percussive separation, optional band-pass
//! - **Four independent estimators**: dynamic-programming beat tracking with a fast
//!   and a slow tempo prior, and windowed onset autocorrelation at two hop sizes
//! - **Robust fusion**: plausibility filtering, then the median of the candidates
//!   reconciled with their weighted average
//!
//! ## Quick Start
//!
//! ```no_run
//! use stratum_tempo::{detect_bpm, AnalysisConfig};
//!
//! // Load audio samples (mono, f32, normalized)
//! let samples: Vec<f32> = vec![]; // Your audio data
//! let sample_rate = 44100;
//!
//! let result = detect_bpm(&samples, sample_rate, &AnalysisConfig::default());
//! println!("{}", serde_json::json!({ "bpm": result }));
//! ```
//!
//! ## Architecture
//!
//! The analysis pipeline follows this flow:
//!
//! ```text
//! Waveform → Preprocessing → Onset envelopes → 4 Candidate Generators (concurrent) → Fusion → Result
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod features;
pub mod metronome;
pub mod preprocessing;

use std::sync::Arc;
use std::time::{Duration, Instant};

// Re-export main types
pub use analysis::aggregate::{FusionStrategy, PlausibleRange, MAX_PLAUSIBLE_BPM, MIN_PLAUSIBLE_BPM};
pub use analysis::candidates::{Candidate, CandidateSource, RawEstimate};
pub use analysis::result::{AnalysisMetadata, DetectionResult, FailureReason, TempoEstimate, FAILURE_SENTINEL};
pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use preprocessing::Waveform;

use analysis::aggregate;
use analysis::generators::{run_generators, GeneratorInput};

/// Main analysis function
///
/// Runs the full pipeline and returns the fused tempo together with every
/// candidate and run metadata.
///
/// # Arguments
///
/// * `samples` - Mono audio samples, normalized to [-1.0, 1.0]
/// * `sample_rate` - Sample rate in Hz (typically 44100 or 48000)
/// * `config` - Analysis configuration parameters
///
/// # Errors
///
/// Returns `AnalysisError` if any stage fails: invalid or silent input, a
/// failing generator, no plausible candidate, or an implausible fused tempo
///
/// # Example
///
/// ```no_run
/// use stratum_tempo::{analyze_tempo, AnalysisConfig};
///
/// let samples = vec![0.0f32; 44100 * 30];
/// let estimate = analyze_tempo(&samples, 44100, &AnalysisConfig::default())?;
/// println!("{:.2} BPM from {} candidates", estimate.bpm, estimate.candidates.len());
/// # Ok::<(), stratum_tempo::AnalysisError>(())
/// ```
pub fn analyze_tempo(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalysisConfig,
) -> Result<TempoEstimate, AnalysisError> {
    let start_time = Instant::now();

    log::debug!("Starting tempo analysis: {} samples at {} Hz", samples.len(), sample_rate);

    config.validate()?;
    if samples.is_empty() {
        return Err(AnalysisError::EmptySignal("Empty audio samples".to_string()));
    }
    let waveform = Waveform::new(samples.to_vec(), sample_rate)?;

    let prepared = preprocessing::prepare(&waveform, config)?;
    let input = Arc::new(GeneratorInput::from_signal(&prepared.percussive, config)?);

    let sources = config.fusion.sources();
    let timeout = config.generator_timeout_ms.map(Duration::from_millis);
    let run = run_generators(input, sources, timeout)?;

    let range = PlausibleRange {
        min_bpm: config.min_bpm,
        max_bpm: config.max_bpm,
    };
    let fusion = aggregate::fuse(&run.candidates, config.fusion, &range)?;

    let mut warnings: Vec<String> = fusion
        .rejected
        .iter()
        .map(|c| format!("{} candidate {:.2} BPM outside [{}, {}]", c.source, c.bpm, range.min_bpm, range.max_bpm))
        .collect();
    warnings.extend(run.timed_out.iter().map(|s| format!("{} timed out", s)));

    let processing_time_ms = start_time.elapsed().as_secs_f32() * 1000.0;

    log::debug!(
        "Tempo analysis complete: {:.2} BPM in {:.1} ms ({} candidates used)",
        fusion.bpm,
        processing_time_ms,
        fusion.used.len()
    );

    Ok(TempoEstimate {
        bpm: fusion.bpm,
        metadata: AnalysisMetadata {
            duration_seconds: waveform.duration_seconds(),
            sample_rate,
            trimmed_seconds: prepared.trimmed_seconds,
            segment_seconds: prepared.segment_seconds,
            processing_time_ms,
            fusion: config.fusion,
            band_pass: config.band_pass.is_some(),
            methods_used: fusion.used.iter().map(|c| c.source).collect(),
            timed_out: run.timed_out,
            warnings,
            ..AnalysisMetadata::default()
        },
        candidates: fusion.used,
        rejected: fusion.rejected,
        beats: run.beats,
    })
}

/// Detect the tempo of `samples`, collapsing every failure
///
/// This never returns an error. Failures are logged and reported as
/// [`DetectionResult::Failed`], which serializes as [`FAILURE_SENTINEL`].
///
/// # Example
///
/// ```no_run
/// use stratum_tempo::{detect_bpm, AnalysisConfig, DetectionResult};
///
/// let samples = vec![0.0f32; 22050 * 10];
/// match detect_bpm(&samples, 22050, &AnalysisConfig::default()) {
///     DetectionResult::Detected(bpm) => println!("{:.2} BPM", bpm),
///     DetectionResult::Failed(reason) => println!("failed: {:?}", reason),
/// }
/// ```
pub fn detect_bpm(samples: &[f32], sample_rate: u32, config: &AnalysisConfig) -> DetectionResult {
    match analyze_tempo(samples, sample_rate, config) {
        Ok(estimate) => DetectionResult::Detected(estimate.bpm),
        Err(err) => {
            log::warn!("BPM detection failed: {}", err);
            DetectionResult::Failed(FailureReason::from(&err))
        }
    }
}
