//! Candidate generators and their concurrent runner
//!
//! Every generator reads the same immutable [`GeneratorInput`] and produces a
//! [`RawEstimate`]. [`run_generators`] starts one named thread per generator,
//! collects results over a channel with an optional deadline, and coerces each
//! raw estimate to a scalar [`Candidate`] in a fixed source order.
//!
//! A generator that misses the deadline contributes no candidate, and is told
//! to stop through a shared cancel flag that the beat tracker and tempogram
//! loops poll. A generator that returns an error fails the whole run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};

use super::aggregate::median;
use super::candidates::{Candidate, CandidateSource, RawEstimate};
use crate::config::{AnalysisConfig, BeatTrackParams};
use crate::error::AnalysisError;
use crate::features::beat_tracking::dynamic::DynamicBeatTracker;
use crate::features::beat_tracking::BeatPosition;
use crate::features::onset::spectral_flux::{onset_strength, OnsetStrengthConfig};
use crate::features::period::autocorrelation::estimate_bpm_from_autocorrelation;
use crate::features::period::tempogram_autocorr::{
    autocorrelation_tempogram_with_cancel, local_tempo_curve, TempoPrior,
};
use crate::features::period::tempogram_fft::{fft_tempogram, find_best_bpm_fft};
use crate::preprocessing::Waveform;

/// Onset strength envelope with its frame rate
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    /// One value per STFT frame
    pub values: Vec<f32>,

    /// Frames per second
    pub frame_rate: f32,
}

impl OnsetEnvelope {
    /// Compute the envelope of `waveform` at `hop_size`
    pub fn compute(waveform: &Waveform, config: &AnalysisConfig, hop_size: usize) -> Result<Self, AnalysisError> {
        let onset_config = OnsetStrengthConfig {
            frame_size: config.frame_size,
            hop_size,
            n_mels: config.n_mels,
            ..OnsetStrengthConfig::default()
        };
        Ok(Self {
            values: onset_strength(&waveform.samples, waveform.sample_rate, &onset_config)?,
            frame_rate: waveform.sample_rate as f32 / hop_size as f32,
        })
    }
}

/// Shared read-only input of all generators
#[derive(Debug, Clone)]
pub struct GeneratorInput {
    /// Envelope at the standard hop
    pub coarse: OnsetEnvelope,

    /// Envelope at the fine hop
    pub fine: OnsetEnvelope,

    /// Parameters of every generator
    pub config: AnalysisConfig,
}

impl GeneratorInput {
    /// Compute both onset envelopes of the percussive signal
    pub fn from_signal(percussive: &Waveform, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let (coarse, fine) = rayon::join(
            || OnsetEnvelope::compute(percussive, config, config.hop_size),
            || OnsetEnvelope::compute(percussive, config, config.fine_hop_size),
        );
        Ok(Self {
            coarse: coarse?,
            fine: fine?,
            config: config.clone(),
        })
    }
}

/// Output of one generator
#[derive(Debug, Clone)]
pub struct GeneratorOutput {
    /// Tempo before scalar coercion
    pub raw: RawEstimate,

    /// Tracked beats, for beat-tracking generators
    pub beats: Vec<BeatPosition>,
}

impl From<RawEstimate> for GeneratorOutput {
    fn from(raw: RawEstimate) -> Self {
        Self {
            raw,
            beats: Vec::new(),
        }
    }
}

fn beat_track(
    envelope: &OnsetEnvelope,
    params: BeatTrackParams,
    config: &AnalysisConfig,
    cancel_flag: &Arc<AtomicBool>,
) -> Result<GeneratorOutput, AnalysisError> {
    let track = DynamicBeatTracker::new(params.start_bpm, params.tightness)
        .with_search_range(config.search_min_bpm, config.search_max_bpm)
        .with_tempo_prior(config.prior_std_octaves, config.tempogram_window_seconds)
        .with_cancel_flag(Arc::clone(cancel_flag))
        .track(&envelope.values, envelope.frame_rate)?;
    Ok(GeneratorOutput {
        raw: RawEstimate::Scalar(track.bpm),
        beats: track.beats,
    })
}

fn onset_tempo(envelope: &OnsetEnvelope, config: &AnalysisConfig, cancel_flag: &AtomicBool) -> Result<GeneratorOutput, AnalysisError> {
    let tempogram = autocorrelation_tempogram_with_cancel(
        &envelope.values,
        envelope.frame_rate,
        config.tempogram_window_seconds,
        Some(cancel_flag),
    )?;
    let prior = TempoPrior::new(config.onset_prior_bpm, config.prior_std_octaves);
    let curve = local_tempo_curve(&tempogram, &prior, config.search_min_bpm, config.search_max_bpm);
    Ok(RawEstimate::from(median(&curve)).into())
}

fn autocorr_peak(envelope: &OnsetEnvelope, config: &AnalysisConfig) -> Result<GeneratorOutput, AnalysisError> {
    let candidates = estimate_bpm_from_autocorrelation(&envelope.values, envelope.frame_rate, config.min_bpm, config.max_bpm)?;
    Ok(RawEstimate::Series(candidates.into_iter().map(|c| c.bpm).collect()).into())
}

fn tempogram_peak(envelope: &OnsetEnvelope, config: &AnalysisConfig) -> Result<GeneratorOutput, AnalysisError> {
    let tempogram = fft_tempogram(&envelope.values, envelope.frame_rate, config.min_bpm, config.max_bpm)?;
    Ok(RawEstimate::from(find_best_bpm_fft(&tempogram).map(|best| best.bpm)).into())
}

/// Run a single generator
pub fn generate(source: CandidateSource, input: &GeneratorInput) -> Result<GeneratorOutput, AnalysisError> {
    generate_with_cancel(source, input, &Arc::new(AtomicBool::new(false)))
}

/// Run a single generator, giving up with `AnalysisError::Cancelled` once
/// `cancel_flag` is set
///
/// The beat trackers and onset tempo estimators poll the flag; the two
/// single-pass estimators finish regardless.
pub fn generate_with_cancel(
    source: CandidateSource,
    input: &GeneratorInput,
    cancel_flag: &Arc<AtomicBool>,
) -> Result<GeneratorOutput, AnalysisError> {
    let config = &input.config;
    match source {
        CandidateSource::BeatTrackFast => beat_track(&input.coarse, config.beat_fast, config, cancel_flag),
        CandidateSource::BeatTrackSlow => beat_track(&input.coarse, config.beat_slow, config, cancel_flag),
        CandidateSource::OnsetTempoCoarse => onset_tempo(&input.coarse, config, cancel_flag),
        CandidateSource::OnsetTempoFine => onset_tempo(&input.fine, config, cancel_flag),
        CandidateSource::AutocorrPeak => autocorr_peak(&input.coarse, config),
        CandidateSource::TempogramPeak => tempogram_peak(&input.coarse, config),
    }
}

/// Results of a generator run
#[derive(Debug, Clone, Default)]
pub struct GeneratorRun {
    /// Coerced candidates in requested source order
    pub candidates: Vec<Candidate>,

    /// Generators that missed the deadline
    pub timed_out: Vec<CandidateSource>,

    /// Beats from the fast-prior beat tracker, if it ran
    pub beats: Vec<BeatPosition>,
}

/// Run generators concurrently and collect their candidates
///
/// # Arguments
///
/// * `input` - Shared generator input
/// * `sources` - Generators to run; the output keeps this order
/// * `timeout` - Overall time budget; `None` waits for every generator
///
/// # Errors
///
/// Returns `AnalysisError::Generator` for the first failing generator in
/// source order, or `AnalysisError::ProcessingError` if a thread cannot start
pub fn run_generators(
    input: Arc<GeneratorInput>,
    sources: &[CandidateSource],
    timeout: Option<Duration>,
) -> Result<GeneratorRun, AnalysisError> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel::unbounded();

    for &source in sources {
        let tx = tx.clone();
        let input = Arc::clone(&input);
        let cancel_flag = Arc::clone(&cancel_flag);
        thread::Builder::new()
            .name(format!("tempo-{}", source))
            .spawn(move || {
                let started = Instant::now();
                let result = generate_with_cancel(source, &input, &cancel_flag);
                log::debug!("Generator {} finished in {:?}", source, started.elapsed());
                // The receiver is gone once the deadline has passed
                let _ = tx.send((source, result));
            })
            .map_err(|e| {
                AnalysisError::ProcessingError(format!("Failed to start generator {}: {}", source, e))
            })?;
    }
    drop(tx);

    let mut finished = HashMap::with_capacity(sources.len());
    while finished.len() < sources.len() {
        let received = match deadline {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((source, result)) => {
                finished.insert(source, result);
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel_flag.store(true, Ordering::Relaxed);
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let mut run = GeneratorRun::default();
    for &source in sources {
        match finished.remove(&source) {
            Some(Ok(output)) => {
                let candidate = Candidate::from_raw(source, &output.raw);
                log::debug!("Candidate {}: {:?} -> {:.2} BPM", source, output.raw, candidate.bpm);
                if source == CandidateSource::BeatTrackFast {
                    run.beats = output.beats;
                }
                run.candidates.push(candidate);
            }
            Some(Err(err)) => {
                return Err(AnalysisError::Generator {
                    generator: source,
                    message: err.to_string(),
                });
            }
            None if deadline.is_some_and(|d| Instant::now() >= d) => {
                log::warn!("Generator {} missed its time budget; no candidate", source);
                run.timed_out.push(source);
            }
            None => {
                return Err(AnalysisError::Generator {
                    generator: source,
                    message: "generator thread exited without a result".to_string(),
                });
            }
        }
    }

    Ok(run)
}
