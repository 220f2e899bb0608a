//! Windowed autocorrelation tempogram
//!
//! Slides a window over the onset strength envelope and computes a normalized
//! autocorrelation for each position. Every column of the tempogram is the
//! periodicity profile of one stretch of the track, so the tempo can be read
//! off locally (one value per window) or globally (averaged over windows).
//!
//! A log-normal prior over tempo, centered on a typical BPM, resolves the
//! octave ambiguity that plain autocorrelation leaves: the lags of half and
//! double tempo carry comparable periodicity.
//!
//! The prior alone cannot settle a steady pulse, whose ACF is as strong at
//! twice the period as at the period itself. A pick is folded up to a
//! subdivision of comparable support (never above 180 BPM), then refined to a
//! fractional lag so that tempos between two integer lags are not quantized.
//!
//! # Reference
//!
//! Grosche, P., Müller, M., & Kurth, F. (2010). Cyclic Tempogram: A Mid-level Tempo
//! Representation for Music Signals. *Proceedings of IEEE ICASSP*.
//!
//! Ellis, D. P. W. (2007). Beat Tracking by Dynamic Programming.
//! *Journal of New Music Research*, 36(1), 51-60.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::features::period::tempogram_autocorr::{
//!     autocorrelation_tempogram, local_tempo_curve, TempoPrior,
//! };
//!
//! let envelope = vec![0.0f32; 2000];
//! let tempogram = autocorrelation_tempogram(&envelope, 22050.0 / 512.0, 8.0)?;
//! let curve = local_tempo_curve(&tempogram, &TempoPrior::new(120.0, 1.0), 30.0, 300.0);
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use super::autocorrelation::compute_autocorrelation_fft;
use crate::error::AnalysisError;
use crate::features::stft::hann_window;

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Log-normal weighting over tempo
///
/// `w(bpm) = exp(-0.5 * ((log2(bpm) - log2(center)) / std_octaves)^2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoPrior {
    /// Most likely tempo in BPM
    pub center_bpm: f32,

    /// Standard deviation in octaves
    pub std_octaves: f32,
}

impl TempoPrior {
    /// Create a prior centered on `center_bpm`
    pub fn new(center_bpm: f32, std_octaves: f32) -> Self {
        Self {
            center_bpm,
            std_octaves,
        }
    }

    /// Prior weight of `bpm`, in (0, 1]
    pub fn weight(&self, bpm: f32) -> f32 {
        if bpm <= 0.0 {
            return 0.0;
        }
        let z = (bpm.log2() - self.center_bpm.log2()) / self.std_octaves;
        (-0.5 * z * z).exp()
    }
}

/// Convert an autocorrelation lag in frames to BPM
pub fn lag_to_bpm(lag: usize, frame_rate: f32) -> f32 {
    60.0 * frame_rate / lag as f32
}

/// Autocorrelation tempogram
#[derive(Debug, Clone)]
pub struct Tempogram {
    /// Envelope frames per second
    pub frame_rate: f32,

    /// Window length in frames (also the number of lags per column)
    pub window_frames: usize,

    /// Frames between successive windows
    pub hop_frames: usize,

    /// One ACF per window, normalized so lag 0 is 1.0; `None` for silent windows
    pub columns: Vec<Option<Vec<f32>>>,
}

impl Tempogram {
    /// Lag range `[min, max]` covering a BPM search range, clipped to the window
    pub fn lag_range(&self, min_bpm: f32, max_bpm: f32) -> Option<(usize, usize)> {
        let lag_min = ((60.0 * self.frame_rate) / max_bpm).ceil().max(1.0) as usize;
        let lag_max = (((60.0 * self.frame_rate) / min_bpm).floor() as usize)
            .min(self.window_frames.saturating_sub(1));
        (lag_min <= lag_max).then_some((lag_min, lag_max))
    }

    /// Average of all non-silent columns
    pub fn mean_column(&self) -> Option<Vec<f32>> {
        let active: Vec<&Vec<f32>> = self.columns.iter().flatten().collect();
        if active.is_empty() {
            return None;
        }
        let mut mean = vec![0.0f32; self.window_frames];
        for column in &active {
            for (m, &v) in mean.iter_mut().zip(column.iter()) {
                *m += v;
            }
        }
        let n = active.len() as f32;
        mean.iter_mut().for_each(|m| *m /= n);
        Some(mean)
    }
}

/// Compute a windowed autocorrelation tempogram
///
/// # Arguments
///
/// * `envelope` - Onset strength envelope
/// * `frame_rate` - Envelope frames per second
/// * `window_seconds` - Window length; successive windows overlap by half
///
/// Envelopes shorter than one window are analysed as a single window.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an empty envelope or non-positive
/// frame rate / window length
pub fn autocorrelation_tempogram(
    envelope: &[f32],
    frame_rate: f32,
    window_seconds: f32,
) -> Result<Tempogram, AnalysisError> {
    autocorrelation_tempogram_with_cancel(envelope, frame_rate, window_seconds, None)
}

/// [`autocorrelation_tempogram`] that stops early once `cancel_flag` is set
///
/// # Errors
///
/// As [`autocorrelation_tempogram`], plus `AnalysisError::Cancelled` when the
/// flag is observed before every window is done
pub fn autocorrelation_tempogram_with_cancel(
    envelope: &[f32],
    frame_rate: f32,
    window_seconds: f32,
    cancel_flag: Option<&AtomicBool>,
) -> Result<Tempogram, AnalysisError> {
    if envelope.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "Onset envelope is empty".to_string(),
        ));
    }
    if frame_rate <= 0.0 || window_seconds <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "Frame rate and window length must be > 0, got {} and {}",
            frame_rate, window_seconds
        )));
    }

    let window_frames = ((window_seconds * frame_rate).round() as usize)
        .max(2)
        .min(envelope.len());
    let hop_frames = (window_frames / 2).max(1);
    let starts: Vec<usize> = (0..=envelope.len() - window_frames)
        .step_by(hop_frames)
        .collect();
    let window = hann_window(window_frames);

    log::debug!(
        "Autocorrelation tempogram: {} frames at {:.2} Hz, {} windows of {} frames",
        envelope.len(),
        frame_rate,
        starts.len(),
        window_frames
    );

    let columns = starts
        .par_iter()
        .map(|&start| {
            if cancel_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(AnalysisError::Cancelled);
            }
            let segment: Vec<f32> = envelope[start..start + window_frames]
                .iter()
                .zip(window.iter())
                .map(|(&x, &w)| x * w)
                .collect();
            let acf = compute_autocorrelation_fft(&segment)?;
            if acf[0] < EPSILON {
                return Ok(None);
            }
            let norm = acf[0];
            Ok(Some(acf.into_iter().map(|v| v / norm).collect()))
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    Ok(Tempogram {
        frame_rate,
        window_frames,
        hop_frames,
        columns,
    })
}

/// Subdivisions a slow pick may fold up to
const FOLD_FACTORS: [usize; 2] = [2, 3];

/// Support a subdivision needs, relative to the picked lag, to win the fold
const FOLD_SUPPORT_RATIO: f32 = 0.8;

/// Folding never lands above this tempo
const FOLD_MAX_BPM: f32 = 180.0;

/// ACF mass at `lag` and its two neighbours
///
/// A period between two integer lags splits its peak across both.
fn lag_support(column: &[f32], lag: usize) -> f32 {
    let lo = lag.saturating_sub(1).max(1);
    let hi = (lag + 1).min(column.len() - 1);
    column[lo..=hi].iter().sum()
}

/// Move a pick to the fastest subdivision (`lag / 2`, `lag / 3`) that carries
/// comparable support, as long as the result stays at or below `FOLD_MAX_BPM`
fn fold_up(column: &[f32], frame_rate: f32, lag: usize, min_lag: usize) -> usize {
    let support = lag_support(column, lag);
    let mut folded = lag;

    for factor in FOLD_FACTORS {
        for candidate in [lag / factor, lag.div_ceil(factor)] {
            if candidate >= min_lag
                && candidate < folded
                && lag_to_bpm(candidate, frame_rate) <= FOLD_MAX_BPM
                && lag_support(column, candidate) >= FOLD_SUPPORT_RATIO * support
            {
                folded = candidate;
            }
        }
    }

    if folded != lag {
        log::trace!(
            "Fold-up: lag {} ({:.2} BPM) -> lag {} ({:.2} BPM)",
            lag,
            lag_to_bpm(lag, frame_rate),
            folded,
            lag_to_bpm(folded, frame_rate)
        );
    }
    folded
}

/// Fractional lag of the ACF peak next to `lag`, by parabolic interpolation
fn refine_peak(column: &[f32], lag: usize) -> f32 {
    let lo = lag.saturating_sub(1).max(1);
    let hi = (lag + 1).min(column.len().saturating_sub(2));
    if lo > hi {
        return lag as f32;
    }

    let peak = (lo..=hi).fold(lo, |best, k| if column[k] > column[best] { k } else { best });
    let (left, centre, right) = (column[peak - 1], column[peak], column[peak + 1]);
    let curvature = left - 2.0 * centre + right;
    let offset = if curvature < 0.0 {
        (0.5 * (left - right) / curvature).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    peak as f32 + offset
}

/// Prior-weighted tempo of one ACF column
///
/// Lags are scored by `lag_support * prior(bpm(lag))`. The winner may fold up
/// to a well-supported subdivision, and is then refined to a fractional lag.
fn best_bpm(column: &[f32], frame_rate: f32, prior: &TempoPrior, lags: (usize, usize)) -> Option<f32> {
    let (lag, score) = (lags.0..=lags.1)
        .map(|lag| (lag, lag_support(column, lag) * prior.weight(lag_to_bpm(lag, frame_rate))))
        .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });
    if score <= EPSILON {
        return None;
    }

    let lag = fold_up(column, frame_rate, lag, lags.0);
    Some(60.0 * frame_rate / refine_peak(column, lag))
}

/// Tempo of each non-silent window
///
/// Windows with no periodicity inside `[min_bpm, max_bpm]` are skipped, so the
/// curve may be shorter than the number of columns, or empty.
pub fn local_tempo_curve(
    tempogram: &Tempogram,
    prior: &TempoPrior,
    min_bpm: f32,
    max_bpm: f32,
) -> Vec<f32> {
    let Some(lags) = tempogram.lag_range(min_bpm, max_bpm) else {
        log::warn!(
            "Tempogram window of {} frames cannot resolve [{:.1}, {:.1}] BPM",
            tempogram.window_frames,
            min_bpm,
            max_bpm
        );
        return Vec::new();
    };

    let curve: Vec<f32> = tempogram
        .columns
        .iter()
        .flatten()
        .filter_map(|column| best_bpm(column, tempogram.frame_rate, prior, lags))
        .collect();

    log::debug!(
        "Local tempo curve: {} of {} windows resolved",
        curve.len(),
        tempogram.columns.len()
    );

    curve
}

/// Single tempo from the window-averaged tempogram, weighted by `prior`
pub fn global_tempo(tempogram: &Tempogram, prior: &TempoPrior, min_bpm: f32, max_bpm: f32) -> Option<f32> {
    let lags = tempogram.lag_range(min_bpm, max_bpm)?;
    let mean = tempogram.mean_column()?;
    best_bpm(&mean, tempogram.frame_rate, prior, lags)
}
