//! Dynamic-programming beat tracker
//!
//! Picks the beat sequence that best trades off onset strength at each beat
//! against deviation from a target inter-beat period.
//!
//! # Algorithm
//!
//! 1. **Initial tempo**: window-averaged autocorrelation tempogram, weighted by a
//!    log-normal prior centered on `start_bpm`
//! 2. **Local score**: onset envelope normalized by its standard deviation and
//!    smoothed with a Gaussian a fraction of the period wide
//! 3. **Forward pass**: for every frame, the best predecessor between `2 * period`
//!    and `period / 2` frames back, penalized by
//!    `tightness * ln(offset / period)^2`
//! 4. **Backtrack** from the last strong cumulative-score peak
//! 5. **Trim** weak beats from both ends
//!
//! The reported tempo is derived from the mean of the inter-beat intervals
//! within 10% of their median, or the initial tempo when fewer than two beats
//! survive. Beats sit on whole frames, so a period between two frame counts
//! shows up as alternating intervals whose mean recovers it.
//!
//! # Reference
//!
//! Ellis, D. P. W. (2007). Beat Tracking by Dynamic Programming.
//! *Journal of New Music Research*, 36(1), 51-60.
//!
//! # Example
//!
//! ```no_run
//! use stratum_tempo::features::beat_tracking::dynamic::DynamicBeatTracker;
//!
//! let envelope = vec![0.0f32; 2000];
//! let track = DynamicBeatTracker::new(90.0, 100.0).track(&envelope, 22050.0 / 512.0)?;
//! println!("{:.2} BPM, {} beats", track.bpm, track.beats.len());
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{BeatPosition, BeatTrack};
use crate::analysis::aggregate::median;
use crate::error::AnalysisError;
use crate::features::period::tempogram_autocorr::{
    autocorrelation_tempogram_with_cancel, global_tempo, TempoPrior,
};

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// Gaussian width factor: the smoothing kernel's sigma is `period / 32`
const SMOOTHING_DIVISOR: f32 = 32.0;

/// Fraction of the peak local score below which no first beat is placed
const FIRST_BEAT_THRESHOLD: f32 = 0.01;

/// Inter-beat intervals further than this fraction from the median are ignored
const IBI_TOLERANCE: f32 = 0.1;

/// Frames between cancellation checks in the forward pass
const CANCEL_CHECK_FRAMES: usize = 1024;

/// Dynamic-programming beat tracker
#[derive(Debug, Clone)]
pub struct DynamicBeatTracker {
    /// Center of the tempo prior, in BPM
    pub start_bpm: f32,

    /// Penalty weight for deviating from the target period
    pub tightness: f32,

    /// Width of the tempo prior in octaves (default: 1.0)
    pub prior_std_octaves: f32,

    /// Tempogram window for the initial tempo, in seconds (default: 8.0)
    pub tempogram_window_seconds: f32,

    /// Lowest tempo considered (default: 30.0)
    pub min_bpm: f32,

    /// Highest tempo considered (default: 300.0)
    pub max_bpm: f32,

    /// Stops tracking with `AnalysisError::Cancelled` once set (default: none)
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl DynamicBeatTracker {
    /// Create a tracker seeded at `start_bpm` with the given tightness
    pub fn new(start_bpm: f32, tightness: f32) -> Self {
        Self {
            start_bpm,
            tightness,
            prior_std_octaves: 1.0,
            tempogram_window_seconds: 8.0,
            min_bpm: 30.0,
            max_bpm: 300.0,
            cancel_flag: None,
        }
    }

    /// Restrict the tempo search range
    pub fn with_search_range(mut self, min_bpm: f32, max_bpm: f32) -> Self {
        self.min_bpm = min_bpm;
        self.max_bpm = max_bpm;
        self
    }

    /// Set the prior width and tempogram window used for the initial tempo
    pub fn with_tempo_prior(mut self, std_octaves: f32, window_seconds: f32) -> Self {
        self.prior_std_octaves = std_octaves;
        self.tempogram_window_seconds = window_seconds;
        self
    }

    /// Observe `flag` while tracking and give up once it is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Track beats in an onset strength envelope
    ///
    /// # Arguments
    ///
    /// * `envelope` - Onset strength envelope
    /// * `frame_rate` - Envelope frames per second
    ///
    /// # Returns
    ///
    /// Tempo and beat positions. A silent or aperiodic envelope yields tempo 0.0
    /// and no beats.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` for an empty envelope or invalid
    /// tracker parameters, and `AnalysisError::Cancelled` if the cancel flag
    /// is set mid-run
    pub fn track(&self, envelope: &[f32], frame_rate: f32) -> Result<BeatTrack, AnalysisError> {
        if envelope.is_empty() {
            return Err(AnalysisError::InvalidInput("Onset envelope is empty".to_string()));
        }
        if frame_rate <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "Frame rate must be > 0, got {}",
                frame_rate
            )));
        }
        if self.start_bpm <= 0.0 || self.tightness <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "start_bpm and tightness must be > 0, got {} and {}",
                self.start_bpm, self.tightness
            )));
        }

        log::debug!(
            "Dynamic beat tracking: {} frames at {:.2} Hz, start_bpm={:.1}, tightness={:.1}",
            envelope.len(),
            frame_rate,
            self.start_bpm,
            self.tightness
        );

        let prior = TempoPrior::new(self.start_bpm, self.prior_std_octaves);
        let cancel_flag = self.cancel_flag.as_deref();
        let tempogram =
            autocorrelation_tempogram_with_cancel(envelope, frame_rate, self.tempogram_window_seconds, cancel_flag)?;
        let Some(initial_bpm) = global_tempo(&tempogram, &prior, self.min_bpm, self.max_bpm) else {
            log::debug!("No periodicity in onset envelope; no beats tracked");
            return Ok(BeatTrack::empty());
        };

        let period = 60.0 * frame_rate / initial_bpm;
        let Some(localscore) = local_score(envelope, period) else {
            return Ok(BeatTrack::empty());
        };

        let (cumscore, backlink) = forward_pass(&localscore, period, self.tightness, cancel_flag)?;
        let beats = match last_beat(&cumscore) {
            Some(last) => trim_beats(&localscore, backtrack(&backlink, last)),
            None => Vec::new(),
        };

        let bpm = match beat_interval(&beats) {
            Some(ibi) if ibi > 0.0 => 60.0 * frame_rate / ibi,
            _ => initial_bpm,
        };

        log::debug!(
            "Beat tracker: initial {:.2} BPM, {} beats, final {:.2} BPM",
            initial_bpm,
            beats.len(),
            bpm
        );

        Ok(BeatTrack {
            bpm,
            beats: beats
                .into_iter()
                .map(|frame| BeatPosition {
                    frame,
                    time_seconds: frame as f32 / frame_rate,
                    strength: envelope[frame],
                })
                .collect(),
        })
    }
}

/// Envelope normalized by its standard deviation, smoothed with a Gaussian
///
/// Returns `None` for a constant envelope.
fn local_score(envelope: &[f32], period: f32) -> Option<Vec<f32>> {
    let n = envelope.len();
    let mean = envelope.iter().sum::<f32>() / n as f32;
    let variance = envelope.iter().map(|&x| (x - mean).powi(2)).sum::<f32>()
        / (n.saturating_sub(1).max(1)) as f32;
    let std = variance.sqrt();
    if std < EPSILON {
        return None;
    }

    let half = period.round().max(1.0) as usize;
    let kernel: Vec<f32> = (0..=2 * half)
        .map(|k| {
            let t = (k as f32 - half as f32) * SMOOTHING_DIVISOR / period;
            (-0.5 * t * t).exp()
        })
        .collect();

    Some(
        (0..n)
            .map(|i| {
                kernel
                    .iter()
                    .enumerate()
                    .filter_map(|(k, &w)| {
                        (i + k).checked_sub(half).and_then(|j| envelope.get(j)).map(|&x| x * w)
                    })
                    .sum::<f32>()
                    / std
            })
            .collect(),
    )
}

/// Cumulative score and best predecessor of every frame
fn forward_pass(
    localscore: &[f32],
    period: f32,
    tightness: f32,
    cancel_flag: Option<&AtomicBool>,
) -> Result<(Vec<f32>, Vec<Option<usize>>), AnalysisError> {
    let n = localscore.len();
    let max_offset = (2.0 * period).round() as usize;
    let min_offset = ((period / 2.0).round() as usize).max(1);
    let threshold = FIRST_BEAT_THRESHOLD * localscore.iter().copied().fold(0.0f32, f32::max);

    let mut cumscore = vec![0.0f32; n];
    let mut backlink = vec![None; n];
    let mut first_beat = true;

    for i in 0..n {
        if i % CANCEL_CHECK_FRAMES == 0 && cancel_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(AnalysisError::Cancelled);
        }
        cumscore[i] = localscore[i];
        if first_beat && localscore[i] < threshold {
            continue;
        }
        first_beat = false;

        if i < min_offset {
            continue;
        }
        let best = (i.saturating_sub(max_offset)..=i - min_offset)
            .map(|j| {
                let ratio = (i - j) as f32 / period;
                (j, cumscore[j] - tightness * ratio.ln().powi(2))
            })
            .fold(None, |best: Option<(usize, f32)>, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });
        if let Some((j, score)) = best {
            cumscore[i] += score;
            backlink[i] = Some(j);
        }
    }

    Ok((cumscore, backlink))
}

/// Last cumulative-score peak that reaches half the median peak height
fn last_beat(cumscore: &[f32]) -> Option<usize> {
    let n = cumscore.len();
    let maxima: Vec<usize> = (0..n)
        .filter(|&i| {
            let rises = i > 0 && cumscore[i] > cumscore[i - 1];
            let holds = i + 1 >= n || cumscore[i] >= cumscore[i + 1];
            rises && holds
        })
        .collect();

    let heights: Vec<f32> = maxima.iter().map(|&i| cumscore[i]).collect();
    let typical = median(&heights)?;
    maxima.into_iter().rev().find(|&i| cumscore[i] > 0.5 * typical)
}

/// Mean inter-beat interval in frames, over the intervals near the median
fn beat_interval(beats: &[usize]) -> Option<f32> {
    let intervals: Vec<f32> = beats.windows(2).map(|w| (w[1] - w[0]) as f32).collect();
    let typical = median(&intervals)?;
    let near: Vec<f32> = intervals
        .into_iter()
        .filter(|&ibi| (ibi - typical).abs() <= IBI_TOLERANCE * typical)
        .collect();
    if near.is_empty() {
        return Some(typical);
    }
    Some(near.iter().sum::<f32>() / near.len() as f32)
}

fn backtrack(backlink: &[Option<usize>], last: usize) -> Vec<usize> {
    let mut beats = vec![last];
    let mut current = last;
    while let Some(previous) = backlink[current] {
        beats.push(previous);
        current = previous;
    }
    beats.reverse();
    beats
}

/// Drop leading and trailing beats weaker than half the RMS beat strength
fn trim_beats(localscore: &[f32], beats: Vec<usize>) -> Vec<usize> {
    if beats.is_empty() {
        return beats;
    }
    let rms = (beats.iter().map(|&b| localscore[b].powi(2)).sum::<f32>() / beats.len() as f32).sqrt();
    let threshold = 0.5 * rms;

    let first = beats.iter().position(|&b| localscore[b] > threshold);
    let last = beats.iter().rposition(|&b| localscore[b] > threshold);
    match (first, last) {
        (Some(first), Some(last)) => beats[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME_RATE: f32 = 22050.0 / 512.0;

    fn impulse_train(len: usize, offset: usize, period: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i >= offset && (i - offset) % period == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_tracks_regular_pulse() {
        // 24 frames per beat is 107.67 BPM
        let envelope = impulse_train(1200, 5, 24);
        let track = DynamicBeatTracker::new(90.0, 100.0).track(&envelope, FRAME_RATE).unwrap();

        assert!((track.bpm - 107.67).abs() < 0.1, "got {:.2}", track.bpm);
        assert!(track.beats.len() > 40);
        for pair in track.beats.windows(2) {
            assert_eq!(pair[1].frame - pair[0].frame, 24);
        }
        assert!(track.beats.iter().all(|b| (b.frame - 5) % 24 == 0));
        assert!(track.beats.iter().all(|b| b.strength == 1.0));
    }

    #[test]
    fn test_beat_times() {
        let envelope = impulse_train(800, 0, 20);
        let track = DynamicBeatTracker::new(120.0, 100.0).track(&envelope, FRAME_RATE).unwrap();
        let beat = &track.beats[1];
        assert!((beat.time_seconds - beat.frame as f32 / FRAME_RATE).abs() < 1e-6);
    }

    #[test]
    fn test_slow_prior_folds_to_pulse() {
        // The 60 BPM prior favours lag 48, which folds up to the 24-frame pulse
        let envelope = impulse_train(1200, 5, 24);
        let track = DynamicBeatTracker::new(60.0, 80.0).track(&envelope, FRAME_RATE).unwrap();
        assert!((track.bpm - 107.67).abs() < 0.5, "got {:.2}", track.bpm);
    }

    #[test]
    fn test_fractional_period_pulse() {
        for bpm in [90.0f32, 120.0, 128.0, 140.0, 174.0] {
            let period = 60.0 * FRAME_RATE / bpm;
            let mut envelope = vec![0.0f32; 1200];
            let len = envelope.len();
            (0..)
                .map(|k| 5 + (k as f32 * period).round() as usize)
                .take_while(|&i| i < len)
                .for_each(|i| envelope[i] = 1.0);

            for tracker in [DynamicBeatTracker::new(90.0, 100.0), DynamicBeatTracker::new(60.0, 80.0)] {
                let track = tracker.track(&envelope, FRAME_RATE).unwrap();
                assert!(
                    (track.bpm - bpm).abs() < 0.01 * bpm,
                    "{} BPM pulse, prior {}: got {:.2}",
                    bpm,
                    tracker.start_bpm,
                    track.bpm
                );
                assert!(track.beats.len() > 30);
            }
        }
    }

    #[test]
    fn test_beat_interval_ignores_gaps() {
        // Alternating 21/22 frames, then a dropout spanning several beats
        let interval = beat_interval(&[0, 21, 43, 64, 86, 107, 200]).unwrap();
        assert!((interval - 21.4).abs() < 1e-4, "got {:.3}", interval);
        assert_eq!(beat_interval(&[0, 24, 48]), Some(24.0));
        assert_eq!(beat_interval(&[5]), None);
    }

    #[test]
    fn test_silent_envelope_has_no_beats() {
        let track = DynamicBeatTracker::new(90.0, 100.0)
            .track(&vec![0.0; 600], FRAME_RATE)
            .unwrap();
        assert_eq!(track.bpm, 0.0);
        assert!(track.beats.is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        let envelope = impulse_train(600, 0, 20);
        assert!(DynamicBeatTracker::new(90.0, 100.0).track(&[], FRAME_RATE).is_err());
        assert!(DynamicBeatTracker::new(90.0, 100.0).track(&envelope, 0.0).is_err());
        assert!(DynamicBeatTracker::new(0.0, 100.0).track(&envelope, FRAME_RATE).is_err());
        assert!(DynamicBeatTracker::new(90.0, -1.0).track(&envelope, FRAME_RATE).is_err());
    }

    #[test]
    fn test_cancelled_tracker_stops() {
        let envelope = impulse_train(1200, 5, 24);
        let flag = Arc::new(AtomicBool::new(true));
        let result = DynamicBeatTracker::new(90.0, 100.0)
            .with_cancel_flag(Arc::clone(&flag))
            .track(&envelope, FRAME_RATE);
        assert!(matches!(result, Err(AnalysisError::Cancelled)));

        // The forward pass checks the flag on its own as well
        let localscore = vec![1.0f32; 4096];
        assert!(matches!(
            forward_pass(&localscore, 24.0, 100.0, Some(&flag)),
            Err(AnalysisError::Cancelled)
        ));

        flag.store(false, Ordering::Relaxed);
        let track = DynamicBeatTracker::new(90.0, 100.0)
            .with_cancel_flag(flag)
            .track(&envelope, FRAME_RATE)
            .unwrap();
        assert!(!track.beats.is_empty());
    }

    #[test]
    fn test_trim_beats_drops_weak_edges() {
        let localscore = vec![0.1, 5.0, 0.0, 5.0, 0.0, 5.0, 0.2];
        let trimmed = trim_beats(&localscore, vec![0, 1, 3, 5, 6]);
        assert_eq!(trimmed, vec![1, 3, 5]);
    }

    #[test]
    fn test_backtrack_follows_links() {
        let backlink = vec![None, None, Some(0), None, Some(2)];
        assert_eq!(backtrack(&backlink, 4), vec![0, 2, 4]);
    }
}
