//! Candidate fusion
//!
//! Candidates are first checked against a plausible tempo range; values
//! outside it are dropped, never clamped. The survivors are fused with one of
//! two strategies:
//!
//! - **Weighted voting** (default): `M1` is the median of all candidates, `M2`
//!   the weighted average `0.4 * beat_fast + 0.3 * onset_coarse + 0.2 * beat_slow
//!   + 0.1 * onset_fine`. The result is `round(median(M1, M2), 2)`. When some
//!   candidates were dropped the remaining weights are renormalized.
//! - **Plain median**: the median of the survivors, rounded to 2 decimals.
//!
//! The fused value passes through [`validate`] before it is reported.
//!
//! # Example
//!
//! ```
//! use stratum_tempo::analysis::aggregate::{fuse, FusionStrategy, PlausibleRange};
//! use stratum_tempo::analysis::candidates::{Candidate, CandidateSource};
//!
//! let candidates = [
//!     Candidate { source: CandidateSource::BeatTrackFast, bpm: 120.0 },
//!     Candidate { source: CandidateSource::OnsetTempoCoarse, bpm: 122.0 },
//!     Candidate { source: CandidateSource::BeatTrackSlow, bpm: 118.0 },
//!     Candidate { source: CandidateSource::OnsetTempoFine, bpm: 121.0 },
//! ];
//! let fusion = fuse(&candidates, FusionStrategy::WeightedVoting, &PlausibleRange::default())?;
//! assert!((fusion.bpm - 120.4).abs() < 1e-4);
//! # Ok::<(), stratum_tempo::AnalysisError>(())
//! ```

use serde::{Deserialize, Serialize};

use super::candidates::{Candidate, CandidateSource};
use crate::error::AnalysisError;

/// Lowest tempo reported as a detection
pub const MIN_PLAUSIBLE_BPM: f32 = 40.0;

/// Highest tempo reported as a detection
pub const MAX_PLAUSIBLE_BPM: f32 = 200.0;

/// Inclusive tempo range a candidate must fall in to take part in fusion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibleRange {
    /// Lower bound in BPM
    pub min_bpm: f32,

    /// Upper bound in BPM
    pub max_bpm: f32,
}

impl Default for PlausibleRange {
    fn default() -> Self {
        Self {
            min_bpm: MIN_PLAUSIBLE_BPM,
            max_bpm: MAX_PLAUSIBLE_BPM,
        }
    }
}

impl PlausibleRange {
    /// True for finite values within `[min_bpm, max_bpm]`
    pub fn contains(&self, bpm: f32) -> bool {
        bpm.is_finite() && bpm >= self.min_bpm && bpm <= self.max_bpm
    }
}

/// How candidates are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Median of the candidates reconciled with their weighted average
    #[default]
    WeightedVoting,
    /// Median of autocorrelation peak, tempogram peak and fast beat track
    PlainMedian,
}

impl FusionStrategy {
    /// Generators this strategy needs
    pub fn sources(&self) -> &'static [CandidateSource] {
        match self {
            FusionStrategy::WeightedVoting => &CandidateSource::WEIGHTED_VOTING,
            FusionStrategy::PlainMedian => &CandidateSource::PLAIN_MEDIAN,
        }
    }
}

/// Voting weight of a generator; zero for sources that do not vote
pub fn weight(source: CandidateSource) -> f32 {
    match source {
        CandidateSource::BeatTrackFast => 0.4,
        CandidateSource::OnsetTempoCoarse => 0.3,
        CandidateSource::BeatTrackSlow => 0.2,
        CandidateSource::OnsetTempoFine => 0.1,
        CandidateSource::AutocorrPeak | CandidateSource::TempogramPeak => 0.0,
    }
}

/// Median, averaging the two middle values for even lengths
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Weighted average of voting candidates, renormalized over the weights present
pub fn weighted_average(candidates: &[Candidate]) -> Option<f32> {
    let (sum, total) = candidates
        .iter()
        .map(|c| (c.bpm, weight(c.source)))
        .filter(|&(_, w)| w > 0.0)
        .fold((0.0f32, 0.0f32), |(sum, total), (bpm, w)| (sum + bpm * w, total + w));
    (total > 0.0).then(|| sum / total)
}

/// Round to two decimal places
pub fn round_to_hundredths(bpm: f32) -> f32 {
    ((bpm as f64 * 100.0).round() / 100.0) as f32
}

/// Split candidates into (plausible, rejected)
pub fn partition_plausible(candidates: &[Candidate], range: &PlausibleRange) -> (Vec<Candidate>, Vec<Candidate>) {
    candidates.iter().partition(|c| range.contains(c.bpm))
}

/// Final validation gate
///
/// # Errors
///
/// Returns `AnalysisError::ImplausibleTempo` when `bpm` is outside `range`
pub fn validate(bpm: f32, range: &PlausibleRange) -> Result<f32, AnalysisError> {
    if range.contains(bpm) {
        Ok(bpm)
    } else {
        Err(AnalysisError::ImplausibleTempo(bpm))
    }
}

/// Outcome of fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fusion {
    /// Fused tempo, rounded to 2 decimals and validated
    pub bpm: f32,

    /// Candidates that took part
    pub used: Vec<Candidate>,

    /// Candidates dropped as implausible
    pub rejected: Vec<Candidate>,
}

/// Fuse candidates into one tempo
///
/// # Errors
///
/// - `AnalysisError::NoPlausibleCandidates` when no candidate is in range
/// - `AnalysisError::ImplausibleTempo` when the fused value fails the final gate
pub fn fuse(
    candidates: &[Candidate],
    strategy: FusionStrategy,
    range: &PlausibleRange,
) -> Result<Fusion, AnalysisError> {
    let (used, rejected) = partition_plausible(candidates, range);

    for candidate in &rejected {
        log::warn!(
            "Dropping implausible candidate from {}: {:.2} BPM",
            candidate.source,
            candidate.bpm
        );
    }

    let values: Vec<f32> = used.iter().map(|c| c.bpm).collect();
    let m1 = median(&values).ok_or(AnalysisError::NoPlausibleCandidates {
        min_bpm: range.min_bpm,
        max_bpm: range.max_bpm,
    })?;

    let fused = match strategy {
        FusionStrategy::WeightedVoting => match weighted_average(&used) {
            Some(m2) => {
                log::debug!("Weighted voting: median={:.3}, weighted={:.3}", m1, m2);
                (m1 + m2) / 2.0
            }
            None => m1,
        },
        FusionStrategy::PlainMedian => m1,
    };

    let bpm = validate(round_to_hundredths(fused), range)?;

    log::debug!(
        "Fused {} of {} candidates ({:?}) -> {:.2} BPM",
        used.len(),
        candidates.len(),
        strategy,
        bpm
    );

    Ok(Fusion { bpm, used, rejected })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voting(fast: f32, coarse: f32, slow: f32, fine: f32) -> Vec<Candidate> {
        CandidateSource::WEIGHTED_VOTING
            .iter()
            .zip([fast, coarse, slow, fine])
            .map(|(&source, bpm)| Candidate { source, bpm })
            .collect()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[120.0, 60.0, 121.0]), Some(120.0));
        assert_eq!(median(&[118.0, 122.0]), Some(120.0));
    }

    #[test]
    fn test_weighted_voting_arithmetic() {
        let candidates = voting(120.0, 122.0, 118.0, 121.0);

        assert_eq!(median(&[120.0, 122.0, 118.0, 121.0]), Some(120.5));
        assert!((weighted_average(&candidates).unwrap() - 120.3).abs() < 1e-4);

        let fusion = fuse(&candidates, FusionStrategy::WeightedVoting, &PlausibleRange::default()).unwrap();
        assert!((fusion.bpm - 120.4).abs() < 1e-4);
        assert_eq!(fusion.used.len(), 4);
        assert!(fusion.rejected.is_empty());
    }

    #[test]
    fn test_out_of_range_candidate_rejected() {
        let candidates = [Candidate {
            source: CandidateSource::BeatTrackFast,
            bpm: 250.0,
        }];
        let result = fuse(&candidates, FusionStrategy::WeightedVoting, &PlausibleRange::default());
        assert!(matches!(result, Err(AnalysisError::NoPlausibleCandidates { .. })));
    }

    #[test]
    fn test_weights_renormalized_after_rejection() {
        let candidates = voting(120.0, 250.0, 118.0, 121.0);
        let fusion = fuse(&candidates, FusionStrategy::WeightedVoting, &PlausibleRange::default()).unwrap();

        // median(120, 118, 121) = 120; (0.4*120 + 0.2*118 + 0.1*121) / 0.7 = 119.571
        assert!((fusion.bpm - 119.79).abs() < 1e-4);
        assert_eq!(fusion.rejected.len(), 1);
        assert_eq!(fusion.rejected[0].source, CandidateSource::OnsetTempoCoarse);
    }

    #[test]
    fn test_zero_candidates_are_dropped() {
        // An empty generator output coerces to 0.0
        let candidates = voting(0.0, 0.0, 100.0, 0.0);
        let fusion = fuse(&candidates, FusionStrategy::WeightedVoting, &PlausibleRange::default()).unwrap();
        assert_eq!(fusion.bpm, 100.0);
    }

    #[test]
    fn test_plain_median() {
        let candidates = [
            Candidate { source: CandidateSource::AutocorrPeak, bpm: 128.0 },
            Candidate { source: CandidateSource::TempogramPeak, bpm: 64.0 },
            Candidate { source: CandidateSource::BeatTrackFast, bpm: 127.333 },
        ];
        let fusion = fuse(&candidates, FusionStrategy::PlainMedian, &PlausibleRange::default()).unwrap();
        assert!((fusion.bpm - 127.33).abs() < 1e-4);
    }

    #[test]
    fn test_range_boundaries_inclusive() {
        let range = PlausibleRange::default();
        assert!(range.contains(40.0));
        assert!(range.contains(200.0));
        assert!(!range.contains(39.99));
        assert!(!range.contains(200.01));
        assert!(!range.contains(f32::NAN));
    }

    #[test]
    fn test_validate_gate() {
        let range = PlausibleRange::default();
        assert_eq!(validate(120.0, &range).unwrap(), 120.0);
        assert!(matches!(validate(250.0, &range), Err(AnalysisError::ImplausibleTempo(_))));
    }

    #[test]
    fn test_round_to_hundredths() {
        assert!((round_to_hundredths(120.456) - 120.46).abs() < 1e-4);
        assert!((round_to_hundredths(99.994) - 99.99).abs() < 1e-4);
    }

    #[test]
    fn test_fusion_is_order_insensitive() {
        let mut candidates = voting(120.0, 122.0, 118.0, 121.0);
        let forward = fuse(&candidates, FusionStrategy::WeightedVoting, &PlausibleRange::default()).unwrap();
        candidates.reverse();
        let backward = fuse(&candidates, FusionStrategy::WeightedVoting, &PlausibleRange::default()).unwrap();
        assert_eq!(forward.bpm, backward.bpm);
    }
}
