//! Candidate tempo estimates and their provenance

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which generator produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Beat tracker seeded with the fast tempo prior
    BeatTrackFast,
    /// Beat tracker seeded with the slow tempo prior
    BeatTrackSlow,
    /// Onset autocorrelation tempogram at the standard hop
    OnsetTempoCoarse,
    /// Onset autocorrelation tempogram at the fine hop
    OnsetTempoFine,
    /// Highest global autocorrelation peak (plain-median fusion)
    AutocorrPeak,
    /// Highest FFT tempogram bin (plain-median fusion)
    TempogramPeak,
}

impl CandidateSource {
    /// Generators used by weighted voting, in weight order
    pub const WEIGHTED_VOTING: [CandidateSource; 4] = [
        CandidateSource::BeatTrackFast,
        CandidateSource::OnsetTempoCoarse,
        CandidateSource::BeatTrackSlow,
        CandidateSource::OnsetTempoFine,
    ];

    /// Generators used by plain-median fusion
    pub const PLAIN_MEDIAN: [CandidateSource; 3] = [
        CandidateSource::AutocorrPeak,
        CandidateSource::TempogramPeak,
        CandidateSource::BeatTrackFast,
    ];

    /// Short stable identifier
    pub fn name(&self) -> &'static str {
        match self {
            CandidateSource::BeatTrackFast => "beat_track_fast",
            CandidateSource::BeatTrackSlow => "beat_track_slow",
            CandidateSource::OnsetTempoCoarse => "onset_tempo_coarse",
            CandidateSource::OnsetTempoFine => "onset_tempo_fine",
            CandidateSource::AutocorrPeak => "autocorr_peak",
            CandidateSource::TempogramPeak => "tempogram_peak",
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw generator output before coercion
///
/// Periodicity algorithms may report either a single tempo or a sequence of
/// them, and the sequence can be empty on short or atypical input.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEstimate {
    /// A single value
    Scalar(f32),
    /// A sequence of values
    Series(Vec<f32>),
}

impl RawEstimate {
    /// Coerce to one BPM value
    ///
    /// A scalar is returned as is. A series yields its first element, or 0.0
    /// when empty.
    ///
    /// # Example
    ///
    /// ```
    /// use stratum_tempo::analysis::candidates::RawEstimate;
    ///
    /// assert_eq!(RawEstimate::from(vec![128.3]).to_scalar(), 128.3);
    /// assert_eq!(RawEstimate::from(Vec::<f32>::new()).to_scalar(), 0.0);
    /// assert_eq!(RawEstimate::from(140).to_scalar(), 140.0);
    /// ```
    pub fn to_scalar(&self) -> f32 {
        match self {
            RawEstimate::Scalar(value) => *value,
            RawEstimate::Series(values) => values.first().copied().unwrap_or(0.0),
        }
    }
}

impl From<f32> for RawEstimate {
    fn from(value: f32) -> Self {
        RawEstimate::Scalar(value)
    }
}

impl From<i32> for RawEstimate {
    fn from(value: i32) -> Self {
        RawEstimate::Scalar(value as f32)
    }
}

impl From<Vec<f32>> for RawEstimate {
    fn from(values: Vec<f32>) -> Self {
        RawEstimate::Series(values)
    }
}

impl From<Option<f32>> for RawEstimate {
    fn from(value: Option<f32>) -> Self {
        RawEstimate::Series(value.into_iter().collect())
    }
}

/// One scalar BPM candidate with provenance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Generator that produced the value
    pub source: CandidateSource,

    /// Tempo in BPM
    pub bpm: f32,
}

impl Candidate {
    /// Coerce a raw generator output into a candidate
    pub fn from_raw(source: CandidateSource, raw: &RawEstimate) -> Self {
        Self {
            source,
            bpm: raw.to_scalar(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(RawEstimate::Series(vec![128.3]).to_scalar(), 128.3);
        assert_eq!(RawEstimate::Series(vec![]).to_scalar(), 0.0);
        assert_eq!(RawEstimate::from(140).to_scalar(), 140.0);
        assert_eq!(RawEstimate::Scalar(97.5).to_scalar(), 97.5);
    }

    #[test]
    fn test_series_takes_first_element() {
        assert_eq!(RawEstimate::from(vec![110.0, 55.0, 220.0]).to_scalar(), 110.0);
    }

    #[test]
    fn test_option_coercion() {
        assert_eq!(RawEstimate::from(Some(123.0)).to_scalar(), 123.0);
        assert_eq!(RawEstimate::from(None::<f32>).to_scalar(), 0.0);
    }

    #[test]
    fn test_candidate_from_raw() {
        let candidate = Candidate::from_raw(CandidateSource::OnsetTempoFine, &RawEstimate::from(vec![99.0]));
        assert_eq!(candidate.source, CandidateSource::OnsetTempoFine);
        assert_eq!(candidate.bpm, 99.0);
    }

    #[test]
    fn test_source_names() {
        assert_eq!(CandidateSource::BeatTrackFast.to_string(), "beat_track_fast");
        assert_eq!(
            serde_json::to_string(&CandidateSource::OnsetTempoCoarse).unwrap(),
            "\"onset_tempo_coarse\""
        );
    }
}
