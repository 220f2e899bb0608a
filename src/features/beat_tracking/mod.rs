//! Beat tracking modules
//!
//! Derive a beat sequence and a global tempo from an onset strength envelope:
//! - Dynamic-programming beat tracker with a tempo prior and tightness penalty

pub mod dynamic;

use serde::{Deserialize, Serialize};

/// A tracked beat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatPosition {
    /// Envelope frame index
    pub frame: usize,

    /// Time in seconds from the start of the analysed segment
    pub time_seconds: f32,

    /// Onset strength at the beat
    pub strength: f32,
}

/// Beat tracker output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatTrack {
    /// Global tempo estimate in BPM (0.0 when nothing could be tracked)
    pub bpm: f32,

    /// Beats in time order
    pub beats: Vec<BeatPosition>,
}

impl BeatTrack {
    /// No tempo, no beats
    pub fn empty() -> Self {
        Self {
            bpm: 0.0,
            beats: Vec::new(),
        }
    }
}
