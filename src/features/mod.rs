//! Feature extraction modules
//!
//! This module contains the signal analysis building blocks:
//! - Short-time Fourier transform
//! - Onset analysis (HPSS + onset strength)
//! - Period estimation (autocorrelation, tempograms)
//! - Beat tracking (dynamic programming)

pub mod beat_tracking;
pub mod onset;
pub mod period;
pub mod stft;
