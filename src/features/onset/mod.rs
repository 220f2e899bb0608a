//! Onset analysis modules
//!
//! - Harmonic-percussive source separation (HPSS)
//! - Onset strength envelope (log-mel spectral flux)

pub mod hpss;
pub mod spectral_flux;
