//! Frequency-domain band-pass filtering
//!
//! Sub-bass rumble and high-frequency noise carry no rhythmic onset
//! information. The filter zeroes STFT bins outside `[low_hz, high_hz]` and
//! inverse-transforms back to the time domain.

use super::Waveform;
use crate::config::BandPassConfig;
use crate::error::AnalysisError;
use crate::features::stft::{bin_frequencies, istft, stft};

/// Restrict a waveform to a frequency band
///
/// # Arguments
///
/// * `waveform` - Input audio (typically the percussive component)
/// * `band` - Cutoffs in Hz; `high_hz` above Nyquist is clipped to Nyquist
/// * `frame_size` - STFT frame size
/// * `hop_size` - STFT hop size
pub fn band_pass(
    waveform: &Waveform,
    band: &BandPassConfig,
    frame_size: usize,
    hop_size: usize,
) -> Result<Waveform, AnalysisError> {
    if band.low_hz < 0.0 || band.high_hz <= band.low_hz {
        return Err(AnalysisError::InvalidInput(format!(
            "Invalid band: [{}, {}] Hz",
            band.low_hz, band.high_hz
        )));
    }

    let nyquist = waveform.sample_rate as f32 / 2.0;
    let high_hz = band.high_hz.min(nyquist);
    if band.low_hz >= high_hz {
        return Err(AnalysisError::InvalidInput(format!(
            "Band [{}, {}] Hz lies above Nyquist ({} Hz)",
            band.low_hz, band.high_hz, nyquist
        )));
    }

    log::debug!(
        "Band-pass {:.0}-{:.0} Hz on {} samples at {} Hz",
        band.low_hz,
        high_hz,
        waveform.len(),
        waveform.sample_rate
    );

    let mut spectrogram = stft(&waveform.samples, frame_size, hop_size)?;
    let freqs = bin_frequencies(waveform.sample_rate, frame_size);

    for frame in spectrogram.iter_mut() {
        for (bin, &freq) in frame.iter_mut().zip(freqs.iter()) {
            if freq < band.low_hz || freq > high_hz {
                *bin = Default::default();
            }
        }
    }

    let samples = istft(&spectrogram, frame_size, hop_size, waveform.len())?;
    Ok(waveform.with_samples(samples))
}
