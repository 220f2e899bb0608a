//! Integration tests for the tempo detection pipeline
//!
//! Test material is synthesized with the metronome so the true tempo is known.
//! The reference track spaces clicks a whole number of analysis frames apart
//! (12288 samples at 22050 Hz is 24 frames of 512, or 107.67 BPM); the tempo
//! sweep uses common tempos whose beat periods fall between frames.

use std::path::Path;

use stratum_tempo::metronome::{click_track, overlay_click_track, ClickConfig};
use stratum_tempo::{
    analyze_tempo, detect_bpm, AnalysisConfig, AnalysisError, CandidateSource, DetectionResult,
    FailureReason, FusionStrategy, Waveform, FAILURE_SENTINEL,
};

const CLICK_BPM: f32 = 60.0 * 22050.0 / 12288.0;

/// Load a WAV file and return (samples, sample_rate)
fn load_wav(path: &str) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    // Convert to mono if stereo
    let mono_samples = if spec.channels == 2 {
        samples
            .chunks(2)
            .map(|chunk| (chunk[0] + chunk[1]) / 2.0)
            .collect()
    } else {
        samples
    };

    Ok((mono_samples, spec.sample_rate))
}

/// Write mono 16-bit PCM
fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), Box<dyn std::error::Error>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn clicks(bpm: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
    click_track(bpm, seconds, sample_rate, &ClickConfig::default()).expect("valid click parameters")
}

/// Detected tempo, or its half/double, lies near `expected`
fn near_octave(bpm: f32, expected: f32, tolerance: f32) -> bool {
    [0.5, 1.0, 2.0]
        .iter()
        .any(|&factor| (bpm - expected * factor).abs() <= expected * factor * tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_track_detected() {
        let samples = clicks(CLICK_BPM, 30.0, 22050);
        let estimate = analyze_tempo(&samples, 22050, &AnalysisConfig::default())
            .expect("Analysis should succeed");

        assert!(
            (40.0..=200.0).contains(&estimate.bpm),
            "BPM must be in the plausible range, got {:.2}",
            estimate.bpm
        );
        assert!(
            (estimate.bpm - CLICK_BPM).abs() < 0.1 * CLICK_BPM,
            "BPM should be close to {:.2}, got {:.2}",
            CLICK_BPM,
            estimate.bpm
        );
        assert_eq!(estimate.bpm, (estimate.bpm * 100.0).round() / 100.0);

        // The fast tracker and both onset estimators lock onto the click period
        for candidate in &estimate.candidates {
            if candidate.source != CandidateSource::BeatTrackSlow {
                assert!(
                    (candidate.bpm - CLICK_BPM).abs() < 1.0,
                    "{} gave {:.2}",
                    candidate.source,
                    candidate.bpm
                );
            } else {
                assert!(near_octave(candidate.bpm, CLICK_BPM, 0.02));
            }
        }
        assert_eq!(estimate.candidates.len(), 4);
        assert!(estimate.beats.len() >= 8, "expected beats, got {}", estimate.beats.len());
    }

    #[test]
    fn test_common_tempos_detected() {
        for bpm in [90.0f32, 120.0, 128.0, 140.0, 174.0] {
            let estimate = analyze_tempo(&clicks(bpm, 30.0, 22050), 22050, &AnalysisConfig::default())
                .expect("Analysis should succeed");
            assert!(
                (estimate.bpm - bpm).abs() < 0.03 * bpm,
                "{} BPM clicks detected as {:.2} (candidates {:?})",
                bpm,
                estimate.bpm,
                estimate.candidates
            );
            for candidate in &estimate.candidates {
                assert!(
                    (candidate.bpm - bpm).abs() < 0.03 * bpm,
                    "{} BPM clicks: {} gave {:.2}",
                    bpm,
                    candidate.source,
                    candidate.bpm
                );
            }
        }
    }

    #[test]
    fn test_common_tempo_at_44k() {
        let result = detect_bpm(&clicks(120.0, 30.0, 44100), 44100, &AnalysisConfig::default());
        let bpm = result.bpm().expect("120 BPM at 44.1 kHz should be detected");
        assert!((bpm - 120.0).abs() < 3.6, "got {:.2}", bpm);
    }

    #[test]
    fn test_metadata_populated() {
        let samples = clicks(CLICK_BPM, 20.0, 22050);
        let estimate = analyze_tempo(&samples, 22050, &AnalysisConfig::default()).unwrap();
        let metadata = &estimate.metadata;

        assert_eq!(metadata.sample_rate, 22050);
        assert!((metadata.duration_seconds - 20.0).abs() < 0.01);
        assert!(metadata.trimmed_seconds <= metadata.duration_seconds);
        assert!((metadata.segment_seconds - metadata.trimmed_seconds / 2.0).abs() < 0.01);
        assert!(metadata.processing_time_ms > 0.0);
        assert_eq!(metadata.fusion, FusionStrategy::WeightedVoting);
        assert!(metadata.timed_out.is_empty());
        assert_eq!(metadata.methods_used.len(), estimate.candidates.len());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let samples = clicks(CLICK_BPM, 20.0, 22050);
        let config = AnalysisConfig::default();

        let first = analyze_tempo(&samples, 22050, &config).unwrap();
        let second = analyze_tempo(&samples, 22050, &config).unwrap();

        assert_eq!(first.bpm, second.bpm);
        assert_eq!(first.candidates, second.candidates);
        assert_eq!(first.beats, second.beats);
    }

    #[test]
    fn test_resampled_input() {
        // Same click spacing in seconds at 44.1 kHz
        let samples = clicks(CLICK_BPM, 30.0, 44100);
        let result = detect_bpm(&samples, 44100, &AnalysisConfig::default());

        let bpm = result.bpm().expect("44.1 kHz input should be detected");
        assert!((40.0..=200.0).contains(&bpm));
        assert!((bpm - CLICK_BPM).abs() < 0.1 * CLICK_BPM, "got {:.2}", bpm);
    }

    #[test]
    fn test_clicks_over_sustained_tone() {
        // A steady 220 Hz pad is harmonic and must not hide the clicks
        let pad: Vec<f32> = (0..22050 * 30)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22050.0).sin())
            .collect();
        let song = Waveform::new(pad, 22050).unwrap();
        let mixed = overlay_click_track(&song, CLICK_BPM, &ClickConfig::default()).unwrap();

        let bpm = detect_bpm(&mixed.samples, 22050, &AnalysisConfig::default())
            .bpm()
            .expect("clicks over a pad should be detected");
        assert!(near_octave(bpm, CLICK_BPM, 0.1), "got {:.2}", bpm);
    }

    #[test]
    fn test_band_pass_enabled() {
        let config = AnalysisConfig::from_json_str(
            r#"{ "band_pass": { "low_hz": 150.0, "high_hz": 5000.0 } }"#,
        )
        .unwrap();
        let samples = clicks(CLICK_BPM, 30.0, 22050);

        let estimate = analyze_tempo(&samples, 22050, &config).unwrap();
        assert!(estimate.metadata.band_pass);
        assert!((40.0..=200.0).contains(&estimate.bpm));
    }

    #[test]
    fn test_plain_median_fusion() {
        let config = AnalysisConfig {
            fusion: FusionStrategy::PlainMedian,
            ..AnalysisConfig::default()
        };
        let samples = clicks(CLICK_BPM, 30.0, 22050);

        let estimate = analyze_tempo(&samples, 22050, &config).unwrap();
        let sources: Vec<CandidateSource> = estimate.candidates.iter().map(|c| c.source).collect();
        assert!(sources.iter().all(|s| CandidateSource::PLAIN_MEDIAN.contains(s)));
        assert!(near_octave(estimate.bpm, CLICK_BPM, 0.05), "got {:.2}", estimate.bpm);
    }

    #[test]
    fn test_silence_fails() {
        let samples = vec![0.0f32; 22050 * 10];

        let err = analyze_tempo(&samples, 22050, &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::SilentSignal { .. }));

        let result = detect_bpm(&samples, 22050, &AnalysisConfig::default());
        assert_eq!(result, DetectionResult::Failed(FailureReason::Silent));
    }

    #[test]
    fn test_low_level_noise_fails() {
        // Uniform noise at 1e-4 peak amplitude, around -85 dBFS
        let mut state = 2024u32;
        let noise: Vec<f32> = (0..22050 * 20)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                1e-4 * ((state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0)
            })
            .collect();

        let result = detect_bpm(&noise, 22050, &AnalysisConfig::default());
        assert_eq!(result, DetectionResult::Failed(FailureReason::Silent));
    }

    #[test]
    fn test_empty_and_invalid_input_fail() {
        let config = AnalysisConfig::default();
        assert!(!detect_bpm(&[], 22050, &config).is_detected());
        assert!(!detect_bpm(&clicks(120.0, 2.0, 22050), 0, &config).is_detected());
    }

    #[test]
    fn test_too_short_input_fails_gracefully() {
        // Half a second holds at most one click: no tempo can be established
        let samples = clicks(CLICK_BPM, 0.5, 22050);
        let result = detect_bpm(&samples, 22050, &AnalysisConfig::default());
        assert!(!result.is_detected());
    }

    #[test]
    fn test_invalid_config_fails() {
        let config = AnalysisConfig {
            min_bpm: 200.0,
            max_bpm: 40.0,
            ..AnalysisConfig::default()
        };
        let result = analyze_tempo(&clicks(CLICK_BPM, 10.0, 22050), 22050, &config);
        assert!(matches!(result, Err(AnalysisError::InvalidConfig(_))));
    }

    #[test]
    fn test_widened_plausible_range_rejected() {
        let config = AnalysisConfig {
            min_bpm: 10.0,
            max_bpm: 400.0,
            ..AnalysisConfig::default()
        };
        let result = detect_bpm(&clicks(CLICK_BPM, 10.0, 22050), 22050, &config);
        assert_eq!(result, DetectionResult::Failed(FailureReason::InvalidInput));
    }

    #[test]
    fn test_json_response_shape() {
        let detected = detect_bpm(&clicks(CLICK_BPM, 20.0, 22050), 22050, &AnalysisConfig::default());
        let failed = detect_bpm(&vec![0.0f32; 22050], 22050, &AnalysisConfig::default());

        let ok = serde_json::json!({ "file": "clicks.wav", "bpm": detected });
        assert!(ok["bpm"].is_number());

        let err = serde_json::json!({ "file": "silence.wav", "bpm": failed });
        assert_eq!(err["bpm"], FAILURE_SENTINEL);
    }

    #[test]
    fn test_estimate_serializes() {
        let estimate = analyze_tempo(&clicks(CLICK_BPM, 20.0, 22050), 22050, &AnalysisConfig::default()).unwrap();
        let json = serde_json::to_value(&estimate).unwrap();

        assert!(json["bpm"].is_number());
        assert_eq!(json["candidates"][0]["source"], "beat_track_fast");
        assert_eq!(json["metadata"]["fusion"], "weighted_voting");
    }

    #[test]
    fn test_wav_round_trip() {
        let path = std::env::temp_dir().join(format!("stratum_tempo_clicks_{}.wav", std::process::id()));
        write_wav(&path, &clicks(CLICK_BPM, 20.0, 22050), 22050).expect("Failed to write WAV");

        let (samples, sample_rate) = load_wav(path.to_str().unwrap()).expect("Failed to load WAV");
        let _ = std::fs::remove_file(&path);

        assert_eq!(sample_rate, 22050);
        let bpm = detect_bpm(&samples, sample_rate, &AnalysisConfig::default())
            .bpm()
            .expect("16-bit WAV should be detected");
        assert!((bpm - CLICK_BPM).abs() < 0.1 * CLICK_BPM, "got {:.2}", bpm);
    }
}
