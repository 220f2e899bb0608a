//! Example: Detect the tempo of a single WAV file
//!
//! Usage:
//!   cargo run --release --example analyze_file -- [--config cfg.json] [--full] [--clicks out.wav] <file.wav>
//!
//! Prints `{"file": ..., "bpm": ...}`. A failed detection prints the failure
//! sentinel string in place of the number. `--full` prints every candidate and
//! the run metadata instead. `--clicks` writes the input with a metronome
//! overlaid at the detected tempo.

use std::env;

use stratum_tempo::metronome::{overlay_click_track, ClickConfig};
use stratum_tempo::{analyze_tempo, detect_bpm, AnalysisConfig, DetectionResult, FailureReason, Waveform};

/// Load a WAV file as mono f32
fn load_wav(path: &str) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels.max(1) as usize;
    let mono = samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}

fn write_wav(path: &str, waveform: &Waveform) -> Result<(), Box<dyn std::error::Error>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in &waveform.samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut config_path: Option<String> = None;
    let mut clicks_path: Option<String> = None;
    let mut full = false;
    let mut file: Option<String> = None;

    while !args.is_empty() {
        let a = args.remove(0);
        match a.as_str() {
            "--config" => {
                if args.is_empty() {
                    return Err("--config requires a path".into());
                }
                config_path = Some(args.remove(0));
            }
            "--clicks" => {
                if args.is_empty() {
                    return Err("--clicks requires a path".into());
                }
                clicks_path = Some(args.remove(0));
            }
            "--full" => full = true,
            "--help" | "-h" => {
                eprintln!("Usage: analyze_file [--config cfg.json] [--full] [--clicks out.wav] <file.wav>");
                return Ok(());
            }
            _ => file = Some(a),
        }
    }

    let Some(file) = file else {
        eprintln!("ERROR: Provide an audio file path. Use --help for usage.");
        std::process::exit(2);
    };

    let config = match &config_path {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };

    let (samples, sample_rate) = load_wav(&file)?;
    log::info!("Loaded {}: {} samples at {} Hz", file, samples.len(), sample_rate);

    let result = if full {
        match analyze_tempo(&samples, sample_rate, &config) {
            Ok(estimate) => {
                println!("{}", serde_json::to_string_pretty(&estimate)?);
                DetectionResult::Detected(estimate.bpm)
            }
            Err(e) => {
                eprintln!("Analysis failed: {}", e);
                DetectionResult::Failed(FailureReason::from(&e))
            }
        }
    } else {
        let result = detect_bpm(&samples, sample_rate, &config);
        println!("{}", serde_json::json!({ "file": file, "bpm": result }));
        result
    };

    if let (Some(out), Some(bpm)) = (clicks_path, result.bpm()) {
        let song = Waveform::new(samples, sample_rate)?;
        let mixed = overlay_click_track(&song, bpm, &ClickConfig::default())?;
        write_wav(&out, &mixed)?;
        eprintln!("Wrote metronome overlay at {:.2} BPM to {}", bpm, out);
    }

    Ok(())
}
