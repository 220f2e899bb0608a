//! Example: Detect the tempo of multiple WAV files in parallel
//!
//! Usage:
//!   cargo run --release --example analyze_batch -- [--jobs N] [--json] <file1.wav> <file2.wav> ...
//!
//! Notes:
//! - Parallelism is across files. Each file still runs its four estimators concurrently.
//! - Default workers: (available CPU threads - 1), keeping one core free for the system.

use rayon::prelude::*;
use serde::Serialize;
use std::env;
use std::time::Instant;
use stratum_tempo::{analyze_tempo, AnalysisConfig, DetectionResult, FailureReason};

fn load_wav(path: &str) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error + Send + Sync>> {
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

fn default_jobs() -> usize {
    let n = std::thread::available_parallelism().map(|v| v.get()).unwrap_or(1);
    std::cmp::max(1, n.saturating_sub(1))
}

fn percentile(mut xs: Vec<f32>, p: f32) -> Option<f32> {
    if xs.is_empty() {
        return None;
    }
    xs.sort_by(|a, b| a.total_cmp(b));
    let idx = ((xs.len() - 1) as f32 * p.clamp(0.0, 1.0)).round() as usize;
    Some(xs[idx.min(xs.len() - 1)])
}

#[derive(Serialize)]
struct ItemOut {
    file: String,
    bpm: DetectionResult,
    #[serde(skip)]
    processing_ms: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn analyze_one(path: &str, config: &AnalysisConfig) -> ItemOut {
    let failed = |reason: FailureReason, error: String| ItemOut {
        file: path.to_string(),
        bpm: DetectionResult::Failed(reason),
        processing_ms: None,
        error: Some(error),
    };

    let (samples, sample_rate) = match load_wav(path) {
        Ok(decoded) => decoded,
        Err(e) => return failed(FailureReason::InvalidInput, format!("decode failed: {e}")),
    };

    match analyze_tempo(&samples, sample_rate, config) {
        Ok(estimate) => ItemOut {
            file: path.to_string(),
            bpm: DetectionResult::Detected(estimate.bpm),
            processing_ms: Some(estimate.metadata.processing_time_ms),
            error: None,
        },
        Err(e) => failed(FailureReason::from(&e), format!("analysis failed: {e}")),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut json = false;
    let mut jobs: Option<usize> = None;
    let mut paths: Vec<String> = Vec::new();

    while !args.is_empty() {
        let a = args.remove(0);
        match a.as_str() {
            "--json" => json = true,
            "--jobs" => {
                let v = args.first().ok_or("--jobs requires a value")?.parse::<usize>()?;
                args.remove(0);
                jobs = Some(std::cmp::max(1, v));
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: analyze_batch [--jobs N] [--json] <file1> <file2> ...\n\
                     \n\
                     --jobs N   Parallel workers (default: CPU-1)\n\
                     --json     Emit one JSON object per line (JSONL)\n"
                );
                return Ok(());
            }
            _ => paths.push(a),
        }
    }

    if paths.is_empty() {
        eprintln!("ERROR: Provide at least one audio file path. Use --help for usage.");
        std::process::exit(2);
    }

    let jobs = jobs.unwrap_or_else(default_jobs);
    eprintln!("Batch: {} files, jobs={}", paths.len(), jobs);

    let config = AnalysisConfig::default();

    let t0 = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    let outs: Vec<ItemOut> = pool.install(|| paths.par_iter().map(|path| analyze_one(path, &config)).collect());

    for (idx, o) in outs.iter().enumerate() {
        if json {
            println!("{}", serde_json::to_string(o)?);
        } else {
            match (&o.bpm, &o.error) {
                (DetectionResult::Detected(bpm), _) => println!(
                    "[{}/{}] {}: BPM={:.2} time={:.2}ms",
                    idx + 1,
                    outs.len(),
                    o.file,
                    bpm,
                    o.processing_ms.unwrap_or(0.0)
                ),
                (DetectionResult::Failed(_), error) => println!(
                    "[{}/{}] {}: ERROR: {}",
                    idx + 1,
                    outs.len(),
                    o.file,
                    error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }

    let ok_times: Vec<f32> = outs.iter().filter_map(|o| o.processing_ms).collect();
    let wall_ms = t0.elapsed().as_secs_f64() * 1000.0;

    eprintln!("Done: ok={}/{} wall={:.0}ms", ok_times.len(), outs.len(), wall_ms);
    if !ok_times.is_empty() {
        let mean = ok_times.iter().sum::<f32>() / ok_times.len() as f32;
        let p50 = percentile(ok_times.clone(), 0.50).unwrap_or(mean);
        let p90 = percentile(ok_times.clone(), 0.90).unwrap_or(mean);
        eprintln!("processing_time_ms: mean={:.2} p50={:.2} p90={:.2}", mean, p50, p90);
    }

    Ok(())
}
