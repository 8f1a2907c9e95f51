use anyhow::{Context, Result, bail};
use futures::future::join_all;
use image::RgbImage;
use std::env;
use std::path::Path;
use std::sync::Arc;
use terra_sentinel::core_modules::image_helper::save_png;
use terra_sentinel::service::{DeforestationRequest, InMemoryReportSink, SentinelService, SiteRequest};
use terra_sentinel::{AnalysisEngine, AnalysisMode, Detection, EngineConfig, GroundDetector, ParallelPipeline};
use tracing::info;

const USAGE: &str = "Usage:
  sentinel_tester site <input> <output.png> [sat|land] [detections.json]
  sentinel_tester deforest <before> <after> <output.png>
  sentinel_tester batch <output_dir> <sat|land> <input>...";

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Logging & Configuration ---
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("{USAGE}");
        return Ok(());
    }
    let config = EngineConfig::from_env().context("reading SENTINEL_* configuration")?;
    let engine = AnalysisEngine::new(config)?;

    // --- 2. Dispatch ---
    match args[1].as_str() {
        "site" if args.len() >= 4 => {
            let mode = match args.get(4) {
                Some(mode) => mode.parse::<AnalysisMode>()?,
                None => AnalysisMode::Satellite,
            };
            run_site(engine, &args[2], &args[3], mode, args.get(5).map(String::as_str))
        }
        "deforest" if args.len() >= 5 => run_deforest(engine, &args[2], &args[3], &args[4]),
        "batch" if args.len() >= 5 => {
            let mode = args[3].parse::<AnalysisMode>()?;
            run_batch(engine, &args[2], mode, &args[4..]).await
        }
        _ => {
            println!("{USAGE}");
            Ok(())
        }
    }
}

fn read(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {path}"))
}

/// Replays detections recorded in a JSON file in place of a live detector.
struct RecordedDetector {
    detections: Vec<Detection>,
}

impl GroundDetector for RecordedDetector {
    fn detect(&self, _image: &RgbImage, confidence_floor: f32) -> terra_sentinel::Result<Vec<Detection>> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= confidence_floor)
            .copied()
            .collect())
    }
}

fn run_site(
    engine: AnalysisEngine,
    input: &str,
    output: &str,
    mode: AnalysisMode,
    detections_path: Option<&str>,
) -> Result<()> {
    let engine = match detections_path {
        Some(path) => {
            if mode != AnalysisMode::Land {
                bail!("a detections file only applies to land mode");
            }
            let detections: Vec<Detection> =
                serde_json::from_slice(&read(path)?).with_context(|| format!("parsing detections in {path}"))?;
            info!(detections = detections.len(), "replaying recorded detections");
            engine.with_detector(Arc::new(RecordedDetector { detections }))
        }
        None => engine,
    };

    let service = SentinelService::new(engine, Arc::new(InMemoryReportSink::new()));
    let request = SiteRequest {
        image: read(input)?,
        mode,
        location: None,
        image_path: Some(input.to_string()),
    };
    let (response, result) = service.analyze_site_detailed(&request)?;
    save_png(output, &result.heatmap_overlay)?;
    info!(output, raw_score = result.raw_score, chaos = result.chaos_index, "heatmap written");

    let mut json = serde_json::to_value(&response)?;
    // The PNG is on disk; keep stdout readable.
    json["heatmap"] = serde_json::Value::String(output.to_string());
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn run_deforest(engine: AnalysisEngine, before: &str, after: &str, output: &str) -> Result<()> {
    let service = SentinelService::new(engine, Arc::new(InMemoryReportSink::new()));
    let (response, result) = service.analyze_deforestation_detailed(&DeforestationRequest {
        before: read(before)?,
        after: read(after)?,
        location: None,
        image_path: Some(after.to_string()),
    })?;
    save_png(output, &result.loss_overlay)?;
    info!(output, "loss overlay written");

    let mut json = serde_json::to_value(&response)?;
    json["heatmap"] = serde_json::Value::String(output.to_string());
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn run_batch(engine: AnalysisEngine, output_dir: &str, mode: AnalysisMode, inputs: &[String]) -> Result<()> {
    std::fs::create_dir_all(output_dir).with_context(|| format!("creating {output_dir}"))?;
    let pipeline = ParallelPipeline::new(engine);
    info!(workers = pipeline.worker_count(), images = inputs.len(), "batch started");

    let mut pending = Vec::with_capacity(inputs.len());
    for input in inputs {
        pending.push(pipeline.analyze_site(read(input)?, mode));
    }
    let results = join_all(pending).await;

    let mut summary = Vec::with_capacity(inputs.len());
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(result) => {
                let stem = Path::new(input).file_stem().and_then(|s| s.to_str()).unwrap_or("image");
                let output = Path::new(output_dir).join(format!("{stem}_heatmap.png"));
                save_png(&output, &result.heatmap_overlay)?;
                summary.push(serde_json::json!({
                    "input": input,
                    "prediction": result.status.label().to_uppercase(),
                    "confidence": (result.final_score * 10_000.0).round() / 100.0,
                    "heatmap": output.display().to_string(),
                }));
            }
            Err(e) => summary.push(serde_json::json!({ "input": input, "error": e.to_string() })),
        }
    }
    pipeline.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
