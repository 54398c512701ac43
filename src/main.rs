use anyhow::Context;
use clap::Parser;
use image::ImageReader;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sheetcount::{ImageArray, LineSegment, SheetCounter, SheetCounterConfig};

#[derive(Parser)]
#[command(name = "sheetcount")]
#[command(about = "Estimate the number of sheets in a stack from a photograph")]
struct Cli {
    /// Path to input image file (JPEG or PNG)
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// TOML file overriding the default detection parameters
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save the annotated edge map to this file
    #[arg(long, value_name = "FILE")]
    annotated_out: Option<PathBuf>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct SegmentReport {
    #[serde(flatten)]
    segment: LineSegment,
    angle_degrees: f64,
}

#[derive(Serialize)]
struct Report {
    count: usize,
    confidence: f32,
    width: usize,
    height: usize,
    segments: Vec<SegmentReport>,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "sheetcount=debug" } else { "sheetcount=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = SheetCounterConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    let img = ImageReader::open(&args.image_path)
        .with_context(|| format!("Failed to open {}", args.image_path.display()))?
        .with_guessed_format()?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    tracing::info!(width = img.width(), height = img.height(), "image loaded");

    let mut counter = SheetCounter::new(config)?;
    if let Some(debug_dir) = args.debug_out {
        counter = counter.with_debug(debug_dir)?;
    }

    let input = ImageArray::from_dynamic(&img);
    let estimate = counter.estimate(&input)?;

    if let Some(path) = &args.annotated_out {
        estimate
            .annotated()
            .save(path)
            .with_context(|| format!("Failed to save annotated image to {}", path.display()))?;
    }

    if args.json {
        let report = Report {
            count: estimate.count(),
            confidence: estimate.confidence(),
            width: input.width(),
            height: input.height(),
            segments: estimate
                .segments()
                .iter()
                .map(|s| SegmentReport {
                    segment: *s,
                    angle_degrees: s.angle_degrees(),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Estimated number of sheets: {}", estimate.count());
        println!("Confidence: {:.2}%", estimate.confidence() * 100.0);

        if args.verbose && !estimate.segments().is_empty() {
            println!("\nCounted segments:");
            for (i, s) in estimate.segments().iter().enumerate() {
                println!(
                    "  {}: ({}, {}) -> ({}, {})  angle {:.1}°",
                    i + 1,
                    s.x1,
                    s.y1,
                    s.x2,
                    s.y2,
                    s.angle_degrees()
                );
            }
        }
        if let Some(path) = &args.annotated_out {
            println!("Annotated edge map saved to {}", path.display());
        }
    }

    Ok(())
}
