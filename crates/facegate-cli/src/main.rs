mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facegate_core::{
    Annotator, EnrollmentStatus, EnrollmentWorkflow, FaceExtractor, GalleryStore, OnnxDetector,
    OnnxEmbedder, OnnxExtractor, RecognitionSession,
};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "facegate", about = "Face enrollment and recognition")]
struct Cli {
    /// Enrollment directory (overrides FACEGATE_GALLERY_DIR)
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,
    /// ONNX model directory (overrides FACEGATE_MODEL_DIR)
    #[arg(long, global = true)]
    models: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify every face in an image against the gallery
    Identify {
        image: PathBuf,
        /// Where to write the annotated copy (default: <image>_annotated.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Enroll the single face in an image
    Enroll {
        image: PathBuf,
        /// Name to enroll the face under
        #[arg(short, long)]
        label: String,
    },
    /// List enrolled identities in match order
    List {
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct ListEntry<'a> {
    label: &'a str,
    source: &'a Path,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.gallery {
        config.gallery_dir = dir;
    }
    if let Some(dir) = cli.models {
        config.model_dir = dir;
    }
    tracing::debug!(?config, "configuration loaded");

    let mut extractor = load_extractor(&config)?;
    let store = GalleryStore::open(&config.gallery_dir, &mut extractor)
        .with_context(|| format!("loading gallery {}", config.gallery_dir.display()))?;

    match cli.command {
        Commands::Identify { image, output, json } => {
            let frame = read_frame(&image)?;
            let annotator = match &config.font_path {
                Some(path) => Annotator::with_font_file(path)?,
                None => Annotator::default(),
            };
            if !annotator.has_font() {
                tracing::info!(
                    "no caption font configured (FACEGATE_FONT_PATH); captions drawn as solid tabs"
                );
            }
            let session = RecognitionSession::new(annotator);
            let gallery = store.snapshot();
            let annotated = session
                .annotate(&mut extractor, &frame, &gallery)
                .context("recognition failed")?;

            let output = output.unwrap_or_else(|| default_output_path(&image));
            annotated
                .image
                .save(&output)
                .with_context(|| format!("writing {}", output.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&annotated.faces)?);
            } else if annotated.faces.is_empty() {
                println!("no faces found");
            } else {
                for face in &annotated.faces {
                    let verdict = if face.accepted { "match" } else { "no match" };
                    println!("{:<20} {:.2}  {verdict}", face.label, face.score);
                }
            }
            tracing::info!(output = %output.display(), "annotated image written");
        }
        Commands::Enroll { image, label } => {
            let frame = read_frame(&image)?;
            let mut workflow = EnrollmentWorkflow::new();

            let status = workflow.capture(&frame, &mut extractor)?;
            if !status.is_success() {
                eprintln!("{}", status.message());
                return Ok(ExitCode::FAILURE);
            }

            let status = workflow.save(&label, &store, &mut extractor)?;
            if !status.is_success() {
                eprintln!("{}", status.message());
                return Ok(ExitCode::FAILURE);
            }
            println!("{}", status.message());
            if let EnrollmentStatus::Saved { path, gallery_size, .. } = &status {
                println!("  {} ({gallery_size} enrolled)", path.display());
            }
            workflow.acknowledge();
        }
        Commands::List { json } => {
            let gallery = store.snapshot();
            if json {
                let entries: Vec<_> = gallery
                    .records()
                    .iter()
                    .map(|r| ListEntry {
                        label: &r.label,
                        source: &r.source,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if gallery.is_empty() {
                println!("No faces enrolled");
            } else {
                for record in gallery.records() {
                    println!("{:<20} {}", record.label, record.source.display());
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_extractor(config: &Config) -> Result<OnnxExtractor> {
    let detector = OnnxDetector::load(&config.scrfd_model_path()).context("loading detector")?;
    let embedder = OnnxEmbedder::load(&config.arcface_model_path()).context("loading embedder")?;
    Ok(FaceExtractor::new(detector, embedder))
}

fn read_frame(path: &Path) -> Result<RgbImage> {
    let frame = image::open(path)
        .with_context(|| format!("reading {}", path.display()))?
        .to_rgb8();
    Ok(frame)
}

/// `photo.jpg` becomes `photo_annotated.png` in the same directory.
fn default_output_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    image.with_file_name(format!("{stem}_annotated.png"))
}
