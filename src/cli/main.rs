//! Subject highlight CLI
//!
//! Captures are image files (or raw NV21 camera frames); results are written
//! next to the inputs or into `--output-dir`.

use super::config::CliConfigBuilder;
use crate::{
    config::{OutputFormat, SegmenterConfig},
    frame::{Nv21Frame, Rotation},
    processor::SubjectSegmenter,
    session::{CaptureOutcome, CaptureSession},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{save_image, SegmentationResult},
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];
const FRAME_EXTENSIONS: [&str; 3] = ["nv21", "yuv", "raw"];

/// Highlight the subjects of photos with an on-device segmentation model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "subject-highlight")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Vec<PathBuf>,

    /// Directory for results [default: next to each input]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Image format for written results (masks are always PNG)
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Png)]
    pub format: CliOutputFormat,

    /// Which results to write, comma separated
    #[arg(long, value_enum, value_delimiter = ',', default_value = "highlighted")]
    pub outputs: Vec<OutputKind>,

    /// Segmentation model (ONNX file)
    #[arg(short, long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Square model input size in pixels
    #[arg(long, default_value_t = 1024)]
    pub input_size: u32,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 90)]
    pub jpeg_quality: u8,

    /// Maximum number of subjects per image
    #[arg(long, default_value_t = 10)]
    pub max_subjects: usize,

    /// Drop subjects smaller than this many pixels
    #[arg(long, default_value_t = 64)]
    pub min_subject_area: u32,

    /// Treat inputs as raw NV21 camera frames of the given size (e.g., 640x480)
    #[arg(long, value_name = "WxH")]
    pub nv21: Option<String>,

    /// Clockwise rotation of NV21 frames in degrees (0, 90, 180, 270)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rotation: i32,

    /// Write a JSON summary per input
    #[arg(long)]
    pub summary: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum OutputKind {
    /// Original with subjects tinted
    Highlighted,
    /// Foreground cutout
    Foreground,
    /// One cutout per subject
    Subjects,
    /// Foreground confidence as grayscale PNG
    Mask,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

/// How results of one input are written
#[derive(Debug, Clone)]
pub(crate) struct OutputOptions {
    pub(crate) kinds: Vec<OutputKind>,
    pub(crate) format: OutputFormat,
    pub(crate) jpeg_quality: u8,
    pub(crate) summary: bool,
}

/// How inputs are turned into captures
#[derive(Debug, Clone, Copy)]
enum InputMode {
    Image,
    Nv21 {
        width: u32,
        height: u32,
        rotation: Rotation,
    },
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing subscriber")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let session_span = spans::session(
        &session_id,
        &config.backend_type.to_string(),
        &config.execution_provider.to_string(),
    );
    run(&cli, config).instrument(session_span).await
}

/// Load the model and process every input
async fn run(cli: &Cli, config: SegmenterConfig) -> Result<()> {
    let input_mode = match &cli.nv21 {
        Some(size) => {
            let (width, height) = CliConfigBuilder::parse_frame_size(size)?;
            InputMode::Nv21 {
                width,
                height,
                rotation: Rotation::from_degrees(cli.rotation)?,
            }
        },
        None => InputMode::Image,
    };

    let mut segmenter =
        SubjectSegmenter::new(config).context("Failed to create subject segmenter")?;
    // Load the model up front: per-image failures degrade silently
    segmenter.initialize().context("Failed to load segmentation model")?;
    let session = CaptureSession::new(segmenter);

    let files = collect_inputs(cli, input_mode)?;
    if files.is_empty() {
        warn!("No supported input files found");
        return Ok(());
    }

    let options = OutputOptions {
        kinds: cli.outputs.clone(),
        format: CliConfigBuilder::output_format(cli.format),
        jpeg_quality: cli.jpeg_quality,
        summary: cli.summary,
    };

    let start_time = Instant::now();
    let (processed, failed) =
        process_inputs(&session, &files, input_mode, cli.output_dir.as_deref(), &options)
            .instrument(spans::batch_processing(files.len()))
            .await?;

    info!(
        "Processed {processed} input(s) in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    if failed > 0 {
        anyhow::bail!("{failed} of {} input(s) failed", files.len());
    }
    Ok(())
}

/// Display execution provider diagnostics
fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for provider_info in ExecutionProviderManager::list_all_providers() {
        let status = if provider_info.available {
            "✅ Available"
        } else {
            "❌ Not Available"
        };
        println!(
            "  • {}: {} - {}",
            provider_info.name, status, provider_info.description
        );
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider onnx:auto    # Auto-select best ONNX provider (default)");
    println!("  --execution-provider onnx:coreml  # Use Apple CoreML (macOS)");
    println!("  --execution-provider onnx:cuda    # Use NVIDIA CUDA");
    println!("  --execution-provider tract:cpu    # Use pure Rust Tract backend");
}

fn collect_inputs(cli: &Cli, mode: InputMode) -> Result<Vec<PathBuf>> {
    let extensions: &[&str] = match mode {
        InputMode::Image => &IMAGE_EXTENSIONS,
        InputMode::Nv21 { .. } => &FRAME_EXTENSIONS,
    };

    let mut files = Vec::new();
    for path in &cli.input {
        if path.is_file() {
            // Explicit files are taken as given in frame mode
            if matches!(mode, InputMode::Nv21 { .. }) || is_supported_file(path, extensions) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_input_files(
                path,
                cli.recursive,
                cli.pattern.as_deref(),
                extensions,
            )?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    files.sort();
    Ok(files)
}

async fn process_inputs(
    session: &CaptureSession,
    files: &[PathBuf],
    mode: InputMode,
    output_dir: Option<&Path>,
    options: &OutputOptions,
) -> Result<(usize, usize)> {
    if let Some(dir) = output_dir {
        if dir.is_file() {
            anyhow::bail!(
                "Output path exists and is a file, not a directory: {}",
                dir.display()
            );
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }

    let progress = if files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut processed = 0;
    let mut failed = 0;

    for input in files {
        if let Some(pb) = &progress {
            pb.set_message(format!("Processing {}", input.display()));
        }

        match process_single_file(session, input, mode, output_dir, options)
            .instrument(spans::file_processing(input))
            .await
        {
            Ok(written) => {
                processed += 1;
                debug!("✅ Processed {} ({} file(s) written)", input.display(), written.len());
            },
            Err(e) => {
                failed += 1;
                error!("❌ Failed to process {}: {e:#}", input.display());
            },
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!("Completed! Processed: {processed}, Failed: {failed}"));
    }

    Ok((processed, failed))
}

async fn process_single_file(
    session: &CaptureSession,
    input: &Path,
    mode: InputMode,
    output_dir: Option<&Path>,
    options: &OutputOptions,
) -> Result<Vec<PathBuf>> {
    let outcome = match mode {
        InputMode::Image => {
            let image = image::open(input)
                .with_context(|| format!("Failed to load image {}", input.display()))?;
            session.capture(image).await?
        },
        InputMode::Nv21 {
            width,
            height,
            rotation,
        } => {
            let data = tokio::fs::read(input)
                .await
                .with_context(|| format!("Failed to read frame {}", input.display()))?;
            let frame = Nv21Frame::new(width, height, data, rotation)?;
            session.capture_frame(frame).await?
        },
    };

    if let CaptureOutcome::Busy = outcome {
        anyhow::bail!("Capture session busy");
    }

    let result = session
        .current_result()
        .await
        .context("Capture finished without a result")?;

    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = input
        .file_stem()
        .map_or_else(|| "capture".to_string(), |s| s.to_string_lossy().into_owned());

    write_outputs(&result, &dir, &stem, options)
}

/// Write the requested results of one capture, returning the written paths
pub(crate) fn write_outputs(
    result: &SegmentationResult,
    dir: &Path,
    stem: &str,
    options: &OutputOptions,
) -> Result<Vec<PathBuf>> {
    let extension = options.format.extension();
    let mut written = Vec::new();

    let mut save = |image: &image::RgbaImage, name: String| -> Result<()> {
        let path = dir.join(name);
        save_image(image, &path, options.format, options.jpeg_quality)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
        Ok(())
    };

    for kind in &options.kinds {
        match kind {
            OutputKind::Highlighted => {
                save(&result.highlighted_image, format!("{stem}_highlighted.{extension}"))?;
            },
            OutputKind::Foreground => match &result.foreground_bitmap {
                Some(bitmap) => save(bitmap, format!("{stem}_foreground.{extension}"))?,
                None => warn!("No foreground detected for {stem}"),
            },
            OutputKind::Subjects => {
                for (index, bitmap) in result.subject_bitmaps.iter().enumerate() {
                    save(bitmap, format!("{stem}_subject_{index}.{extension}"))?;
                }
            },
            // Masks are always PNG, written below
            OutputKind::Mask => {},
        }
    }

    if options.kinds.contains(&OutputKind::Mask) {
        match &result.foreground_mask {
            Some(mask) => {
                let path = dir.join(format!("{stem}_mask.png"));
                mask.to_luma_image()
                    .save_with_format(&path, image::ImageFormat::Png)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                written.push(path);
            },
            None => warn!("No foreground mask available for {stem}"),
        }
    }

    if options.summary {
        let path = dir.join(format!("{stem}_summary.json"));
        let json = serde_json::to_string_pretty(&result.summary())
            .context("Failed to serialize summary")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }

    Ok(written)
}

/// Find supported files in a directory
fn find_input_files(
    dir: &Path,
    recursive: bool,
    pattern: Option<&str>,
    extensions: &[&str],
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_supported_file(path, extensions) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_supported_file(&path, extensions) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

/// Check a file extension against the supported list
fn is_supported_file(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext.to_lowercase().as_str()))
}

/// Check if the file name matches the given glob pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}
