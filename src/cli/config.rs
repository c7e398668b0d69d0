//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputFormat};
use crate::{
    config::{OutputFormat, SegmenterConfig},
    frame::Rotation,
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a `SegmenterConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `SegmenterConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<SegmenterConfig> {
        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let mut builder = SegmenterConfig::builder()
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .input_size(cli.input_size)
            .max_subjects(cli.max_subjects)
            .min_subject_area(cli.min_subject_area)
            .num_threads(cli.threads);

        if let Some(model) = &cli.model {
            builder = builder.model_path(model);
        }

        builder.build().context("Invalid configuration")
    }

    /// Reject argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.model.is_none() {
            anyhow::bail!("No model specified. Use --model <FILE.onnx>");
        }
        if !(1..=100).contains(&cli.jpeg_quality) {
            anyhow::bail!(
                "JPEG quality must be between 1 and 100, got {}",
                cli.jpeg_quality
            );
        }
        if cli.outputs.is_empty() {
            anyhow::bail!("At least one output kind is required (--outputs)");
        }
        Rotation::from_degrees(cli.rotation).context("Invalid --rotation")?;
        if let Some(size) = &cli.nv21 {
            Self::parse_frame_size(size)?;
        } else if cli.rotation != 0 {
            anyhow::bail!("--rotation only applies to NV21 frames (--nv21 WxH)");
        }
        Ok(())
    }

    /// Parse a `WIDTHxHEIGHT` frame size
    pub(crate) fn parse_frame_size(size: &str) -> Result<(u32, u32)> {
        let (width, height) = size
            .split_once(['x', 'X'])
            .with_context(|| format!("Frame size '{size}' must look like 640x480"))?;
        let width: u32 = width
            .trim()
            .parse()
            .with_context(|| format!("Invalid frame width in '{size}'"))?;
        let height: u32 = height
            .trim()
            .parse()
            .with_context(|| format!("Invalid frame height in '{size}'"))?;
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            anyhow::bail!("Frame size '{size}' must have even, non-zero dimensions");
        }
        Ok((width, height))
    }

    pub(crate) fn output_format(format: CliOutputFormat) -> OutputFormat {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendType, ExecutionProvider};
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("subject-highlight").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_from_cli_maps_arguments() {
        let cli = parse(&[
            "photo.jpg",
            "--model",
            "model.onnx",
            "--execution-provider",
            "tract:cpu",
            "--input-size",
            "320",
            "--max-subjects",
            "3",
            "--threads",
            "4",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.input_size, 320);
        assert_eq!(config.max_subjects, 3);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.inter_threads, 2);
        assert!(config.model_path.is_some());
    }

    #[test]
    fn test_validate_requires_model() {
        let cli = parse(&["photo.jpg"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }

    #[test]
    fn test_validate_rotation_needs_nv21() {
        let cli = parse(&["frame.nv21", "--model", "m.onnx", "--rotation", "90"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&[
            "frame.nv21",
            "--model",
            "m.onnx",
            "--nv21",
            "640x480",
            "--rotation",
            "90",
        ]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());

        let cli = parse(&[
            "frame.nv21",
            "--model",
            "m.onnx",
            "--nv21",
            "640x480",
            "--rotation",
            "45",
        ]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }

    #[test]
    fn test_parse_frame_size() {
        assert_eq!(CliConfigBuilder::parse_frame_size("640x480").unwrap(), (640, 480));
        assert_eq!(CliConfigBuilder::parse_frame_size("64X32").unwrap(), (64, 32));
        assert!(CliConfigBuilder::parse_frame_size("640").is_err());
        assert!(CliConfigBuilder::parse_frame_size("641x480").is_err());
        assert!(CliConfigBuilder::parse_frame_size("ax480").is_err());
    }

    #[test]
    fn test_invalid_provider_rejected() {
        let cli = parse(&["photo.jpg", "--model", "m.onnx", "-e", "gpu:magic"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }
}
