#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::unused_async)]

//! # Subject Highlight
//!
//! Subject segmentation for captured photos: run a salient-object model on an
//! image and produce a foreground cutout, one cutout per subject and a
//! color-highlighted overlay of the original.
//!
//! ## Features
//!
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Subject Extraction**: connected regions of the foreground mask become subjects
//! - **Highlight Compositing**: red foreground tint, per-subject palette colors
//! - **Camera Frames**: NV21 decoding with rotation
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use subject_highlight::{SegmenterConfig, SubjectSegmenter, DisplayMode};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = SegmenterConfig::builder()
//!     .model_path("models/isnet-general.onnx")
//!     .build()?;
//! let mut segmenter = SubjectSegmenter::new(config)?;
//!
//! let image = image::open("photo.jpg")?;
//! let result = segmenter.process_image(&image);
//! result.image_for(DisplayMode::Highlighted).save("photo_highlighted.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Compositing only
//!
//! The compositor works on any masks, independent of a model:
//!
//! ```rust
//! use subject_highlight::{composite, ConfidenceMask};
//! use image::{Rgba, RgbaImage};
//!
//! let original = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
//! let mask = ConfidenceMask::filled(4, 4, 1.0);
//! let highlighted = composite(&original, Some(&mask), &[]);
//! assert_eq!(highlighted.get_pixel(0, 0).0, [255, 155, 155, 255]);
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod frame;
pub mod inference;
pub mod models;
pub mod processor;
pub mod session;
pub mod subjects;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

pub use backends::*;
pub use compositor::{composite, try_composite};
pub use config::{
    BackendType, ExecutionProvider, OutputFormat, PreprocessingConfig, SegmenterConfig,
    SegmenterConfigBuilder,
};
pub use error::{Result, SegmentationError};
pub use frame::{Nv21Frame, Rotation};
pub use inference::InferenceBackend;
pub use models::{ModelFile, ModelInfo};
pub use processor::{BackendFactory, DefaultBackendFactory, SubjectSegmenter};
pub use session::{CaptureOutcome, CaptureSession};
pub use subjects::{extract_subjects, foreground_cutout, SubjectExtractionOptions};
pub use types::{
    save_image, BoundingBox, ConfidenceMask, DisplayMode, ModelOutput, ProcessingTimings,
    ResultSummary, SegmentationResult, Subject,
};
pub use utils::{
    ExecutionProviderManager, ImagePreprocessor, LetterboxTransform, PreprocessingOptions,
    ProviderInfo,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Segment an encoded image (PNG, JPEG, WebP, BMP, TIFF) and highlight its subjects
///
/// The model is loaded for this call; keep a [`SubjectSegmenter`] around to
/// process several images.
///
/// # Errors
/// - Image decoding failures
/// - Invalid configuration or model loading failures
pub async fn highlight_subjects_from_bytes(
    image_bytes: &[u8],
    config: &SegmenterConfig,
) -> Result<SegmentationResult> {
    let image = image::load_from_memory(image_bytes).map_err(|e| {
        SegmentationError::processing(format!("Failed to decode image from bytes: {e}"))
    })?;

    let mut segmenter = SubjectSegmenter::new(config.clone())?;
    segmenter.initialize()?;
    Ok(segmenter.process_image(&image))
}

/// Read an encoded image from an async stream, then highlight its subjects
///
/// # Errors
/// - Stream reading failures
/// - See [`highlight_subjects_from_bytes`]
pub async fn highlight_subjects_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    config: &SegmenterConfig,
) -> Result<SegmentationResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| SegmentationError::processing(format!("Failed to read from stream: {e}")))?;

    highlight_subjects_from_bytes(&buffer, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_undecodable_bytes_rejected() {
        let config = SegmenterConfig::default();
        let result = highlight_subjects_from_bytes(b"definitely not an image", &config).await;
        assert!(matches!(result, Err(SegmentationError::Processing(_))));
    }

    #[tokio::test]
    async fn test_reader_without_model_fails() {
        let mut png = Vec::new();
        image::RgbaImage::new(4, 4)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let config = SegmenterConfig::default();
        let result = highlight_subjects_from_reader(std::io::Cursor::new(png), &config).await;
        assert!(result.is_err());
    }
}
