//! Configuration types for subject segmentation

use crate::error::{Result, SegmentationError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = SegmentationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(SegmentationError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Inference engine used to run the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Output image format for saved results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// PNG with alpha channel
    #[default]
    Png,
    /// JPEG (alpha dropped)
    Jpeg,
    /// WebP with alpha channel
    WebP,
}

impl OutputFormat {
    /// File extension used for this format
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }
}

/// Model input preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square model input edge length in pixels
    pub target_size: u32,
    /// Per-channel mean subtracted after scaling to 0-1
    pub normalization_mean: [f32; 3],
    /// Per-channel divisor applied after mean subtraction
    pub normalization_std: [f32; 3],
}

/// Configuration for subject segmentation
///
/// The `enable_*` flags select which parts of the model output end up in the
/// result. The highlight overlay only uses confidence masks, so disabling both
/// mask flags yields a highlighted image identical to the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct SegmenterConfig {
    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Path to the ONNX segmentation model
    pub model_path: Option<PathBuf>,

    /// Square model input size in pixels
    pub input_size: u32,

    /// Per-channel normalization mean
    pub normalization_mean: [f32; 3],

    /// Per-channel normalization standard deviation
    pub normalization_std: [f32; 3],

    /// Produce a foreground cutout bitmap
    pub enable_foreground_bitmap: bool,

    /// Keep the foreground confidence mask (drives the red highlight)
    pub enable_foreground_confidence_mask: bool,

    /// Produce per-subject cutout bitmaps
    pub enable_subject_bitmaps: bool,

    /// Keep per-subject confidence masks (drive the palette highlights)
    pub enable_subject_confidence_masks: bool,

    /// Maximum number of subjects reported
    pub max_subjects: usize,

    /// Connected regions smaller than this many pixels are not subjects
    pub min_subject_area: u32,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            model_path: None,
            input_size: 1024,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
            enable_foreground_bitmap: true,
            enable_foreground_confidence_mask: true,
            enable_subject_bitmaps: true,
            enable_subject_confidence_masks: true,
            max_subjects: 10,
            min_subject_area: 64,
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

impl SegmenterConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use subject_highlight::SegmenterConfig;
    ///
    /// let config = SegmenterConfig::builder()
    ///     .input_size(320)
    ///     .max_subjects(5)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.input_size, 320);
    /// ```
    #[must_use]
    pub fn builder() -> SegmenterConfigBuilder {
        SegmenterConfigBuilder::default()
    }

    /// Preprocessing parameters derived from this configuration
    #[must_use]
    pub fn preprocessing(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size: self.input_size,
            normalization_mean: self.normalization_mean,
            normalization_std: self.normalization_std,
        }
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Input size outside 32-4096
    /// - Non-positive normalization std entry
    /// - `max_subjects` of zero
    pub fn validate(&self) -> Result<()> {
        if !(32..=4096).contains(&self.input_size) {
            return Err(SegmentationError::config_value_error(
                "input size",
                self.input_size,
                "32-4096",
                Some(1024),
            ));
        }

        if self.normalization_std.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(SegmentationError::invalid_config(format!(
                "Normalization std must be positive, got {:?}",
                self.normalization_std
            )));
        }

        if self.max_subjects == 0 {
            return Err(SegmentationError::config_value_error(
                "max subjects",
                self.max_subjects,
                ">= 1",
                Some(10),
            ));
        }

        Ok(())
    }
}

/// Builder for `SegmenterConfig`
#[derive(Debug, Default)]
pub struct SegmenterConfigBuilder {
    config: SegmenterConfig,
}

impl SegmenterConfigBuilder {
    /// Set inference backend
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set model path
    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = Some(path.into());
        self
    }

    /// Set model input size
    #[must_use]
    pub fn input_size(mut self, size: u32) -> Self {
        self.config.input_size = size;
        self
    }

    /// Set normalization mean and std
    #[must_use]
    pub fn normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.config.normalization_mean = mean;
        self.config.normalization_std = std;
        self
    }

    /// Enable or disable the foreground cutout
    #[must_use]
    pub fn enable_foreground_bitmap(mut self, enable: bool) -> Self {
        self.config.enable_foreground_bitmap = enable;
        self
    }

    /// Enable or disable the foreground confidence mask
    #[must_use]
    pub fn enable_foreground_confidence_mask(mut self, enable: bool) -> Self {
        self.config.enable_foreground_confidence_mask = enable;
        self
    }

    /// Enable or disable subject cutouts
    #[must_use]
    pub fn enable_subject_bitmaps(mut self, enable: bool) -> Self {
        self.config.enable_subject_bitmaps = enable;
        self
    }

    /// Enable or disable subject confidence masks
    #[must_use]
    pub fn enable_subject_confidence_masks(mut self, enable: bool) -> Self {
        self.config.enable_subject_confidence_masks = enable;
        self
    }

    /// Set maximum number of subjects
    #[must_use]
    pub fn max_subjects(mut self, max: usize) -> Self {
        self.config.max_subjects = max;
        self
    }

    /// Set minimum subject area in pixels
    #[must_use]
    pub fn min_subject_area(mut self, area: u32) -> Self {
        self.config.min_subject_area = area;
        self
    }

    /// Set both intra and inter threads (inter = threads/2, minimum 1; 0 = auto)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// See [`SegmenterConfig::validate`].
    pub fn build(self) -> Result<SegmenterConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
