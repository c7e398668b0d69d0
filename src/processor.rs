//! Subject segmentation processor
//!
//! `SubjectSegmenter` drives one capture through the pipeline: letterbox
//! preprocessing, backend inference, mapping the output tensor back to a
//! full-resolution confidence mask, subject extraction and highlight
//! compositing.

use crate::{
    compositor,
    config::{BackendType, SegmenterConfig},
    error::{Result, SegmentationError},
    frame::Nv21Frame,
    inference::InferenceBackend,
    subjects::{extract_subjects, foreground_cutout, SubjectExtractionOptions},
    types::{ConfidenceMask, ModelOutput, ProcessingTimings, SegmentationResult},
    utils::{ImagePreprocessor, LetterboxTransform},
};
use chrono::Utc;
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use ndarray::Array4;
use tracing::{debug, info, instrument, span, warn, Level};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given type
    ///
    /// # Errors
    /// - Backend type not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// Backend types this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Creates the backends enabled through cargo features
pub struct DefaultBackendFactory;

#[cfg(feature = "onnx")]
fn onnx_backend() -> Result<Box<dyn InferenceBackend>> {
    Ok(Box::new(crate::backends::OnnxBackend::new()))
}

#[cfg(not(feature = "onnx"))]
fn onnx_backend() -> Result<Box<dyn InferenceBackend>> {
    Err(SegmentationError::invalid_config(
        "ONNX backend not compiled in. Rebuild with the `onnx` feature",
    ))
}

#[cfg(feature = "tract")]
fn tract_backend() -> Result<Box<dyn InferenceBackend>> {
    Ok(Box::new(crate::backends::TractBackend::new()))
}

#[cfg(not(feature = "tract"))]
fn tract_backend() -> Result<Box<dyn InferenceBackend>> {
    Err(SegmentationError::invalid_config(
        "Tract backend not compiled in. Rebuild with the `tract` feature",
    ))
}

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            BackendType::Onnx => onnx_backend(),
            BackendType::Tract => tract_backend(),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        backends
    }
}

/// Runs the segmentation model and assembles highlighted results
pub struct SubjectSegmenter {
    config: SegmenterConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
    initialized: bool,
    /// Model load time not yet reported in a result
    pending_model_load_ms: u64,
}

impl std::fmt::Debug for SubjectSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubjectSegmenter")
            .field("config", &self.config)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl SubjectSegmenter {
    /// Create a segmenter using the feature-enabled backends
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: SegmenterConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a segmenter with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: SegmenterConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
            backend: None,
            initialized: false,
            pending_model_load_ms: 0,
        })
    }

    /// Create a segmenter around an existing backend instance
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_backend(
        config: SegmenterConfig,
        backend: Box<dyn InferenceBackend>,
    ) -> Result<Self> {
        let mut segmenter = Self::new(config)?;
        segmenter.backend = Some(backend);
        Ok(segmenter)
    }

    /// Create and initialize the backend; a no-op once initialized
    ///
    /// # Errors
    /// - Backend type unavailable
    /// - Model loading failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        info!(
            backend = %self.config.backend_type,
            provider = %self.config.execution_provider,
            "Initializing subject segmenter"
        );

        let mut backend = match self.backend.take() {
            Some(backend) => backend,
            None => self
                .backend_factory
                .create_backend(self.config.backend_type)?,
        };

        match backend.initialize(&self.config) {
            Ok(load_time) => {
                if let Some(load_time) = load_time {
                    self.pending_model_load_ms =
                        u64::try_from(load_time.as_millis()).unwrap_or(u64::MAX);
                }
                self.backend = Some(backend);
            },
            Err(e) => {
                // Keep the backend so a later call can retry
                self.backend = Some(backend);
                return Err(e);
            },
        }

        self.initialized = true;
        debug!("Subject segmenter initialized");
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Backend types the factory can create
    #[must_use]
    pub fn available_backends(&self) -> Vec<BackendType> {
        self.backend_factory.available_backends()
    }

    /// Run the model and normalize its output
    ///
    /// # Errors
    /// - Initialization or inference failures
    /// - Output tensor of unexpected shape
    pub fn segment(&mut self, image: &DynamicImage) -> Result<ModelOutput> {
        let original = image.to_rgba8();
        let mut timings = ProcessingTimings::default();
        self.segment_with_timings(image, &original, &mut timings)
    }

    /// Segment an image and composite the highlight
    ///
    /// Never fails: any segmentation error is logged and the result carries the
    /// original as both original and highlighted image.
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> SegmentationResult {
        let total_start = Instant::now();
        let original = image.to_rgba8();
        let mut timings = ProcessingTimings::default();

        let output = match self.segment_with_timings(image, &original, &mut timings) {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Segmentation failed, showing the original image");
                return SegmentationResult::unsegmented(original);
            },
        };

        let composite_start = Instant::now();
        let highlighted = {
            let _span = span!(Level::DEBUG, "compositing").entered();
            compositor::composite(
                &original,
                output.foreground_confidence_mask.as_ref(),
                &output.subjects,
            )
        };
        timings.compositing_ms = elapsed_ms(composite_start);
        timings.total_ms = elapsed_ms(total_start);

        info!(
            subjects = output.subjects.len(),
            foreground = output.foreground_bitmap.is_some(),
            total_ms = timings.total_ms,
            "Segmentation complete"
        );

        Self::assemble_result(original, highlighted, output, timings)
    }

    /// Decode a camera frame, then segment it
    ///
    /// Unlike [`SubjectSegmenter::process_image`], segmentation failures are
    /// returned to the caller.
    ///
    /// # Errors
    /// - Initialization or inference failures
    #[instrument(skip(self, frame), fields(rotation = frame.rotation().degrees()))]
    pub fn process_frame(&mut self, frame: &Nv21Frame) -> Result<SegmentationResult> {
        let total_start = Instant::now();
        let original = frame.to_rgba_image();
        let image = DynamicImage::ImageRgba8(original.clone());
        let mut timings = ProcessingTimings::default();

        let output = self.segment_with_timings(&image, &original, &mut timings)?;

        let composite_start = Instant::now();
        let highlighted = compositor::composite(
            &original,
            output.foreground_confidence_mask.as_ref(),
            &output.subjects,
        );
        timings.compositing_ms = elapsed_ms(composite_start);
        timings.total_ms = elapsed_ms(total_start);

        Ok(Self::assemble_result(original, highlighted, output, timings))
    }

    /// Decode encoded image bytes (PNG, JPEG, WebP), then segment
    ///
    /// # Errors
    /// - Image decoding failures
    pub fn process_bytes(&mut self, image_bytes: &[u8]) -> Result<SegmentationResult> {
        let image = image::load_from_memory(image_bytes).map_err(|e| {
            SegmentationError::processing(format!("Failed to decode image from bytes: {e}"))
        })?;
        Ok(self.process_image(&image))
    }

    fn segment_with_timings(
        &mut self,
        image: &DynamicImage,
        original: &RgbaImage,
        timings: &mut ProcessingTimings,
    ) -> Result<ModelOutput> {
        self.initialize()?;
        timings.model_load_ms = std::mem::take(&mut self.pending_model_load_ms);

        let preprocess_start = Instant::now();
        let (input_tensor, transform) = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            ImagePreprocessor::preprocess_for_inference(image, &self.config.preprocessing())?
        };
        timings.preprocessing_ms = elapsed_ms(preprocess_start);

        let inference_start = Instant::now();
        let output_tensor = {
            let _span = span!(Level::INFO, "inference").entered();
            let backend = self
                .backend
                .as_mut()
                .ok_or_else(|| SegmentationError::internal("Backend not initialized"))?;
            backend.infer(&input_tensor)?
        };
        timings.inference_ms = elapsed_ms(inference_start);

        let postprocess_start = Instant::now();
        let output = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            let foreground = Self::tensor_to_mask(&output_tensor, &transform, original.dimensions())?;
            self.build_model_output(original, foreground)?
        };
        timings.postprocessing_ms = elapsed_ms(postprocess_start);

        Ok(output)
    }

    /// Map a `1x1xHxW` output tensor back onto the original image
    ///
    /// # Errors
    /// - Tensor with more than one batch or channel, or zero extent
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        transform: &LetterboxTransform,
        original_dimensions: (u32, u32),
    ) -> Result<ConfidenceMask> {
        let (batch, channels, mask_height, mask_width) = tensor.dim();
        if batch != 1 || channels != 1 || mask_height == 0 || mask_width == 0 {
            return Err(SegmentationError::processing(format!(
                "Invalid output tensor shape {:?}, expected [1, 1, H, W]",
                tensor.shape()
            )));
        }

        let (width, height) = original_dimensions;
        let target = transform.target_size as usize;
        let mut values = Vec::with_capacity(width as usize * height as usize);

        for y in 0..height {
            for x in 0..width {
                let (model_x, model_y) = transform.to_model(x, y);
                // Output may be at a different resolution than the input
                let tensor_x = (model_x as usize * mask_width / target).min(mask_width - 1);
                let tensor_y = (model_y as usize * mask_height / target).min(mask_height - 1);
                let value = tensor
                    .get([0, 0, tensor_y, tensor_x])
                    .copied()
                    .unwrap_or(0.0);
                values.push(value.clamp(0.0, 1.0));
            }
        }

        ConfidenceMask::new(width, height, values)
    }

    fn build_model_output(
        &self,
        original: &RgbaImage,
        foreground: ConfidenceMask,
    ) -> Result<ModelOutput> {
        let config = &self.config;

        let foreground_bitmap = if config.enable_foreground_bitmap {
            Some(foreground_cutout(original, &foreground)?)
        } else {
            None
        };

        let subjects = if config.enable_subject_bitmaps || config.enable_subject_confidence_masks {
            let options = SubjectExtractionOptions {
                max_subjects: config.max_subjects,
                min_area: config.min_subject_area,
                include_masks: config.enable_subject_confidence_masks,
                include_bitmaps: config.enable_subject_bitmaps,
            };
            extract_subjects(original, &foreground, &options)?
        } else {
            Vec::new()
        };

        debug!(
            foreground_pixels = foreground.count_above(compositor::CONFIDENCE_THRESHOLD),
            subjects = subjects.len(),
            "Model output normalized"
        );

        Ok(ModelOutput {
            foreground_confidence_mask: config
                .enable_foreground_confidence_mask
                .then_some(foreground),
            foreground_bitmap,
            subjects,
        })
    }

    fn assemble_result(
        original: RgbaImage,
        highlighted: RgbaImage,
        output: ModelOutput,
        timings: ProcessingTimings,
    ) -> SegmentationResult {
        let subject_boxes = output.subjects.iter().map(|s| s.bounding_box()).collect();
        let subject_bitmaps = output
            .subjects
            .into_iter()
            .filter_map(|s| s.bitmap)
            .collect();

        SegmentationResult {
            original_image: original,
            foreground_bitmap: output.foreground_bitmap,
            foreground_mask: output.foreground_confidence_mask,
            subject_bitmaps,
            highlighted_image: highlighted,
            subject_boxes,
            timings,
            captured_at: Utc::now(),
        }
    }
}
