//! Core data types for subject segmentation results

use crate::{
    config::OutputFormat,
    error::{Result, SegmentationError},
};
use chrono::{DateTime, Utc};
use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-pixel confidence grid with values in `[0, 1]`, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceMask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl ConfidenceMask {
    /// Create a mask from row-major values
    ///
    /// # Errors
    /// - `values.len()` differs from `width * height`
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| SegmentationError::invalid_input("Mask dimensions overflow"))?;
        if values.len() != expected {
            return Err(SegmentationError::invalid_input(format!(
                "Mask {}x{} expects {} values, got {}",
                width,
                height,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Create a mask with every value set to `value`
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw row-major values
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Confidence at `(x, y)`, `None` outside the mask extent
    #[must_use]
    pub fn value_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Convert to an 8-bit grayscale image (0.0 -> 0, 1.0 -> 255)
    #[must_use]
    pub fn to_luma_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let value = self.value_at(x, y).unwrap_or(0.0);
            Luma([(value.clamp(0.0, 1.0) * 255.0).round() as u8])
        })
    }

    /// Number of pixels whose confidence exceeds `threshold`
    #[must_use]
    pub fn count_above(&self, threshold: f32) -> usize {
        self.values.iter().filter(|&&v| v > threshold).count()
    }
}

/// Axis-aligned region of the original image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
}

/// One detected subject
///
/// The confidence mask, when present, covers `width x height` pixels starting at
/// `(start_x, start_y)` in the original image.
#[derive(Debug, Clone)]
pub struct Subject {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence_mask: Option<ConfidenceMask>,
    pub bitmap: Option<RgbaImage>,
}

impl Subject {
    /// Create a subject with no mask or bitmap
    #[must_use]
    pub fn new(start_x: u32, start_y: u32, width: u32, height: u32) -> Self {
        Self {
            start_x,
            start_y,
            width,
            height,
            confidence_mask: None,
            bitmap: None,
        }
    }

    #[must_use]
    pub fn with_confidence_mask(mut self, mask: ConfidenceMask) -> Self {
        self.confidence_mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_bitmap(mut self, bitmap: RgbaImage) -> Self {
        self.bitmap = Some(bitmap);
        self
    }

    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            start_x: self.start_x,
            start_y: self.start_y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Normalized output of the segmentation adapter
#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
    pub foreground_confidence_mask: Option<ConfidenceMask>,
    pub foreground_bitmap: Option<RgbaImage>,
    pub subjects: Vec<Subject>,
}

/// Timing breakdown for one segmentation call, in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading (first call only)
    pub model_load_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    /// Mask mapping and subject extraction
    pub postprocessing_ms: u64,
    pub compositing_ms: u64,
    pub total_ms: u64,
}

/// Which image of a result is shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Original,
    Highlighted,
    Foreground,
    Subjects,
}

/// Aggregated result of one capture
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    pub original_image: RgbaImage,
    pub foreground_bitmap: Option<RgbaImage>,
    /// Full-resolution foreground confidence, when the mask output was enabled
    pub foreground_mask: Option<ConfidenceMask>,
    pub subject_bitmaps: Vec<RgbaImage>,
    pub highlighted_image: RgbaImage,
    /// Bounding boxes of all subjects, in enumeration order
    pub subject_boxes: Vec<BoundingBox>,
    pub timings: ProcessingTimings,
    pub captured_at: DateTime<Utc>,
}

impl SegmentationResult {
    /// Result for a failed segmentation: the original stands in for the highlight
    #[must_use]
    pub fn unsegmented(original: RgbaImage) -> Self {
        Self {
            highlighted_image: original.clone(),
            original_image: original,
            foreground_bitmap: None,
            foreground_mask: None,
            subject_bitmaps: Vec::new(),
            subject_boxes: Vec::new(),
            timings: ProcessingTimings::default(),
            captured_at: Utc::now(),
        }
    }

    /// Image to show for the given display mode
    ///
    /// `Foreground` falls back to the original when no cutout was produced.
    /// `Subjects` shows the original; the cutouts are listed separately.
    #[must_use]
    pub fn image_for(&self, mode: DisplayMode) -> &RgbaImage {
        match mode {
            DisplayMode::Original | DisplayMode::Subjects => &self.original_image,
            DisplayMode::Highlighted => &self.highlighted_image,
            DisplayMode::Foreground => self
                .foreground_bitmap
                .as_ref()
                .unwrap_or(&self.original_image),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.original_image.dimensions()
    }

    #[must_use]
    pub fn summary(&self) -> ResultSummary {
        let (width, height) = self.dimensions();
        ResultSummary {
            width,
            height,
            subject_count: self.subject_bitmaps.len().max(self.subject_boxes.len()),
            foreground_detected: self.foreground_bitmap.is_some(),
            subject_boxes: self.subject_boxes.clone(),
            timings: self.timings.clone(),
            captured_at: self.captured_at,
        }
    }
}

/// Serializable digest of a `SegmentationResult`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub width: u32,
    pub height: u32,
    pub subject_count: usize,
    pub foreground_detected: bool,
    pub subject_boxes: Vec<BoundingBox>,
    pub timings: ProcessingTimings,
    pub captured_at: DateTime<Utc>,
}

/// Save an RGBA image in the requested format
///
/// # Errors
/// - File creation or encoding failures
pub fn save_image<P: AsRef<Path>>(
    image: &RgbaImage,
    path: P,
    format: OutputFormat,
    quality: u8,
) -> Result<()> {
    match format {
        OutputFormat::Png => {
            image.save_with_format(path, image::ImageFormat::Png)?;
        },
        OutputFormat::Jpeg => {
            let rgb_image = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let file = std::io::BufWriter::new(std::fs::File::create(path)?);
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, quality);
            encoder.encode_image(&rgb_image)?;
        },
        OutputFormat::WebP => {
            image.save_with_format(path, image::ImageFormat::WebP)?;
        },
    }
    Ok(())
}
