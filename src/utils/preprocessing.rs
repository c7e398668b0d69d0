//! Image preprocessing for model inference
//!
//! Images are letterboxed: resized to fit the square model input while keeping
//! the aspect ratio, centered on a padded canvas, then normalized into an NCHW
//! tensor. The returned [`LetterboxTransform`] maps model output back onto the
//! original image.

use crate::{
    config::PreprocessingConfig,
    error::{Result, SegmentationError},
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
    /// Whether to return the preprocessed image for debugging
    pub return_preprocessed_image: bool,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            // Black padding reads as background to salient-object models
            padding_color: [0, 0, 0],
            return_preprocessed_image: false,
        }
    }
}

/// Placement of the original image inside the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub target_size: u32,
}

impl LetterboxTransform {
    /// Compute the letterbox placement of `original_dimensions` in a `target_size` square
    ///
    /// # Errors
    /// - Zero-sized image or target
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(original_dimensions: (u32, u32), target_size: u32) -> Result<Self> {
        let (width, height) = original_dimensions;
        if width == 0 || height == 0 || target_size == 0 {
            return Err(SegmentationError::invalid_input(format!(
                "Cannot letterbox {width}x{height} image into {target_size}x{target_size}"
            )));
        }

        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            scale,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
            target_size,
        })
    }

    /// Model-space coordinate for an original-image coordinate
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_model(&self, x: u32, y: u32) -> (u32, u32) {
        let scaled_x = ((x as f32 * self.scale) as u32).min(self.scaled_width - 1);
        let scaled_y = ((y as f32 * self.scale) as u32).min(self.scaled_height - 1);
        (scaled_x + self.offset_x, scaled_y + self.offset_y)
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox and normalize an image into a `1x3xSxS` tensor
    ///
    /// # Errors
    /// - Zero-sized image
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<(Option<DynamicImage>, Array4<f32>, LetterboxTransform)> {
        let target_size = preprocessing_config.target_size;
        let rgb_image = image.to_rgb8();
        let transform = LetterboxTransform::new(rgb_image.dimensions(), target_size)?;

        let resized = if rgb_image.dimensions() == (transform.scaled_width, transform.scaled_height)
        {
            rgb_image
        } else {
            image::imageops::resize(
                &rgb_image,
                transform.scaled_width,
                transform.scaled_height,
                image::imageops::FilterType::Triangle,
            )
        };

        let padding = options.padding_color;
        let mut canvas = ImageBuffer::from_pixel(
            target_size,
            target_size,
            image::Rgb([padding[0], padding[1], padding[2]]),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(transform.offset_x),
            i64::from(transform.offset_y),
        );

        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);

        let preprocessed_image = if options.return_preprocessed_image {
            Some(DynamicImage::ImageRgb8(canvas))
        } else {
            None
        };

        Ok((preprocessed_image, tensor, transform))
    }

    /// Convert canvas to normalized NCHW tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let normalized = (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
                if let Some(elem) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *elem = normalized;
                }
            }
        }

        tensor
    }

    /// Tensor-only preprocessing with default options
    ///
    /// # Errors
    /// - Zero-sized image
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, LetterboxTransform)> {
        let (_, tensor, transform) =
            Self::preprocess_image(image, preprocessing_config, &PreprocessingOptions::default())?;
        Ok((tensor, transform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn test_config(target_size: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            target_size,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn test_letterbox_wide_image() {
        let transform = LetterboxTransform::new((200, 100), 64).unwrap();
        assert_eq!((transform.scaled_width, transform.scaled_height), (64, 32));
        assert_eq!((transform.offset_x, transform.offset_y), (0, 16));
        assert_eq!(transform.to_model(0, 0), (0, 16));
        assert_eq!(transform.to_model(199, 99), (63, 47));
    }

    #[test]
    fn test_letterbox_rejects_empty() {
        assert!(LetterboxTransform::new((0, 10), 64).is_err());
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(64, 64, Rgb([255, 0, 255])));
        let (tensor, transform) =
            ImagePreprocessor::preprocess_for_inference(&image, &test_config(64)).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert!((transform.scale - 1.0).abs() < f32::EPSILON);
        assert!((tensor[[0, 0, 10, 10]] - 0.5).abs() < 1e-6);
        assert!((tensor[[0, 1, 10, 10]] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_padding_returned() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(100, 50, Rgb([255, 255, 255])));
        let options = PreprocessingOptions {
            padding_color: [0, 255, 0],
            return_preprocessed_image: true,
        };
        let (preprocessed, tensor, _) =
            ImagePreprocessor::preprocess_image(&image, &test_config(64), &options).unwrap();

        let canvas = preprocessed.unwrap().to_rgb8();
        assert_eq!(canvas.dimensions(), (64, 64));
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 255, 0]);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
    }
}
