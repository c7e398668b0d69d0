//! Subject extraction and cutouts from a foreground confidence mask
//!
//! A foreground model gives one confidence mask for the whole image. Subjects
//! are the 8-connected regions of that mask above the confidence threshold,
//! enumerated in the raster order in which each region is first met.

use crate::{
    compositor::CONFIDENCE_THRESHOLD,
    error::{Result, SegmentationError},
    types::{ConfidenceMask, Subject},
};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::BTreeMap;
use tracing::debug;

/// What to extract for each subject
#[derive(Debug, Clone)]
pub struct SubjectExtractionOptions {
    /// Maximum number of subjects kept (in enumeration order)
    pub max_subjects: usize,
    /// Regions with fewer pixels than this are dropped
    pub min_area: u32,
    /// Attach a per-subject confidence mask
    pub include_masks: bool,
    /// Attach a per-subject RGBA cutout
    pub include_bitmaps: bool,
}

impl Default for SubjectExtractionOptions {
    fn default() -> Self {
        Self {
            max_subjects: 10,
            min_area: 64,
            include_masks: true,
            include_bitmaps: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RegionStats {
    first_index: u64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u32,
}

impl RegionStats {
    fn new(x: u32, y: u32, width: u32) -> Self {
        Self {
            first_index: u64::from(y) * u64::from(width) + u64::from(x),
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            area: 0,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.area += 1;
    }
}

/// Split the foreground mask into subjects
///
/// # Errors
/// - Mask and image dimensions differ
pub fn extract_subjects(
    original: &RgbaImage,
    foreground: &ConfidenceMask,
    options: &SubjectExtractionOptions,
) -> Result<Vec<Subject>> {
    let (width, height) = original.dimensions();
    if foreground.dimensions() != (width, height) {
        return Err(SegmentationError::processing(format!(
            "Foreground mask {}x{} does not match image {}x{}",
            foreground.width(),
            foreground.height(),
            width,
            height
        )));
    }

    let binary = GrayImage::from_fn(width, height, |x, y| {
        let above = foreground
            .value_at(x, y)
            .is_some_and(|v| v > CONFIDENCE_THRESHOLD);
        Luma([if above { 255 } else { 0 }])
    });
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    let mut regions: BTreeMap<u32, RegionStats> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        regions
            .entry(label)
            .or_insert_with(|| RegionStats::new(x, y, width))
            .include(x, y);
    }

    let mut kept: Vec<(u32, RegionStats)> = regions
        .into_iter()
        .filter(|(_, stats)| stats.area >= options.min_area)
        .collect();
    kept.sort_by_key(|(_, stats)| stats.first_index);
    kept.truncate(options.max_subjects);

    debug!(subjects = kept.len(), "Extracted subjects from foreground mask");

    kept.into_iter()
        .map(|(label, stats)| build_subject(original, foreground, &labels, label, stats, options))
        .collect()
}

fn build_subject(
    original: &RgbaImage,
    foreground: &ConfidenceMask,
    labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
    label: u32,
    stats: RegionStats,
    options: &SubjectExtractionOptions,
) -> Result<Subject> {
    let width = stats.max_x - stats.min_x + 1;
    let height = stats.max_y - stats.min_y + 1;

    // Confidence restricted to this region, zero elsewhere in the box
    let local_confidence = |x: u32, y: u32| -> f32 {
        let (image_x, image_y) = (stats.min_x + x, stats.min_y + y);
        if labels.get_pixel(image_x, image_y)[0] == label {
            foreground.value_at(image_x, image_y).unwrap_or(0.0)
        } else {
            0.0
        }
    };

    let mut subject = Subject::new(stats.min_x, stats.min_y, width, height);

    if options.include_masks {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(local_confidence(x, y));
            }
        }
        subject = subject.with_confidence_mask(ConfidenceMask::new(width, height, values)?);
    }

    if options.include_bitmaps {
        let bitmap = RgbaImage::from_fn(width, height, |x, y| {
            let pixel = original.get_pixel(stats.min_x + x, stats.min_y + y);
            apply_confidence(*pixel, local_confidence(x, y))
        });
        subject = subject.with_bitmap(bitmap);
    }

    Ok(subject)
}

/// Full-size cutout: original pixels with alpha scaled by foreground confidence
///
/// # Errors
/// - Mask and image dimensions differ
pub fn foreground_cutout(original: &RgbaImage, foreground: &ConfidenceMask) -> Result<RgbaImage> {
    let (width, height) = original.dimensions();
    if foreground.dimensions() != (width, height) {
        return Err(SegmentationError::processing(format!(
            "Foreground mask {}x{} does not match image {}x{}",
            foreground.width(),
            foreground.height(),
            width,
            height
        )));
    }

    Ok(RgbaImage::from_fn(width, height, |x, y| {
        apply_confidence(*original.get_pixel(x, y), foreground.value_at(x, y).unwrap_or(0.0))
    }))
}

fn apply_confidence(pixel: Rgba<u8>, confidence: f32) -> Rgba<u8> {
    let alpha = (f32::from(pixel[3]) * confidence.clamp(0.0, 1.0)).round() as u8;
    if alpha > 0 {
        Rgba([pixel[0], pixel[1], pixel[2], alpha])
    } else {
        Rgba([0, 0, 0, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16x8 mask with a 3x3 block at (1,1) and a 4x2 block at (10,5)
    fn two_blob_mask() -> ConfidenceMask {
        let mut values = vec![0.0; 16 * 8];
        for y in 1..4 {
            for x in 1..4 {
                values[y * 16 + x] = 0.9;
            }
        }
        for y in 5..7 {
            for x in 10..14 {
                values[y * 16 + x] = 1.0;
            }
        }
        ConfidenceMask::new(16, 8, values).unwrap()
    }

    fn options(min_area: u32) -> SubjectExtractionOptions {
        SubjectExtractionOptions {
            min_area,
            ..SubjectExtractionOptions::default()
        }
    }

    #[test]
    fn test_two_regions_in_raster_order() {
        let original = RgbaImage::from_pixel(16, 8, Rgba([40, 80, 120, 255]));
        let subjects = extract_subjects(&original, &two_blob_mask(), &options(1)).unwrap();

        assert_eq!(subjects.len(), 2);
        assert_eq!(
            (subjects[0].start_x, subjects[0].start_y, subjects[0].width, subjects[0].height),
            (1, 1, 3, 3)
        );
        assert_eq!(
            (subjects[1].start_x, subjects[1].start_y, subjects[1].width, subjects[1].height),
            (10, 5, 4, 2)
        );

        let mask = subjects[0].confidence_mask.as_ref().unwrap();
        assert_eq!(mask.dimensions(), (3, 3));
        assert!(mask.values().iter().all(|&v| (v - 0.9).abs() < f32::EPSILON));

        let bitmap = subjects[1].bitmap.as_ref().unwrap();
        assert_eq!(bitmap.dimensions(), (4, 2));
        assert_eq!(bitmap.get_pixel(0, 0).0, [40, 80, 120, 255]);
    }

    #[test]
    fn test_small_regions_dropped_and_truncated() {
        let original = RgbaImage::new(16, 8);
        let subjects = extract_subjects(&original, &two_blob_mask(), &options(9)).unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].start_x, 1);

        let limited = SubjectExtractionOptions {
            max_subjects: 1,
            min_area: 1,
            ..SubjectExtractionOptions::default()
        };
        let subjects = extract_subjects(&original, &two_blob_mask(), &limited).unwrap();
        assert_eq!(subjects.len(), 1);
    }

    #[test]
    fn test_region_mask_excludes_neighbours_in_box() {
        // Diagonal touch joins under 8-connectivity; the L-shape box has holes
        let mut values = vec![0.0; 4 * 4];
        values[0] = 1.0; // (0,0)
        values[5] = 1.0; // (1,1)
        values[6] = 1.0; // (2,1)
        let mask = ConfidenceMask::new(4, 4, values).unwrap();
        let original = RgbaImage::from_pixel(4, 4, Rgba([1, 1, 1, 255]));

        let subjects = extract_subjects(&original, &mask, &options(1)).unwrap();
        assert_eq!(subjects.len(), 1);
        let local = subjects[0].confidence_mask.as_ref().unwrap();
        assert_eq!(local.dimensions(), (3, 2));
        assert_eq!(local.value_at(1, 0), Some(0.0));
        assert_eq!(local.value_at(2, 1), Some(1.0));
        assert_eq!(subjects[0].bitmap.as_ref().unwrap().get_pixel(1, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_flags_control_attachments() {
        let original = RgbaImage::new(16, 8);
        let bare = SubjectExtractionOptions {
            min_area: 1,
            include_masks: false,
            include_bitmaps: false,
            ..SubjectExtractionOptions::default()
        };
        let subjects = extract_subjects(&original, &two_blob_mask(), &bare).unwrap();
        assert!(subjects.iter().all(|s| s.confidence_mask.is_none() && s.bitmap.is_none()));
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let original = RgbaImage::new(4, 4);
        let mask = ConfidenceMask::filled(3, 4, 1.0);
        assert!(extract_subjects(&original, &mask, &options(1)).is_err());
        assert!(foreground_cutout(&original, &mask).is_err());
    }

    #[test]
    fn test_foreground_cutout_alpha() {
        let original = RgbaImage::from_pixel(2, 1, Rgba([200, 100, 50, 255]));
        let mask = ConfidenceMask::new(2, 1, vec![1.0, 0.0]).unwrap();
        let cutout = foreground_cutout(&original, &mask).unwrap();
        assert_eq!(cutout.get_pixel(0, 0).0, [200, 100, 50, 255]);
        assert_eq!(cutout.get_pixel(1, 0).0, [0, 0, 0, 0]);
    }
}
