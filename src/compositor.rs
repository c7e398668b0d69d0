//! Highlight compositing of confidence masks over the original image
//!
//! The overlay is built in a separate transparent buffer: the foreground mask
//! paints red, then each subject paints its palette color in enumeration order,
//! overwriting whatever was there. The finished overlay is alpha-blended onto a
//! copy of the original. The original image is never modified.

use crate::{
    error::{Result, SegmentationError},
    types::{ConfidenceMask, Subject},
};
use image::{Rgba, RgbaImage};
use tracing::{debug, instrument, warn};

/// Confidence above which a mask pixel is highlighted
pub const CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Alpha shared by every highlight color
pub const HIGHLIGHT_ALPHA: u8 = 100;

/// Foreground highlight color
pub const FOREGROUND_COLOR: Rgba<u8> = Rgba([255, 0, 0, HIGHLIGHT_ALPHA]);

/// Subject highlight colors, assigned by `subject_index % SUBJECT_PALETTE.len()`
pub const SUBJECT_PALETTE: [Rgba<u8>; 5] = [
    Rgba([0, 255, 0, HIGHLIGHT_ALPHA]),   // green
    Rgba([0, 0, 255, HIGHLIGHT_ALPHA]),   // blue
    Rgba([255, 255, 0, HIGHLIGHT_ALPHA]), // yellow
    Rgba([255, 0, 255, HIGHLIGHT_ALPHA]), // magenta
    Rgba([0, 255, 255, HIGHLIGHT_ALPHA]), // cyan
];

/// Palette color for the subject at `index`
#[must_use]
pub fn subject_color(index: usize) -> Rgba<u8> {
    SUBJECT_PALETTE[index % SUBJECT_PALETTE.len()]
}

/// Composite the highlight overlay onto `original`
///
/// Never fails: on any internal error the failure is logged and an unmodified
/// copy of `original` is returned.
#[must_use]
pub fn composite(
    original: &RgbaImage,
    foreground_mask: Option<&ConfidenceMask>,
    subjects: &[Subject],
) -> RgbaImage {
    match try_composite(original, foreground_mask, subjects) {
        Ok(highlighted) => highlighted,
        Err(e) => {
            warn!(error = %e, "Highlight compositing failed, returning original image");
            original.clone()
        },
    }
}

/// Fallible form of [`composite`]
///
/// # Errors
/// - Overlay buffer size overflows
/// - Mask data shorter than the mask extent
#[instrument(
    skip_all,
    fields(
        dimensions = %format!("{}x{}", original.width(), original.height()),
        foreground = foreground_mask.is_some(),
        subjects = subjects.len()
    )
)]
pub fn try_composite(
    original: &RgbaImage,
    foreground_mask: Option<&ConfidenceMask>,
    subjects: &[Subject],
) -> Result<RgbaImage> {
    let overlay = build_overlay(original.width(), original.height(), foreground_mask, subjects)?;

    let mut highlighted = original.clone();
    for (base, top) in highlighted.pixels_mut().zip(overlay.pixels()) {
        if top[3] > 0 {
            *base = blend_over(*base, *top);
        }
    }

    debug!("Highlight compositing complete");
    Ok(highlighted)
}

/// Build the transparent overlay with foreground and subject highlights
///
/// # Errors
/// - Overlay buffer size overflows
/// - Mask data shorter than the mask extent
pub fn build_overlay(
    width: u32,
    height: u32,
    foreground_mask: Option<&ConfidenceMask>,
    subjects: &[Subject],
) -> Result<RgbaImage> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| {
            SegmentationError::processing_stage_error(
                "overlay allocation",
                "buffer size overflows",
                Some(&format!("{width}x{height}")),
            )
        })?;
    let mut overlay = RgbaImage::new(width, height);

    if let Some(mask) = foreground_mask {
        paint_mask(&mut overlay, mask, 0, 0, FOREGROUND_COLOR)?;
    }

    for (index, subject) in subjects.iter().enumerate() {
        // Subjects without a mask keep their palette slot
        let Some(mask) = subject.confidence_mask.as_ref() else {
            continue;
        };
        paint_mask(
            &mut overlay,
            mask,
            subject.start_x,
            subject.start_y,
            subject_color(index),
        )?;
    }

    Ok(overlay)
}

/// Paint `color` wherever `mask` exceeds the threshold, offset by `(start_x, start_y)`
fn paint_mask(
    overlay: &mut RgbaImage,
    mask: &ConfidenceMask,
    start_x: u32,
    start_y: u32,
    color: Rgba<u8>,
) -> Result<()> {
    let (width, height) = overlay.dimensions();
    let (mask_width, mask_height) = mask.dimensions();

    for y in 0..mask_height {
        for x in 0..mask_width {
            let value = mask.value_at(x, y).ok_or_else(|| {
                SegmentationError::processing_stage_error(
                    "compositing",
                    &format!("mask data missing at ({x}, {y})"),
                    Some(&format!("{mask_width}x{mask_height} mask")),
                )
            })?;
            if value <= CONFIDENCE_THRESHOLD {
                continue;
            }

            let (Some(image_x), Some(image_y)) = (start_x.checked_add(x), start_y.checked_add(y))
            else {
                continue;
            };
            if image_x < width && image_y < height {
                overlay.put_pixel(image_x, image_y, color);
            }
        }
    }

    Ok(())
}

/// Source-over blend of `top` onto `base`
#[must_use]
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = f32::from(top[3]) / 255.0;
    let base_alpha = f32::from(base[3]) / 255.0;
    let out_alpha = top_alpha + base_alpha * (1.0 - top_alpha);
    if out_alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |i: usize| -> u8 {
        let value = (f32::from(top[i]) * top_alpha
            + f32::from(base[i]) * base_alpha * (1.0 - top_alpha))
            / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
