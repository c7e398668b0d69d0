//! Raw camera frame decoding
//!
//! Camera pipelines hand out NV21 frames: a full-resolution Y plane followed by
//! a half-resolution plane of interleaved V/U pairs. Frames also carry the
//! rotation needed to display them upright.

use crate::error::{Result, SegmentationError};
use image::{imageops, Rgba, RgbaImage};

/// Supported frame rotations, clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Parse a rotation given in degrees
    ///
    /// # Errors
    /// - Anything other than 0, 90, 180 or 270 (negative values are normalized)
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::None),
            90 => Ok(Self::Clockwise90),
            180 => Ok(Self::Clockwise180),
            270 => Ok(Self::Clockwise270),
            _ => Err(SegmentationError::invalid_input(format!(
                "Unsupported frame rotation {degrees} degrees (expected a multiple of 90)"
            ))),
        }
    }

    #[must_use]
    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Clockwise180 => 180,
            Self::Clockwise270 => 270,
        }
    }
}

/// One NV21 camera frame
#[derive(Debug, Clone)]
pub struct Nv21Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    rotation: Rotation,
}

impl Nv21Frame {
    /// Wrap an NV21 buffer
    ///
    /// # Errors
    /// - Zero or odd dimensions
    /// - Buffer shorter than `width * height * 3 / 2`
    pub fn new(width: u32, height: u32, data: Vec<u8>, rotation: Rotation) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(SegmentationError::invalid_input(format!(
                "NV21 frame dimensions must be even and non-zero, got {width}x{height}"
            )));
        }
        let expected = Self::expected_len(width, height);
        if data.len() < expected {
            return Err(SegmentationError::invalid_input(format!(
                "NV21 frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            rotation,
        })
    }

    /// Buffer length required for a frame of the given size
    #[must_use]
    pub fn expected_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + luma / 2
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Decode to RGBA (BT.601 full range) and rotate upright
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        let width = self.width as usize;
        let luma_len = width * self.height as usize;
        let (y_plane, vu_plane) = self.data.split_at(luma_len);

        let decoded = RgbaImage::from_fn(self.width, self.height, |x, y| {
            let (x, y) = (x as usize, y as usize);
            let luma = y_plane.get(y * width + x).copied().unwrap_or(0);
            let vu_index = (y / 2) * width + (x / 2) * 2;
            let v = vu_plane.get(vu_index).copied().unwrap_or(128);
            let u = vu_plane.get(vu_index + 1).copied().unwrap_or(128);
            yuv_to_rgba(luma, u, v)
        });

        match self.rotation {
            Rotation::None => decoded,
            Rotation::Clockwise90 => imageops::rotate90(&decoded),
            Rotation::Clockwise180 => imageops::rotate180(&decoded),
            Rotation::Clockwise270 => imageops::rotate270(&decoded),
        }
    }
}

fn yuv_to_rgba(y: u8, u: u8, v: u8) -> Rgba<u8> {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    Rgba([
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
        255,
    ])
}
