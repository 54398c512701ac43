use image::{DynamicImage, GrayImage, RgbImage};
use serde::Serialize;

use crate::error::{Result, SheetCountError};

/// Raw 8-bit pixel buffer handed to the pipeline, row-major.
///
/// Shape is `(height, width)` for grayscale or `(height, width, 3)` for RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArray {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<u8>,
}

impl ImageArray {
    /// Build from an explicit shape, rejecting anything that is not 2D or
    /// 3D with three channels.
    pub fn from_shape(shape: &[usize], data: Vec<u8>) -> Result<Self> {
        let (height, width, channels) = match *shape {
            [h, w] => (h, w, 1),
            [h, w, 3] => (h, w, 3),
            [_, _, c] => {
                return Err(SheetCountError::invalid_input(
                    shape,
                    format!("expected 3 channels, got {}", c),
                ));
            }
            _ => {
                return Err(SheetCountError::invalid_input(
                    shape,
                    format!("expected a 2D or 3D array, got {} dimensions", shape.len()),
                ));
            }
        };

        if height == 0 || width == 0 {
            return Err(SheetCountError::invalid_input(shape, "image has no pixels"));
        }
        if u32::try_from(height).is_err() || u32::try_from(width).is_err() {
            return Err(SheetCountError::invalid_input(shape, "image is too large"));
        }

        let Some(expected) = height
            .checked_mul(width)
            .and_then(|n| n.checked_mul(channels))
        else {
            return Err(SheetCountError::invalid_input(shape, "image is too large"));
        };
        if data.len() != expected {
            return Err(SheetCountError::invalid_input(
                shape,
                format!("expected {} samples, got {}", expected, data.len()),
            ));
        }

        Ok(Self {
            height,
            width,
            channels,
            data,
        })
    }

    pub fn from_rgb(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            height: height as usize,
            width: width as usize,
            channels: 3,
            data: img.into_raw(),
        }
    }

    pub fn from_gray(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            height: height as usize,
            width: width as usize,
            channels: 1,
            data: img.into_raw(),
        }
    }

    /// Decoded uploads are always flattened to RGB first.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        Self::from_rgb(img.to_rgb8())
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn shape(&self) -> Vec<usize> {
        if self.channels == 1 {
            vec![self.height, self.width]
        } else {
            vec![self.height, self.width, self.channels]
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// View the buffer as an `image` crate image for the pipeline steps.
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let (w, h) = (self.width as u32, self.height as u32);
        match self.channels {
            1 => GrayImage::from_raw(w, h, self.data.clone()).map(DynamicImage::ImageLuma8),
            _ => RgbImage::from_raw(w, h, self.data.clone()).map(DynamicImage::ImageRgb8),
        }
        .ok_or_else(|| {
            SheetCountError::Pipeline(format!(
                "buffer of {} samples does not fit shape {:?}",
                self.data.len(),
                self.shape()
            ))
        })
    }
}

/// Line segment in pixel coordinates, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineSegment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl LineSegment {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Signed direction in degrees, range (-180, 180].
    pub fn angle_degrees(&self) -> f64 {
        let dy = (self.y2 - self.y1) as f64;
        let dx = (self.x2 - self.x1) as f64;
        dy.atan2(dx).to_degrees()
    }

    /// Direction sensitive: a horizontal segment traversed right-to-left
    /// sits near 180 degrees and is not accepted.
    pub fn is_near_horizontal(&self, max_angle_degrees: f64) -> bool {
        self.angle_degrees().abs() < max_angle_degrees
    }
}

/// Outcome of counting: the accepted segments and the annotated edge map.
#[derive(Debug, Clone)]
pub struct SheetEstimate {
    segments: Vec<LineSegment>,
    annotated: GrayImage,
}

impl SheetEstimate {
    pub(crate) fn new(segments: Vec<LineSegment>, annotated: GrayImage) -> Self {
        Self {
            segments,
            annotated,
        }
    }

    /// Number of accepted near-horizontal segments.
    pub fn count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[LineSegment] {
        &self.segments
    }

    pub fn annotated(&self) -> &GrayImage {
        &self.annotated
    }

    pub fn into_annotated(self) -> GrayImage {
        self.annotated
    }

    /// Display-only progress value, `min(count / 100, 1)`. Not a statistic.
    pub fn confidence(&self) -> f32 {
        (self.count() as f32 / 100.0).min(1.0)
    }
}
