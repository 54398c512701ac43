use image::{DynamicImage, GrayImage, Luma};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PreprocessConfig;
use crate::detection::clahe::{equalize_adaptive, reflect_101};
use crate::detection::{canny, steps::*};
use crate::error::{Result, SheetCountError};
use crate::models::ImageArray;
use crate::pipeline::Pipeline;

/// Convert to grayscale with BT.601 luma weights in Q14 fixed point.
/// Single channel images are returned unchanged.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    match img {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => {
            let rgb = other.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                let y = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
                Luma([y.min(255) as u8])
            })
        }
    }
}

/// Adaptive histogram equalization on a square `grid` of tiles
pub fn equalize_contrast(img: &GrayImage, clip_limit: f64, grid: u32) -> GrayImage {
    equalize_adaptive(img, clip_limit, grid, grid)
}

/// 1D Gaussian weights for an odd `size`. A non-positive sigma is derived
/// as `0.3 * ((size - 1) * 0.5 - 1) + 0.8`; sizes up to 7 then use the
/// binomial approximation.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    if sigma <= 0.0 {
        match size {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
                ];
            }
            _ => {}
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let scale = -0.5 / (sigma * sigma);
    let half = (size as f64 - 1.0) * 0.5;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Separable Gaussian blur with mirrored borders
pub fn apply_blur(img: &GrayImage, kernel_size: u32, sigma: f64) -> GrayImage {
    let kernel = gaussian_kernel(kernel_size as usize, sigma);
    let radius = (kernel.len() / 2) as i64;
    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    let src = img.as_raw();

    let mut horizontal = vec![0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            horizontal[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = reflect_101(x as i64 + k as i64 - radius, w as i64);
                    row[sx] as f32 * weight
                })
                .sum();
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let value: f32 = kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| {
                let sy = reflect_101(y as i64 + k as i64 - radius, h as i64);
                horizontal[sy * w + x as usize] * weight
            })
            .sum();
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Median intensity; for an even pixel count the mean of the middle pair
pub fn median_intensity(img: &GrayImage) -> f64 {
    let total = img.as_raw().len();
    if total == 0 {
        return 0.0;
    }

    let mut hist = [0usize; 256];
    for &v in img.as_raw() {
        hist[v as usize] += 1;
    }

    // Value at zero-based rank `k` in sorted order
    let nth = |k: usize| -> usize {
        let mut seen = 0;
        for (value, count) in hist.iter().enumerate() {
            seen += count;
            if seen > k {
                return value;
            }
        }
        255
    };

    if total % 2 == 1 {
        nth(total / 2) as f64
    } else {
        (nth(total / 2 - 1) + nth(total / 2)) as f64 / 2.0
    }
}

/// Canny thresholds spread `sigma` around the median, clamped to 0..=255
/// and truncated toward zero.
pub fn edge_thresholds(median: f64, sigma: f64) -> (u8, u8) {
    let lower = ((1.0 - sigma) * median).max(0.0).min(255.0);
    let upper = ((1.0 + sigma) * median).max(0.0).min(255.0);
    (lower as u8, upper as u8)
}

/// Detect edges with thresholds derived from the image median
pub fn detect_edges(img: &GrayImage, sigma: f64) -> (GrayImage, f64, (u8, u8)) {
    let median = median_intensity(img);
    let (lower, upper) = edge_thresholds(median, sigma);
    debug!(median, lower, upper, "derived edge thresholds");
    let edges = canny::canny(img, lower as f32, upper as f32);
    (edges, median, (lower, upper))
}

/// Turns an input image into a binary edge map
pub struct Preprocessor {
    config: PreprocessConfig,
    pipeline: Pipeline,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        let pipeline = build_pipeline(&config);
        Ok(Self { config, pipeline })
    }

    /// Dump every intermediate stage under `output_dir` (must be empty)
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        self.pipeline = build_pipeline(&self.config).with_debug(output_dir)?;
        Ok(self)
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn preprocess(&self, image: &ImageArray) -> Result<GrayImage> {
        info!(
            width = image.width(),
            height = image.height(),
            channels = image.channels(),
            "preprocessing image"
        );
        let data = self.pipeline.run(image.to_dynamic()?)?;

        match data.image {
            DynamicImage::ImageLuma8(edges) => Ok(edges),
            other => Err(SheetCountError::Pipeline(format!(
                "produced {:?} instead of a single channel map",
                other.color()
            ))),
        }
    }

    /// Convenience for decoded files; flattens to RGB first
    pub fn preprocess_dynamic(&self, image: &DynamicImage) -> Result<GrayImage> {
        self.preprocess(&ImageArray::from_dynamic(image))
    }
}

fn build_pipeline(config: &PreprocessConfig) -> Pipeline {
    Pipeline::new()
        .add_step(Arc::new(GrayscaleStep))
        .add_step(Arc::new(ContrastStep {
            clip_limit: config.clip_limit,
            grid: config.tile_grid,
        }))
        .add_step(Arc::new(BlurStep {
            kernel_size: config.blur_kernel,
            sigma: config.blur_sigma,
        }))
        .add_step(Arc::new(EdgeDetectionStep {
            threshold_sigma: config.threshold_sigma,
        }))
}

/// Preprocess with the default parameters
pub fn preprocess(image: &ImageArray) -> Result<GrayImage> {
    Preprocessor::new(PreprocessConfig::default())?.preprocess(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn thresholds_truncate() {
        assert_eq!(edge_thresholds(100.0, 0.33), (67, 133));
        assert_eq!(edge_thresholds(100.5, 0.33), (67, 133));
        assert_eq!(edge_thresholds(200.0, 0.33), (134, 255));
        assert_eq!(edge_thresholds(0.0, 0.33), (0, 0));
        assert_eq!(edge_thresholds(3.0, 0.33), (2, 3));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let img = GrayImage::from_raw(4, 1, vec![10, 20, 30, 200]).unwrap();
        assert_eq!(median_intensity(&img), 25.0);

        let img = GrayImage::from_raw(3, 1, vec![255, 0, 7]).unwrap();
        assert_eq!(median_intensity(&img), 7.0);
    }

    #[test]
    fn luma_weights() {
        let mut rgb = RgbImage::new(3, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, Rgb([255, 255, 255]));
        let gray = to_grayscale(&DynamicImage::ImageRgb8(rgb));

        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn kernel_sums_to_one() {
        for (size, sigma) in [(5, 0.0), (9, 0.0), (5, 2.0), (3, 0.5)] {
            let k = gaussian_kernel(size, sigma);
            assert_eq!(k.len(), size);
            assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
        assert_eq!(gaussian_kernel(5, 0.0), vec![0.0625, 0.25, 0.375, 0.25, 0.0625]);
    }

    #[test]
    fn blur_keeps_flat_regions_and_softens_spikes() {
        let flat = GrayImage::from_pixel(9, 9, Luma([77u8]));
        assert_eq!(apply_blur(&flat, 5, 0.0), flat);

        let mut spike = GrayImage::new(9, 9);
        spike.put_pixel(4, 4, Luma([255]));
        let blurred = apply_blur(&spike, 5, 0.0);
        // 255 * 0.375^2
        assert_eq!(blurred.get_pixel(4, 4)[0], 36);
        assert!(blurred.get_pixel(2, 4)[0] > 0);
        assert_eq!(blurred.get_pixel(1, 4)[0], 0);
    }
}
