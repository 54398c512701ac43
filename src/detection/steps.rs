use crate::detection::preprocessing;
use crate::error::Result;
use crate::pipeline::{MetadataValue, PipelineContext, PipelineData, PipelineStep};
use image::DynamicImage;

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let gray = preprocessing::to_grayscale(&data.image);
        Ok(data.with_image(DynamicImage::ImageLuma8(gray)))
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }
}

/// Local contrast enhancement with clipped tile histograms
pub struct ContrastStep {
    pub clip_limit: f64,
    pub grid: u32,
}

impl PipelineStep for ContrastStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let gray = data.image.to_luma8();
        let equalized = preprocessing::equalize_contrast(&gray, self.clip_limit, self.grid);
        Ok(data.with_image(DynamicImage::ImageLuma8(equalized)))
    }

    fn name(&self) -> &str {
        "Contrast Equalization"
    }
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub kernel_size: u32,
    /// Zero derives sigma from the kernel size
    pub sigma: f64,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let gray = data.image.to_luma8();
        let blurred = preprocessing::apply_blur(&gray, self.kernel_size, self.sigma);
        Ok(data.with_image(DynamicImage::ImageLuma8(blurred)))
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Canny with thresholds adapted to the median brightness
pub struct EdgeDetectionStep {
    pub threshold_sigma: f64,
}

impl PipelineStep for EdgeDetectionStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let gray = data.image.to_luma8();
        let (edges, median, (lower, upper)) = preprocessing::detect_edges(&gray, self.threshold_sigma);
        Ok(data
            .with_image(DynamicImage::ImageLuma8(edges))
            .with_metadata("median", MetadataValue::Float(median))
            .with_metadata("lower_threshold", MetadataValue::Int(lower as i64))
            .with_metadata("upper_threshold", MetadataValue::Int(upper as i64)))
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn edge_step_records_thresholds() {
        let img = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 100 } else { 101 }]));
        let data = PipelineData::from_image(DynamicImage::ImageLuma8(img));

        let out = EdgeDetectionStep { threshold_sigma: 0.33 }
            .process(data, &PipelineContext::default())
            .unwrap();

        assert_eq!(out.get_float("median"), Some(100.5));
        assert_eq!(out.get_int("lower_threshold"), Some(67));
        assert_eq!(out.get_int("upper_threshold"), Some(133));
    }
}
