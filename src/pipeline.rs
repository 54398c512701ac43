use image::DynamicImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SheetCountError};

/// Data that flows through the pipeline
#[derive(Clone)]
pub struct PipelineData {
    /// The image at the current stage (color on input, grayscale afterwards)
    pub image: DynamicImage,

    /// Values recorded by steps (e.g. "median", "lower_threshold")
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Float(f64),
    Int(i64),
}

impl PipelineData {
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image,
            metadata: HashMap::new(),
        }
    }

    /// Replace the image, keeping metadata from earlier steps
    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.image = image;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    pub enabled: bool,
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Transform one image into the next stage
    fn process(&self, data: PipelineData, context: &PipelineContext) -> Result<PipelineData>;

    /// Human-readable name for this step (used in logs and debug directory names)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(SheetCountError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("Debug directory is not empty: {}", output_dir.display()),
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Helper method to add a step from a Box (for convenience)
    pub fn add_step_boxed(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.steps.push(Arc::from(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step sequentially on an input image
    pub fn run(&self, input: DynamicImage) -> Result<PipelineData> {
        self.run_partial(input, self.steps.len())
    }

    /// Run the pipeline but stop after `num_steps` steps (useful for debugging)
    pub fn run_partial(&self, input: DynamicImage, num_steps: usize) -> Result<PipelineData> {
        self.save_debug_image(&input, "00_input")?;

        let mut data = PipelineData::from_image(input);

        for (step_idx, step) in self.steps.iter().take(num_steps).enumerate() {
            debug!(
                step = step.name(),
                width = data.image.width(),
                height = data.image.height(),
                "running pipeline step"
            );

            data = step.process(data, &self.context)?;

            let step_dir_name = format!(
                "{:02}_{}",
                step_idx + 1,
                step.name().to_lowercase().replace(' ', "_")
            );
            self.save_debug_image(&data.image, &step_dir_name)?;
        }

        Ok(data)
    }

    fn save_debug_image(&self, image: &DynamicImage, dir_name: &str) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };
        if !debug_config.enabled {
            return Ok(());
        }

        let step_dir = debug_config.output_dir.join(dir_name);
        std::fs::create_dir_all(&step_dir)?;
        let output_path = step_dir.join("01.png");
        image.save(&output_path)?;

        debug!("Debug: saved {}", relative_display(&debug_config.output_dir, &output_path));
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    struct InvertStep;

    impl PipelineStep for InvertStep {
        fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
            let mut gray = data.image.to_luma8();
            image::imageops::invert(&mut gray);
            Ok(data
                .with_image(DynamicImage::ImageLuma8(gray))
                .with_metadata("inverted", MetadataValue::Int(1)))
        }

        fn name(&self) -> &str {
            "Invert"
        }
    }

    fn input() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([10u8])))
    }

    #[test]
    fn runs_steps_in_order() {
        let pipeline = Pipeline::new()
            .add_step(Arc::new(InvertStep))
            .add_step_boxed(Box::new(InvertStep));

        assert_eq!(pipeline.step_names(), vec!["Invert", "Invert"]);

        let out = pipeline.run(input()).unwrap();
        assert_eq!(out.image.to_luma8().get_pixel(0, 0)[0], 10);
        assert_eq!(out.get_int("inverted"), Some(1));

        let half = pipeline.run_partial(input(), 1).unwrap();
        assert_eq!(half.image.to_luma8().get_pixel(0, 0)[0], 245);
    }

    #[test]
    fn debug_mode_dumps_every_stage() {
        let dir = tempfile::TempDir::new().unwrap();
        let out_dir = dir.path().join("debug");
        let pipeline = Pipeline::new()
            .add_step(Arc::new(InvertStep))
            .with_debug(out_dir.clone())
            .unwrap();

        pipeline.run(input()).unwrap();

        assert!(out_dir.join("00_input/01.png").exists());
        assert!(out_dir.join("01_invert/01.png").exists());
    }

    #[test]
    fn debug_dir_must_be_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("stale.txt"), b"x").unwrap();

        let result = Pipeline::new().with_debug(dir.path().to_path_buf());
        assert!(result.is_err());
    }
}
