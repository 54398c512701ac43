use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::Deserialize;

use crate::detection::hough::HoughParams;
use crate::error::{Result, SheetCountError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SheetCounterConfig {
    pub preprocess: PreprocessConfig,
    pub lines: LineConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Histogram clip limit for adaptive equalization.
    pub clip_limit: f64,
    /// Tiles per side of the equalization grid.
    pub tile_grid: u32,
    /// Gaussian kernel side, must be odd.
    pub blur_kernel: u32,
    /// Zero derives sigma from the kernel size.
    pub blur_sigma: f64,
    /// Relative spread of the Canny thresholds around the median.
    pub threshold_sigma: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tile_grid: 8,
            blur_kernel: 5,
            blur_sigma: 0.0,
            threshold_sigma: 0.33,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Distance resolution of the accumulator in pixels.
    pub rho: f64,
    /// Angle resolution of the accumulator in radians.
    pub theta: f64,
    /// Minimum votes before a line is traced.
    pub vote_threshold: u32,
    pub min_line_length: u32,
    pub max_line_gap: u32,
    /// Segments with `|angle| >= max_angle_degrees` are discarded.
    pub max_angle_degrees: f64,
    /// Value written along accepted segments in the annotated map.
    pub marker: u8,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            rho: 1.0,
            theta: std::f64::consts::PI / 180.0,
            vote_threshold: 50,
            min_line_length: 50,
            max_line_gap: 10,
            max_angle_degrees: 20.0,
            marker: 128,
        }
    }
}

impl LineConfig {
    pub fn hough_params(&self) -> HoughParams {
        HoughParams {
            rho: self.rho,
            theta: self.theta,
            threshold: self.vote_threshold,
            min_line_length: self.min_line_length,
            max_line_gap: self.max_line_gap,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached edge maps; 0 disables caching.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 32 }
    }
}

impl SheetCounterConfig {
    /// Defaults, then the optional file, then `SHEETCOUNT_*` environment
    /// variables (`__` separates sections, e.g. `SHEETCOUNT_LINES__MARKER`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("SHEETCOUNT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.preprocess.validate()?;
        self.lines.validate()
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.clip_limit.is_finite() && self.clip_limit >= 0.0) {
            return Err(SheetCountError::InvalidConfig(format!(
                "clip_limit must be a non-negative number, got {}",
                self.clip_limit
            )));
        }
        if self.tile_grid == 0 {
            return Err(SheetCountError::InvalidConfig(
                "tile_grid must be at least 1".to_string(),
            ));
        }
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(SheetCountError::InvalidConfig(format!(
                "blur_kernel must be odd, got {}",
                self.blur_kernel
            )));
        }
        if !(self.blur_sigma.is_finite() && self.blur_sigma >= 0.0) {
            return Err(SheetCountError::InvalidConfig(format!(
                "blur_sigma must be a non-negative number, got {}",
                self.blur_sigma
            )));
        }
        if !(self.threshold_sigma.is_finite() && self.threshold_sigma >= 0.0) {
            return Err(SheetCountError::InvalidConfig(format!(
                "threshold_sigma must be a non-negative number, got {}",
                self.threshold_sigma
            )));
        }
        Ok(())
    }

    /// Digest of every parameter that shapes the edge map. Floats are
    /// hashed by bit pattern, so `0.0` and `-0.0` differ.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.clip_limit.to_bits().hash(&mut hasher);
        self.tile_grid.hash(&mut hasher);
        self.blur_kernel.hash(&mut hasher);
        self.blur_sigma.to_bits().hash(&mut hasher);
        self.threshold_sigma.to_bits().hash(&mut hasher);
        hasher.finish()
    }
}

impl LineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.rho.is_finite() && self.rho > 0.0) {
            return Err(SheetCountError::InvalidConfig(format!(
                "rho must be positive, got {}",
                self.rho
            )));
        }
        if !(self.theta.is_finite() && self.theta > 0.0 && self.theta <= std::f64::consts::PI) {
            return Err(SheetCountError::InvalidConfig(format!(
                "theta must lie in (0, pi], got {}",
                self.theta
            )));
        }
        if self.vote_threshold == 0 {
            return Err(SheetCountError::InvalidConfig(
                "vote_threshold must be at least 1".to_string(),
            ));
        }
        if !self.max_angle_degrees.is_finite() {
            return Err(SheetCountError::InvalidConfig(
                "max_angle_degrees must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
