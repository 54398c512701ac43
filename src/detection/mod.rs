pub mod canny;
pub mod clahe;
pub mod hough;
pub mod lines;
pub mod preprocessing;
pub mod steps;

use image::GrayImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cache::{ContentKey, EdgeMapCache};
use crate::config::SheetCounterConfig;
use crate::error::Result;
use crate::models::{ImageArray, SheetEstimate};
use lines::LineCounter;
use preprocessing::Preprocessor;

/// Main sheet counting orchestrator: image -> edge map -> estimate
pub struct SheetCounter {
    preprocessor: Preprocessor,
    counter: LineCounter,
    cache: Arc<EdgeMapCache>,
    debug: bool,
}

impl SheetCounter {
    pub fn new(config: SheetCounterConfig) -> Result<Self> {
        let cache = Arc::new(EdgeMapCache::new(config.cache.capacity));
        Ok(Self {
            preprocessor: Preprocessor::new(config.preprocess)?,
            counter: LineCounter::new(config.lines)?,
            cache,
            debug: false,
        })
    }

    /// Share an edge map cache between several counters (e.g. sessions)
    pub fn with_cache(mut self, cache: Arc<EdgeMapCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Save every preprocessing stage under `output_dir`. The cache is
    /// bypassed so each request writes its stages.
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        self.preprocessor = self.preprocessor.with_debug(output_dir)?;
        self.debug = true;
        Ok(self)
    }

    pub fn cache(&self) -> &Arc<EdgeMapCache> {
        &self.cache
    }

    /// Edge map for `image`, served from the cache when the same content was
    /// seen before with the same preprocessing parameters. The returned map
    /// is shared and must not be mutated.
    pub fn edge_map(&self, image: &ImageArray) -> Result<Arc<GrayImage>> {
        if self.debug {
            return Ok(Arc::new(self.preprocessor.preprocess(image)?));
        }
        let key = ContentKey::of(image, self.preprocessor.config());
        self.cache
            .get_or_try_insert_with(key, || self.preprocessor.preprocess(image))
    }

    /// Run the full pipeline on one image
    pub fn estimate(&self, image: &ImageArray) -> Result<SheetEstimate> {
        let edges = self.edge_map(image)?;
        let estimate = self.counter.count(&edges);
        info!(
            count = estimate.count(),
            confidence = estimate.confidence(),
            "estimated sheet count"
        );
        Ok(estimate)
    }
}
