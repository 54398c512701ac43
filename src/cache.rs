//! Bounded, content-addressed cache of preprocessed edge maps.
//!
//! Entries are keyed by the input's shape, a digest of its samples and a
//! digest of the preprocessing parameters, so the same picture uploaded twice
//! maps to the same edge map while counters with different settings can
//! share one cache. An entry lives
//! until it is the least recently used one when capacity runs out.

use image::GrayImage;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

use crate::config::PreprocessConfig;
use crate::error::Result;
use crate::models::ImageArray;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub digest: u64,
    pub params: u64,
}

impl ContentKey {
    pub fn of(image: &ImageArray, config: &PreprocessConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        image.as_bytes().hash(&mut hasher);
        Self {
            height: image.height(),
            width: image.width(),
            channels: image.channels(),
            digest: hasher.finish(),
            params: config.fingerprint(),
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ContentKey, Arc<GrayImage>>,
    /// Front is least recently used
    order: VecDeque<ContentKey>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn touch(&mut self, key: &ContentKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(*key);
    }
}

pub struct EdgeMapCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl EdgeMapCache {
    /// A capacity of zero disables caching entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn get(&self, key: &ContentKey) -> Option<Arc<GrayImage>> {
        let mut state = self.state.lock();
        let found = state.entries.get(key).cloned();
        if found.is_some() {
            state.hits += 1;
            state.touch(key);
        }
        found
    }

    pub fn insert(&self, key: ContentKey, edges: Arc<GrayImage>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.entries.insert(key, edges);
        state.touch(&key);
        while state.order.len() > self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.entries.remove(&evicted);
                debug!(?evicted, "evicted edge map");
            }
        }
    }

    /// Return the cached map or compute and store it. The lock is not held
    /// while `compute` runs.
    pub fn get_or_try_insert_with<F>(&self, key: ContentKey, compute: F) -> Result<Arc<GrayImage>>
    where
        F: FnOnce() -> Result<GrayImage>,
    {
        if let Some(edges) = self.get(&key) {
            debug!(?key, "edge map cache hit");
            return Ok(edges);
        }

        self.state.lock().misses += 1;
        debug!(?key, "edge map cache miss");

        let edges = Arc::new(compute()?);
        self.insert(key, Arc::clone(&edges));
        Ok(edges)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.state.lock().hits
    }

    pub fn misses(&self) -> u64 {
        self.state.lock().misses
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetCountError;

    fn array(fill: u8) -> ImageArray {
        ImageArray::from_shape(&[4, 4], vec![fill; 16]).unwrap()
    }

    fn key_for(image: &ImageArray) -> ContentKey {
        ContentKey::of(image, &PreprocessConfig::default())
    }

    fn edges(fill: u8) -> Result<GrayImage> {
        Ok(GrayImage::from_pixel(4, 4, image::Luma([fill])))
    }

    #[test]
    fn key_depends_on_content_and_shape() {
        assert_eq!(key_for(&array(1)), key_for(&array(1)));
        assert_ne!(key_for(&array(1)), key_for(&array(2)));

        let wide = ImageArray::from_shape(&[2, 8], vec![1; 16]).unwrap();
        assert_ne!(key_for(&array(1)), key_for(&wide));

        let other = PreprocessConfig {
            blur_kernel: 3,
            ..PreprocessConfig::default()
        };
        assert_ne!(key_for(&array(1)), ContentKey::of(&array(1), &other));
    }

    #[test]
    fn computes_once_per_distinct_input() {
        let cache = EdgeMapCache::new(4);
        let key = key_for(&array(1));
        let mut calls = 0;

        for _ in 0..3 {
            cache
                .get_or_try_insert_with(key, || {
                    calls += 1;
                    edges(255)
                })
                .unwrap();
        }

        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = EdgeMapCache::new(2);
        let (a, b, c) = (
            key_for(&array(1)),
            key_for(&array(2)),
            key_for(&array(3)),
        );

        cache.get_or_try_insert_with(a, || edges(1)).unwrap();
        cache.get_or_try_insert_with(b, || edges(2)).unwrap();
        // Refresh a so b becomes the oldest
        assert!(cache.get(&a).is_some());
        cache.get_or_try_insert_with(c, || edges(3)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn zero_capacity_never_stores() {
        let cache = EdgeMapCache::new(0);
        let key = key_for(&array(1));
        cache.get_or_try_insert_with(key, || edges(1)).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = EdgeMapCache::new(2);
        let key = key_for(&array(1));

        let err = cache.get_or_try_insert_with(key, || {
            Err(SheetCountError::InvalidConfig("boom".to_string()))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());

        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
