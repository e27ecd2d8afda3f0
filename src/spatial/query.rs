//! Viewport resolution: cache lookup, index query and render budget
//!
//! When a query returns more features than the render budget for the zoom
//! allows, the result is cut down to exactly the budget. Verified features
//! are kept first, then higher vote scores, then the lowest marker keys. The
//! caller sees `truncated` together with the exact number of features (and
//! points) that were left out, so the map can say that it shows partial
//! results.

use crate::cache::ResultCache;
use crate::core::config::EngineConfig;
use crate::core::viewport::Viewport;
use crate::data::point::DataVersion;
use crate::spatial::clustering::MapFeature;
use crate::spatial::index::SpatialIndex;
use crate::Result;
use instant::Instant;
use std::cmp::Reverse;
use std::sync::Arc;

/// Features visible for one viewport, plus the conditions under which they were produced
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Sorted by marker key
    pub features: Vec<MapFeature>,
    /// The render budget cut the result down
    pub truncated: bool,
    /// Number of features left out by the budget
    pub omitted: usize,
    /// Number of points beneath the omitted features
    pub omitted_points: usize,
    /// No index had been built yet
    pub not_ready: bool,
    pub from_cache: bool,
    /// Indexed zoom level the features come from
    pub level: u8,
    pub version: DataVersion,
}

impl QueryResult {
    pub fn empty(version: DataVersion, level: u8) -> Self {
        Self {
            features: Vec::new(),
            truncated: false,
            omitted: 0,
            omitted_points: 0,
            not_ready: false,
            from_cache: false,
            level,
            version,
        }
    }

    /// Explicit empty answer for queries that arrive before the first build
    pub fn not_ready() -> Self {
        Self {
            not_ready: true,
            ..Self::empty(DataVersion::default(), 0)
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Points represented by the returned features
    pub fn point_count(&self) -> usize {
        self.features.iter().map(MapFeature::count).sum()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &MapFeature> {
        self.features.iter().filter(|f| f.is_cluster())
    }
}

/// Resolves viewports against the current index
#[derive(Debug, Clone)]
pub struct ClusterQueryEngine {
    config: Arc<EngineConfig>,
}

impl ClusterQueryEngine {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolve(
        &self,
        index: Option<&SpatialIndex>,
        viewport: &Viewport,
        version: DataVersion,
        cache: &mut ResultCache,
    ) -> Result<QueryResult> {
        self.resolve_at(index, viewport, version, cache, Instant::now())
    }

    /// Resolves `viewport` as of `now` (cache expiry is measured against it).
    ///
    /// A malformed viewport is the only error; an absent index gives a
    /// `not_ready` result.
    pub fn resolve_at(
        &self,
        index: Option<&SpatialIndex>,
        viewport: &Viewport,
        version: DataVersion,
        cache: &mut ResultCache,
        now: Instant,
    ) -> Result<QueryResult> {
        viewport.validate()?;

        let Some(index) = index else {
            log::debug!("query at zoom {} before first index build", viewport.zoom);
            return Ok(QueryResult::not_ready());
        };

        // The cache holds the whole bucket, unbudgeted, so every viewport
        // mapping to it can be narrowed from the same entry
        let key = (version, viewport.bucket(&self.config));
        let (region, from_cache) = match cache.get_at(&key, now) {
            Some(hit) => (hit, true),
            None => {
                let region = Arc::new(QueryResult {
                    features: index.query(&key.1.bounds(), viewport.zoom),
                    ..QueryResult::empty(version, index.zoom_range().level_for(viewport.zoom))
                });
                cache.set_at(key, region.clone(), self.config.cache_ttl(), now);
                (region, false)
            }
        };

        let mut result = QueryResult {
            features: index.retain_visible(&region.features, &viewport.bounds, viewport.zoom),
            from_cache,
            ..QueryResult::empty(version, region.level)
        };
        if let Some(cap) = self.config.render_budget(viewport.zoom) {
            apply_budget(&mut result, cap);
        }
        Ok(result)
    }
}

/// Cuts `result` down to `cap` features by render priority
fn apply_budget(result: &mut QueryResult, cap: usize) {
    if result.features.len() <= cap {
        return;
    }

    let total = result.features.len();
    let mut features = std::mem::take(&mut result.features);
    features.sort_by_cached_key(|f| (Reverse(f.is_verified()), Reverse(f.vote_score()), f.key()));
    let omitted = features.split_off(cap);
    features.sort_by_key(|f| f.key());

    result.features = features;
    result.truncated = true;
    result.omitted = omitted.len();
    result.omitted_points = omitted.iter().map(MapFeature::count).sum();

    log::debug!(
        "render budget {} truncated {} features at level {} ({} points omitted)",
        cap,
        total,
        result.level,
        result.omitted_points
    );
}
