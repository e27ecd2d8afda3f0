//! Configuration for clustering, viewport settling, rendering and caching
//!
//! Every option has a default; hosts can supply any subset as JSON, or pick
//! a [`DeviceProfile`] preset and adjust from there. Device classes are
//! expressed purely as configuration values, never as separate code paths.

use crate::core::constants::*;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Inclusive range of zoom levels that get a cluster tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Clamps a (possibly fractional) view zoom to an indexed level.
    ///
    /// Level `max + 1` holds the unclustered points.
    pub fn level_for(&self, zoom: f64) -> u8 {
        let floor = zoom.floor();
        if floor <= self.min as f64 {
            self.min
        } else if floor >= self.max as f64 + 1.0 {
            self.max + 1
        } else {
            floor as u8
        }
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM)
    }
}

/// How a cluster picks its dominant category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationMode {
    /// Every member counts once
    #[default]
    Majority,
    /// Members count by their (non-negative) vote score
    VoteWeighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub cluster_radius_px: f64,
    pub tile_size: f64,
    pub zoom_levels: ZoomRange,
    pub min_cluster_points: usize,
    pub viewport_debounce_ms: u64,
    pub zoom_boundary_debounce_ms: u64,
    /// zoom → max markers; the entry with the greatest key <= the view zoom applies
    pub render_budget_by_zoom: BTreeMap<u8, usize>,
    pub commit_batch_size: usize,
    pub cache_ttl_ms: u64,
    pub cache_capacity: usize,
    pub bucket_divisions: u32,
    pub aggregation: AggregationMode,
    /// Numeric property names summed and maxed across cluster members
    pub aggregate_fields: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        DeviceProfile::default().resolve()
    }
}

impl EngineConfig {
    /// Parses a (partial) JSON configuration; absent options keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.cluster_radius_px.is_finite() && self.cluster_radius_px > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "clusterRadiusPx must be positive, got {}",
                self.cluster_radius_px
            )));
        }
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "tileSize must be positive, got {}",
                self.tile_size
            )));
        }
        if self.zoom_levels.min > self.zoom_levels.max {
            return Err(EngineError::InvalidConfig(format!(
                "zoomLevels min {} exceeds max {}",
                self.zoom_levels.min, self.zoom_levels.max
            )));
        }
        if self.zoom_levels.max > MAX_SUPPORTED_ZOOM {
            return Err(EngineError::InvalidConfig(format!(
                "zoomLevels max {} exceeds supported {}",
                self.zoom_levels.max, MAX_SUPPORTED_ZOOM
            )));
        }
        if self.min_cluster_points < 2 {
            return Err(EngineError::InvalidConfig(
                "minClusterPoints must be at least 2".to_string(),
            ));
        }
        if self.commit_batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "commitBatchSize must be at least 1".to_string(),
            ));
        }
        if self.bucket_divisions == 0 {
            return Err(EngineError::InvalidConfig(
                "bucketDivisions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Marker budget for a view zoom, `None` when no budget applies
    pub fn render_budget(&self, zoom: f64) -> Option<usize> {
        let level = if zoom <= 0.0 {
            0
        } else {
            zoom.floor().min(u8::MAX as f64) as u8
        };
        self.render_budget_by_zoom
            .range(..=level)
            .next_back()
            .map(|(_, cap)| *cap)
    }

    pub fn viewport_debounce(&self) -> Duration {
        Duration::from_millis(self.viewport_debounce_ms)
    }

    pub fn zoom_boundary_debounce(&self) -> Duration {
        Duration::from_millis(self.zoom_boundary_debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Presets for device classes
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeviceProfile {
    #[default]
    Balanced,
    LowEnd,
    HighEnd,
    Custom(Box<EngineConfig>),
}

impl DeviceProfile {
    pub fn resolve(&self) -> EngineConfig {
        match self {
            Self::Balanced => EngineConfig {
                cluster_radius_px: DEFAULT_CLUSTER_RADIUS_PX,
                tile_size: TILE_SIZE,
                zoom_levels: ZoomRange::default(),
                min_cluster_points: DEFAULT_MIN_CLUSTER_POINTS,
                viewport_debounce_ms: DEFAULT_VIEWPORT_DEBOUNCE_MS,
                zoom_boundary_debounce_ms: DEFAULT_ZOOM_BOUNDARY_DEBOUNCE_MS,
                render_budget_by_zoom: DEFAULT_RENDER_BUDGET.into_iter().collect(),
                commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
                cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
                cache_capacity: DEFAULT_CACHE_CAPACITY,
                bucket_divisions: DEFAULT_BUCKET_DIVISIONS,
                aggregation: AggregationMode::Majority,
                aggregate_fields: Vec::new(),
            },
            Self::LowEnd => EngineConfig {
                cluster_radius_px: 80.0,
                viewport_debounce_ms: 200,
                zoom_boundary_debounce_ms: 80,
                render_budget_by_zoom: [(0, 60), (4, 100), (8, 150), (12, 250), (15, 400)]
                    .into_iter()
                    .collect(),
                commit_batch_size: 10,
                cache_capacity: 64,
                ..Self::Balanced.resolve()
            },
            Self::HighEnd => EngineConfig {
                cluster_radius_px: 40.0,
                viewport_debounce_ms: 120,
                zoom_boundary_debounce_ms: 40,
                render_budget_by_zoom: [(0, 300), (4, 500), (8, 800), (12, 1200), (15, 2000)]
                    .into_iter()
                    .collect(),
                commit_batch_size: 30,
                cache_capacity: 512,
                ..Self::Balanced.resolve()
            },
            Self::Custom(config) => config.as_ref().clone(),
        }
    }
}
