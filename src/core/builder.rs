//! Fluent construction of a [`ClusterEngine`]
//!
//! Start from a device profile (or a JSON config), override individual
//! options, pick where index builds run, then `build`. The configuration is
//! validated once, at `build`.

use crate::background::tasks::{BuildExecutor, InlineExecutor};
use crate::core::{
    config::{AggregationMode, DeviceProfile, EngineConfig, ZoomRange},
    engine::ClusterEngine,
};
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct EngineBuilder {
    config: EngineConfig,
    executor: Option<Arc<dyn BuildExecutor>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            executor: None,
        }
    }

    /// Replaces every option with the preset for a device class
    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.config = profile.resolve();
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the configuration with a (partial) JSON document
    pub fn with_json_config(mut self, json: &str) -> Result<Self> {
        self.config = EngineConfig::from_json_str(json)?;
        Ok(self)
    }

    pub fn cluster_radius_px(mut self, radius: f64) -> Self {
        self.config.cluster_radius_px = radius;
        self
    }

    pub fn zoom_levels(mut self, min: u8, max: u8) -> Self {
        self.config.zoom_levels = ZoomRange::new(min, max);
        self
    }

    pub fn min_cluster_points(mut self, points: usize) -> Self {
        self.config.min_cluster_points = points;
        self
    }

    pub fn viewport_debounce_ms(mut self, ms: u64) -> Self {
        self.config.viewport_debounce_ms = ms;
        self
    }

    pub fn zoom_boundary_debounce_ms(mut self, ms: u64) -> Self {
        self.config.zoom_boundary_debounce_ms = ms;
        self
    }

    /// Sets the marker cap that applies from `zoom` upwards
    pub fn render_budget(mut self, zoom: u8, max_markers: usize) -> Self {
        self.config.render_budget_by_zoom.insert(zoom, max_markers);
        self
    }

    pub fn render_budget_by_zoom(mut self, budget: BTreeMap<u8, usize>) -> Self {
        self.config.render_budget_by_zoom = budget;
        self
    }

    /// Removes every render budget
    pub fn unbounded(mut self) -> Self {
        self.config.render_budget_by_zoom.clear();
        self
    }

    pub fn commit_batch_size(mut self, size: usize) -> Self {
        self.config.commit_batch_size = size;
        self
    }

    pub fn cache_ttl_ms(mut self, ms: u64) -> Self {
        self.config.cache_ttl_ms = ms;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn aggregation(mut self, mode: AggregationMode) -> Self {
        self.config.aggregation = mode;
        self
    }

    /// Adds a numeric property to sum and max across cluster members
    pub fn aggregate_field(mut self, name: impl Into<String>) -> Self {
        self.config.aggregate_fields.push(name.into());
        self
    }

    /// Where index builds run; inline on the calling thread by default
    pub fn executor(mut self, executor: Arc<dyn BuildExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(self) -> Result<ClusterEngine> {
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(InlineExecutor) as Arc<dyn BuildExecutor>);
        ClusterEngine::new(self.config, executor)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
