//! # geocluster
//!
//! Viewport-driven clustering of large, changing sets of geolocated points.
//!
//! The engine keeps a per-zoom cluster hierarchy over the current point
//! snapshot, resolves the clusters visible in a (debounced) viewport, and
//! commits the minimal marker diff to an external render target in small
//! batches so the host's event loop is never blocked for long.
//!
//! Pipeline: [`PointStore`] snapshot → [`SpatialIndex`] build →
//! [`ViewportTracker`] settle → [`ClusterQueryEngine`] resolve (through the
//! [`ResultCache`]) → [`MarkerLifecycleManager`] diff and batched commit →
//! [`RenderTarget`].

pub mod background;
pub mod cache;
pub mod core;
pub mod data;
pub mod input;
pub mod layers;
pub mod prelude;
pub mod runtime;
pub mod spatial;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    bounds::Bounds,
    builder::EngineBuilder,
    config::{AggregationMode, DeviceProfile, EngineConfig, ZoomRange},
    engine::{ClusterEngine, ClusterExpansion, TickOutcome},
    geo::{LatLng, LatLngBounds, Point},
    viewport::{Viewport, ViewportBucket},
};

pub use data::point::{BuildSummary, DataVersion, DropReason, PointProperties, PointRecord};

pub use spatial::{
    clustering::{ClusterAggregates, ClusterId, MapFeature},
    index::SpatialIndex,
    query::{ClusterQueryEngine, QueryResult},
};

pub use cache::ResultCache;

pub use input::{
    events::{InteractionKind, MarkerInteraction, SettleReason, ViewportEvent},
    tracker::ViewportTracker,
};

pub use layers::{
    manager::{CommitStats, DiffCounts, MarkerLifecycleManager},
    marker::{MarkerKey, RenderHints},
};

pub use traits::{MarkerHandle, PointStore, RenderTarget, RenderTargetError};

pub use background::tasks::{BuildExecutor, InlineExecutor, ThreadExecutor};

pub use runtime::{FrameScheduler, ImmediateScheduler};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, EngineError>;

/// Hard errors. Expected conditions (bad points, budget caps, a flaky
/// render target, no index yet) are reported through result values instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index build failed: {0}")]
    BuildFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid GeoJSON: {0}")]
    InvalidGeoJson(String),
}

/// Error type alias for convenience
pub type Error = EngineError;
