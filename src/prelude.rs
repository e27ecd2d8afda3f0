//! Prelude module for common geocluster types and traits
//!
//! `use geocluster::prelude::*;` brings in the engine, its configuration,
//! the collaborator traits and the value types that flow between them.

pub use crate::core::{
    bounds::Bounds,
    builder::EngineBuilder,
    config::{AggregationMode, DeviceProfile, EngineConfig, ZoomRange},
    engine::{ClusterEngine, ClusterExpansion, TickOutcome},
    geo::{LatLng, LatLngBounds, Point},
    viewport::{Viewport, ViewportBucket},
};

pub use crate::data::point::{BuildSummary, DataVersion, DropReason, PointProperties, PointRecord};

pub use crate::spatial::{
    clustering::{Cluster, ClusterAggregates, ClusterId, MapFeature},
    index::SpatialIndex,
    query::{ClusterQueryEngine, QueryResult},
};

pub use crate::layers::{
    manager::{CommitStats, DiffCounts, MarkerLifecycleManager},
    marker::{MarkerKey, RenderHints},
};

pub use crate::input::{
    events::{InteractionKind, MarkerInteraction, SettleReason, ViewportEvent},
    tracker::ViewportTracker,
};

pub use crate::background::tasks::{BuildExecutor, InlineExecutor, ThreadExecutor};

#[cfg(feature = "tokio-runtime")]
pub use crate::background::tasks::TokioExecutor;

pub use crate::runtime::{FrameScheduler, ImmediateScheduler};

#[cfg(feature = "tokio-runtime")]
pub use crate::runtime::TokioFrameScheduler;

pub use crate::cache::ResultCache;

pub use crate::traits::{MarkerHandle, PointStore, RenderTarget, RenderTargetError};

pub use crate::{EngineError, Result};

pub use std::sync::Arc;

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
