//! Engine-wide defaults.

/// Default square tile size in pixels; the projected world is this wide at zoom 0.
pub const TILE_SIZE: f64 = 256.0;

/// Screen-space radius (px) within which points merge into one cluster.
pub const DEFAULT_CLUSTER_RADIUS_PX: f64 = 60.0;

/// Lowest zoom level that gets a cluster tree.
pub const DEFAULT_MIN_ZOOM: u8 = 0;

/// Highest zoom level that gets a cluster tree; above it points are unclustered.
pub const DEFAULT_MAX_ZOOM: u8 = 16;

/// Hard ceiling for `max_zoom`; projected distances lose precision beyond it.
pub const MAX_SUPPORTED_ZOOM: u8 = 24;

/// Minimum members required to form a cluster.
pub const DEFAULT_MIN_CLUSTER_POINTS: usize = 2;

/// Quiescence window before a viewport change is considered settled.
pub const DEFAULT_VIEWPORT_DEBOUNCE_MS: u64 = 150;

/// Shorter window used when a zoom change crosses a cluster's expansion zoom.
pub const DEFAULT_ZOOM_BOUNDARY_DEBOUNCE_MS: u64 = 50;

/// Marker operations applied per scheduler turn.
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 20;

/// Lifetime of a cached query result.
pub const DEFAULT_CACHE_TTL_MS: u64 = 60_000;

/// Upper bound on cached query results.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Viewport bucket grid cells per tile edge.
pub const DEFAULT_BUCKET_DIVISIONS: u32 = 4;

/// Default render budget: (from zoom, max markers).
pub const DEFAULT_RENDER_BUDGET: [(u8, usize); 5] =
    [(0, 150), (4, 250), (8, 400), (12, 600), (15, 1000)];
