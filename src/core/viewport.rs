use crate::core::config::EngineConfig;
use crate::core::geo::{LatLng, LatLngBounds, Point};
use crate::{EngineError, Result};
use instant::Instant;
use serde::{Deserialize, Serialize};

/// The visible region of the render target: bounds, zoom and when it was observed.
///
/// Immutable value; every move produces a new one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub bounds: LatLngBounds,
    pub zoom: f64,
    pub timestamp: Instant,
}

impl Viewport {
    /// Creates a viewport stamped with the current time
    pub fn new(bounds: LatLngBounds, zoom: f64) -> Self {
        Self::at(bounds, zoom, Instant::now())
    }

    pub fn at(bounds: LatLngBounds, zoom: f64, timestamp: Instant) -> Self {
        Self {
            bounds,
            zoom,
            timestamp,
        }
    }

    /// Derives the visible bounds from a centre, zoom and pixel size
    pub fn from_center(center: LatLng, zoom: f64, size: Point, tile_size: f64) -> Self {
        let world_px = tile_size * 2_f64.powf(zoom);
        let origin = center.project();
        let half_w = size.x / 2.0 / world_px;
        let half_h = size.y / 2.0 / world_px;

        let north = LatLng::unproject(Point::new(origin.x, (origin.y - half_h).clamp(0.0, 1.0))).lat;
        let south = LatLng::unproject(Point::new(origin.x, (origin.y + half_h).clamp(0.0, 1.0))).lat;

        let bounds = if half_w * 2.0 >= 1.0 {
            LatLngBounds::from_wsen(-180.0, south, 180.0, north)
        } else {
            let west = LatLng::wrap_lng(center.lng - half_w * 360.0);
            let east = LatLng::wrap_lng(center.lng + half_w * 360.0);
            LatLngBounds::from_wsen(west, south, east, north)
        };

        Self::new(bounds, zoom)
    }

    /// Rejects malformed viewports. This is a caller contract, not a data condition.
    pub fn validate(&self) -> Result<()> {
        let b = &self.bounds;
        let values = [b.west(), b.south(), b.east(), b.north(), self.zoom];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::InvalidViewport(format!(
                "non-finite value in {:?} at zoom {}",
                b, self.zoom
            )));
        }
        if b.south() > b.north() {
            return Err(EngineError::InvalidViewport(format!(
                "south {} is above north {}",
                b.south(),
                b.north()
            )));
        }
        if !b.south_west.is_valid() || !b.north_east.is_valid() {
            return Err(EngineError::InvalidViewport(format!(
                "bounds {:?} outside WGS84 range",
                b
            )));
        }
        if self.zoom < 0.0 {
            return Err(EngineError::InvalidViewport(format!(
                "negative zoom {}",
                self.zoom
            )));
        }
        Ok(())
    }

    /// Same region and zoom, ignoring when it was observed
    pub fn same_view(&self, other: &Viewport) -> bool {
        self.bounds == other.bounds && self.zoom == other.zoom
    }

    /// Integer zoom used for bucketing and render budgets
    pub fn integer_zoom(&self) -> u8 {
        self.zoom.floor().clamp(0.0, u8::MAX as f64) as u8
    }

    pub fn bucket(&self, config: &EngineConfig) -> ViewportBucket {
        ViewportBucket::for_viewport(self, config.bucket_divisions)
    }
}

/// Viewport class used as a cache key: bounds snapped outward to a coarse
/// grid plus the integer zoom. Nearby viewports share a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewportBucket {
    pub zoom: u8,
    pub west: i64,
    pub south: i64,
    pub east: i64,
    pub north: i64,
    divisions: u32,
}

impl ViewportBucket {
    pub fn for_viewport(viewport: &Viewport, divisions: u32) -> Self {
        let zoom = viewport.integer_zoom();
        let divisions = divisions.max(1);
        let cell = Self::cell_degrees(zoom, divisions);
        let b = &viewport.bounds;

        if b.lng_span() >= 360.0 {
            return Self {
                zoom,
                west: (-180.0 / cell).floor() as i64,
                south: (b.south() / cell).floor() as i64,
                east: (180.0 / cell).ceil() as i64,
                north: (b.north() / cell).ceil() as i64,
                divisions,
            };
        }

        Self {
            zoom,
            west: (b.west() / cell).floor() as i64,
            south: (b.south() / cell).floor() as i64,
            east: (b.east() / cell).ceil() as i64,
            north: (b.north() / cell).ceil() as i64,
            divisions,
        }
    }

    /// Grid cell edge in degrees: a tile width divided into `divisions`
    fn cell_degrees(zoom: u8, divisions: u32) -> f64 {
        360.0 / (2_f64.powi(zoom as i32) * divisions as f64)
    }

    /// The snapped geographic bounds this bucket stands for.
    ///
    /// Queries on a cache miss run against these, so every viewport that
    /// maps to the bucket is covered by the cached result.
    pub fn bounds(&self) -> LatLngBounds {
        let cell = Self::cell_degrees(self.zoom, self.divisions);
        let west = (self.west as f64 * cell).max(-180.0);
        let east = (self.east as f64 * cell).min(180.0);
        let south = (self.south as f64 * cell).max(-90.0);
        let north = (self.north as f64 * cell).min(90.0);
        LatLngBounds::from_wsen(west, south, east, north)
    }
}
