use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Validates that the coordinates are finite and within WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Projects onto the unit square (x east, y south, both in [0, 1]).
    ///
    /// Clustering distances are measured here: one unit equals the world
    /// width in pixels at the zoom in question, so a pixel radius converts
    /// with a single division by `tile_size * 2^zoom`.
    pub fn project(&self) -> Point {
        Point::new(project_x(self.lng), project_y(self.lat))
    }

    /// Inverse of [`LatLng::project`]
    pub fn unproject(point: Point) -> Self {
        let lng = (point.x - 0.5) * 360.0;
        let y2 = (180.0 - point.y * 360.0) * PI / 180.0;
        let lat = 360.0 * y2.exp().atan() / PI - 90.0;
        Self::new(lat, lng)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Longitude to unit-square x
pub fn project_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Latitude to unit-square y, clamped so the poles stay inside [0, 1]
pub fn project_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

/// Represents a point in projected (unit square) or pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Represents a bounding box of geographical coordinates.
///
/// `west > east` describes a box that crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    /// Creates bounds in the west/south/east/north order used by map surfaces
    pub fn from_wsen(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::from_coords(south, west, north, east)
    }

    /// The whole world
    pub fn world() -> Self {
        Self::from_wsen(-180.0, -90.0, 180.0, 90.0)
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    /// True when the box wraps across the ±180° meridian
    pub fn crosses_antimeridian(&self) -> bool {
        self.west() > self.east()
    }

    /// Longitudinal span in degrees, accounting for antimeridian wrap
    pub fn lng_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            360.0 - (self.west() - self.east())
        } else {
            self.east() - self.west()
        }
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LatLng) -> bool {
        let lat_ok = point.lat >= self.south() && point.lat <= self.north();
        let lng_ok = if self.crosses_antimeridian() {
            point.lng >= self.west() || point.lng <= self.east()
        } else {
            point.lng >= self.west() && point.lng <= self.east()
        };
        lat_ok && lng_ok
    }
}
