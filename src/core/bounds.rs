use crate::core::geo::{LatLngBounds, Point};
use rstar::AABB;
use serde::{Deserialize, Serialize};

/// Represents a bounding box in projected (unit square) coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn from_coords(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        }
    }

    /// Projects geographic bounds into one or two projected ranges.
    ///
    /// Boxes crossing the antimeridian split at x = 0/1; a span of 360° or
    /// more covers the full x range.
    pub fn project(bounds: &LatLngBounds) -> Vec<Bounds> {
        use crate::core::geo::{project_x, project_y};

        // north maps to the smaller y
        let min_y = project_y(bounds.north());
        let max_y = project_y(bounds.south());

        if bounds.lng_span() >= 360.0 {
            return vec![Self::from_coords(0.0, min_y, 1.0, max_y)];
        }

        let min_x = project_x(bounds.west());
        let max_x = project_x(bounds.east());
        if bounds.crosses_antimeridian() {
            vec![
                Self::from_coords(min_x, min_y, 1.0, max_y),
                Self::from_coords(0.0, min_y, max_x, max_y),
            ]
        } else {
            vec![Self::from_coords(min_x, min_y, max_x, max_y)]
        }
    }

    /// Inclusive on every edge, matching R-tree envelope lookups
    pub fn contains(&self, point: &Point) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.y..=self.max.y).contains(&point.y)
    }

    /// Grows the range by `amount` on every side
    pub fn expand(&mut self, amount: f64) {
        self.min.x -= amount;
        self.min.y -= amount;
        self.max.x += amount;
        self.max.y += amount;
    }

    pub fn expanded(&self, amount: f64) -> Bounds {
        let mut expanded = self.clone();
        expanded.expand(amount);
        expanded
    }

    /// R-tree envelope covering these bounds
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners(self.min.to_array(), self.max.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expanded_margin_contains_edges() {
        let range = Bounds::from_coords(0.25, 0.25, 0.5, 0.5);
        assert!(range.contains(&Point::new(0.5, 0.25)));
        assert!(!range.contains(&Point::new(0.505, 0.3)));

        let grown = range.expanded(0.01);
        assert!(grown.contains(&Point::new(0.505, 0.3)));
        assert!(!grown.contains(&Point::new(0.515, 0.3)));
        assert_eq!(range, Bounds::from_coords(0.25, 0.25, 0.5, 0.5));
    }

    #[test]
    fn test_project_world_and_antimeridian() {
        let world = Bounds::project(&LatLngBounds::world());
        assert_eq!(world.len(), 1);
        assert_eq!(world[0].min.x, 0.0);
        assert_eq!(world[0].max.x, 1.0);
        assert_eq!(world[0].min.y, 0.0);
        assert_eq!(world[0].max.y, 1.0);

        let wrapped = Bounds::project(&LatLngBounds::from_wsen(170.0, -10.0, -170.0, 10.0));
        assert_eq!(wrapped.len(), 2);
        assert!(wrapped[0].min.x > 0.97);
        assert_eq!(wrapped[0].max.x, 1.0);
        assert_eq!(wrapped[1].min.x, 0.0);
        assert!(wrapped[1].max.x < 0.03);
    }
}
