use crate::core::geo::LatLng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque token identifying one snapshot of the point store.
///
/// Only equality and ordering matter: a newer snapshot carries a greater version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct DataVersion(pub u64);

impl DataVersion {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for DataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Attributes used for cluster aggregation and marker styling; never for spatial work.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PointProperties {
    pub category: Option<String>,
    pub verified: bool,
    pub vote_score: i64,
    pub author: Option<String>,
    /// Named numeric values that clusters can sum and max
    pub numeric: BTreeMap<String, f64>,
}

impl PointProperties {
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    pub fn with_votes(mut self, votes: i64) -> Self {
        self.vote_score = votes;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_numeric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.numeric.insert(name.into(), value);
        self
    }
}

/// A geolocated record from the point store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub id: Arc<str>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub properties: PointProperties,
}

impl PointRecord {
    pub fn new(id: impl Into<Arc<str>>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            properties: PointProperties::default(),
        }
    }

    pub fn with_properties(mut self, properties: PointProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }

    /// Coordinates must be finite and inside WGS84 ranges
    pub fn check(&self) -> std::result::Result<(), DropReason> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(DropReason::MissingCoordinate);
        }
        if !self.position().is_valid() {
            return Err(DropReason::OutOfRange);
        }
        Ok(())
    }
}

/// Why a record was left out of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// Latitude or longitude absent or not a number
    MissingCoordinate,
    /// Latitude outside [-90, 90] or longitude outside [-180, 180]
    OutOfRange,
    /// Another record with the same id was already indexed
    DuplicateId,
}

/// Outcome of an index build
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildSummary {
    pub version: DataVersion,
    pub indexed: usize,
    pub dropped: usize,
    pub dropped_by_reason: BTreeMap<String, usize>,
}

impl BuildSummary {
    pub fn new(version: DataVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        self.dropped += 1;
        *self
            .dropped_by_reason
            .entry(format!("{:?}", reason))
            .or_insert(0) += 1;
    }

    pub fn dropped_for(&self, reason: DropReason) -> usize {
        self.dropped_by_reason
            .get(&format!("{:?}", reason))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_check() {
        assert!(PointRecord::new("a", 45.0, 10.0).check().is_ok());
        assert_eq!(
            PointRecord::new("b", 91.0, 10.0).check(),
            Err(DropReason::OutOfRange)
        );
        assert_eq!(
            PointRecord::new("c", 10.0, 181.0).check(),
            Err(DropReason::OutOfRange)
        );
        assert_eq!(
            PointRecord::new("d", f64::NAN, 10.0).check(),
            Err(DropReason::MissingCoordinate)
        );
    }

    #[test]
    fn test_summary_counts_by_reason() {
        let mut summary = BuildSummary::new(DataVersion(3));
        summary.record_drop(DropReason::OutOfRange);
        summary.record_drop(DropReason::OutOfRange);
        summary.record_drop(DropReason::DuplicateId);
        assert_eq!(summary.dropped, 3);
        assert_eq!(summary.dropped_for(DropReason::OutOfRange), 2);
        assert_eq!(summary.dropped_for(DropReason::MissingCoordinate), 0);
    }

    #[test]
    fn test_record_deserializes_without_properties() {
        let record: PointRecord =
            serde_json::from_str(r#"{"id": "p1", "latitude": 1.5, "longitude": 2.5}"#).unwrap();
        assert_eq!(&*record.id, "p1");
        assert_eq!(record.properties, PointProperties::default());
    }
}
