//! GeoJSON import of point records and export of query results
//!
//! Import reads `Point` features from a FeatureCollection (or a single
//! Feature). The record id comes from the feature `id`, falling back to an
//! `id` property; features without an id or a point geometry are skipped and
//! counted. Coordinate validation is left to the index build, which drops
//! and counts out-of-range points like any other source.
//!
//! Export writes one Point feature per result entry. Cluster features carry
//! `cluster: true`, `cluster_id`, `point_count` and `expansion_zoom` in the
//! same shape supercluster-style clients expect.

use crate::data::point::{PointProperties, PointRecord};
use crate::spatial::clustering::MapFeature;
use crate::spatial::query::QueryResult;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonFeature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Kept as raw JSON; only `Point` geometries are read
    pub geometry: Option<Value>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJson {
    Feature(GeoJsonFeature),
    FeatureCollection { features: Vec<GeoJsonFeature> },
}

/// Records read from a GeoJSON document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoJsonImport {
    pub points: Vec<PointRecord>,
    /// Features without a point geometry or an id
    pub skipped: usize,
}

impl GeoJson {
    pub fn from_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidGeoJson(e.to_string()))
    }

    fn features(&self) -> &[GeoJsonFeature] {
        match self {
            Self::Feature(feature) => std::slice::from_ref(feature),
            Self::FeatureCollection { features } => features,
        }
    }

    pub fn to_point_records(&self) -> GeoJsonImport {
        let mut import = GeoJsonImport::default();
        for feature in self.features() {
            match feature.to_point_record() {
                Some(record) => import.points.push(record),
                None => {
                    log::debug!("skipping GeoJSON feature {:?}", feature.id);
                    import.skipped += 1;
                }
            }
        }
        import
    }
}

/// Parses a GeoJSON document into point records
pub fn read_points(json: &str) -> Result<GeoJsonImport> {
    Ok(GeoJson::from_str(json)?.to_point_records())
}

impl GeoJsonFeature {
    fn to_point_record(&self) -> Option<PointRecord> {
        let geometry = self.geometry.as_ref()?;
        if geometry.get("type")?.as_str()? != "Point" {
            return None;
        }
        // GeoJSON order is [longitude, latitude]; malformed pairs become NaN
        // so the index build drops and counts them
        let coordinates = geometry.get("coordinates").and_then(Value::as_array);
        let coordinate = |i: usize| {
            coordinates
                .and_then(|c| c.get(i))
                .and_then(Value::as_f64)
                .unwrap_or(f64::NAN)
        };
        let (lng, lat) = (coordinate(0), coordinate(1));

        let empty = Map::new();
        let props = self.properties.as_ref().unwrap_or(&empty);
        let id = self.id.as_ref().or_else(|| props.get("id")).and_then(id_string)?;

        Some(PointRecord::new(id, lat, lng).with_properties(point_properties(props)))
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn point_properties(props: &Map<String, Value>) -> PointProperties {
    let mut properties = PointProperties::default();
    for (name, value) in props {
        match (name.as_str(), value) {
            ("category", Value::String(s)) => properties.category = Some(s.clone()),
            ("verified", Value::Bool(b)) => properties.verified = *b,
            ("voteScore" | "vote_score" | "votes", Value::Number(n)) => {
                properties.vote_score = n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64)
            }
            ("author", Value::String(s)) => properties.author = Some(s.clone()),
            ("id", _) => {}
            (_, Value::Number(n)) => {
                if let Some(v) = n.as_f64() {
                    properties.numeric.insert(name.clone(), v);
                }
            }
            _ => {}
        }
    }
    properties
}

/// Writes a query result as a FeatureCollection
pub fn write_result(result: &QueryResult) -> Value {
    let features: Vec<Value> = result.features.iter().map(feature_json).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
        "truncated": result.truncated,
        "omitted": result.omitted,
        "omittedPoints": result.omitted_points,
        "notReady": result.not_ready,
    })
}

fn feature_json(feature: &MapFeature) -> Value {
    let position = feature.position();
    let geometry = json!({
        "type": "Point",
        "coordinates": [position.lng, position.lat],
    });

    match feature {
        MapFeature::Point(point) => {
            let mut properties = Map::new();
            let p = &point.properties;
            if let Some(category) = &p.category {
                properties.insert("category".into(), json!(category));
            }
            properties.insert("verified".into(), json!(p.verified));
            properties.insert("voteScore".into(), json!(p.vote_score));
            if let Some(author) = &p.author {
                properties.insert("author".into(), json!(author));
            }
            for (name, value) in &p.numeric {
                properties.insert(name.clone(), json!(value));
            }
            json!({
                "type": "Feature",
                "id": &*point.id,
                "geometry": geometry,
                "properties": properties,
            })
        }
        MapFeature::Cluster(cluster) => {
            let mut properties = Map::new();
            properties.insert("cluster".into(), json!(true));
            properties.insert("cluster_id".into(), json!(cluster.id.to_string()));
            properties.insert("point_count".into(), json!(cluster.count));
            properties.insert("expansion_zoom".into(), json!(cluster.expansion_zoom));
            properties.insert(
                "verified_count".into(),
                json!(cluster.aggregates.verified_count),
            );
            properties.insert("vote_sum".into(), json!(cluster.aggregates.vote_sum));
            if let Some(category) = &cluster.dominant_category {
                properties.insert("category".into(), json!(category));
            }
            for (name, stats) in &cluster.aggregates.fields {
                properties.insert(format!("{name}_sum"), json!(stats.sum));
                properties.insert(format!("{name}_max"), json!(stats.max));
            }
            json!({
                "type": "Feature",
                "id": cluster.id.to_string(),
                "geometry": geometry,
                "properties": properties,
            })
        }
    }
}
