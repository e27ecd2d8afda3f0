pub mod geojson;
pub mod point;

pub use geojson::{read_points, write_result, GeoJson, GeoJsonImport};
pub use point::{BuildSummary, DataVersion, DropReason, PointProperties, PointRecord};
