pub mod clustering;
pub mod index;
pub mod query;

pub use clustering::{Cluster, ClusterAggregates, ClusterId, MapFeature};
pub use index::SpatialIndex;
pub use query::{ClusterQueryEngine, QueryResult};
