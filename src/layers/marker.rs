use crate::core::geo::LatLng;
use crate::prelude::HashMap;
use crate::spatial::clustering::{ClusterAggregates, ClusterId, MapFeature};
use std::fmt;
use std::sync::Arc;

/// Identity of a rendered marker: a point id or a cluster id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkerKey {
    Point(Arc<str>),
    Cluster(ClusterId),
}

impl MarkerKey {
    pub fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster(_))
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Point(id) => f.write_str(id),
            Self::Cluster(id) => write!(f, "{}", id),
        }
    }
}

/// Everything the render target needs to draw one marker.
///
/// Hints compare by value: equal hints mean the marker is unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderHints {
    pub position: LatLng,
    pub count: usize,
    pub category: Option<String>,
    pub verified: bool,
    pub vote_score: i64,
    pub author: Option<String>,
    /// Set for clusters only
    pub expansion_zoom: Option<u8>,
    pub aggregates: Option<Arc<ClusterAggregates>>,
}

impl RenderHints {
    pub fn for_feature(feature: &MapFeature) -> Self {
        match feature {
            MapFeature::Point(point) => Self {
                position: point.position(),
                count: 1,
                category: point.properties.category.clone(),
                verified: point.properties.verified,
                vote_score: point.properties.vote_score,
                author: point.properties.author.clone(),
                expansion_zoom: None,
                aggregates: None,
            },
            MapFeature::Cluster(cluster) => Self {
                position: cluster.centroid,
                count: cluster.count,
                category: cluster.dominant_category.clone(),
                verified: cluster.aggregates.verified_count > 0,
                vote_score: cluster.aggregates.vote_max,
                author: None,
                expansion_zoom: Some(cluster.expansion_zoom),
                aggregates: Some(cluster.aggregates.clone()),
            },
        }
    }

    pub fn is_cluster(&self) -> bool {
        self.expansion_zoom.is_some()
    }
}

/// One queued render-target operation
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerOp {
    Add { key: MarkerKey, hints: RenderHints },
    Update { key: MarkerKey, hints: RenderHints },
    Remove { key: MarkerKey },
}

impl MarkerOp {
    pub fn key(&self) -> &MarkerKey {
        match self {
            Self::Add { key, .. } | Self::Update { key, .. } | Self::Remove { key } => key,
        }
    }
}

/// Minimal change set between what is rendered and a new result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerDiff {
    pub adds: Vec<MarkerOp>,
    pub updates: Vec<MarkerOp>,
    pub removes: Vec<MarkerOp>,
}

impl MarkerDiff {
    /// Keys only in `next` are added, keys only in `previous` removed, and
    /// keys in both with different hints updated in place. Unchanged
    /// markers produce no operation.
    pub fn compute<'a>(
        previous: impl IntoIterator<Item = (&'a MarkerKey, &'a RenderHints)>,
        next: &[MapFeature],
    ) -> Self {
        let mut stale: HashMap<&MarkerKey, &RenderHints> = previous.into_iter().collect();
        let mut diff = Self::default();

        for feature in next {
            let key = feature.key();
            let hints = RenderHints::for_feature(feature);
            match stale.remove(&key) {
                None => diff.adds.push(MarkerOp::Add { key, hints }),
                Some(old) if *old != hints => diff.updates.push(MarkerOp::Update { key, hints }),
                Some(_) => {}
            }
        }

        let mut removed: Vec<MarkerKey> = stale.into_keys().cloned().collect();
        removed.sort();
        diff.removes = removed
            .into_iter()
            .map(|key| MarkerOp::Remove { key })
            .collect();
        diff
    }

    pub fn len(&self) -> usize {
        self.adds.len() + self.updates.len() + self.removes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removals first, then updates, then additions
    pub fn into_ops(self) -> impl Iterator<Item = MarkerOp> {
        self.removes
            .into_iter()
            .chain(self.updates)
            .chain(self.adds)
    }
}
