use crate::core::config::AggregationMode;
use crate::core::geo::LatLng;
use crate::data::point::{PointProperties, PointRecord};
use crate::layers::marker::MarkerKey;
use fxhash::FxHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Deterministic cluster identifier.
///
/// Derived from the member id set and the zoom the cluster formed at, so the
/// same cluster hashes equal across rebuilds and across pans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub u64);

impl ClusterId {
    pub(crate) fn derive(members: &MemberDigest, formation_zoom: u8, salt: u32) -> Self {
        let mut hasher = FxHasher::default();
        members.sum.hash(&mut hasher);
        members.xor.hash(&mut hasher);
        members.count.hash(&mut hasher);
        formation_zoom.hash(&mut hasher);
        salt.hash(&mut hasher);
        Self(mix64(hasher.finish()))
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster-{:016x}", self.0)
    }
}

/// Order-independent digest of a set of point ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct MemberDigest {
    sum: u64,
    xor: u64,
    count: u64,
}

impl MemberDigest {
    pub(crate) fn of_point(id: &str) -> Self {
        let mut hasher = FxHasher::default();
        id.hash(&mut hasher);
        let h = mix64(hasher.finish());
        Self {
            sum: h,
            xor: mix64(h ^ 0x9e37_79b9_7f4a_7c15),
            count: 1,
        }
    }

    pub(crate) fn merge(&mut self, other: &MemberDigest) {
        self.sum = self.sum.wrapping_add(other.sum);
        self.xor ^= other.xor;
        self.count += other.count;
    }
}

/// splitmix64 finaliser; FxHash alone mixes short inputs poorly
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryTally {
    pub count: usize,
    /// Sum of non-negative vote scores
    pub votes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub sum: f64,
    pub max: f64,
}

/// Summary of the properties of every point beneath a cluster
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterAggregates {
    pub verified_count: usize,
    pub vote_sum: i64,
    pub vote_max: i64,
    pub categories: BTreeMap<String, CategoryTally>,
    pub fields: BTreeMap<String, FieldStats>,
}

impl ClusterAggregates {
    pub fn from_properties(properties: &PointProperties, fields: &[String]) -> Self {
        let mut categories = BTreeMap::new();
        if let Some(category) = &properties.category {
            categories.insert(
                category.clone(),
                CategoryTally {
                    count: 1,
                    votes: properties.vote_score.max(0),
                },
            );
        }

        let fields = fields
            .iter()
            .filter_map(|name| {
                properties
                    .numeric
                    .get(name)
                    .filter(|v| v.is_finite())
                    .map(|v| (name.clone(), FieldStats { sum: *v, max: *v }))
            })
            .collect();

        Self {
            verified_count: usize::from(properties.verified),
            vote_sum: properties.vote_score,
            vote_max: properties.vote_score,
            categories,
            fields,
        }
    }

    pub fn merge(&mut self, other: &ClusterAggregates) {
        self.verified_count += other.verified_count;
        self.vote_sum = self.vote_sum.saturating_add(other.vote_sum);
        self.vote_max = self.vote_max.max(other.vote_max);

        for (name, tally) in &other.categories {
            let entry = self.categories.entry(name.clone()).or_default();
            entry.count += tally.count;
            entry.votes = entry.votes.saturating_add(tally.votes);
        }

        for (name, stats) in &other.fields {
            self.fields
                .entry(name.clone())
                .and_modify(|s| {
                    s.sum += stats.sum;
                    s.max = s.max.max(stats.max);
                })
                .or_insert(*stats);
        }
    }

    /// Category with the greatest weight; ties go to the lexically smallest name.
    ///
    /// Vote weighting falls back to plain counts when no member has positive votes.
    pub fn dominant_category(&self, mode: AggregationMode) -> Option<&str> {
        let use_votes = mode == AggregationMode::VoteWeighted
            && self.categories.values().any(|t| t.votes > 0);

        let mut best: Option<(&str, i64)> = None;
        for (name, tally) in &self.categories {
            let weight = if use_votes {
                tally.votes
            } else {
                tally.count as i64
            };
            match best {
                Some((_, w)) if w >= weight => {}
                _ => best = Some((name.as_str(), weight)),
            }
        }
        best.map(|(name, _)| name)
    }
}

/// An aggregate of nearby points at one zoom level
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    /// Count-weighted mean of member positions (in projected space)
    pub centroid: LatLng,
    pub count: usize,
    pub aggregates: Arc<ClusterAggregates>,
    pub dominant_category: Option<String>,
    /// Lowest zoom at which this cluster splits into its children
    pub expansion_zoom: u8,
}

/// One entry of a query result: a cluster, or a single point
#[derive(Debug, Clone, PartialEq)]
pub enum MapFeature {
    Point(Arc<PointRecord>),
    Cluster(Cluster),
}

impl MapFeature {
    /// Identity used for marker diffing
    pub fn key(&self) -> MarkerKey {
        match self {
            Self::Point(point) => MarkerKey::Point(point.id.clone()),
            Self::Cluster(cluster) => MarkerKey::Cluster(cluster.id),
        }
    }

    pub fn position(&self) -> LatLng {
        match self {
            Self::Point(point) => point.position(),
            Self::Cluster(cluster) => cluster.centroid,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::Cluster(cluster) => cluster.count,
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster(_))
    }

    pub fn as_cluster(&self) -> Option<&Cluster> {
        match self {
            Self::Cluster(cluster) => Some(cluster),
            Self::Point(_) => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        match self {
            Self::Point(point) => point.properties.verified,
            Self::Cluster(cluster) => cluster.aggregates.verified_count > 0,
        }
    }

    /// Vote score used for render-budget priority
    pub fn vote_score(&self) -> i64 {
        match self {
            Self::Point(point) => point.properties.vote_score,
            Self::Cluster(cluster) => cluster.aggregates.vote_max,
        }
    }
}
