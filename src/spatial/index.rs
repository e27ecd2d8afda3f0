//! Per-zoom cluster hierarchy over one point snapshot
//!
//! Built bottom-up: the level above `max_zoom` holds every valid point, and
//! each lower level greedily merges the nodes of the level above it that lie
//! within the cluster radius (measured in projected pixels at that zoom).
//! Nodes that do not merge are carried down unchanged, so a cluster keeps
//! its id for as long as its membership is unchanged.

use crate::core::bounds::Bounds;
use crate::core::config::{AggregationMode, EngineConfig, ZoomRange};
use crate::core::geo::{LatLng, LatLngBounds, Point};
use crate::data::point::{BuildSummary, DataVersion, DropReason, PointRecord};
use crate::prelude::{HashMap, HashSet};
use crate::spatial::clustering::{Cluster, ClusterAggregates, ClusterId, MapFeature, MemberDigest};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::sync::Arc;

/// A node position stored in a per-level R-tree
#[derive(Debug, Clone, Copy)]
struct IndexedNode {
    position: [f64; 2],
    /// Index of the node within its level
    slot: u32,
    /// Index into the node arena
    node: u32,
}

// --- rstar integration -------------------------------------------------------------------------

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Point(u32),
    Cluster {
        id: ClusterId,
        formation_zoom: u8,
        children: Vec<u32>,
    },
}

#[derive(Debug, Clone)]
struct Node {
    position: Point,
    count: usize,
    digest: MemberDigest,
    aggregates: Arc<ClusterAggregates>,
    kind: NodeKind,
}

struct ZoomLevel {
    zoom: u8,
    nodes: Vec<u32>,
    tree: RTree<IndexedNode>,
}

impl ZoomLevel {
    fn new(zoom: u8, nodes: Vec<u32>, arena: &[Node]) -> Self {
        let items = nodes
            .iter()
            .enumerate()
            .map(|(slot, &node)| IndexedNode {
                position: arena[node as usize].position.to_array(),
                slot: slot as u32,
                node,
            })
            .collect();
        Self {
            zoom,
            nodes,
            tree: RTree::bulk_load(items),
        }
    }
}

/// Read-only cluster hierarchy. Rebuilt wholesale for every snapshot.
pub struct SpatialIndex {
    version: DataVersion,
    zoom_range: ZoomRange,
    radius_px: f64,
    tile_size: f64,
    aggregation: AggregationMode,
    points: Vec<Arc<PointRecord>>,
    arena: Vec<Node>,
    /// `levels[i]` holds zoom `min + i`; the last level is `max + 1`
    levels: Vec<ZoomLevel>,
    clusters: HashMap<ClusterId, u32>,
    summary: BuildSummary,
}

impl SpatialIndex {
    /// Builds the hierarchy, dropping (and counting) invalid or duplicate records.
    ///
    /// Zero valid points yields an empty index; every query on it is empty.
    pub fn build(
        records: impl IntoIterator<Item = PointRecord>,
        version: DataVersion,
        config: &EngineConfig,
    ) -> Self {
        let mut summary = BuildSummary::new(version);
        let mut seen: HashSet<Arc<str>> = HashSet::default();
        let mut points = Vec::new();

        for record in records {
            if let Err(reason) = record.check() {
                log::debug!(
                    "dropping point {} ({}, {}): {:?}",
                    record.id,
                    record.latitude,
                    record.longitude,
                    reason
                );
                summary.record_drop(reason);
                continue;
            }
            if !seen.insert(record.id.clone()) {
                log::debug!("dropping point {}: {:?}", record.id, DropReason::DuplicateId);
                summary.record_drop(DropReason::DuplicateId);
                continue;
            }
            points.push(Arc::new(record));
        }

        // Input order must not influence clustering
        points.sort_by(|a, b| a.id.cmp(&b.id));
        summary.indexed = points.len();

        let mut index = Self {
            version,
            zoom_range: config.zoom_levels,
            radius_px: config.cluster_radius_px,
            tile_size: config.tile_size,
            aggregation: config.aggregation,
            points,
            arena: Vec::new(),
            levels: Vec::new(),
            clusters: HashMap::default(),
            summary,
        };
        index.build_levels(config);

        log::info!(
            "built spatial index {}: {} indexed, {} dropped, {} clusters over zooms {}..={}",
            version,
            index.summary.indexed,
            index.summary.dropped,
            index.clusters.len(),
            index.zoom_range.min,
            index.zoom_range.max
        );
        index
    }

    fn build_levels(&mut self, config: &EngineConfig) {
        self.arena.reserve(self.points.len() * 2);
        for (i, point) in self.points.iter().enumerate() {
            self.arena.push(Node {
                position: point.position().project(),
                count: 1,
                digest: MemberDigest::of_point(&point.id),
                aggregates: Arc::new(ClusterAggregates::from_properties(
                    &point.properties,
                    &config.aggregate_fields,
                )),
                kind: NodeKind::Point(i as u32),
            });
        }

        let top_zoom = self.zoom_range.max + 1;
        let leaves: Vec<u32> = (0..self.arena.len() as u32).collect();
        let mut levels = vec![ZoomLevel::new(top_zoom, leaves, &self.arena)];

        for zoom in (self.zoom_range.min..=self.zoom_range.max).rev() {
            let nodes = match levels.last() {
                Some(above) => self.cluster_level(above, zoom, config.min_cluster_points),
                None => Vec::new(),
            };
            levels.push(ZoomLevel::new(zoom, nodes, &self.arena));
        }

        levels.reverse();
        self.levels = levels;
    }

    /// Greedily merges the nodes of `above` into the node set for `zoom`
    fn cluster_level(&mut self, above: &ZoomLevel, zoom: u8, min_points: usize) -> Vec<u32> {
        let radius = self.radius_at(zoom);
        let radius_2 = radius * radius;
        let mut processed = vec![false; above.nodes.len()];
        let mut next = Vec::with_capacity(above.nodes.len());

        for slot in 0..above.nodes.len() {
            if processed[slot] {
                continue;
            }
            processed[slot] = true;
            let node_idx = above.nodes[slot];
            let origin = self.arena[node_idx as usize].position.to_array();

            let mut neighbors: Vec<&IndexedNode> = above
                .tree
                .locate_within_distance(origin, radius_2)
                .filter(|n| !processed[n.slot as usize])
                .collect();
            neighbors.sort_by_key(|n| n.slot);

            let total: usize = self.arena[node_idx as usize].count
                + neighbors
                    .iter()
                    .map(|n| self.arena[n.node as usize].count)
                    .sum::<usize>();

            if neighbors.is_empty() || total < min_points {
                next.push(node_idx);
                continue;
            }

            let mut members = Vec::with_capacity(neighbors.len() + 1);
            members.push(node_idx);
            for neighbor in &neighbors {
                processed[neighbor.slot as usize] = true;
                members.push(neighbor.node);
            }
            next.push(self.merge(&members, zoom));
        }

        next
    }

    fn merge(&mut self, members: &[u32], zoom: u8) -> u32 {
        let mut weighted = Point::default();
        let mut count = 0usize;
        let mut digest = MemberDigest::default();
        // seeded from the first member so maxima start from real values
        let mut aggregates = ClusterAggregates::clone(&self.arena[members[0] as usize].aggregates);

        for (i, &member) in members.iter().enumerate() {
            let node = &self.arena[member as usize];
            weighted = weighted.add(&node.position.multiply(node.count as f64));
            count += node.count;
            digest.merge(&node.digest);
            if i > 0 {
                aggregates.merge(&node.aggregates);
            }
        }

        let mut salt = 0;
        let mut id = ClusterId::derive(&digest, zoom, salt);
        while self.clusters.contains_key(&id) {
            salt += 1;
            log::warn!("cluster id collision at zoom {}, rehashing with salt {}", zoom, salt);
            id = ClusterId::derive(&digest, zoom, salt);
        }

        let idx = self.arena.len() as u32;
        self.arena.push(Node {
            position: weighted.multiply(1.0 / count as f64),
            count,
            digest,
            aggregates: Arc::new(aggregates),
            kind: NodeKind::Cluster {
                id,
                formation_zoom: zoom,
                children: members.to_vec(),
            },
        });
        self.clusters.insert(id, idx);
        idx
    }

    /// Cluster radius in projected units at `zoom`
    pub fn radius_at(&self, zoom: u8) -> f64 {
        self.radius_px / (self.tile_size * 2_f64.powi(zoom as i32))
    }

    /// Every cluster and point at the indexed level for `zoom` whose centroid
    /// lies within `bounds` expanded by one cluster radius.
    ///
    /// Results are sorted by marker key, so identical inputs give identical output.
    pub fn query(&self, bounds: &LatLngBounds, zoom: f64) -> Vec<MapFeature> {
        let Some(level) = self.level(zoom) else {
            return Vec::new();
        };
        let margin = self.radius_at(level.zoom);

        let mut hits: HashSet<u32> = HashSet::default();
        for range in Bounds::project(bounds) {
            let envelope = range.expanded(margin).envelope();
            hits.extend(level.tree.locate_in_envelope(&envelope).map(|n| n.node));
        }

        let mut features: Vec<MapFeature> = hits.into_iter().map(|n| self.feature(n)).collect();
        features.sort_by_key(|f| f.key());
        features
    }

    /// The subset of `features` that [`SpatialIndex::query`] would return for
    /// `bounds` at `zoom`, in their original order.
    ///
    /// Used to narrow a result cached for a wider region down to one viewport.
    pub fn retain_visible(
        &self,
        features: &[MapFeature],
        bounds: &LatLngBounds,
        zoom: f64,
    ) -> Vec<MapFeature> {
        let margin = self.radius_at(self.zoom_range.level_for(zoom));
        let ranges: Vec<Bounds> = Bounds::project(bounds)
            .iter()
            .map(|range| range.expanded(margin))
            .collect();

        features
            .iter()
            .filter(|feature| {
                let position = self.projected(feature);
                ranges.iter().any(|range| range.contains(&position))
            })
            .cloned()
            .collect()
    }

    /// Position a feature was indexed at
    fn projected(&self, feature: &MapFeature) -> Point {
        match feature {
            MapFeature::Cluster(cluster) => match self.clusters.get(&cluster.id) {
                Some(&node) => self.arena[node as usize].position,
                None => cluster.centroid.project(),
            },
            MapFeature::Point(point) => point.position().project(),
        }
    }

    /// Immediate constituents of a cluster, sorted by marker key.
    ///
    /// `None` when the id is unknown to this index (e.g. issued by an older build).
    pub fn get_children(&self, id: ClusterId, limit: Option<usize>) -> Option<Vec<MapFeature>> {
        let node = self.clusters.get(&id)?;
        let NodeKind::Cluster { children, .. } = &self.arena[*node as usize].kind else {
            return None;
        };
        let mut features: Vec<MapFeature> = children.iter().map(|c| self.feature(*c)).collect();
        features.sort_by_key(|f| f.key());
        if let Some(limit) = limit {
            features.truncate(limit);
        }
        Some(features)
    }

    /// Original points beneath a cluster in id order, paged by `offset`/`limit`
    pub fn get_leaves(
        &self,
        id: ClusterId,
        limit: usize,
        offset: usize,
    ) -> Option<Vec<Arc<PointRecord>>> {
        let root = *self.clusters.get(&id)?;
        let mut leaves = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match &self.arena[node as usize].kind {
                NodeKind::Point(i) => leaves.push(*i),
                NodeKind::Cluster { children, .. } => stack.extend(children.iter().copied()),
            }
        }
        // points are stored in id order
        leaves.sort_unstable();
        Some(
            leaves
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|i| self.points[i as usize].clone())
                .collect(),
        )
    }

    /// Lowest zoom at which the cluster splits into its children
    pub fn expansion_zoom(&self, id: ClusterId) -> Option<u8> {
        let node = self.clusters.get(&id)?;
        match &self.arena[*node as usize].kind {
            NodeKind::Cluster { formation_zoom, .. } => Some(formation_zoom + 1),
            NodeKind::Point(_) => None,
        }
    }

    fn level(&self, zoom: f64) -> Option<&ZoomLevel> {
        let level = self.zoom_range.level_for(zoom);
        self.levels.get((level - self.zoom_range.min) as usize)
    }

    fn feature(&self, node: u32) -> MapFeature {
        let node = &self.arena[node as usize];
        match &node.kind {
            NodeKind::Point(i) => MapFeature::Point(self.points[*i as usize].clone()),
            NodeKind::Cluster {
                id, formation_zoom, ..
            } => MapFeature::Cluster(Cluster {
                id: *id,
                centroid: LatLng::unproject(node.position),
                count: node.count,
                dominant_category: node
                    .aggregates
                    .dominant_category(self.aggregation)
                    .map(str::to_string),
                aggregates: node.aggregates.clone(),
                expansion_zoom: formation_zoom + 1,
            }),
        }
    }

    pub fn version(&self) -> DataVersion {
        self.version
    }

    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    pub fn zoom_range(&self) -> ZoomRange {
        self.zoom_range
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of nodes (clusters and carried points) at the level for `zoom`
    pub fn nodes_at(&self, zoom: f64) -> usize {
        self.level(zoom).map(|l| l.nodes.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("version", &self.version)
            .field("points", &self.points.len())
            .field("clusters", &self.clusters.len())
            .field("zoom_range", &self.zoom_range)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::point::PointProperties;

    fn config(min: u8, max: u8) -> EngineConfig {
        EngineConfig {
            zoom_levels: ZoomRange::new(min, max),
            ..EngineConfig::default()
        }
    }

    fn total_count(features: &[MapFeature]) -> usize {
        features.iter().map(MapFeature::count).sum()
    }

    #[test]
    fn test_empty_index_is_valid() {
        let index = SpatialIndex::build(Vec::new(), DataVersion(1), &config(0, 16));
        assert!(index.is_empty());
        assert!(index.query(&LatLngBounds::world(), 0.0).is_empty());
        assert!(index.query(&LatLngBounds::world(), 17.0).is_empty());
    }

    #[test]
    fn test_invalid_and_duplicate_points_dropped() {
        let points = vec![
            PointRecord::new("a", 10.0, 10.0),
            PointRecord::new("b", 95.0, 10.0),
            PointRecord::new("c", 10.0, f64::NAN),
            PointRecord::new("a", 20.0, 20.0),
            PointRecord::new("d", -10.0, -10.0),
        ];
        let index = SpatialIndex::build(points, DataVersion(1), &config(0, 10));
        let summary = index.summary();
        assert_eq!(summary.indexed, 2);
        assert_eq!(summary.dropped, 3);
        assert_eq!(summary.dropped_for(DropReason::DuplicateId), 1);

        let leaves = index.query(&LatLngBounds::world(), 11.0);
        let ids: Vec<_> = leaves.iter().map(|f| f.key().to_string()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        // the first record with a duplicated id wins
        assert_eq!(leaves[0].position(), LatLng::new(10.0, 10.0));
    }

    #[test]
    fn test_close_points_cluster_and_split() {
        let points = vec![
            PointRecord::new("a", 40.0000, -74.0000),
            PointRecord::new("b", 40.0001, -74.0001),
            PointRecord::new("c", 40.0002, -74.0000),
            PointRecord::new("far", -33.0, 151.0),
        ];
        let index = SpatialIndex::build(points, DataVersion(1), &config(0, 16));

        let low = index.query(&LatLngBounds::world(), 3.0);
        assert_eq!(low.len(), 2);
        assert_eq!(total_count(&low), 4);
        let cluster = low.iter().find_map(MapFeature::as_cluster).unwrap();
        assert_eq!(cluster.count, 3);
        assert!((cluster.centroid.lat - 40.0001).abs() < 1e-6);

        let high = index.query(&LatLngBounds::world(), 17.0);
        assert_eq!(high.len(), 4);
        assert!(high.iter().all(|f| !f.is_cluster()));
    }

    #[test]
    fn test_children_leaves_and_expansion() {
        let mut points = Vec::new();
        for i in 0..6 {
            points.push(PointRecord::new(
                format!("p{i}"),
                10.0 + i as f64 * 0.001,
                20.0,
            ));
        }
        let index = SpatialIndex::build(points, DataVersion(1), &config(0, 16));
        let top = index.query(&LatLngBounds::world(), 0.0);
        assert_eq!(top.len(), 1);
        let cluster = top[0].as_cluster().unwrap().clone();
        assert_eq!(cluster.count, 6);

        let children = index.get_children(cluster.id, None).unwrap();
        assert!(children.len() >= 2);
        assert_eq!(total_count(&children), 6);
        assert_eq!(index.get_children(cluster.id, Some(1)).unwrap().len(), 1);

        // children are what the next level shows
        let at_expansion = index.query(&LatLngBounds::world(), cluster.expansion_zoom as f64);
        let child_keys: Vec<_> = children.iter().map(MapFeature::key).collect();
        let expansion_keys: Vec<_> = at_expansion.iter().map(MapFeature::key).collect();
        assert_eq!(child_keys, expansion_keys);
        assert_eq!(index.expansion_zoom(cluster.id), Some(cluster.expansion_zoom));

        let leaves = index.get_leaves(cluster.id, 4, 1).unwrap();
        let ids: Vec<_> = leaves.iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3", "p4"]);

        assert!(index.get_children(ClusterId(42), None).is_none());
    }

    #[test]
    fn test_cluster_ids_stable_across_rebuilds() {
        let make = |extra: bool| {
            let mut points = vec![
                PointRecord::new("a", 0.0, 0.0),
                PointRecord::new("b", 0.0001, 0.0001),
                PointRecord::new("c", 50.0, 50.0),
            ];
            if extra {
                points.push(PointRecord::new("z", -50.0, -120.0));
            }
            points.reverse();
            points
        };
        let first = SpatialIndex::build(make(false), DataVersion(1), &config(0, 16));
        let second = SpatialIndex::build(make(true), DataVersion(2), &config(0, 16));

        let bounds = LatLngBounds::from_wsen(-1.0, -1.0, 1.0, 1.0);
        let a = first.query(&bounds, 8.0);
        let b = second.query(&bounds, 8.0);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].key(), b[0].key());
    }

    #[test]
    fn test_antimeridian_query() {
        let points = vec![
            PointRecord::new("east", 0.0, 179.5),
            PointRecord::new("west", 0.0, -179.5),
            PointRecord::new("middle", 0.0, 0.0),
        ];
        let index = SpatialIndex::build(points, DataVersion(1), &config(0, 16));
        let bounds = LatLngBounds::from_wsen(178.0, -5.0, -178.0, 5.0);
        let keys: Vec<_> = index
            .query(&bounds, 12.0)
            .iter()
            .map(|f| f.key().to_string())
            .collect();
        assert_eq!(keys, vec!["east", "west"]);
    }

    #[test]
    fn test_aggregates_follow_members() {
        let points = vec![
            PointRecord::new("a", 1.0, 1.0).with_properties(
                PointProperties::default()
                    .with_category("art")
                    .verified(true)
                    .with_votes(3),
            ),
            PointRecord::new("b", 1.0001, 1.0)
                .with_properties(PointProperties::default().with_category("art").with_votes(5)),
            PointRecord::new("c", 1.0, 1.0001)
                .with_properties(PointProperties::default().with_category("food")),
        ];
        let index = SpatialIndex::build(points, DataVersion(1), &config(0, 16));
        let top = index.query(&LatLngBounds::world(), 0.0);
        let cluster = top[0].as_cluster().unwrap();
        assert_eq!(cluster.aggregates.verified_count, 1);
        assert_eq!(cluster.aggregates.vote_sum, 8);
        assert_eq!(cluster.aggregates.vote_max, 5);
        assert_eq!(cluster.dominant_category.as_deref(), Some("art"));
    }
}
