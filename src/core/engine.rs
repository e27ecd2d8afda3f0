//! The clustering pipeline
//!
//! [`ClusterEngine::tick`] is driven by the host's event loop. Each call does
//! a bounded amount of work, in this order:
//!
//! 1. hand new point snapshots to the build queue
//! 2. feed raw viewport moves to the tracker
//! 3. install a finished index (flushing the cache) if one is ready
//! 4. resolve the settled viewport and queue the marker diff when the
//!    viewport settled or the index changed
//! 5. apply one commit batch to the render target
//! 6. collect marker interactions
//!
//! Until the first index is installed queries report `not_ready`, and while
//! a rebuild runs the previous index and rendered set stay on screen.

use crate::background::spatial::IndexBuildQueue;
use crate::background::tasks::BuildExecutor;
use crate::cache::ResultCache;
use crate::core::config::EngineConfig;
use crate::core::viewport::Viewport;
use crate::data::point::{BuildSummary, DataVersion, PointRecord};
use crate::input::events::{MarkerInteraction, SettleReason};
use crate::input::tracker::ViewportTracker;
use crate::layers::manager::{CommitStats, DiffCounts, MarkerLifecycleManager};
use crate::runtime::FrameScheduler;
use crate::spatial::clustering::{ClusterId, MapFeature};
use crate::spatial::index::SpatialIndex;
use crate::spatial::query::{ClusterQueryEngine, QueryResult};
use crate::traits::{PointStore, RenderTarget};
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use instant::Instant;
use std::sync::Arc;

type Snapshot = (Vec<PointRecord>, DataVersion);

/// What one `tick` did
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Summary of an index installed during this tick
    pub installed: Option<BuildSummary>,
    pub settled: Option<SettleReason>,
    /// Result resolved during this tick
    pub result: Option<Arc<QueryResult>>,
    pub diff: Option<DiffCounts>,
    pub commit: CommitStats,
    pub interactions: Vec<MarkerInteraction>,
}

impl TickOutcome {
    /// Nothing happened and nothing is left to do for now
    pub fn is_quiet(&self) -> bool {
        self.installed.is_none()
            && self.settled.is_none()
            && self.result.is_none()
            && self.commit.attempted() == 0
            && self.interactions.is_empty()
    }
}

/// Click-to-expand answer for one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterExpansion {
    pub cluster_id: ClusterId,
    /// Zoom at which the cluster splits
    pub zoom: u8,
    pub children: Vec<MapFeature>,
}

pub struct ClusterEngine {
    config: Arc<EngineConfig>,
    index: Option<Arc<SpatialIndex>>,
    builds: IndexBuildQueue,
    tracker: ViewportTracker,
    query: ClusterQueryEngine,
    cache: ResultCache,
    markers: MarkerLifecycleManager,
    snapshot_tx: Sender<Snapshot>,
    snapshot_rx: Receiver<Snapshot>,
    viewport_tx: Sender<Viewport>,
    viewport_rx: Receiver<Viewport>,
    last_result: Option<Arc<QueryResult>>,
    requery: bool,
}

impl ClusterEngine {
    pub fn new(config: EngineConfig, executor: Arc<dyn BuildExecutor>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (snapshot_tx, snapshot_rx) = unbounded();
        let (viewport_tx, viewport_rx) = unbounded();

        log::debug!(
            "creating cluster engine: radius {}px, zooms {}..={}, batch {}, {} builds",
            config.cluster_radius_px,
            config.zoom_levels.min,
            config.zoom_levels.max,
            config.commit_batch_size,
            executor.name()
        );

        Ok(Self {
            builds: IndexBuildQueue::new(executor, config.clone()),
            tracker: ViewportTracker::from_config(&config),
            query: ClusterQueryEngine::new(config.clone()),
            cache: ResultCache::new(config.cache_capacity),
            markers: MarkerLifecycleManager::new(config.commit_batch_size),
            config,
            index: None,
            snapshot_tx,
            snapshot_rx,
            viewport_tx,
            viewport_rx,
            last_result: None,
            requery: false,
        })
    }

    /// Subscribes to `store` and queues a build of its current snapshot
    pub fn attach_store<S>(&mut self, store: &mut S) -> Result<()>
    where
        S: PointStore + ?Sized,
    {
        let tx = self.snapshot_tx.clone();
        store.subscribe(Box::new(move |points: Vec<PointRecord>, version: DataVersion| {
            let _ = tx.send((points, version));
        }));
        let (points, version) = store.snapshot();
        self.load_snapshot(points, version)
    }

    /// Routes the target's viewport changes to the tracker and settles its
    /// current viewport immediately
    pub fn attach_target<T>(&mut self, target: &mut T)
    where
        T: RenderTarget + ?Sized,
    {
        let tx = self.viewport_tx.clone();
        target.on_viewport_change(Box::new(move |viewport: Viewport| {
            let _ = tx.send(viewport);
        }));
        self.tracker.settle_now(target.get_viewport());
        self.requery = true;
    }

    /// Queues a build for a snapshot. Older snapshots are ignored.
    pub fn load_snapshot(&mut self, points: Vec<PointRecord>, version: DataVersion) -> Result<()> {
        if self.index.as_ref().is_some_and(|i| version <= i.version()) {
            log::debug!("ignoring snapshot {} at or below installed index", version);
            return Ok(());
        }
        self.builds.submit(points, version)?;
        Ok(())
    }

    /// Records a raw viewport move, for hosts that do not use `attach_target`
    pub fn viewport_changed(&mut self, viewport: Viewport, now: Instant) {
        self.tracker.on_move(viewport, now);
    }

    /// Settles `viewport` without waiting for the debounce window
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.tracker.settle_now(viewport);
        self.requery = true;
    }

    pub fn tick<T>(&mut self, target: &mut T, now: Instant) -> Result<TickOutcome>
    where
        T: RenderTarget + ?Sized,
    {
        let mut outcome = TickOutcome::default();

        let snapshots: Vec<Snapshot> = self.snapshot_rx.try_iter().collect();
        for (points, version) in snapshots {
            self.load_snapshot(points, version)?;
        }

        for viewport in self.viewport_rx.try_iter() {
            self.tracker.on_move(viewport, now);
        }

        let installed = self.index.as_ref().map(|i| i.version());
        if let Some(built) = self.builds.poll_latest(installed) {
            let summary = built.index.summary().clone();
            log::info!(
                "installing index {} ({} points, {} dropped) built in {:?}",
                summary.version,
                summary.indexed,
                summary.dropped,
                built.elapsed
            );
            self.index = Some(Arc::new(built.index));
            self.cache.invalidate_all();
            self.requery = true;
            outcome.installed = Some(summary);
        }

        if let Some(event) = self.tracker.poll(now) {
            outcome.settled = Some(event.reason);
            self.requery = true;
        }

        if self.requery {
            self.requery = false;
            if let Some(viewport) = self.tracker.last_settled().copied() {
                let (result, diff) = self.resolve_and_commit(&viewport, now)?;
                outcome.result = Some(result);
                outcome.diff = Some(diff);
            }
        }

        outcome.commit = self.markers.run_batch(target);
        outcome.interactions = self.markers.take_interactions();
        Ok(outcome)
    }

    fn resolve_and_commit(
        &mut self,
        viewport: &Viewport,
        now: Instant,
    ) -> Result<(Arc<QueryResult>, DiffCounts)> {
        let version = self.index.as_ref().map(|i| i.version()).unwrap_or_default();
        let result = self.query.resolve_at(
            self.index.as_deref(),
            viewport,
            version,
            &mut self.cache,
            now,
        )?;

        if result.not_ready {
            // keep whatever is on screen until there is an index to show
            let result = Arc::new(result);
            self.last_result = Some(result.clone());
            return Ok((result, DiffCounts::default()));
        }

        let diff = self.markers.commit(&result);
        self.tracker.set_cluster_boundaries(
            result
                .features
                .iter()
                .filter_map(MapFeature::as_cluster)
                .map(|c| c.expansion_zoom),
        );
        let result = Arc::new(result);
        self.last_result = Some(result.clone());
        Ok((result, diff))
    }

    /// Applies every queued batch, yielding to `scheduler` between batches
    pub async fn flush<T, S>(&mut self, target: &mut T, scheduler: &S) -> CommitStats
    where
        T: RenderTarget + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        self.markers.drain(target, scheduler).await
    }

    /// Expansion zoom and children of a cluster in the installed index
    pub fn expand(&self, cluster_id: ClusterId) -> Option<ClusterExpansion> {
        let index = self.index.as_ref()?;
        Some(ClusterExpansion {
            cluster_id,
            zoom: index.expansion_zoom(cluster_id)?,
            children: index.get_children(cluster_id, None)?,
        })
    }

    pub fn get_leaves(
        &self,
        cluster_id: ClusterId,
        limit: usize,
        offset: usize,
    ) -> Option<Vec<Arc<PointRecord>>> {
        self.index.as_ref()?.get_leaves(cluster_id, limit, offset)
    }

    /// Removes every rendered marker and drops the index and cache
    pub fn teardown<T>(&mut self, target: &mut T) -> CommitStats
    where
        T: RenderTarget + ?Sized,
    {
        let stats = self.markers.teardown(target);
        self.cache.invalidate_all();
        self.index = None;
        self.last_result = None;
        self.requery = false;
        stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> Option<&SpatialIndex> {
        self.index.as_deref()
    }

    pub fn data_version(&self) -> Option<DataVersion> {
        self.index.as_ref().map(|i| i.version())
    }

    pub fn last_result(&self) -> Option<&Arc<QueryResult>> {
        self.last_result.as_ref()
    }

    pub fn markers(&self) -> &MarkerLifecycleManager {
        &self.markers
    }

    pub fn tracker(&self) -> &ViewportTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn is_building(&self) -> bool {
        self.builds.is_building()
    }

    /// Sender hosts can hand to a point source living elsewhere
    pub fn snapshot_sender(&self) -> Sender<(Vec<PointRecord>, DataVersion)> {
        self.snapshot_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::tasks::InlineExecutor;
    use crate::core::geo::LatLngBounds;
    use crate::layers::marker::{MarkerKey, RenderHints};
    use crate::prelude::HashMap;
    use crate::traits::{
        InteractionCallback, MarkerHandle, RenderTargetError, SnapshotCallback, ViewportCallback,
    };
    use std::time::Duration;

    struct Surface {
        viewport: Viewport,
        next: u64,
        markers: HashMap<MarkerHandle, MarkerKey>,
        on_move: Option<ViewportCallback>,
    }

    impl Surface {
        fn new(viewport: Viewport) -> Self {
            Self {
                viewport,
                next: 0,
                markers: HashMap::default(),
                on_move: None,
            }
        }

        fn pan(&mut self, viewport: Viewport) {
            self.viewport = viewport;
            if let Some(cb) = self.on_move.as_mut() {
                cb(viewport);
            }
        }
    }

    impl RenderTarget for Surface {
        fn place_marker(
            &mut self,
            key: &MarkerKey,
            _lat: f64,
            _lon: f64,
            _hints: &RenderHints,
        ) -> std::result::Result<MarkerHandle, RenderTargetError> {
            self.next += 1;
            self.markers.insert(MarkerHandle(self.next), key.clone());
            Ok(MarkerHandle(self.next))
        }

        fn update_marker(
            &mut self,
            _handle: MarkerHandle,
            _hints: &RenderHints,
        ) -> std::result::Result<(), RenderTargetError> {
            Ok(())
        }

        fn remove_marker(
            &mut self,
            handle: MarkerHandle,
        ) -> std::result::Result<(), RenderTargetError> {
            self.markers.remove(&handle);
            Ok(())
        }

        fn get_viewport(&self) -> Viewport {
            self.viewport
        }

        fn on_viewport_change(&mut self, callback: ViewportCallback) {
            self.on_move = Some(callback);
        }

        fn on_marker_interaction(
            &mut self,
            _handle: MarkerHandle,
            _callback: InteractionCallback,
        ) -> std::result::Result<(), RenderTargetError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Store {
        points: Vec<PointRecord>,
        version: DataVersion,
        subscribers: Vec<SnapshotCallback>,
    }

    impl Store {
        fn publish(&mut self, points: Vec<PointRecord>) {
            self.version = self.version.next();
            self.points = points;
            for cb in self.subscribers.iter_mut() {
                cb(self.points.clone(), self.version);
            }
        }
    }

    impl PointStore for Store {
        fn subscribe(&mut self, on_snapshot: SnapshotCallback) {
            self.subscribers.push(on_snapshot);
        }

        fn snapshot(&self) -> (Vec<PointRecord>, DataVersion) {
            (self.points.clone(), self.version)
        }
    }

    fn engine() -> ClusterEngine {
        let config = EngineConfig {
            commit_batch_size: 5,
            ..EngineConfig::default()
        };
        ClusterEngine::new(config, Arc::new(InlineExecutor)).unwrap()
    }

    fn europe() -> Viewport {
        Viewport::new(LatLngBounds::from_wsen(-10.0, 35.0, 30.0, 60.0), 8.0)
    }

    fn spread(n: usize) -> Vec<PointRecord> {
        (0..n)
            .map(|i| PointRecord::new(format!("p{i}"), 36.0 + i as f64, -9.0 + i as f64 * 1.5))
            .collect()
    }

    #[test]
    fn test_not_ready_before_first_snapshot() {
        let mut engine = engine();
        let mut surface = Surface::new(europe());
        engine.attach_target(&mut surface);
        let outcome = engine.tick(&mut surface, Instant::now()).unwrap();
        assert!(outcome.result.unwrap().not_ready);
        assert_eq!(engine.markers().rendered_len(), 0);
    }

    #[test]
    fn test_snapshot_to_markers() {
        let mut engine = engine();
        let mut store = Store::default();
        store.publish(spread(12));
        let mut surface = Surface::new(europe());

        engine.attach_store(&mut store).unwrap();
        engine.attach_target(&mut surface);

        let now = Instant::now();
        let first = engine.tick(&mut surface, now).unwrap();
        assert_eq!(first.installed.unwrap().indexed, 12);
        let result = first.result.unwrap();
        assert!(!result.not_ready);
        assert_eq!(result.len(), 12);
        assert_eq!(first.commit.placed, 5);

        futures::executor::block_on(engine.flush(&mut surface, &crate::runtime::ImmediateScheduler));
        assert_eq!(engine.markers().rendered_len(), result.len());
        assert_eq!(surface.markers.len(), result.len());
    }

    #[test]
    fn test_new_snapshot_flushes_cache_and_requeries() {
        let mut engine = engine();
        let mut store = Store::default();
        store.publish(spread(12));
        let mut surface = Surface::new(europe());
        engine.attach_store(&mut store).unwrap();
        engine.attach_target(&mut surface);
        let now = Instant::now();
        engine.tick(&mut surface, now).unwrap();

        store.publish(spread(6));
        let outcome = engine.tick(&mut surface, now).unwrap();
        assert_eq!(outcome.installed.unwrap().version, DataVersion(2));
        let result = outcome.result.unwrap();
        assert!(!result.from_cache);
        assert_eq!(result.point_count(), 6);
    }

    #[test]
    fn test_pan_waits_for_debounce() {
        let mut engine = engine();
        let mut store = Store::default();
        store.publish(spread(12));
        let mut surface = Surface::new(europe());
        engine.attach_store(&mut store).unwrap();
        engine.attach_target(&mut surface);
        let t0 = Instant::now();
        engine.tick(&mut surface, t0).unwrap();

        surface.pan(Viewport::new(LatLngBounds::from_wsen(-5.0, 35.0, 35.0, 60.0), 8.0));
        let during = engine.tick(&mut surface, t0).unwrap();
        assert!(during.result.is_none());

        let after = engine
            .tick(&mut surface, t0 + Duration::from_millis(200))
            .unwrap();
        assert_eq!(after.settled, Some(SettleReason::Quiescent));
        assert!(after.result.is_some());
    }

    #[test]
    fn test_expand_cluster() {
        let mut engine = engine();
        let points: Vec<_> = (0..4)
            .map(|i| PointRecord::new(format!("c{i}"), 45.0 + i as f64 * 0.01, 5.0))
            .collect();
        engine.load_snapshot(points, DataVersion(1)).unwrap();
        let mut surface = Surface::new(europe());
        engine.attach_target(&mut surface);
        let outcome = engine.tick(&mut surface, Instant::now()).unwrap();

        let result = outcome.result.unwrap();
        let cluster = result.features[0].as_cluster().unwrap();
        let expansion = engine.expand(cluster.id).unwrap();
        assert_eq!(expansion.zoom, cluster.expansion_zoom);
        assert_eq!(
            expansion.children.iter().map(MapFeature::count).sum::<usize>(),
            4
        );
        assert_eq!(engine.get_leaves(cluster.id, 10, 0).unwrap().len(), 4);
    }

    #[test]
    fn test_teardown_clears_surface() {
        let mut engine = engine();
        engine.load_snapshot(spread(8), DataVersion(1)).unwrap();
        let mut surface = Surface::new(europe());
        engine.attach_target(&mut surface);
        engine.tick(&mut surface, Instant::now()).unwrap();
        futures::executor::block_on(engine.flush(&mut surface, &crate::runtime::ImmediateScheduler));
        assert!(!surface.markers.is_empty());

        engine.teardown(&mut surface);
        assert!(surface.markers.is_empty());
        assert!(engine.index().is_none());
        assert!(engine.cache().is_empty());
    }
}
