//! Owner of the rendered set and the batched commit queue
//!
//! `commit` turns a new query result into a minimal diff against what is on
//! screen and queues it; `run_batch` applies at most `batch_size` queued
//! operations to the render target. A newer `commit` discards whatever is
//! still queued and re-diffs against the rendered set, so two batches never
//! overlap and applied operations are never undone half-way.

use crate::input::events::{InteractionKind, MarkerInteraction};
use crate::layers::marker::{MarkerDiff, MarkerKey, MarkerOp, RenderHints};
use crate::prelude::HashMap;
use crate::runtime::FrameScheduler;
use crate::spatial::query::QueryResult;
use crate::traits::{InteractionCallback, MarkerHandle, RenderTarget};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::ops::AddAssign;

/// A marker currently committed to the render target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMarker {
    pub handle: MarkerHandle,
    pub hints: RenderHints,
}

/// Outcome of applying queued operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub placed: usize,
    pub updated: usize,
    pub removed: usize,
    /// Operations the render target rejected (logged and skipped)
    pub failed: usize,
}

impl CommitStats {
    pub fn applied(&self) -> usize {
        self.placed + self.updated + self.removed
    }

    pub fn attempted(&self) -> usize {
        self.applied() + self.failed
    }
}

impl AddAssign for CommitStats {
    fn add_assign(&mut self, other: Self) {
        self.placed += other.placed;
        self.updated += other.updated;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

/// Sizes of the diff queued by one `commit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
    /// Queued operations of an earlier commit that were discarded
    pub superseded: usize,
}

pub struct MarkerLifecycleManager {
    rendered: HashMap<MarkerKey, RenderedMarker>,
    queue: VecDeque<MarkerOp>,
    batch_size: usize,
    interaction_tx: Sender<MarkerInteraction>,
    interaction_rx: Receiver<MarkerInteraction>,
}

impl MarkerLifecycleManager {
    pub fn new(batch_size: usize) -> Self {
        let (interaction_tx, interaction_rx) = unbounded();
        Self {
            rendered: HashMap::default(),
            queue: VecDeque::new(),
            batch_size: batch_size.max(1),
            interaction_tx,
            interaction_rx,
        }
    }

    /// Replaces the queued work with the diff from the rendered set to `result`
    pub fn commit(&mut self, result: &QueryResult) -> DiffCounts {
        let superseded = self.queue.len();
        if superseded > 0 {
            log::debug!("superseding {} queued marker operations", superseded);
            self.queue.clear();
        }

        let diff = MarkerDiff::compute(
            self.rendered.iter().map(|(key, marker)| (key, &marker.hints)),
            &result.features,
        );
        let counts = DiffCounts {
            adds: diff.adds.len(),
            updates: diff.updates.len(),
            removes: diff.removes.len(),
            superseded,
        };
        log::debug!(
            "queued marker diff: {} adds, {} updates, {} removes",
            counts.adds,
            counts.updates,
            counts.removes
        );
        self.queue.extend(diff.into_ops());
        counts
    }

    /// Applies up to one batch of queued operations.
    ///
    /// A failed operation is logged and skipped; the rest of the batch still runs.
    pub fn run_batch<T>(&mut self, target: &mut T) -> CommitStats
    where
        T: RenderTarget + ?Sized,
    {
        let mut stats = CommitStats::default();
        for _ in 0..self.batch_size {
            let Some(op) = self.queue.pop_front() else {
                break;
            };
            self.apply(op, target, &mut stats);
        }
        stats
    }

    /// Applies every queued batch, yielding to `scheduler` between batches
    pub async fn drain<T, S>(&mut self, target: &mut T, scheduler: &S) -> CommitStats
    where
        T: RenderTarget + ?Sized,
        S: FrameScheduler + ?Sized,
    {
        let mut stats = CommitStats::default();
        while !self.queue.is_empty() {
            stats += self.run_batch(target);
            if !self.queue.is_empty() {
                scheduler.next_frame().await;
            }
        }
        stats
    }

    fn apply<T>(&mut self, op: MarkerOp, target: &mut T, stats: &mut CommitStats)
    where
        T: RenderTarget + ?Sized,
    {
        match op {
            MarkerOp::Add { key, hints } => {
                let position = hints.position;
                match target.place_marker(&key, position.lat, position.lng, &hints) {
                    Ok(handle) => {
                        self.attach_interactions(target, &key, handle);
                        self.rendered.insert(key, RenderedMarker { handle, hints });
                        stats.placed += 1;
                    }
                    Err(err) => {
                        log::warn!("failed to place marker {}: {}", key, err);
                        stats.failed += 1;
                    }
                }
            }
            MarkerOp::Update { key, hints } => {
                let Some(marker) = self.rendered.get_mut(&key) else {
                    log::warn!("update for marker {} that is not rendered", key);
                    stats.failed += 1;
                    return;
                };
                match target.update_marker(marker.handle, &hints) {
                    Ok(()) => {
                        marker.hints = hints;
                        stats.updated += 1;
                    }
                    Err(err) => {
                        // old hints stay, so the next diff retries
                        log::warn!("failed to update marker {}: {}", key, err);
                        stats.failed += 1;
                    }
                }
            }
            MarkerOp::Remove { key } => {
                let Some(marker) = self.rendered.remove(&key) else {
                    return;
                };
                match target.remove_marker(marker.handle) {
                    Ok(()) => stats.removed += 1,
                    Err(err) => {
                        log::warn!(
                            "failed to remove marker {} ({}): {}",
                            key,
                            marker.handle,
                            err
                        );
                        stats.failed += 1;
                    }
                }
            }
        }
    }

    /// Attaches the one interaction handler a handle ever gets
    fn attach_interactions<T>(&self, target: &mut T, key: &MarkerKey, handle: MarkerHandle)
    where
        T: RenderTarget + ?Sized,
    {
        let tx = self.interaction_tx.clone();
        let key = key.clone();
        let log_key = key.clone();
        let callback: InteractionCallback = Box::new(move |kind: InteractionKind| {
            let _ = tx.send(MarkerInteraction {
                key: key.clone(),
                handle,
                kind,
            });
        });
        if let Err(err) = target.on_marker_interaction(handle, callback) {
            log::warn!("failed to attach interaction handler to {}: {}", log_key, err);
        }
    }

    /// Removes every rendered marker and drops queued work
    pub fn teardown<T>(&mut self, target: &mut T) -> CommitStats
    where
        T: RenderTarget + ?Sized,
    {
        self.queue.clear();
        let mut keys: Vec<MarkerKey> = self.rendered.keys().cloned().collect();
        keys.sort();

        let mut stats = CommitStats::default();
        for key in keys {
            self.apply(MarkerOp::Remove { key }, target, &mut stats);
        }
        log::info!(
            "marker teardown: {} removed, {} failed",
            stats.removed,
            stats.failed
        );
        stats
    }

    /// Interactions reported since the last call, in arrival order
    pub fn take_interactions(&self) -> Vec<MarkerInteraction> {
        self.interaction_rx.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn rendered_len(&self) -> usize {
        self.rendered.len()
    }

    pub fn rendered(&self) -> impl Iterator<Item = (&MarkerKey, &RenderedMarker)> {
        self.rendered.iter()
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&RenderedMarker> {
        self.rendered.get(key)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLngBounds;
    use crate::core::viewport::Viewport;
    use crate::data::point::{DataVersion, PointRecord};
    use crate::spatial::clustering::MapFeature;
    use crate::traits::{RenderTargetError, ViewportCallback};
    use std::sync::Arc;

    #[derive(Default)]
    struct Surface {
        next: u64,
        markers: HashMap<MarkerHandle, (MarkerKey, RenderHints)>,
        handlers: HashMap<MarkerHandle, InteractionCallback>,
        reject_lat_above: Option<f64>,
        calls: usize,
    }

    impl RenderTarget for Surface {
        fn place_marker(
            &mut self,
            key: &MarkerKey,
            lat: f64,
            lon: f64,
            hints: &RenderHints,
        ) -> Result<MarkerHandle, RenderTargetError> {
            self.calls += 1;
            if self.reject_lat_above.is_some_and(|limit| lat > limit) {
                return Err(RenderTargetError::InvalidCoordinate { lat, lon });
            }
            self.next += 1;
            let handle = MarkerHandle(self.next);
            self.markers.insert(handle, (key.clone(), hints.clone()));
            Ok(handle)
        }

        fn update_marker(
            &mut self,
            handle: MarkerHandle,
            hints: &RenderHints,
        ) -> Result<(), RenderTargetError> {
            self.calls += 1;
            let marker = self
                .markers
                .get_mut(&handle)
                .ok_or(RenderTargetError::UnknownHandle(handle))?;
            marker.1 = hints.clone();
            Ok(())
        }

        fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), RenderTargetError> {
            self.calls += 1;
            self.handlers.remove(&handle);
            self.markers
                .remove(&handle)
                .map(|_| ())
                .ok_or(RenderTargetError::UnknownHandle(handle))
        }

        fn get_viewport(&self) -> Viewport {
            Viewport::new(LatLngBounds::world(), 0.0)
        }

        fn on_viewport_change(&mut self, _callback: ViewportCallback) {}

        fn on_marker_interaction(
            &mut self,
            handle: MarkerHandle,
            callback: InteractionCallback,
        ) -> Result<(), RenderTargetError> {
            self.handlers.insert(handle, callback);
            Ok(())
        }
    }

    fn result(points: &[(&str, f64)]) -> QueryResult {
        QueryResult {
            features: points
                .iter()
                .map(|(id, lat)| MapFeature::Point(Arc::new(PointRecord::new(*id, *lat, 0.0))))
                .collect(),
            ..QueryResult::empty(DataVersion(1), 10)
        }
    }

    #[test]
    fn test_commit_is_batched() {
        let mut manager = MarkerLifecycleManager::new(2);
        let mut surface = Surface::default();
        let counts = manager.commit(&result(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]));
        assert_eq!(counts.adds, 3);

        assert_eq!(manager.run_batch(&mut surface).placed, 2);
        assert_eq!(manager.pending(), 1);
        assert_eq!(manager.run_batch(&mut surface).placed, 1);
        assert!(manager.is_idle());
        assert_eq!(surface.markers.len(), 3);
    }

    #[test]
    fn test_failed_placement_is_skipped() {
        let mut manager = MarkerLifecycleManager::new(10);
        let mut surface = Surface {
            reject_lat_above: Some(1.5),
            ..Surface::default()
        };
        manager.commit(&result(&[("a", 1.0), ("b", 2.0), ("c", 1.2)]));
        let stats = manager.run_batch(&mut surface);
        assert_eq!(stats.placed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(manager.rendered_len(), 2);
        assert!(manager.get(&MarkerKey::Point("b".into())).is_none());
    }

    #[test]
    fn test_new_commit_supersedes_queue() {
        let mut manager = MarkerLifecycleManager::new(1);
        let mut surface = Surface::default();
        manager.commit(&result(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]));
        manager.run_batch(&mut surface);

        let counts = manager.commit(&result(&[("a", 1.0), ("d", 4.0)]));
        assert_eq!(counts.superseded, 2);
        assert_eq!(counts.adds, 1);
        assert_eq!(counts.removes, 0);

        futures::executor::block_on(
            manager.drain(&mut surface, &crate::runtime::ImmediateScheduler),
        );
        let mut keys: Vec<_> = manager.rendered().map(|(k, _)| k.to_string()).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "d"]);
        assert_eq!(surface.markers.len(), 2);
    }

    #[test]
    fn test_handlers_attached_once_and_routed() {
        let mut manager = MarkerLifecycleManager::new(10);
        let mut surface = Surface::default();
        manager.commit(&result(&[("a", 1.0)]));
        manager.run_batch(&mut surface);
        manager.commit(&result(&[("a", 1.1)]));
        let stats = manager.run_batch(&mut surface);
        assert_eq!(stats.updated, 1);
        assert_eq!(surface.handlers.len(), 1);

        let handle = manager.get(&MarkerKey::Point("a".into())).unwrap().handle;
        (surface.handlers[&handle])(InteractionKind::Click);
        let interactions = manager.take_interactions();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0].key, MarkerKey::Point("a".into()));
        assert_eq!(interactions[0].kind, InteractionKind::Click);
    }

    #[test]
    fn test_teardown_removes_everything() {
        let mut manager = MarkerLifecycleManager::new(10);
        let mut surface = Surface::default();
        manager.commit(&result(&[("a", 1.0), ("b", 2.0)]));
        manager.run_batch(&mut surface);
        let stats = manager.teardown(&mut surface);
        assert_eq!(stats.removed, 2);
        assert_eq!(manager.rendered_len(), 0);
        assert!(surface.markers.is_empty());
    }
}
