use crate::background::tasks::BuildExecutor;
use crate::core::config::EngineConfig;
use crate::data::point::{DataVersion, PointRecord};
use crate::spatial::index::SpatialIndex;
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use instant::Instant;
use std::sync::Arc;
use std::time::Duration;

/// A finished build, as delivered by the executor
pub struct BuiltIndex {
    pub index: SpatialIndex,
    pub elapsed: Duration,
}

/// Runs index builds through an executor and hands back only the newest.
///
/// Snapshots older than the newest one already submitted are not built, and
/// finished builds older than the newest finished one (or than what is
/// installed) are discarded.
pub struct IndexBuildQueue {
    executor: Arc<dyn BuildExecutor>,
    config: Arc<EngineConfig>,
    tx: Sender<BuiltIndex>,
    rx: Receiver<BuiltIndex>,
    latest_submitted: Option<DataVersion>,
    in_flight: usize,
}

impl IndexBuildQueue {
    pub fn new(executor: Arc<dyn BuildExecutor>, config: Arc<EngineConfig>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            executor,
            config,
            tx,
            rx,
            latest_submitted: None,
            in_flight: 0,
        }
    }

    /// Starts building `points`; returns `false` if the snapshot was stale
    pub fn submit(&mut self, points: Vec<PointRecord>, version: DataVersion) -> Result<bool> {
        if self.latest_submitted.is_some_and(|latest| version <= latest) {
            log::debug!(
                "skipping snapshot {}: {} already submitted",
                version,
                self.latest_submitted.unwrap_or_default()
            );
            return Ok(false);
        }

        let tx = self.tx.clone();
        let config = self.config.clone();
        let count = points.len();
        log::debug!(
            "submitting build of {} points for {} to {} executor",
            count,
            version,
            self.executor.name()
        );

        self.executor.execute(Box::new(move || {
            let start = Instant::now();
            let index = SpatialIndex::build(points, version, &config);
            let _ = tx.send(BuiltIndex {
                index,
                elapsed: start.elapsed(),
            });
        }))?;

        self.latest_submitted = Some(version);
        self.in_flight += 1;
        Ok(true)
    }

    /// Newest finished build newer than `installed`, if any
    pub fn poll_latest(&mut self, installed: Option<DataVersion>) -> Option<BuiltIndex> {
        let mut newest: Option<BuiltIndex> = None;
        for built in self.rx.try_iter() {
            self.in_flight = self.in_flight.saturating_sub(1);
            let version = built.index.version();
            let superseded = installed.is_some_and(|v| version <= v)
                || newest
                    .as_ref()
                    .is_some_and(|n| version <= n.index.version());
            if superseded {
                log::debug!("discarding stale index build {}", version);
                continue;
            }
            if let Some(dropped) = newest.replace(built) {
                log::debug!("discarding stale index build {}", dropped.index.version());
            }
        }
        newest
    }

    pub fn is_building(&self) -> bool {
        self.in_flight > 0
    }

    pub fn latest_submitted(&self) -> Option<DataVersion> {
        self.latest_submitted
    }
}
