#![allow(dead_code)]

use geocluster::background::tasks::Job;
use geocluster::prelude::*;
use geocluster::traits::{InteractionCallback, SnapshotCallback, ViewportCallback};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One call the engine made on the surface
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Place(MarkerKey),
    Update(MarkerKey),
    Remove(MarkerKey),
}

/// In-memory render target recording every call
pub struct RecordingTarget {
    pub viewport: Viewport,
    pub calls: Vec<Call>,
    pub markers: BTreeMap<MarkerHandle, (MarkerKey, RenderHints)>,
    pub handlers: HashMap<MarkerHandle, InteractionCallback>,
    pub handler_attachments: usize,
    /// Placements of these keys are rejected
    pub reject: HashSet<String>,
    pub torn_down: bool,
    next: u64,
    on_move: Option<ViewportCallback>,
}

impl RecordingTarget {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            calls: Vec::new(),
            markers: BTreeMap::new(),
            handlers: HashMap::default(),
            handler_attachments: 0,
            reject: HashSet::default(),
            torn_down: false,
            next: 0,
            on_move: None,
        }
    }

    /// Simulates one pan/zoom step on the surface
    pub fn move_to(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        if let Some(callback) = self.on_move.as_mut() {
            callback(viewport);
        }
    }

    pub fn click(&self, key: &MarkerKey) {
        let handle = self
            .markers
            .iter()
            .find(|(_, (k, _))| k == key)
            .map(|(h, _)| *h)
            .expect("marker is placed");
        (self.handlers[&handle])(InteractionKind::Click);
    }

    pub fn keys(&self) -> Vec<MarkerKey> {
        let mut keys: Vec<_> = self.markers.values().map(|(k, _)| k.clone()).collect();
        keys.sort();
        keys
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }
}

impl RenderTarget for RecordingTarget {
    fn place_marker(
        &mut self,
        key: &MarkerKey,
        lat: f64,
        lon: f64,
        hints: &RenderHints,
    ) -> std::result::Result<MarkerHandle, RenderTargetError> {
        self.calls.push(Call::Place(key.clone()));
        if self.torn_down {
            return Err(RenderTargetError::TornDown);
        }
        if self.reject.contains(&key.to_string()) {
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
    ) -> std::result::Result<(), RenderTargetError> {
        let marker = self
            .markers
            .get_mut(&handle)
            .ok_or(RenderTargetError::UnknownHandle(handle))?;
        self.calls.push(Call::Update(marker.0.clone()));
        marker.1 = hints.clone();
        Ok(())
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> std::result::Result<(), RenderTargetError> {
        let (key, _) = self
            .markers
            .remove(&handle)
            .ok_or(RenderTargetError::UnknownHandle(handle))?;
        self.handlers.remove(&handle);
        self.calls.push(Call::Remove(key));
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
        handle: MarkerHandle,
        callback: InteractionCallback,
    ) -> std::result::Result<(), RenderTargetError> {
        self.handler_attachments += 1;
        self.handlers.insert(handle, callback);
        Ok(())
    }
}

/// In-memory point store with versioned snapshots
#[derive(Default)]
pub struct MemoryStore {
    points: Vec<PointRecord>,
    version: DataVersion,
    subscribers: Vec<SnapshotCallback>,
}

impl MemoryStore {
    pub fn with_points(points: Vec<PointRecord>) -> Self {
        let mut store = Self::default();
        store.publish(points);
        store
    }

    pub fn publish(&mut self, points: Vec<PointRecord>) {
        self.version = self.version.next();
        self.points = points;
        for callback in self.subscribers.iter_mut() {
            callback(self.points.clone(), self.version);
        }
    }

    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }
}

impl PointStore for MemoryStore {
    fn subscribe(&mut self, on_snapshot: SnapshotCallback) {
        self.subscribers.push(on_snapshot);
    }

    fn snapshot(&self) -> (Vec<PointRecord>, DataVersion) {
        (self.points.clone(), self.version)
    }
}

/// Build executor that holds every job until the test releases it
#[derive(Default)]
pub struct GatedExecutor {
    jobs: Mutex<Vec<Job>>,
}

impl GatedExecutor {
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Runs every held job on the calling thread
    pub fn release(&self) {
        let jobs = std::mem::take(&mut *self.jobs.lock().unwrap());
        for job in jobs {
            job();
        }
    }
}

impl BuildExecutor for GatedExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

pub fn viewport(west: f64, south: f64, east: f64, north: f64, zoom: f64) -> Viewport {
    Viewport::new(LatLngBounds::from_wsen(west, south, east, north), zoom)
}

/// Ticks until the commit queue is empty; returns the number of ticks
pub fn settle(engine: &mut ClusterEngine, target: &mut RecordingTarget, now: Instant) -> usize {
    let mut ticks = 0;
    loop {
        engine.tick(target, now).expect("tick");
        ticks += 1;
        if engine.markers().is_idle() || ticks > 10_000 {
            return ticks;
        }
    }
}

pub use instant::Instant;
