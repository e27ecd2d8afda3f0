use geocluster::prelude::*;
use geocluster::traits::{InteractionCallback, ViewportCallback};
use instant::Instant;
use std::time::Duration;

/// Render target that only keeps a tally of what would be on screen
struct ConsoleTarget {
    viewport: Viewport,
    next: u64,
    markers: HashMap<MarkerHandle, (MarkerKey, RenderHints)>,
    on_move: Option<ViewportCallback>,
}

impl ConsoleTarget {
    fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            next: 0,
            markers: HashMap::default(),
            on_move: None,
        }
    }

    fn pan_to(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        if let Some(callback) = self.on_move.as_mut() {
            callback(viewport);
        }
    }

    fn clusters(&self) -> usize {
        self.markers.values().filter(|(k, _)| k.is_cluster()).count()
    }
}

impl RenderTarget for ConsoleTarget {
    fn place_marker(
        &mut self,
        key: &MarkerKey,
        _lat: f64,
        _lon: f64,
        hints: &RenderHints,
    ) -> std::result::Result<MarkerHandle, RenderTargetError> {
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
        marker.1 = hints.clone();
        Ok(())
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> std::result::Result<(), RenderTargetError> {
        self.markers
            .remove(&handle)
            .map(|_| ())
            .ok_or(RenderTargetError::UnknownHandle(handle))
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

/// Points scattered around a handful of cities
fn sample_points() -> Vec<PointRecord> {
    let cities = [
        ("paris", 48.8566, 2.3522),
        ("berlin", 52.5200, 13.4050),
        ("madrid", 40.4168, -3.7038),
        ("rome", 41.9028, 12.4964),
        ("london", 51.5074, -0.1278),
    ];
    let mut points = Vec::new();
    for (name, lat, lng) in cities {
        for i in 0..200 {
            let angle = i as f64 * 0.618 * std::f64::consts::TAU;
            let radius = 0.002 * (i as f64).sqrt();
            let properties = PointProperties::default()
                .with_category(if i % 3 == 0 { "cafe" } else { "shop" })
                .verified(i % 7 == 0)
                .with_votes((i % 11) as i64 - 3);
            points.push(
                PointRecord::new(
                    format!("{name}-{i:03}"),
                    lat + radius * angle.sin(),
                    lng + radius * angle.cos(),
                )
                .with_properties(properties),
            );
        }
    }
    points
}

/// Drives the engine against an in-memory target, without any map UI
fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("🗺️ geocluster headless example");
    println!("==============================");

    let points = sample_points();
    let mut engine = EngineBuilder::new()
        .with_profile(DeviceProfile::Balanced)
        .commit_batch_size(40)
        .build()?;

    let europe = Viewport::new(LatLngBounds::from_wsen(-12.0, 35.0, 25.0, 60.0), 4.0);
    let mut target = ConsoleTarget::new(europe);
    engine.attach_target(&mut target);
    engine.load_snapshot(points, DataVersion(1))?;

    let mut now = Instant::now();
    let outcome = engine.tick(&mut target, now)?;
    if let Some(summary) = &outcome.installed {
        println!(
            "✅ Index {} built: {} points, {} dropped",
            summary.version, summary.indexed, summary.dropped
        );
    }
    futures::executor::block_on(engine.flush(&mut target, &ImmediateScheduler));
    println!(
        "   Europe at zoom 4: {} markers ({} clusters)",
        target.markers.len(),
        target.clusters()
    );

    println!("\n🔍 Zooming into Paris:");
    for zoom in [8.0, 11.0, 14.0, 16.0] {
        let span = 180.0 / 2f64.powf(zoom);
        let view = Viewport::new(
            LatLngBounds::from_wsen(2.3522 - span, 48.8566 - span, 2.3522 + span, 48.8566 + span),
            zoom,
        );
        target.pan_to(view);
        engine.tick(&mut target, now)?;
        // nothing is queried until the move has been quiet for the debounce window
        now += Duration::from_millis(400);
        let outcome = engine.tick(&mut target, now)?;
        futures::executor::block_on(engine.flush(&mut target, &ImmediateScheduler));

        let from_cache = outcome.result.as_ref().map(|r| r.from_cache).unwrap_or(false);
        println!(
            "   zoom {:>4.1}: {} markers ({} clusters), cached: {}",
            zoom,
            target.markers.len(),
            target.clusters(),
            from_cache
        );
    }

    if let Some(result) = engine.last_result() {
        println!("\n📋 Last result as GeoJSON:");
        let json = geocluster::data::geojson::write_result(result);
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    let stats = engine.teardown(&mut target);
    println!("\n✅ Teardown removed {} markers", stats.removed);
    Ok(())
}
