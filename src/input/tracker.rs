use crate::core::config::EngineConfig;
use crate::core::viewport::Viewport;
use crate::input::events::{SettleReason, ViewportEvent};
use instant::Instant;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct PendingSettle {
    viewport: Viewport,
    deadline: Instant,
    reason: SettleReason,
}

/// Debounces raw pan/zoom steps into "viewport settled" events.
///
/// Every move restarts the window. A move whose zoom lies on the other side
/// of a rendered cluster's expansion zoom (relative to the last settled view)
/// uses the shorter zoom-boundary window instead.
#[derive(Debug, Clone)]
pub struct ViewportTracker {
    debounce: Duration,
    boundary_debounce: Duration,
    current: Option<Viewport>,
    last_settled: Option<Viewport>,
    pending: Option<PendingSettle>,
    boundaries: BTreeSet<u8>,
}

impl ViewportTracker {
    pub fn new(debounce: Duration, boundary_debounce: Duration) -> Self {
        Self {
            debounce,
            boundary_debounce: boundary_debounce.min(debounce),
            current: None,
            last_settled: None,
            pending: None,
            boundaries: BTreeSet::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.viewport_debounce(), config.zoom_boundary_debounce())
    }

    /// Records one raw move/zoom step observed at `now`
    pub fn on_move(&mut self, viewport: Viewport, now: Instant) {
        self.current = Some(viewport);

        let crosses = self
            .last_settled
            .map(|settled| self.crosses_boundary(settled.zoom, viewport.zoom))
            .unwrap_or(false);
        let (window, reason) = if crosses {
            (self.boundary_debounce, SettleReason::ZoomBoundary)
        } else {
            (self.debounce, SettleReason::Quiescent)
        };

        self.pending = Some(PendingSettle {
            viewport,
            deadline: now + window,
            reason,
        });
    }

    /// Settles `viewport` right away, cancelling any pending window
    pub fn settle_now(&mut self, viewport: Viewport) -> ViewportEvent {
        self.current = Some(viewport);
        self.pending = None;
        self.last_settled = Some(viewport);
        ViewportEvent {
            viewport,
            reason: SettleReason::Immediate,
        }
    }

    /// Emits the settled viewport once its window has passed.
    ///
    /// Nothing is emitted when the view came back to exactly the last
    /// settled region and zoom.
    pub fn poll(&mut self, now: Instant) -> Option<ViewportEvent> {
        let pending = self.pending?;
        if now < pending.deadline {
            return None;
        }
        self.pending = None;

        if let Some(previous) = self.last_settled {
            if previous.same_view(&pending.viewport) {
                log::trace!("viewport returned to settled view, nothing to do");
                return None;
            }
        }

        self.last_settled = Some(pending.viewport);
        log::debug!(
            "viewport settled ({:?}) at zoom {:.2}",
            pending.reason,
            pending.viewport.zoom
        );
        Some(ViewportEvent {
            viewport: pending.viewport,
            reason: pending.reason,
        })
    }

    /// Expansion zooms of the clusters currently on screen
    pub fn set_cluster_boundaries(&mut self, zooms: impl IntoIterator<Item = u8>) {
        self.boundaries = zooms.into_iter().collect();
    }

    fn crosses_boundary(&self, from: f64, to: f64) -> bool {
        self.boundaries
            .iter()
            .any(|&b| (from < b as f64) != (to < b as f64))
    }

    pub fn is_moving(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current(&self) -> Option<&Viewport> {
        self.current.as_ref()
    }

    pub fn last_settled(&self) -> Option<&Viewport> {
        self.last_settled.as_ref()
    }

    /// Deadline of the pending settle, if a move is in flight
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }
}
