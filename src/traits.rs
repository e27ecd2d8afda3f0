//! Collaborator interfaces
//!
//! The engine reads points from a [`PointStore`] and draws into a
//! [`RenderTarget`]. Both are owned by the host; every render-target call
//! may fail and the engine treats each failure as local to one marker.

use crate::core::viewport::Viewport;
use crate::data::point::{DataVersion, PointRecord};
use crate::input::events::InteractionKind;
use crate::layers::marker::{MarkerKey, RenderHints};
use std::fmt;

/// Native handle the render target returns for a placed marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

impl fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderTargetError {
    #[error("operation rejected: {0}")]
    Rejected(String),

    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("render target torn down")]
    TornDown,

    #[error("unknown marker handle {0}")]
    UnknownHandle(MarkerHandle),
}

pub type ViewportCallback = Box<dyn FnMut(Viewport) + Send>;
pub type InteractionCallback = Box<dyn Fn(InteractionKind) + Send + Sync>;
pub type SnapshotCallback = Box<dyn FnMut(Vec<PointRecord>, DataVersion) + Send>;

/// The interactive map surface markers are committed to
pub trait RenderTarget {
    fn place_marker(
        &mut self,
        key: &MarkerKey,
        lat: f64,
        lon: f64,
        hints: &RenderHints,
    ) -> Result<MarkerHandle, RenderTargetError>;

    fn update_marker(
        &mut self,
        handle: MarkerHandle,
        hints: &RenderHints,
    ) -> Result<(), RenderTargetError>;

    fn remove_marker(&mut self, handle: MarkerHandle) -> Result<(), RenderTargetError>;

    fn get_viewport(&self) -> Viewport;

    /// Registers the callback invoked on every pan/zoom step
    fn on_viewport_change(&mut self, callback: ViewportCallback);

    /// Attaches an interaction handler to a placed marker. Called once per handle.
    fn on_marker_interaction(
        &mut self,
        handle: MarkerHandle,
        callback: InteractionCallback,
    ) -> Result<(), RenderTargetError>;
}

/// Authoritative source of point records. The engine only reads from it.
pub trait PointStore {
    fn subscribe(&mut self, on_snapshot: SnapshotCallback);

    fn snapshot(&self) -> (Vec<PointRecord>, DataVersion);
}
