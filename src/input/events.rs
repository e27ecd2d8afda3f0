use crate::core::viewport::Viewport;
use crate::layers::marker::MarkerKey;
use crate::traits::MarkerHandle;
use serde::{Deserialize, Serialize};

/// User interaction reported by the render target for one marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionKind {
    Click,
    DoubleClick,
    HoverStart,
    HoverEnd,
}

/// An interaction routed back to the engine, identified by marker key
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInteraction {
    pub key: MarkerKey,
    pub handle: MarkerHandle,
    pub kind: InteractionKind,
}

/// Why the tracker declared the viewport settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
    /// The regular debounce window passed without further moves
    Quiescent,
    /// The zoom crossed a rendered cluster's expansion zoom; shorter window
    ZoomBoundary,
    /// Settled immediately (first viewport, or requested by the host)
    Immediate,
}

/// A debounced viewport-settled signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportEvent {
    pub viewport: Viewport,
    pub reason: SettleReason,
}
