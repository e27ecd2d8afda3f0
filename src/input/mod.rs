pub mod events;
pub mod tracker;

pub use events::{InteractionKind, MarkerInteraction, SettleReason, ViewportEvent};
pub use tracker::ViewportTracker;
