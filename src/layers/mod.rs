pub mod manager;
pub mod marker;

pub use manager::{CommitStats, DiffCounts, MarkerLifecycleManager, RenderedMarker};
pub use marker::{MarkerDiff, MarkerKey, MarkerOp, RenderHints};
