pub mod spatial;
pub mod tasks;

pub use spatial::{BuiltIndex, IndexBuildQueue};
pub use tasks::{AsyncExecutor, BuildExecutor, InlineExecutor, Job, ThreadExecutor};

#[cfg(feature = "tokio-runtime")]
pub use tasks::TokioExecutor;
