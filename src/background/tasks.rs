use crate::core::config::EngineConfig;
use crate::data::point::{DataVersion, PointRecord};
use crate::spatial::index::SpatialIndex;
use crate::{EngineError, Result};

/// A unit of work handed to an executor
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs index builds, on or off the interactive path
pub trait BuildExecutor: Send + Sync {
    fn execute(&self, job: Job) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Runs the job on the calling thread before returning
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl BuildExecutor for InlineExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        job();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Runs each job on a fresh OS thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadExecutor;

impl BuildExecutor for ThreadExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        std::thread::Builder::new()
            .name("geocluster-build".to_string())
            .spawn(job)
            .map(|_| ())
            .map_err(|e| EngineError::BuildFailed(format!("could not spawn build thread: {}", e)))
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}

/// Runs jobs on tokio's blocking pool
#[cfg(feature = "tokio-runtime")]
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio-runtime")]
impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running inside
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| EngineError::BuildFailed(format!("no tokio runtime: {}", e)))
    }
}

#[cfg(feature = "tokio-runtime")]
impl BuildExecutor for TokioExecutor {
    fn execute(&self, job: Job) -> Result<()> {
        self.handle.spawn_blocking(job);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

/// Async helpers for hosts that build indexes from their own tasks
pub struct AsyncExecutor;

impl AsyncExecutor {
    /// Runs a CPU-bound closure off the async workers when tokio is available
    pub async fn execute_blocking<F, R>(task: F) -> Result<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        #[cfg(feature = "tokio-runtime")]
        {
            tokio::task::spawn_blocking(task)
                .await
                .map_err(|e| EngineError::BuildFailed(format!("build task failed: {}", e)))?
        }

        #[cfg(not(feature = "tokio-runtime"))]
        {
            task()
        }
    }

    pub async fn build_index(
        points: Vec<PointRecord>,
        version: DataVersion,
        config: EngineConfig,
    ) -> Result<SpatialIndex> {
        Self::execute_blocking(move || Ok(SpatialIndex::build(points, version, &config))).await
    }
}
