//! Cooperative scheduling between commit batches
//!
//! The marker manager yields to the host between fixed-size batches. A
//! [`FrameScheduler`] is whatever lightweight deferral the host has: an
//! animation-frame callback, a timer, or a plain task yield.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
#[cfg(feature = "tokio-runtime")]
use std::time::Duration;

#[async_trait]
pub trait FrameScheduler: Send + Sync {
    /// Resolves when the next batch may run
    async fn next_frame(&self);
}

/// Yields to the executor once per frame, without waiting
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

#[async_trait]
impl FrameScheduler for ImmediateScheduler {
    async fn next_frame(&self) {
        YieldNow { yielded: false }.await
    }
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Sleeps one frame interval between batches
#[cfg(feature = "tokio-runtime")]
#[derive(Debug, Clone, Copy)]
pub struct TokioFrameScheduler {
    frame: Duration,
}

#[cfg(feature = "tokio-runtime")]
impl TokioFrameScheduler {
    pub fn new(frame: Duration) -> Self {
        Self { frame }
    }

    /// Roughly one display refresh at 60 Hz
    pub fn sixty_hz() -> Self {
        Self::new(Duration::from_micros(16_667))
    }
}

#[cfg(feature = "tokio-runtime")]
#[async_trait]
impl FrameScheduler for TokioFrameScheduler {
    async fn next_frame(&self) {
        tokio::time::sleep(self.frame).await;
    }
}

/// Counts frames; handy for hosts that want to observe how work was spread
#[derive(Debug, Default)]
pub struct CountingScheduler {
    frames: std::sync::atomic::AtomicUsize,
}

impl CountingScheduler {
    pub fn frames(&self) -> usize {
        self.frames.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameScheduler for CountingScheduler {
    async fn next_frame(&self) {
        self.frames.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        ImmediateScheduler.next_frame().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_scheduler_completes() {
        futures::executor::block_on(async {
            ImmediateScheduler.next_frame().await;
            ImmediateScheduler.next_frame().await;
        });
    }

    #[test]
    fn test_counting_scheduler() {
        let scheduler = CountingScheduler::default();
        futures::executor::block_on(async {
            for _ in 0..3 {
                scheduler.next_frame().await;
            }
        });
        assert_eq!(scheduler.frames(), 3);
    }

    #[cfg(feature = "tokio-runtime")]
    #[tokio::test]
    async fn test_tokio_scheduler_sleeps() {
        let scheduler = TokioFrameScheduler::new(Duration::from_millis(5));
        let start = std::time::Instant::now();
        scheduler.next_frame().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
