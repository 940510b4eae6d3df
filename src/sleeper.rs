//! Sleep abstraction for the retry and batch loops.
//!
//! Every pause the lookup pipeline takes (backoff, rate-limit cooldown,
//! inter-query throttling) goes through [`Sleeper`], so the loops can be
//! exercised in tests without waiting.

use async_trait::async_trait;
use std::time::Duration;

/// Something that can pause the current task.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Pause for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl TokioSleeper {
    /// Create a new tokio sleeper.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_advances_clock() {
        let sleeper = TokioSleeper::new();
        let start = tokio::time::Instant::now();
        sleeper.sleep(Duration::from_secs(60)).await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_sleeper_trait_object() {
        let sleeper: Box<dyn Sleeper> = Box::new(TokioSleeper::default());
        sleeper.sleep(Duration::ZERO).await;
    }
}
