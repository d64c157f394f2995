//! Fixed-delay throttler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CopySettings;
use crate::core::Throttler;
use crate::error::Result;

/// Default rows per chunk.
pub const DEFAULT_STRIDE: u64 = 2_000;

/// Default pause between chunks.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Sleeps a fixed delay after every chunk that copied rows.
///
/// The stride can be adjusted while a copy is running; chunks not yet
/// discovered pick up the new value.
#[derive(Debug)]
pub struct TimeThrottler {
    stride: AtomicU64,
    delay: Duration,
}

impl TimeThrottler {
    pub fn new(stride: u64, delay: Duration) -> Self {
        Self {
            stride: AtomicU64::new(stride.max(1)),
            delay,
        }
    }

    pub fn from_settings(settings: &CopySettings) -> Self {
        Self::new(settings.stride, settings.throttle_delay())
    }

    pub fn set_stride(&self, stride: u64) {
        self.stride.store(stride.max(1), Ordering::Relaxed);
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for TimeThrottler {
    fn default() -> Self {
        Self::new(DEFAULT_STRIDE, DEFAULT_DELAY)
    }
}

#[async_trait]
impl Throttler for TimeThrottler {
    fn stride(&self) -> u64 {
        self.stride.load(Ordering::Relaxed)
    }

    async fn run(&self) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}
