//! Progress sinks.

use std::time::Instant;

use tracing::{info, warn};

use crate::core::Printer;
use crate::error::CopyError;

/// Logs completion percentage and an ETA whenever the whole percentage changes.
#[derive(Debug)]
pub struct PercentagePrinter {
    started: Instant,
    last_percent: Option<u64>,
}

impl PercentagePrinter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_percent: None,
        }
    }
}

impl Default for PercentagePrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole percentage of `processed` over `total`, capped at 100.
pub fn percent(processed: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    ((processed as u128 * 100) / total as u128).min(100) as u64
}

impl Printer for PercentagePrinter {
    fn notify(&mut self, processed: u64, total: u64) {
        let pct = percent(processed, total);
        if self.last_percent == Some(pct) {
            return;
        }
        self.last_percent = Some(pct);

        let elapsed = self.started.elapsed().as_secs_f64();
        let eta = if processed > 0 && processed < total {
            let remaining = (total - processed) as f64 * elapsed / processed as f64;
            format!("{:.0}s", remaining)
        } else {
            "-".to_string()
        };

        info!(
            "{}% ({}/{}) complete, ETA {}",
            pct, processed, total, eta
        );
    }

    fn end(&mut self) {
        info!(
            "100% complete in {:.1}s",
            self.started.elapsed().as_secs_f64()
        );
    }

    fn exception(&mut self, error: &CopyError) {
        warn!("failed at {}%: {}", self.last_percent.unwrap_or(0), error);
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPrinter;

impl Printer for NullPrinter {
    fn notify(&mut self, _processed: u64, _total: u64) {}

    fn end(&mut self) {}
}
