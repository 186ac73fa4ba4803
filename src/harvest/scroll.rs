//! Scroll convergence loop.
//!
//! Each iteration measures the page, checks for convergence, then scrolls
//! and waits for the settle delay. The loop ends once the same measurement
//! has been read `threshold` times in a row, or when the iteration budget
//! runs out. A page that never lazy-loads still converges after `threshold`
//! readings.

use std::time::Duration;

use tracing::debug;

use crate::browser::LazyLoadPage;
use crate::error::Result;

/// Per-category scroll progress. Created at the start of a visit and
/// discarded at its end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollState {
    /// Completed scroll iterations.
    pub iteration: u32,
    pub last_measurement: Option<u64>,
    /// Length of the current run of identical measurements.
    pub stable_run: u32,
}

impl ScrollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement. Returns true once the run of identical
    /// readings reaches `threshold`.
    pub fn observe(&mut self, measurement: u64, threshold: u32) -> bool {
        if self.last_measurement == Some(measurement) {
            self.stable_run += 1;
        } else {
            self.stable_run = 1;
        }
        self.last_measurement = Some(measurement);
        self.stable_run >= threshold.max(1)
    }
}

/// How a scroll phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSummary {
    /// Scroll actions performed.
    pub scrolls: u32,
    /// Measurements taken.
    pub measurements: u32,
    pub last_measurement: Option<u64>,
    /// False when the budget ran out first.
    pub converged: bool,
}

/// Drive `page` until its content stabilizes or `budget` iterations pass.
pub async fn converge<P>(
    page: &mut P,
    budget: u32,
    threshold: u32,
    settle: Duration,
) -> Result<ScrollSummary>
where
    P: LazyLoadPage + ?Sized,
{
    let mut state = ScrollState::new();
    let mut measurements = 0;
    let mut converged = false;

    while state.iteration < budget {
        let measurement = page.measure().await?;
        measurements += 1;
        debug!(
            "Scroll {}/{} - measured {}",
            state.iteration + 1,
            budget,
            measurement
        );

        if state.observe(measurement, threshold) {
            debug!(
                "Measurement stable for {} readings, stopping early",
                state.stable_run
            );
            converged = true;
            break;
        }

        page.grow().await?;
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        state.iteration += 1;
    }

    Ok(ScrollSummary {
        scrolls: state.iteration,
        measurements,
        last_measurement: state.last_measurement,
        converged,
    })
}
