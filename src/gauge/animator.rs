//! # Gauge Animator
//!
//! Fixed-rate clock that steps every gauge, independent of how often
//! telemetry arrives.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use super::Gauges;

/// Default animation period (50Hz)
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(20);

/// Drives [`Gauges::step_all`] on a fixed period
#[derive(Debug)]
pub struct AnimationScheduler {
    gauges: Arc<Gauges>,
    period: Duration,
    ticks: u64,
}

impl AnimationScheduler {
    pub fn new(gauges: Arc<Gauges>, period: Duration) -> Self {
        Self {
            gauges,
            period,
            ticks: 0,
        }
    }

    /// Ticks run over the scheduler's lifetime
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Step every gauge once
    pub fn tick(&mut self) {
        self.gauges.step_all();
        self.ticks += 1;
    }

    /// Run until `shutdown` turns true (or its sender is dropped)
    ///
    /// Hands the scheduler back so the next session can reuse it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut clock = interval(self.period);
        // A stalled runtime should not trigger a burst of catch-up ticks
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Animation started at {:?} per tick", self.period);
        let started_at = self.ticks;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = clock.tick() => self.tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Animation stopped after {} ticks", self.ticks - started_at);
        self
    }
}
