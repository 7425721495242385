//! # Gauge Module
//!
//! Per-channel display state shared between the link, the animator and
//! the display.
//!
//! This module handles:
//! - Holding each channel's animated `current` value and latest `target`
//! - Stepping `current` toward `target` without overshoot
//! - Grouping the five dashboard channels and applying samples to them
//!
//! `target` is written only by the connection supervisor and `current`
//! only by the animator. Both are lock-free atomics so neither writer ever
//! waits on the other or on a display read.

pub mod animator;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{GaugeConfig, GaugesConfig};
use crate::frame::TelemetrySample;

/// Relative slack when deciding a gauge is within one step of its target
const SNAP_TOLERANCE: f64 = 1e-9;

/// An `f64` stored as its bit pattern in an `AtomicU64`
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Animated state of one measured channel
///
/// # Examples
///
/// ```
/// use mechanic::gauge::Gauge;
///
/// let gauge = Gauge::new("speed", 0.0, 255.0, " km/h", 0.0, 50);
/// gauge.set_target(60.0);
/// for _ in 0..gauge.ticks_to_converge() {
///     gauge.step();
/// }
/// assert_eq!(gauge.current(), 60.0);
/// ```
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
    min: f64,
    max: f64,
    unit: String,
    /// Largest change applied to `current` per tick
    step: f64,
    current: AtomicF64,
    target: AtomicF64,
}

impl Gauge {
    /// Create a gauge resting at `initial`
    ///
    /// # Arguments
    ///
    /// * `min`, `max` - Advisory display range; targets outside it are kept as-is
    /// * `initial` - Starting value for both `current` and `target`
    /// * `steps_to_full_scale` - Ticks needed to sweep from `min` to `max`
    pub fn new(
        name: &'static str,
        min: f64,
        max: f64,
        unit: &str,
        initial: f64,
        steps_to_full_scale: u32,
    ) -> Self {
        let span = (max - min).abs();
        let step = if span > 0.0 {
            span / f64::from(steps_to_full_scale.max(1))
        } else {
            1.0
        };

        Self {
            name,
            min,
            max,
            unit: unit.to_string(),
            step,
            current: AtomicF64::new(initial),
            target: AtomicF64::new(initial),
        }
    }

    /// Build a gauge from its configuration section
    pub fn from_config(name: &'static str, config: &GaugeConfig, steps_to_full_scale: u32) -> Self {
        Self::new(
            name,
            config.min,
            config.max,
            &config.unit,
            config.initial_target(),
            steps_to_full_scale,
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Animated value to draw
    pub fn current(&self) -> f64 {
        self.current.load()
    }

    /// Latest value reported by the link
    pub fn target(&self) -> f64 {
        self.target.load()
    }

    /// Point the gauge at a new value. Non-finite values are ignored.
    pub fn set_target(&self, value: f64) {
        if value.is_finite() {
            self.target.store(value);
        }
    }

    /// Per-tick increment
    pub fn step_size(&self) -> f64 {
        self.step
    }

    /// Advance `current` one tick toward `target`
    ///
    /// Moves by at most one step and snaps onto `target` once within reach,
    /// so it never overshoots and never oscillates.
    pub fn step(&self) {
        let current = self.current.load();
        let target = self.target.load();

        if current == target {
            return;
        }

        let delta = target - current;
        // Tolerance absorbs rounding accumulated over repeated additions
        let next = if delta.abs() <= self.step * (1.0 + SNAP_TOLERANCE) {
            target
        } else {
            current + self.step.copysign(delta)
        };

        self.current.store(next);
    }

    /// Ticks until `current` reaches the present `target`
    ///
    /// Saturates at `u64::MAX` for distances too large to count.
    pub fn ticks_to_converge(&self) -> u64 {
        let distance = (self.target.load() - self.current.load()).abs();
        let ticks = (distance / self.step).ceil();
        if ticks >= u64::MAX as f64 {
            u64::MAX
        } else {
            ticks as u64
        }
    }

    /// Read-only snapshot for the display
    pub fn reading(&self) -> GaugeReading {
        GaugeReading {
            name: self.name,
            current: self.current(),
            target: self.target(),
            min: self.min,
            max: self.max,
            unit: self.unit.clone(),
        }
    }
}

/// Snapshot of one gauge for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeReading {
    pub name: &'static str,
    pub current: f64,
    pub target: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
}

/// The five dashboard gauges fed by telemetry samples
#[derive(Debug)]
pub struct Gauges {
    pub speed: Gauge,
    pub rpm: Gauge,
    pub load: Gauge,
    pub temp: Gauge,
    pub fuel: Gauge,
}

impl Gauges {
    pub fn from_config(config: &GaugesConfig, steps_to_full_scale: u32) -> Self {
        Self {
            speed: Gauge::from_config("speed", &config.speed, steps_to_full_scale),
            rpm: Gauge::from_config("rpm", &config.rpm, steps_to_full_scale),
            load: Gauge::from_config("load", &config.load, steps_to_full_scale),
            temp: Gauge::from_config("temp", &config.temp, steps_to_full_scale),
            fuel: Gauge::from_config("fuel", &config.fuel, steps_to_full_scale),
        }
    }

    /// Gauges in dashboard order
    pub fn iter(&self) -> impl Iterator<Item = &Gauge> {
        [&self.speed, &self.rpm, &self.load, &self.temp, &self.fuel].into_iter()
    }

    /// Point every gauge at the sample's values
    pub fn apply_sample(&self, sample: &TelemetrySample) {
        self.speed.set_target(sample.speed);
        self.rpm.set_target(sample.rpm);
        self.load.set_target(sample.load);
        self.temp.set_target(sample.temp);
        self.fuel.set_target(sample.fuel);
    }

    /// Advance every gauge one tick
    pub fn step_all(&self) {
        for gauge in self.iter() {
            gauge.step();
        }
    }

    /// Largest remaining convergence bound across all gauges
    pub fn ticks_to_converge(&self) -> u64 {
        self.iter().map(Gauge::ticks_to_converge).max().unwrap_or(0)
    }

    pub fn readings(&self) -> Vec<GaugeReading> {
        self.iter().map(Gauge::reading).collect()
    }
}

impl Default for Gauges {
    fn default() -> Self {
        Self::from_config(&GaugesConfig::default(), 50)
    }
}
