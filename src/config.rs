//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section is optional; anything left out falls back to the defaults
//! below, which describe the stock five-gauge dashboard.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{MechanicError, Result};

/// Baud rates accepted for the serial link
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gauges: GaugesConfig,
}

/// Link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Endpoint selected at startup, if any
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Longest a single receive waits before the link is re-checked
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Animation configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnimationConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Ticks needed to sweep a gauge from min to max
    #[serde(default = "default_steps_to_full_scale")]
    pub steps_to_full_scale: u32,
}

/// Console display configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    #[serde(default = "default_display_format")]
    pub format: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty logs to the console only
    #[serde(default)]
    pub log_dir: String,
}

/// Per-gauge display ranges
#[derive(Debug, Deserialize, Clone)]
pub struct GaugesConfig {
    #[serde(default = "default_speed_gauge")]
    pub speed: GaugeConfig,
    #[serde(default = "default_rpm_gauge")]
    pub rpm: GaugeConfig,
    #[serde(default = "default_load_gauge")]
    pub load: GaugeConfig,
    #[serde(default = "default_temp_gauge")]
    pub temp: GaugeConfig,
    #[serde(default = "default_fuel_gauge")]
    pub fuel: GaugeConfig,
}

/// A single gauge's range, unit suffix and starting target
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GaugeConfig {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub unit: String,
    /// Initial target; defaults to `min`
    #[serde(default)]
    pub initial: Option<f64>,
}

impl GaugeConfig {
    fn new(min: f64, max: f64, unit: &str) -> Self {
        Self {
            min,
            max,
            unit: unit.to_string(),
            initial: None,
        }
    }

    /// Starting target for the gauge
    pub fn initial_target(&self) -> f64 {
        self.initial.unwrap_or(self.min)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            baud_rate: default_baud_rate(),
            receive_timeout_ms: default_receive_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            steps_to_full_scale: default_steps_to_full_scale(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_ms: default_refresh_ms(),
            format: default_display_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Default for GaugesConfig {
    fn default() -> Self {
        Self {
            speed: default_speed_gauge(),
            rpm: default_rpm_gauge(),
            load: default_load_gauge(),
            temp: default_temp_gauge(),
            fuel: default_fuel_gauge(),
        }
    }
}

// Default value functions
fn default_baud_rate() -> u32 { 115200 }
fn default_receive_timeout_ms() -> u64 { 5000 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_tick_ms() -> u64 { 20 }
fn default_steps_to_full_scale() -> u32 { 50 }

fn default_refresh_ms() -> u64 { 250 }
fn default_display_format() -> String { "text".to_string() }

fn default_log_level() -> String { "info".to_string() }

fn default_speed_gauge() -> GaugeConfig { GaugeConfig::new(0.0, 255.0, " km/h") }
fn default_rpm_gauge() -> GaugeConfig { GaugeConfig::new(0.0, 6000.0, " rpm") }
fn default_load_gauge() -> GaugeConfig { GaugeConfig::new(0.0, 100.0, "% load") }
fn default_temp_gauge() -> GaugeConfig { GaugeConfig::new(-40.0, 215.0, "°C") }
fn default_fuel_gauge() -> GaugeConfig { GaugeConfig::new(0.0, 100.0, "% fuel") }

impl LinkConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl AnimationConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl DisplayConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mechanic::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.link.endpoint {
            if endpoint.trim().is_empty() {
                return Err(invalid("link endpoint cannot be blank when set"));
            }
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.link.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if self.link.receive_timeout_ms == 0 || self.link.receive_timeout_ms > 60000 {
            return Err(invalid("receive_timeout_ms must be between 1 and 60000"));
        }

        if self.link.reconnect_interval_ms == 0 || self.link.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.animation.tick_ms == 0 || self.animation.tick_ms > 1000 {
            return Err(invalid("tick_ms must be between 1 and 1000"));
        }

        if self.animation.steps_to_full_scale == 0 {
            return Err(invalid("steps_to_full_scale must be greater than 0"));
        }

        if self.display.refresh_ms < 10 || self.display.refresh_ms > 60000 {
            return Err(invalid("refresh_ms must be between 10 and 60000"));
        }

        if !["text", "json"].contains(&self.display.format.as_str()) {
            return Err(invalid("display format must be 'text' or 'json'"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging level must be one of: trace, debug, info, warn, error",
            ));
        }

        for (name, gauge) in [
            ("speed", &self.gauges.speed),
            ("rpm", &self.gauges.rpm),
            ("load", &self.gauges.load),
            ("temp", &self.gauges.temp),
            ("fuel", &self.gauges.fuel),
        ] {
            if !gauge.min.is_finite() || !gauge.max.is_finite() {
                return Err(invalid(format!("gauge {} range must be finite", name)));
            }
            if gauge.min >= gauge.max {
                return Err(invalid(format!("gauge {} min must be less than max", name)));
            }
            if gauge.initial.is_some_and(|v| !v.is_finite()) {
                return Err(invalid(format!("gauge {} initial must be finite", name)));
            }
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> MechanicError {
    MechanicError::Config(toml::de::Error::custom(msg))
}
