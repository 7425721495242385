//! # Console Display Module
//!
//! Stand-in for the dashboard UI: shows the link status and gauge
//! readouts on the terminal and turns operator input into commands.

pub mod command;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::RwLock;
use tracing::info;

use crate::gauge::{GaugeReading, Gauges};
use crate::link::{StatusReporter, NOT_CONNECTED, STATUS_TITLE};

pub use command::Command;

/// Readout output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadoutFormat {
    Text,
    Json,
}

impl ReadoutFormat {
    /// Parse the `display.format` config value; anything but `json` is text
    pub fn from_config(value: &str) -> Self {
        if value == "json" {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Status reporter that logs changes and remembers the current title line
#[derive(Debug)]
pub struct ConsoleStatus {
    line: RwLock<String>,
}

impl ConsoleStatus {
    pub fn new() -> Self {
        Self {
            line: RwLock::new(title_line(STATUS_TITLE, NOT_CONNECTED)),
        }
    }

    /// Current title line, e.g. `Main [not connected]`
    pub fn line(&self) -> String {
        match self.line.read() {
            Ok(line) => line.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for ConsoleStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter for ConsoleStatus {
    fn set_status(&self, title: &str, detail: &str) {
        let next = title_line(title, detail);
        let mut line = match self.line.write() {
            Ok(line) => line,
            Err(poisoned) => poisoned.into_inner(),
        };

        // The supervisor repeats "not connected" on every retry
        if *line != next {
            info!("{}", next);
            *line = next;
        }
    }
}

fn title_line(title: &str, detail: &str) -> String {
    format!("{} [{}]", title, detail)
}

/// Timestamped snapshot of the status line and every gauge
#[derive(Debug, Clone, Serialize)]
pub struct Readout {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub gauges: Vec<GaugeReading>,
}

impl Readout {
    pub fn capture(status: &ConsoleStatus, gauges: &Gauges) -> Self {
        Self {
            timestamp: Utc::now(),
            status: status.line(),
            gauges: gauges.readings(),
        }
    }

    /// Render as one line in `format`
    pub fn render(&self, format: ReadoutFormat) -> String {
        match format {
            ReadoutFormat::Text => self.to_text(),
            ReadoutFormat::Json => serde_json::to_string(self).unwrap_or_else(|e| {
                format!("{{\"error\":\"readout serialization failed: {}\"}}", e)
            }),
        }
    }

    fn to_text(&self) -> String {
        let gauges: Vec<String> = self
            .gauges
            .iter()
            .map(|g| format!("{} {:.0}{}", g.name, g.current, g.unit))
            .collect();
        format!("{} | {}", self.status, gauges.join(" | "))
    }
}

/// Numbered endpoint listing for the operator
pub fn render_endpoints(endpoints: &[String]) -> String {
    if endpoints.is_empty() {
        return "No paired endpoints found".to_string();
    }

    endpoints
        .iter()
        .enumerate()
        .map(|(i, name)| format!("  [{}] {}", i, name))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TelemetrySample;

    #[test]
    fn test_console_status_starts_not_connected() {
        assert_eq!(ConsoleStatus::new().line(), "Main [not connected]");
    }

    #[test]
    fn test_console_status_tracks_latest() {
        let status = ConsoleStatus::new();
        status.set_status("Main", "OBDLink, 500 kbps, extended ids");
        assert_eq!(status.line(), "Main [OBDLink, 500 kbps, extended ids]");

        status.set_status("Main", NOT_CONNECTED);
        status.set_status("Main", NOT_CONNECTED);
        assert_eq!(status.line(), "Main [not connected]");
    }

    #[test]
    fn test_readout_format_from_config() {
        assert_eq!(ReadoutFormat::from_config("json"), ReadoutFormat::Json);
        assert_eq!(ReadoutFormat::from_config("text"), ReadoutFormat::Text);
    }

    fn sample_readout() -> Readout {
        let gauges = Gauges::default();
        gauges.apply_sample(&TelemetrySample {
            slow_bitrate: false,
            extended_ids: true,
            speed: 60.0,
            rpm: 15.0,
            load: 2.0,
            temp: 3.0,
            fuel: 50.0,
        });
        for _ in 0..gauges.ticks_to_converge() {
            gauges.step_all();
        }
        Readout::capture(&ConsoleStatus::new(), &gauges)
    }

    #[test]
    fn test_text_readout() {
        let text = sample_readout().render(ReadoutFormat::Text);
        assert_eq!(
            text,
            concat!(
                "Main [not connected] | speed 60 km/h | rpm 15 rpm | ",
                "load 2% load | temp 3°C | fuel 50% fuel"
            )
        );
    }

    #[test]
    fn test_json_readout() {
        let json = sample_readout().render(ReadoutFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["status"], "Main [not connected]");
        assert_eq!(value["gauges"][0]["name"], "speed");
        assert_eq!(value["gauges"][0]["current"], 60.0);
        assert_eq!(value["gauges"][3]["min"], -40.0);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_render_endpoints() {
        let listing = render_endpoints(&["OBDLink".to_string(), "/dev/rfcomm1".to_string()]);
        assert_eq!(listing, "  [0] OBDLink\n  [1] /dev/rfcomm1");
        assert_eq!(render_endpoints(&[]), "No paired endpoints found");
    }
}
