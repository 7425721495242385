//! # Link Module
//!
//! Keeps the telemetry link to the diagnostic module alive.
//!
//! This module handles:
//! - Link state and the status snapshot shown to the operator
//! - The endpoint the operator selected
//! - The transport seam ([`transport`]) and the reconnecting supervisor
//!   ([`supervisor`]) that drives it

pub mod supervisor;
pub mod transport;

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::frame::LinkParameters;

pub use supervisor::{ConnectionSupervisor, SupervisorSettings};
pub use transport::{Connector, Transport};

/// Title passed with every status update
pub const STATUS_TITLE: &str = "Main";

/// Detail shown while no session is up
pub const NOT_CONNECTED: &str = "not connected";

/// Connection state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only snapshot of the link published by the supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct LinkStatus {
    pub state: LinkState,
    /// Endpoint of the current or last attempted session
    pub endpoint: Option<String>,
    /// Bus parameters announced by the module in this session
    pub parameters: Option<LinkParameters>,
    /// Samples applied to the gauges in this session
    pub samples_accepted: u64,
    /// Records dropped as malformed in this session
    pub records_rejected: u64,
}

/// Receives status updates for display
#[cfg_attr(test, mockall::automock)]
pub trait StatusReporter: Send + Sync {
    fn set_status(&self, title: &str, detail: &str);
}

/// Status detail once the module has announced its bus parameters
///
/// # Examples
///
/// ```
/// use mechanic::frame::LinkParameters;
/// use mechanic::link::connected_detail;
///
/// let params = LinkParameters { slow_bitrate: false, extended_ids: true };
/// assert_eq!(connected_detail("OBDLink", &params), "OBDLink, 500 kbps, extended ids");
/// ```
pub fn connected_detail(endpoint: &str, parameters: &LinkParameters) -> String {
    format!("{}, {}", endpoint, parameters)
}

/// The operator's endpoint choice, shared with the supervisor
///
/// A new choice is picked up the next time the supervisor starts a
/// session; it never interrupts a running one.
#[derive(Debug, Clone)]
pub struct EndpointSelection {
    selected: Arc<watch::Sender<Option<String>>>,
}

impl EndpointSelection {
    pub fn new(initial: Option<String>) -> Self {
        let (selected, _) = watch::channel(initial);
        Self {
            selected: Arc::new(selected),
        }
    }

    /// Choose the endpoint to connect to
    pub fn select(&self, endpoint: impl Into<String>) {
        self.selected.send_replace(Some(endpoint.into()));
    }

    /// Forget the current choice
    pub fn clear(&self) {
        self.selected.send_replace(None);
    }

    pub fn current(&self) -> Option<String> {
        self.selected.borrow().clone()
    }
}

impl Default for EndpointSelection {
    fn default() -> Self {
        Self::new(None)
    }
}
