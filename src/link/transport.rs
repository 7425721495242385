//! Trait abstraction for the telemetry transport to enable testing

use async_trait::async_trait;
use std::io;

/// An open link to one endpoint, yielding one record per receive
#[async_trait]
pub trait Transport: Send {
    /// Whether the link still considers itself up
    fn is_connected(&self) -> bool;

    /// Wait for the next record, without its line terminator
    async fn receive(&mut self) -> io::Result<String>;

    /// Release the link. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens transports by endpoint name and lists the endpoints available
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport + 'static;

    /// Open a link to `endpoint`
    async fn open(&self, endpoint: &str) -> io::Result<Self::Transport>;

    /// Names of the endpoints the operator can choose from, in display order
    fn list_available_endpoints(&self) -> io::Result<Vec<String>>;
}
