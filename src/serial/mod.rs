//! # Serial Communication Module
//!
//! Handles the serial link to the diagnostic module.
//!
//! This module handles:
//! - Opening a paired endpoint (e.g. `/dev/rfcomm0`) as 8N1 serial
//! - Splitting the byte stream into newline-terminated records
//! - Resynchronizing after garbage or over-long lines
//! - Listing the endpoints available to the operator

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::AsyncReadExt;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{MechanicError, Result};
use crate::link::{Connector, Transport};

/// Default baud rate for the diagnostic module
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Longest record accepted before the buffer is discarded
pub const MAX_RECORD_LEN: usize = 256;

/// Record terminator
const RECORD_TERMINATOR: u8 = b'\n';

/// Read buffer capacity
const READ_BUFFER_CAPACITY: usize = 512;

/// Opens serial endpoints at a fixed baud rate
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Open a specific serial port with 8N1 settings
    ///
    /// Blocks until the device answers; RFCOMM endpoints can take seconds.
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/rfcomm0")
    /// * `baud_rate` - Line speed
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| MechanicError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    type Transport = SerialLink;

    async fn open(&self, endpoint: &str) -> io::Result<SerialLink> {
        debug!("Trying to open serial port: {}", endpoint);

        let path = endpoint.to_string();
        let baud_rate = self.baud_rate;
        let port = off_runtime(move || Self::open_port(&path, baud_rate)).await?;

        info!("Successfully opened diagnostic module at {}", endpoint);
        Ok(SerialLink::new(port, endpoint))
    }

    fn list_available_endpoints(&self) -> io::Result<Vec<String>> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let mut names: Vec<String> = ports.into_iter().map(|port| port.port_name).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Run a blocking port operation on the blocking pool
///
/// Keeps the runtime free so the caller can race the operation against
/// shutdown. Failures map to `NotConnected`.
async fn off_runtime<T, F>(op: F) -> io::Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .map_err(|e| io::Error::new(io::ErrorKind::NotConnected, e.to_string()))
}

/// An open serial session yielding one record per line
pub struct SerialLink {
    /// Serial port handle; `None` once closed
    port: Option<tokio_serial::SerialStream>,
    /// Device path (e.g., /dev/rfcomm0)
    device_path: String,
    buffer: BytesMut,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("device_path", &self.device_path)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialLink {
    fn new(port: tokio_serial::SerialStream, device_path: &str) -> Self {
        Self {
            port: Some(port),
            device_path: device_path.to_string(),
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
        }
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl Transport for SerialLink {
    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn receive(&mut self) -> io::Result<String> {
        loop {
            if let Some(record) = next_record(&mut self.buffer) {
                return Ok(record);
            }

            let port = self
                .port
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial link closed"))?;

            let read = port.read_buf(&mut self.buffer).await?;
            if read == 0 {
                self.port = None;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} closed by remote", self.device_path),
                ));
            }
        }
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.device_path);
        }
        self.buffer.clear();
    }
}

/// Take the next complete record out of `buffer`
///
/// Strips the `\n` terminator and an optional `\r`. Bytes that are not
/// valid UTF-8 are replaced, leaving the parser to reject the record. When
/// more than [`MAX_RECORD_LEN`] bytes pile up without a terminator the
/// buffer is dropped so the stream can resync on the next line.
pub fn next_record(buffer: &mut BytesMut) -> Option<String> {
    match buffer.iter().position(|&b| b == RECORD_TERMINATOR) {
        Some(end) => {
            let line = buffer.split_to(end + 1);
            let mut record = &line[..end];
            if let Some(stripped) = record.strip_suffix(b"\r") {
                record = stripped;
            }

            if record.len() > MAX_RECORD_LEN {
                warn!("Dropped over-long record ({} bytes)", record.len());
                return next_record(buffer);
            }

            Some(String::from_utf8_lossy(record).into_owned())
        }
        None => {
            if buffer.len() > MAX_RECORD_LEN {
                warn!("Discarding {} unterminated bytes", buffer.len());
                buffer.advance(buffer.len());
            }
            None
        }
    }
}
