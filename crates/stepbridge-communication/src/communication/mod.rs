//! Serial link abstraction
//!
//! A [`SerialLink`] is one line-oriented, bidirectional connection. Reads and
//! writes are independent so the two forwarding loops never wait on each
//! other: the host link is read by one loop while the other writes device
//! responses into it.

pub mod link_manager;
pub mod memory;
pub mod serial;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;
use stepbridge_core::constants::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};
use stepbridge_core::ConnectionError;

/// Which side of the broker a link faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    /// Command-issuing controller
    Host,
    /// Motion controller
    Device,
}

impl fmt::Display for LinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// Parameters for opening one serial link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkParams {
    /// Side of the broker this link faces
    pub role: LinkRole,
    /// Port path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Timeout for a single line read or write
    pub timeout: Duration,
}

impl LinkParams {
    /// Create parameters with the default baud rate and timeout
    pub fn new(role: LinkRole, port: impl Into<String>) -> Self {
        Self {
            role,
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read/write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One open, line-oriented serial connection
pub trait SerialLink: Send + Sync {
    /// Read one line including its `\n`.
    ///
    /// Returns `Ok(None)` when no full line is available yet, at the latest
    /// once the read timeout expires; partial data is kept for the next call.
    /// Errors are transport faults.
    fn read_line(&self) -> io::Result<Option<Vec<u8>>>;

    /// Write one complete line (the caller includes the `\n`)
    fn write_line(&self, line: &[u8]) -> io::Result<()>;

    /// Release the underlying handle. Later reads and writes fail with
    /// `NotConnected`, carrying [`ConnectionError::LinkClosed`].
    fn close(&self);

    /// Port name, for logging
    fn name(&self) -> &str;
}

pub(crate) fn closed_error(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        ConnectionError::LinkClosed {
            port: name.to_string(),
        },
    )
}
