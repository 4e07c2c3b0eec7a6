//! Serial port communication implementation
//!
//! Provides the hardware [`SerialLink`] backed by the `serialport` crate.
//!
//! Supports:
//! - Port enumeration for diagnostics
//! - Baud rate and timeout configuration
//! - Line reads that survive read timeouts without losing partial data
//! - Independent read and write handles on the same port

use super::link_manager::LinkOpener;
use super::{closed_error, LinkParams, LinkRole, SerialLink};
use parking_lot::Mutex;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stepbridge_core::constants::LINE_TERMINATOR;
use stepbridge_core::{ConnectionError, Error, Result};

/// Longest line accepted before the partial buffer is discarded
const MAX_LINE_LEN: usize = 4096;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            vid: None,
            pid: None,
        }
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List available serial ports on the system
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .map(|port| {
            let info = SerialPortInfo::new(&port.port_name, get_port_description(port));
            match &port.port_type {
                serialport::SerialPortType::UsbPort(usb_info) => {
                    info.with_usb_ids(usb_info.vid, usb_info.pid)
                }
                _ => info,
            }
        })
        .collect())
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Splits a byte stream into `\n`-terminated lines.
///
/// A partial line survives read timeouts. A line that grows past
/// [`MAX_LINE_LEN`] is dropped along with everything up to its terminator.
struct LineReader<R> {
    port: R,
    pending: Vec<u8>,
    discarding: bool,
}

impl<R: BufRead> LineReader<R> {
    fn new(port: R) -> Self {
        Self {
            port,
            pending: Vec::new(),
            discarding: false,
        }
    }

    /// Consume at most one buffered chunk; `Ok(None)` means no full line yet
    fn read_line(&mut self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let available = match self.port.fill_buf() {
            Ok(available) => available,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        if available.is_empty() {
            let reason = if self.pending.is_empty() && !self.discarding {
                "reached end of stream"
            } else {
                "closed mid-line"
            };
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} {}", name, reason),
            ));
        }

        let (used, terminated) = match available.iter().position(|&b| b == LINE_TERMINATOR) {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };

        let mut complete = false;
        if self.discarding {
            self.discarding = !terminated;
        } else if self.pending.len() + used > MAX_LINE_LEN {
            tracing::warn!(
                port = %name,
                len = self.pending.len() + used,
                "Discarding overlong line"
            );
            self.pending.clear();
            self.discarding = !terminated;
        } else {
            self.pending.extend_from_slice(&available[..used]);
            complete = terminated;
        }
        self.port.consume(used);

        Ok(complete.then(|| std::mem::take(&mut self.pending)))
    }
}

type PortReader = LineReader<BufReader<Box<dyn serialport::SerialPort>>>;

/// Serial link backed by an open `serialport` handle
pub struct SerialPortLink {
    name: String,
    reader: Mutex<Option<PortReader>>,
    writer: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    closed: AtomicBool,
}

impl SerialPortLink {
    /// Open a serial port with the given parameters
    pub fn open(params: &LinkParams) -> Result<Self> {
        if params.baud_rate == 0 {
            return Err(ConnectionError::UnsupportedBaudRate {
                baud: params.baud_rate,
            }
            .into());
        }

        let failed = |e: serialport::Error| ConnectionError::FailedToOpen {
            port: params.port.clone(),
            reason: e.to_string(),
        };

        let writer = serialport::new(&params.port, params.baud_rate)
            .timeout(params.timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(failed)?;

        tracing::debug!(
            role = %params.role,
            port = %params.port,
            baud = params.baud_rate,
            "Opened serial port"
        );

        Self::from_port(&params.port, writer)
    }

    /// Wrap an already open port; reads go through a cloned handle
    pub fn from_port(name: &str, port: Box<dyn serialport::SerialPort>) -> Result<Self> {
        let reader = port
            .try_clone()
            .map_err(|e| ConnectionError::FailedToOpen {
                port: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            reader: Mutex::new(Some(LineReader::new(BufReader::new(reader)))),
            writer: Mutex::new(Some(port)),
            closed: AtomicBool::new(false),
        })
    }
}

impl SerialLink for SerialPortLink {
    fn read_line(&self) -> io::Result<Option<Vec<u8>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(&self.name));
        }
        let mut guard = self.reader.lock();
        let reader = guard.as_mut().ok_or_else(|| closed_error(&self.name))?;

        reader.read_line(&self.name)
    }

    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error(&self.name));
        }
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or_else(|| closed_error(&self.name))?;
        port.write_all(line)?;
        port.flush()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // A concurrent read holds the reader for at most one timeout
        let reader = self.reader.lock().take();
        let writer = self.writer.lock().take();
        if reader.is_some() || writer.is_some() {
            tracing::debug!(port = %self.name, "Closed serial port");
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opens the configured host and device ports
#[derive(Debug, Clone)]
pub struct SerialOpener {
    host: LinkParams,
    device: LinkParams,
}

impl SerialOpener {
    /// Create an opener for the two configured links
    pub fn new(host: LinkParams, device: LinkParams) -> Self {
        Self { host, device }
    }

    /// Parameters for one side
    pub fn params(&self, role: LinkRole) -> &LinkParams {
        match role {
            LinkRole::Host => &self.host,
            LinkRole::Device => &self.device,
        }
    }
}

impl LinkOpener for SerialOpener {
    fn open(&self, role: LinkRole) -> Result<Arc<dyn SerialLink>> {
        let params = self.params(role);
        match SerialPortLink::open(params) {
            Ok(link) => Ok(Arc::new(link)),
            Err(e) => {
                if let Ok(ports) = list_ports() {
                    let names: Vec<&str> = ports.iter().map(|p| p.port_name.as_str()).collect();
                    tracing::debug!(role = %role, available = ?names, "Available serial ports");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Read;
    use std::time::{Duration, Instant};

    /// Byte source that replays chunks and errors, then reports end of stream
    struct Script(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.0.push_front(Ok(chunk.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    fn script(chunks: Vec<io::Result<Vec<u8>>>) -> LineReader<BufReader<Script>> {
        LineReader::new(BufReader::with_capacity(256, Script(chunks.into())))
    }

    fn timeout() -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"))
    }

    #[test]
    fn test_partial_line_survives_timeout() {
        let mut reader = script(vec![Ok(b"M1".to_vec()), timeout(), Ok(b"100\n".to_vec())]);
        assert_eq!(reader.read_line("test").unwrap(), None);
        assert_eq!(reader.read_line("test").unwrap(), None);
        assert_eq!(reader.read_line("test").unwrap(), Some(b"M1100\n".to_vec()));

        let err = reader.read_line("test").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_eof_mid_line_is_an_error() {
        let mut reader = script(vec![Ok(b"D1".to_vec())]);
        assert_eq!(reader.read_line("test").unwrap(), None);
        let err = reader.read_line("test").unwrap_err();
        assert!(err.to_string().contains("closed mid-line"));
    }

    #[test]
    fn test_overlong_line_dropped_through_terminator() {
        let mut chunks: Vec<io::Result<Vec<u8>>> = (0..20).map(|_| Ok(vec![b'A'; 1024])).collect();
        chunks.push(Ok(b"AAA\nH1\n".to_vec()));
        let mut reader = script(chunks);

        let mut line = None;
        for _ in 0..200 {
            line = reader.read_line("test").unwrap();
            assert!(reader.pending.len() <= MAX_LINE_LEN);
            if line.is_some() {
                break;
            }
        }
        assert_eq!(line, Some(b"H1\n".to_vec()));
    }

    #[test]
    fn test_line_at_limit_accepted() {
        let mut long = vec![b'A'; MAX_LINE_LEN - 1];
        long.push(b'\n');
        let mut reader = script(vec![Ok(long.clone())]);

        let mut line = None;
        for _ in 0..100 {
            line = reader.read_line("test").unwrap();
            if line.is_some() {
                break;
            }
        }
        assert_eq!(line, Some(long));
    }

    #[cfg(unix)]
    #[test]
    fn test_pty_stream_without_terminator_is_bounded() {
        use serialport::{SerialPort, TTYPort};
        use std::io::Write;

        let (mut master, mut slave) = TTYPort::pair().unwrap();
        slave.set_timeout(Duration::from_millis(300)).unwrap();
        let link = SerialPortLink::from_port("pty", Box::new(slave)).unwrap();

        let feeder = std::thread::spawn(move || {
            for _ in 0..64 {
                master.write_all(&[b'A'; 1024]).unwrap();
                std::thread::sleep(Duration::from_millis(2));
            }
            master.write_all(b"\nH1\n").unwrap();
            master
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        let line = loop {
            if let Some(line) = link.read_line().unwrap() {
                break line;
            }
            assert!(Instant::now() < deadline, "no line received");
        };
        let _master = feeder.join().unwrap();
        assert_eq!(line, b"H1\n".to_vec());
    }

    #[test]
    fn test_open_missing_port_fails() {
        let params = LinkParams::new(LinkRole::Device, "/dev/stepbridge-does-not-exist")
            .with_timeout(Duration::from_millis(10));
        let err = SerialPortLink::open(&params).err().unwrap();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("/dev/stepbridge-does-not-exist"));
    }

    #[test]
    fn test_zero_baud_rejected() {
        let params = LinkParams::new(LinkRole::Host, "/dev/null").with_baud_rate(0);
        let err = SerialPortLink::open(&params).err().unwrap();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::UnsupportedBaudRate { baud: 0 })
        ));
    }

    #[test]
    fn test_opener_selects_params_by_role() {
        let opener = SerialOpener::new(
            LinkParams::new(LinkRole::Host, "/dev/ttyUSB0"),
            LinkParams::new(LinkRole::Device, "/dev/ttyACM0").with_baud_rate(57_600),
        );
        assert_eq!(opener.params(LinkRole::Host).port, "/dev/ttyUSB0");
        assert_eq!(opener.params(LinkRole::Device).baud_rate, 57_600);
    }
}
