//! In-memory links
//!
//! A [`MemoryLink`] behaves like a serial port with scripted input: lines and
//! faults are queued for reading, and every written line is recorded. The
//! [`MemoryOpener`] hands out fresh memory links and keeps them reachable, so
//! a broker can be driven end to end without hardware.

use super::link_manager::LinkOpener;
use super::{closed_error, LinkRole, SerialLink};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stepbridge_core::{ConnectionError, Result};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Scripted, recording link
pub struct MemoryLink {
    name: String,
    inbound: Mutex<VecDeque<io::Result<Vec<u8>>>>,
    written: Mutex<Vec<Vec<u8>>>,
    write_fault: Mutex<Option<io::ErrorKind>>,
    closed: AtomicBool,
    read_timeout: Duration,
}

impl MemoryLink {
    /// Create an open link
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inbound: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            write_fault: Mutex::new(None),
            closed: AtomicBool::new(false),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Queue a line to be returned by `read_line`
    pub fn push_line(&self, line: impl AsRef<[u8]>) {
        self.inbound.lock().push_back(Ok(line.as_ref().to_vec()));
    }

    /// Queue a read fault
    pub fn push_fault(&self, kind: io::ErrorKind) {
        self.inbound
            .lock()
            .push_back(Err(io::Error::new(kind, "injected read fault")));
    }

    /// Make the next write fail
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        *self.write_fault.lock() = Some(kind);
    }

    /// Every line written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    /// Number of queued, unread inbound entries
    pub fn pending(&self) -> usize {
        self.inbound.lock().len()
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl SerialLink for MemoryLink {
    fn read_line(&self) -> io::Result<Option<Vec<u8>>> {
        if self.is_closed() {
            return Err(closed_error(&self.name));
        }
        let next = self.inbound.lock().pop_front();
        match next {
            Some(entry) => entry.map(Some),
            None => {
                std::thread::sleep(self.read_timeout);
                Ok(None)
            }
        }
    }

    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error(&self.name));
        }
        if let Some(kind) = self.write_fault.lock().take() {
            return Err(io::Error::new(kind, "injected write fault"));
        }
        self.written.lock().push(line.to_vec());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
struct OpenerState {
    host: Vec<Arc<MemoryLink>>,
    device: Vec<Arc<MemoryLink>>,
    fail_remaining: u32,
    fail_role: Option<LinkRole>,
    failed: u32,
}

impl OpenerState {
    fn opened(&mut self, role: LinkRole) -> &mut Vec<Arc<MemoryLink>> {
        match role {
            LinkRole::Host => &mut self.host,
            LinkRole::Device => &mut self.device,
        }
    }
}

/// Hands out memory links and keeps every one it opened
#[derive(Clone, Default)]
pub struct MemoryOpener {
    state: Arc<Mutex<OpenerState>>,
}

impl MemoryOpener {
    /// Create an opener that always succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` open attempts, whichever side they are for
    pub fn fail_next_opens(&self, count: u32) {
        self.state.lock().fail_remaining = count;
    }

    /// Fail the next open attempt for `role` only
    pub fn fail_role_once(&self, role: LinkRole) {
        self.state.lock().fail_role = Some(role);
    }

    /// Number of rejected open attempts
    pub fn failed_opens(&self) -> u32 {
        self.state.lock().failed
    }

    /// Number of successful opens for `role`
    pub fn open_count(&self, role: LinkRole) -> usize {
        self.state.lock().opened(role).len()
    }

    /// All links opened for `role`, oldest first
    pub fn links(&self, role: LinkRole) -> Vec<Arc<MemoryLink>> {
        self.state.lock().opened(role).clone()
    }

    /// Most recently opened link for `role`
    pub fn latest(&self, role: LinkRole) -> Option<Arc<MemoryLink>> {
        self.state.lock().opened(role).last().cloned()
    }
}

impl LinkOpener for MemoryOpener {
    fn open(&self, role: LinkRole) -> Result<Arc<dyn SerialLink>> {
        let mut state = self.state.lock();
        let name = format!("memory-{}-{}", role, state.opened(role).len() + 1);

        let reject = if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            true
        } else if state.fail_role == Some(role) {
            state.fail_role = None;
            true
        } else {
            false
        };
        if reject {
            state.failed += 1;
            return Err(ConnectionError::FailedToOpen {
                port: name,
                reason: "injected open failure".to_string(),
            }
            .into());
        }

        let link = Arc::new(MemoryLink::new(name));
        state.opened(role).push(Arc::clone(&link));
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reads() {
        let link = MemoryLink::new("test");
        link.push_line(b"D1\n");
        link.push_fault(io::ErrorKind::BrokenPipe);

        assert_eq!(link.read_line().unwrap(), Some(b"D1\n".to_vec()));
        assert_eq!(
            link.read_line().unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
        assert_eq!(link.read_line().unwrap(), None);
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let link = MemoryLink::new("test");
        link.close();
        assert_eq!(
            link.write_line(b"S\n").unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        let err = link.read_line().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(matches!(
            err.get_ref().and_then(|e| e.downcast_ref::<ConnectionError>()),
            Some(ConnectionError::LinkClosed { port }) if port == "test"
        ));
    }

    #[test]
    fn test_write_fault_is_one_shot() {
        let link = MemoryLink::new("test");
        link.fail_next_write(io::ErrorKind::TimedOut);
        assert!(link.write_line(b"OK\n").is_err());
        link.write_line(b"OK\n").unwrap();
        assert_eq!(link.written(), vec![b"OK\n".to_vec()]);
    }
}
