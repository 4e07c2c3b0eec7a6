//! Link manager
//!
//! Owns the host/device link pair. Both links are opened together and, after
//! any transport fault, closed and reopened together. Every successful open
//! starts a new *generation*; a worker that saw a fault passes the session it
//! was using to [`LinkManager::reopen`], and if another worker already
//! replaced that generation it simply receives the new session. Concurrent
//! faults therefore cause a single reconnect.

use super::{LinkRole, SerialLink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use stepbridge_core::{ConnectionError, Result, ShutdownSignal};
use tracing::{error, info, warn};

/// Opens one side of the broker
pub trait LinkOpener: Send + Sync {
    /// Open the link for `role`
    fn open(&self, role: LinkRole) -> Result<Arc<dyn SerialLink>>;
}

/// The matched pair of open links
pub struct LinkPair {
    /// Host-facing link
    pub host: Arc<dyn SerialLink>,
    /// Device-facing link
    pub device: Arc<dyn SerialLink>,
}

impl LinkPair {
    /// Close both links
    pub fn close(&self) {
        self.host.close();
        self.device.close();
    }
}

/// A worker's view of the current link pair
#[derive(Clone)]
pub struct Session {
    generation: u64,
    links: Arc<LinkPair>,
}

impl Session {
    /// Open count at the time this session was created (starts at 1)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Host-facing link
    pub fn host(&self) -> &dyn SerialLink {
        self.links.host.as_ref()
    }

    /// Device-facing link
    pub fn device(&self) -> &dyn SerialLink {
        self.links.device.as_ref()
    }
}

#[derive(Default)]
struct SessionSlot {
    generation: u64,
    links: Option<Arc<LinkPair>>,
}

impl SessionSlot {
    fn session(&self) -> Option<Session> {
        self.links.as_ref().map(|links| Session {
            generation: self.generation,
            links: Arc::clone(links),
        })
    }
}

/// Opens, reopens and closes the link pair
pub struct LinkManager {
    opener: Box<dyn LinkOpener>,
    slot: Mutex<SessionSlot>,
    backoff: Duration,
    shutdown: ShutdownSignal,
}

impl LinkManager {
    /// Create a manager; nothing is opened until [`open_all`](Self::open_all)
    pub fn new(
        opener: impl LinkOpener + 'static,
        backoff: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            opener: Box::new(opener),
            slot: Mutex::new(SessionSlot::default()),
            backoff,
            shutdown,
        }
    }

    /// Block until both links are open, retrying every backoff interval.
    ///
    /// Only fails with `ShutdownRequested`. Returns the existing session if
    /// the links are already open.
    pub fn open_all(&self) -> Result<Session> {
        let mut slot = self.slot.lock();
        if let Some(session) = slot.session() {
            return Ok(session);
        }
        self.open_into(&mut slot)
    }

    /// Replace `stale` with a freshly opened pair.
    ///
    /// If the pair was already replaced since `stale` was handed out, the
    /// current session is returned without touching the links.
    pub fn reopen(&self, stale: &Session) -> Result<Session> {
        let mut slot = self.slot.lock();
        if slot.generation != stale.generation {
            if let Some(session) = slot.session() {
                return Ok(session);
            }
        }

        if let Some(links) = slot.links.take() {
            warn!(
                generation = slot.generation,
                host = links.host.name(),
                device = links.device.name(),
                "Closing both links for reconnect"
            );
            links.close();
        }
        self.open_into(&mut slot)
    }

    /// Current session, if the links are open
    pub fn current(&self) -> Option<Session> {
        self.slot.lock().session()
    }

    /// Number of successful pair opens so far
    pub fn generation(&self) -> u64 {
        self.slot.lock().generation
    }

    /// Close both links, e.g. on shutdown
    pub fn close_all(&self) {
        if let Some(links) = self.slot.lock().links.take() {
            links.close();
            info!(
                host = links.host.name(),
                device = links.device.name(),
                "Links closed"
            );
        }
    }

    fn open_into(&self, slot: &mut SessionSlot) -> Result<Session> {
        loop {
            if self.shutdown.is_triggered() {
                return Err(ConnectionError::ShutdownRequested.into());
            }
            match self.open_pair() {
                Ok(links) => {
                    let links = Arc::new(links);
                    slot.generation += 1;
                    slot.links = Some(Arc::clone(&links));
                    let session = Session {
                        generation: slot.generation,
                        links,
                    };
                    info!(
                        generation = session.generation,
                        host = session.host().name(),
                        device = session.device().name(),
                        "Links open"
                    );
                    return Ok(session);
                }
                Err(e) => {
                    error!("Failed to open links: {}. Retrying in {:?}", e, self.backoff);
                    if !self.shutdown.sleep(self.backoff) {
                        return Err(ConnectionError::ShutdownRequested.into());
                    }
                }
            }
        }
    }

    fn open_pair(&self) -> Result<LinkPair> {
        let host = self.opener.open(LinkRole::Host)?;
        let device = match self.opener.open(LinkRole::Device) {
            Ok(device) => device,
            Err(e) => {
                host.close();
                return Err(e);
            }
        };
        Ok(LinkPair { host, device })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::memory::MemoryOpener;

    fn manager(opener: &MemoryOpener) -> LinkManager {
        LinkManager::new(
            opener.clone(),
            Duration::from_millis(5),
            ShutdownSignal::new(),
        )
    }

    #[test]
    fn test_open_all_is_idempotent() {
        let opener = MemoryOpener::new();
        let links = manager(&opener);

        let first = links.open_all().unwrap();
        let second = links.open_all().unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(second.generation(), 1);
        assert_eq!(opener.open_count(LinkRole::Host), 1);
        assert_eq!(opener.open_count(LinkRole::Device), 1);
    }

    #[test]
    fn test_open_retries_until_success() {
        let opener = MemoryOpener::new();
        opener.fail_next_opens(3);
        let links = manager(&opener);

        let session = links.open_all().unwrap();
        assert_eq!(session.generation(), 1);
        assert_eq!(opener.failed_opens(), 3);
    }

    #[test]
    fn test_device_failure_closes_host() {
        let opener = MemoryOpener::new();
        opener.fail_role_once(LinkRole::Device);
        let links = manager(&opener);

        links.open_all().unwrap();
        let hosts = opener.links(LinkRole::Host);
        assert_eq!(hosts.len(), 2);
        assert!(hosts[0].is_closed());
        assert!(!hosts[1].is_closed());
    }

    #[test]
    fn test_stale_reopen_is_ignored() {
        let opener = MemoryOpener::new();
        let links = manager(&opener);

        let stale = links.open_all().unwrap();
        let fresh = links.reopen(&stale).unwrap();
        assert_eq!(fresh.generation(), 2);

        let again = links.reopen(&stale).unwrap();
        assert_eq!(again.generation(), 2);
        assert_eq!(opener.open_count(LinkRole::Host), 2);
        assert_eq!(opener.open_count(LinkRole::Device), 2);
    }

    #[test]
    fn test_shutdown_abandons_retry() {
        let opener = MemoryOpener::new();
        opener.fail_next_opens(u32::MAX);
        let shutdown = ShutdownSignal::new();
        let links = LinkManager::new(opener.clone(), Duration::from_millis(5), shutdown.clone());
        shutdown.trigger();

        let err = links.open_all().err().unwrap();
        assert!(err.is_shutdown());
        assert!(links.current().is_none());
    }
}
