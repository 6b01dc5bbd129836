//! Subscriber handles and per-key subscriber sets

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::{encode_notification, Notification};

/// Identifies one client session for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A session's notification channel, shared between the session and every
/// entry it is subscribed to.
///
/// The sink has its own mutex, independent from the session's response
/// channel, so notification delivery never waits on request handling.
pub struct Notifier {
    session: SessionId,
    sink: Mutex<Option<Box<dyn Write + Send>>>,
}

impl Notifier {
    pub fn new(session: SessionId, sink: Box<dyn Write + Send>) -> Self {
        Self {
            session,
            sink: Mutex::new(Some(sink)),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Write one notification frame to the channel
    pub fn notify(&self, notification: &Notification) -> io::Result<()> {
        let frame = encode_notification(notification)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let mut sink = self.sink.lock();
        match sink.as_mut() {
            Some(writer) => {
                writer.write_all(&frame)?;
                writer.flush()
            }
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "notification channel closed",
            )),
        }
    }

    /// Drop the underlying channel. Later notifications fail with
    /// `BrokenPipe`.
    pub fn close(&self) {
        self.sink.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sink.lock().is_none()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("session", &self.session)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Result of adding a session to a subscriber set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Added,
    AlreadySubscribed,
    Full,
}

/// Bounded set of sessions to notify when a key changes
#[derive(Debug)]
pub struct SubscriberSet {
    slots: Vec<Arc<Notifier>>,
    capacity: usize,
}

impl SubscriberSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a subscriber. Reports `Full` instead of dropping it silently.
    pub fn insert(&mut self, notifier: Arc<Notifier>) -> SubscribeOutcome {
        if self.contains(notifier.session()) {
            return SubscribeOutcome::AlreadySubscribed;
        }
        if self.slots.len() >= self.capacity {
            return SubscribeOutcome::Full;
        }
        self.slots.push(notifier);
        SubscribeOutcome::Added
    }

    /// Remove a session's slot. Returns false if it held none.
    pub fn remove(&mut self, session: SessionId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|n| n.session() != session);
        self.slots.len() != before
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.slots.iter().any(|n| n.session() == session)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deliver a change to every subscriber.
    ///
    /// A failed write is logged and skipped; the owning session detects the
    /// broken channel on its own and tears itself down.
    pub fn notify_all(&self, notification: &Notification) {
        for notifier in &self.slots {
            if let Err(e) = notifier.notify(notification) {
                tracing::warn!(
                    "Failed to notify {} about {:?}: {}",
                    notifier.session(),
                    notification.key(),
                    e
                );
            }
        }
    }
}
