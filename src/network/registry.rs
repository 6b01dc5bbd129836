//! Live-session registry
//!
//! Tracks every session currently being served so an administrative
//! request can tear all of them down at once. Per-request traffic never
//! touches the registry lock.
//!
//! ## Lock order
//! registry → session subscriptions → shard → notification sink

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KvsError, Result};
use crate::store::{Notifier, SessionId, Store};

/// Wakes a session thread blocked on its request channel
pub type Waker = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Shared state of one live session
///
/// The subscription list mutex is held across the matching store call, so
/// a teardown can never miss a key that is being subscribed concurrently.
pub struct SessionHandle {
    notifier: Arc<Notifier>,
    subscriptions: Mutex<Vec<String>>,
    max_subscriptions: usize,
    terminated: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl SessionHandle {
    fn new(notifier: Arc<Notifier>, max_subscriptions: usize) -> Self {
        Self {
            notifier,
            subscriptions: Mutex::new(Vec::with_capacity(max_subscriptions)),
            max_subscriptions,
            terminated: AtomicBool::new(false),
            waker: Mutex::new(None),
        }
    }

    /// Install the hook that unblocks the session's request read on
    /// teardown. Runs at once if the session is already terminated.
    pub fn set_waker(&self, waker: Waker) {
        let mut slot = self.waker.lock();
        if self.is_terminated() {
            drop(slot);
            self.wake(waker);
        } else {
            *slot = Some(waker);
        }
    }

    fn wake(&self, waker: Waker) {
        if let Err(e) = waker() {
            tracing::warn!("{}: failed to wake session: {}", self.id(), e);
        }
    }

    pub fn id(&self) -> SessionId {
        self.notifier.session()
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Subscribe this session to `key` and record it in the session's list
    pub fn subscribe(&self, store: &Store, key: &str) -> Result<()> {
        let mut keys = self.subscriptions.lock();
        if self.is_terminated() {
            return Err(KvsError::Protocol("session terminated".into()));
        }

        let listed = keys.iter().any(|k| k == key);
        if !listed && keys.len() >= self.max_subscriptions {
            return Err(KvsError::SubscriptionLimit(self.max_subscriptions));
        }

        store.subscribe(key, &self.notifier)?;
        if !listed {
            keys.push(key.to_string());
        }
        Ok(())
    }

    /// Unsubscribe from `key`. The key leaves the session's list even when
    /// the store no longer has it.
    pub fn unsubscribe(&self, store: &Store, key: &str) -> Result<()> {
        let mut keys = self.subscriptions.lock();
        keys.retain(|k| k != key);
        store.unsubscribe(key, self.id())
    }

    /// Drop every subscription this session holds. Returns how many keys
    /// were released.
    pub fn release(&self, store: &Store) -> usize {
        let mut keys = self.subscriptions.lock();
        let released = keys.len();
        for key in keys.drain(..) {
            match store.unsubscribe(&key, self.id()) {
                Ok(()) => {}
                Err(KvsError::KeyNotFound) => {
                    tracing::trace!("{}: {:?} already deleted", self.id(), key);
                }
                Err(e) => tracing::warn!("{}: failed to unsubscribe {:?}: {}", self.id(), key, e),
            }
        }
        released
    }

    /// Forced teardown: mark terminated, release subscriptions, close the
    /// notification channel, and wake the session thread so it closes the
    /// request and response channels
    pub fn terminate(&self, store: &Store) {
        self.terminated.store(true, Ordering::SeqCst);
        let released = self.release(store);
        self.notifier.close();
        let waker = self.waker.lock().take();
        if let Some(waker) = waker {
            self.wake(waker);
        }
        tracing::debug!("{} terminated ({} subscriptions released)", self.id(), released);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Snapshot of the keys this session is subscribed to
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("subscriptions", &*self.subscriptions.lock())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// All sessions currently being served
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<SessionHandle>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id, wrap the notification channel, and publish the
    /// session
    pub fn register(
        &self,
        notifications: Box<dyn Write + Send>,
        max_subscriptions: usize,
    ) -> Arc<SessionHandle> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let notifier = Arc::new(Notifier::new(id, notifications));
        let handle = Arc::new(SessionHandle::new(notifier, max_subscriptions));
        self.sessions.lock().insert(id, Arc::clone(&handle));
        handle
    }

    pub fn deregister(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.lock().remove(&id)
    }

    /// Tear down every live session. Each session thread is woken from its
    /// request read and deregisters itself.
    pub fn disconnect_all(&self, store: &Store) -> usize {
        let sessions = self.sessions.lock();
        for handle in sessions.values() {
            handle.terminate(store);
        }
        sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
