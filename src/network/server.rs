//! Session server
//!
//! Accepts connection requests and dispatches them to a fixed pool of
//! session workers through the bounded admission queue.

use std::io::Read;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::error::{KvsError, Result};
use crate::protocol::{read_connect, ConnectRequest};
use crate::store::Store;

use super::admission::AdmissionQueue;
use super::channel::ChannelOpener;
use super::connection::Session;
use super::registry::SessionRegistry;

/// Admission pipeline for client sessions
pub struct Server {
    config: Config,
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    opener: Arc<dyn ChannelOpener>,
    queue: Arc<AdmissionQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl Server {
    /// Create a server; no threads run until [`start`](Self::start)
    pub fn new(
        config: Config,
        store: Arc<Store>,
        registry: Arc<SessionRegistry>,
        opener: Arc<dyn ChannelOpener>,
    ) -> Self {
        let queue = Arc::new(AdmissionQueue::new(config.max_sessions));
        Self {
            config,
            store,
            registry,
            opener,
            queue,
            workers: Vec::new(),
        }
    }

    /// Spawn the session worker pool (`max_sessions` threads)
    pub fn start(&mut self) -> Result<()> {
        for i in 0..self.config.max_sessions {
            let worker = SessionWorker {
                queue: Arc::clone(&self.queue),
                opener: Arc::clone(&self.opener),
                store: Arc::clone(&self.store),
                registry: Arc::clone(&self.registry),
                max_subscriptions: self.config.max_subscriptions,
            };
            let handle = thread::Builder::new()
                .name(format!("session-worker-{}", i))
                .spawn(move || worker.run())?;
            self.workers.push(handle);
        }
        tracing::info!("Started {} session workers", self.workers.len());
        Ok(())
    }

    /// Queue a connection request, blocking while the queue is full
    pub fn admit(&self, request: ConnectRequest) -> Result<()> {
        tracing::debug!("Admitting {:?}", request);
        self.queue.submit(request)
    }

    /// Read connection requests from a registration stream until it ends.
    /// Returns how many were admitted.
    ///
    /// Malformed frames are logged and skipped; frames are fixed-size, so
    /// the stream stays aligned.
    pub fn serve<R: Read>(&self, registration: &mut R) -> Result<usize> {
        let mut admitted = 0;
        loop {
            match read_connect(registration) {
                Ok(Some(request)) => {
                    self.admit(request)?;
                    admitted += 1;
                }
                Ok(None) => return Ok(admitted),
                Err(KvsError::Protocol(msg)) => {
                    tracing::warn!("Rejected connection request: {}", msg);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Serve the configured registration channel forever, re-opening it
    /// each time its writers go away
    pub fn listen(&self) -> Result<()> {
        let name = self.config.registration_channel.to_string_lossy().into_owned();
        tracing::info!("Listening for connections on {}", name);
        loop {
            let mut registration = self.opener.open_reader(&name)?;
            self.serve(&mut registration)?;
        }
    }

    /// Forcefully tear down every live session, freeing their workers for
    /// queued requests. Returns how many were signalled.
    pub fn disconnect_all(&self) -> usize {
        let count = self.registry.disconnect_all(&self.store);
        tracing::info!("Disconnected {} sessions", count);
        count
    }

    /// Sessions currently being served
    pub fn live_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Requests waiting for a session worker
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Close admission, tear down live sessions, and wait for workers
    pub fn shutdown(mut self) {
        self.queue.close();
        self.disconnect_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Session worker panicked");
            }
        }
        tracing::info!("Session server stopped");
    }
}

/// One thread of the session pool
struct SessionWorker {
    queue: Arc<AdmissionQueue>,
    opener: Arc<dyn ChannelOpener>,
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    max_subscriptions: usize,
}

impl SessionWorker {
    fn run(self) {
        while let Some(request) = self.queue.next() {
            match self.open_session(&request) {
                Ok(mut session) => {
                    let end = session.run();
                    tracing::debug!("{} ended: {:?}", session.id(), end);
                }
                Err(e) => {
                    tracing::warn!("Failed to open channels for {:?}: {}", request, e);
                }
            }
        }
    }

    /// Open the channels (notification, response, then request, the order
    /// clients expect) and publish the session
    fn open_session(&self, request: &ConnectRequest) -> Result<Session> {
        let notifications = self.opener.open_writer(&request.notification)?;
        let responses = self.opener.open_writer(&request.response)?;
        let requests = self.opener.open_reader(&request.request)?;

        let handle = self.registry.register(notifications, self.max_subscriptions);
        let opener = Arc::clone(&self.opener);
        let name = request.request.clone();
        handle.set_waker(Box::new(move || opener.interrupt_reader(&name)));
        Ok(Session::new(
            handle,
            requests,
            responses,
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
        ))
    }
}
