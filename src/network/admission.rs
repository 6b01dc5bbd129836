//! Admission queue
//!
//! Bounded FIFO between the registration listener and the session workers.
//! The listener blocks when the queue is full, workers block when it is
//! empty, so at most `capacity` connection requests wait unserviced.

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;

use crate::error::{KvsError, Result};
use crate::protocol::ConnectRequest;

pub struct AdmissionQueue {
    /// `None` once closed; workers drain what is left and then stop
    sender: RwLock<Option<Sender<ConnectRequest>>>,
    receiver: Receiver<ConnectRequest>,
    capacity: usize,
}

impl AdmissionQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            capacity,
        }
    }

    /// Enqueue a request, blocking while the queue is full
    pub fn submit(&self, request: ConnectRequest) -> Result<()> {
        // Clone so the lock is not held across a blocking send
        let sender = self.sender.read().clone().ok_or(KvsError::AdmissionClosed)?;
        sender
            .send(request)
            .map_err(|_| KvsError::AdmissionClosed)
    }

    /// Enqueue without blocking; `Ok(false)` if the queue is full
    pub fn try_submit(&self, request: ConnectRequest) -> Result<bool> {
        let sender = self.sender.read().clone().ok_or(KvsError::AdmissionClosed)?;
        match sender.try_send(request) {
            Ok(()) => Ok(true),
            Err(channel::TrySendError::Full(_)) => Ok(false),
            Err(channel::TrySendError::Disconnected(_)) => Err(KvsError::AdmissionClosed),
        }
    }

    /// Dequeue the oldest request, blocking while the queue is empty.
    /// `None` once the queue is closed and drained.
    pub fn next(&self) -> Option<ConnectRequest> {
        self.receiver.recv().ok()
    }

    /// Stop accepting new requests
    pub fn close(&self) {
        self.sender.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Requests waiting for a worker
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
