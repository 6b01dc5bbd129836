//! Job stack
//!
//! Bounded LIFO of job names shared by the producer (directory scan) and
//! the worker pool. Workers block while the stack is empty and still open;
//! once closed and drained, `pop` returns `None` to every worker.

use parking_lot::{Condvar, Mutex};

use crate::error::{KvsError, Result};

#[derive(Debug, Default)]
struct StackState {
    jobs: Vec<String>,
    closed: bool,
}

#[derive(Debug)]
pub struct JobStack {
    state: Mutex<StackState>,
    available: Condvar,
    capacity: usize,
}

impl JobStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(StackState::default()),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Push a job. Fails if the stack is full or already closed.
    pub fn push(&self, job: impl Into<String>) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(KvsError::SchedulerClosed);
        }
        if state.jobs.len() >= self.capacity {
            return Err(KvsError::JobStackFull(self.capacity));
        }
        state.jobs.push(job.into());
        self.available.notify_one();
        Ok(())
    }

    /// Pop the most recently pushed job, blocking while the stack is empty
    /// and open
    pub fn pop(&self) -> Option<String> {
        let mut state = self.state.lock();
        loop {
            if let Some(job) = state.jobs.pop() {
                return Some(job);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Announce that no more jobs will be pushed; wakes every waiting
    /// worker
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
