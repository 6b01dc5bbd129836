//! Channel plumbing
//!
//! Sessions talk over three one-way byte streams identified by name. The
//! server only needs to open them; creating them is the client's job.
//!
//! - [`FifoChannels`]: named pipes on the local filesystem
//! - [`MemoryChannels`]: in-process pipes for tests and embedding

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use bytes::{Buf, Bytes};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::protocol::{encode_request, Request};

/// Opens named byte-stream channels
pub trait ChannelOpener: Send + Sync {
    /// Open a channel for reading (request and registration channels)
    fn open_reader(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Open a channel for writing (response and notification channels)
    fn open_writer(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Wake the server-side reader of a request channel. The blocked read
    /// returns either end of stream or a DISCONNECT frame.
    fn interrupt_reader(&self, name: &str) -> io::Result<()>;
}

// =============================================================================
// Named pipes
// =============================================================================

/// Named pipes (FIFOs) addressed by filesystem path
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoChannels;

impl ChannelOpener for FifoChannels {
    fn open_reader(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(name)?))
    }

    fn open_writer(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(OpenOptions::new().write(true).open(name)?))
    }

    #[cfg(unix)]
    fn interrupt_reader(&self, name: &str) -> io::Result<()> {
        use std::os::unix::fs::OpenOptionsExt;

        use nix::fcntl::OFlag;

        // The frame is smaller than PIPE_BUF, so it lands whole between
        // client frames
        let frame = encode_request(&Request::Disconnect)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut fifo = OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(name)?;
        fifo.write_all(&frame)
    }

    #[cfg(not(unix))]
    fn interrupt_reader(&self, _name: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "named pipes need a unix host",
        ))
    }
}

/// Create (or re-create) a FIFO at `path` with mode 0640
#[cfg(unix)]
pub fn create_fifo(path: &Path) -> io::Result<()> {
    use nix::sys::stat::Mode;

    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP)
        .map_err(io::Error::from)
}

// =============================================================================
// In-memory pipes
// =============================================================================

/// Create a connected in-memory pipe.
///
/// Reads block until data arrives; once the writer is dropped, reads drain
/// what is buffered and then return 0. Writes fail with `BrokenPipe` once
/// the reader is dropped.
pub fn pipe() -> (PipeWriter, PipeReader) {
    interruptible_pipe(channel::never())
}

fn interruptible_pipe(interrupt: Receiver<()>) -> (PipeWriter, PipeReader) {
    let (tx, rx) = channel::unbounded();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            interrupt,
            pending: Bytes::new(),
        },
    )
}

/// Write end of an in-memory pipe
#[derive(Debug)]
pub struct PipeWriter {
    tx: Sender<Bytes>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read end of an in-memory pipe
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Bytes>,
    interrupt: Receiver<()>,
    pending: Bytes,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending.is_empty() {
            let woken = crossbeam::select! {
                recv(self.rx) -> chunk => Ok(chunk),
                recv(self.interrupt) -> signal => Err(signal.is_ok()),
            };
            match woken {
                Ok(Ok(chunk)) => self.pending = chunk,
                Ok(Err(_)) | Err(true) => return Ok(0),
                // Interrupter gone, only the data channel matters now
                Err(false) => self.interrupt = channel::never(),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

/// Named in-memory pipes.
///
/// `create` makes a pipe under a name; each end can be taken exactly once,
/// either directly (`take_reader` / `take_writer`) or through the
/// [`ChannelOpener`] impl.
#[derive(Debug, Default)]
pub struct MemoryChannels {
    pipes: Mutex<HashMap<String, MemoryPipe>>,
}

#[derive(Debug)]
struct MemoryPipe {
    writer: Option<PipeWriter>,
    reader: Option<PipeReader>,
    interrupt: Sender<()>,
}

impl MemoryChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipe, replacing any previous one with the same name
    pub fn create(&self, name: &str) {
        let (interrupt, signal) = channel::bounded(1);
        let (writer, reader) = interruptible_pipe(signal);
        self.pipes.lock().insert(
            name.to_string(),
            MemoryPipe {
                writer: Some(writer),
                reader: Some(reader),
                interrupt,
            },
        );
    }

    pub fn take_reader(&self, name: &str) -> io::Result<PipeReader> {
        self.pipes
            .lock()
            .get_mut(name)
            .and_then(|pipe| pipe.reader.take())
            .ok_or_else(|| Self::unavailable(name, "read"))
    }

    pub fn take_writer(&self, name: &str) -> io::Result<PipeWriter> {
        self.pipes
            .lock()
            .get_mut(name)
            .and_then(|pipe| pipe.writer.take())
            .ok_or_else(|| Self::unavailable(name, "write"))
    }

    /// Make the reader of `name` see end of stream, even while the writer
    /// is still held
    pub fn interrupt(&self, name: &str) -> io::Result<()> {
        let pipes = self.pipes.lock();
        let pipe = pipes
            .get(name)
            .ok_or_else(|| Self::unavailable(name, "read"))?;
        // A full slot means an interrupt is already pending
        let _ = pipe.interrupt.try_send(());
        Ok(())
    }

    fn unavailable(name: &str, end: &str) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no {} end available for channel {:?}", end, name),
        )
    }
}

impl ChannelOpener for MemoryChannels {
    fn open_reader(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(self.take_reader(name)?))
    }

    fn open_writer(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(self.take_writer(name)?))
    }

    fn interrupt_reader(&self, name: &str) -> io::Result<()> {
        self.interrupt(name)
    }
}
