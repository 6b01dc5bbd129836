//! Network Module
//!
//! Client sessions over named byte-stream channels.
//!
//! ## Architecture
//! - Single listener reading connection requests from the registration channel
//! - Bounded admission queue (listener blocks when full)
//! - Fixed pool of session workers, one session at a time each
//! - Live-session registry for broadcast teardown

mod admission;
mod channel;
mod connection;
mod registry;
mod server;

pub use admission::AdmissionQueue;
#[cfg(unix)]
pub use channel::create_fifo;
pub use channel::{pipe, ChannelOpener, FifoChannels, MemoryChannels, PipeReader, PipeWriter};
pub use connection::{Session, SessionEnd, SessionState};
pub use registry::{SessionHandle, SessionRegistry, Waker};
pub use server::Server;
