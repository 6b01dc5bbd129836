//! Session protocol engine
//!
//! Serves one client: reads request frames, answers on the response
//! channel, and always releases the session's subscriptions on the way out.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use crate::error::{KvsError, Result};
use crate::protocol::{read_request, write_response, OpCode, Request, Response};
use crate::store::{SessionId, Store};

use super::registry::{SessionHandle, SessionRegistry};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Established,
    Serving,
    Closing,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent DISCONNECT
    Disconnected,

    /// Request channel reached end of stream
    PeerClosed,

    /// A read or write on one of the channels failed
    ChannelFault,

    /// Torn down by an administrative broadcast
    Terminated,
}

/// Handles a single client session
pub struct Session {
    handle: Arc<SessionHandle>,
    requests: Box<dyn Read + Send>,
    responses: Box<dyn Write + Send>,
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    state: SessionState,
}

impl Session {
    /// Wrap an already registered session and its channels
    pub fn new(
        handle: Arc<SessionHandle>,
        requests: Box<dyn Read + Send>,
        responses: Box<dyn Write + Send>,
        store: Arc<Store>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            handle,
            requests,
            responses,
            store,
            registry,
            state: SessionState::Established,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Acknowledge admission and serve requests until the session ends.
    ///
    /// Subscriptions are released and the session deregistered on every
    /// exit path.
    pub fn run(&mut self) -> SessionEnd {
        tracing::debug!("{} established", self.id());

        let end = match self.reply(Response::ok(OpCode::Connect as u8)) {
            Ok(()) => {
                self.state = SessionState::Serving;
                self.serve()
            }
            Err(e) => {
                tracing::warn!("{}: failed to acknowledge admission: {}", self.id(), e);
                SessionEnd::ChannelFault
            }
        };

        self.close(end);
        end
    }

    fn serve(&mut self) -> SessionEnd {
        loop {
            let request = match read_request(&mut self.requests) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    if self.handle.is_terminated() {
                        return SessionEnd::Terminated;
                    }
                    tracing::debug!("{}: request channel closed", self.id());
                    return SessionEnd::PeerClosed;
                }
                Err(KvsError::Protocol(msg)) => {
                    if self.handle.is_terminated() {
                        return SessionEnd::Terminated;
                    }
                    tracing::warn!("{}: malformed request: {}", self.id(), msg);
                    if self.reply(Response::error(0)).is_err() {
                        return SessionEnd::ChannelFault;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{}: error reading request: {}", self.id(), e);
                    return SessionEnd::ChannelFault;
                }
            };

            if self.handle.is_terminated() {
                return SessionEnd::Terminated;
            }

            tracing::trace!("{}: received {:?}", self.id(), request);

            match self.dispatch(request) {
                Ok(None) => {}
                Ok(Some(end)) => return end,
                Err(e) => {
                    if Self::is_disconnect(&e) {
                        tracing::debug!("{}: client gone before reply: {}", self.id(), e);
                    } else {
                        tracing::warn!("{}: error writing reply: {}", self.id(), e);
                    }
                    return SessionEnd::ChannelFault;
                }
            }
        }
    }

    /// Execute one request. `Err` only when the reply could not be written.
    fn dispatch(&mut self, request: Request) -> Result<Option<SessionEnd>> {
        let code = request.code();
        match request {
            Request::Subscribe { key } => {
                let response = match self.handle.subscribe(&self.store, &key) {
                    Ok(()) => Response::ok(code),
                    Err(e) => {
                        tracing::debug!("{}: subscribe {:?} rejected: {}", self.id(), key, e);
                        Response::error(code)
                    }
                };
                self.reply(response)?;
                Ok(None)
            }
            Request::Unsubscribe { key } => {
                let response = match self.handle.unsubscribe(&self.store, &key) {
                    Ok(()) => Response::ok(code),
                    Err(e) => {
                        tracing::debug!("{}: unsubscribe {:?} rejected: {}", self.id(), key, e);
                        Response::error(code)
                    }
                };
                self.reply(response)?;
                Ok(None)
            }
            Request::Disconnect => {
                self.reply(Response::ok(code))?;
                Ok(Some(SessionEnd::Disconnected))
            }
            Request::Unknown { code } => {
                tracing::debug!("{}: unknown op code {}", self.id(), code);
                self.reply(Response::error(Self::reply_code(code)))?;
                Ok(None)
            }
        }
    }

    /// Codes with more than one digit do not fit a response frame and are
    /// answered as `0`
    fn reply_code(code: u8) -> u8 {
        if code < 10 {
            code
        } else {
            0
        }
    }

    fn reply(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.responses, &response)
    }

    /// CLOSING → CLOSED: unsubscribe everything, close the notification
    /// channel, leave the registry
    fn close(&mut self, end: SessionEnd) {
        self.state = SessionState::Closing;

        let released = self.handle.release(&self.store);
        self.handle.notifier().close();
        self.registry.deregister(self.id());

        self.state = SessionState::Closed;
        tracing::debug!(
            "{} closed ({:?}, {} subscriptions released)",
            self.id(),
            end,
            released
        );
    }

    fn is_disconnect(error: &KvsError) -> bool {
        matches!(
            error,
            KvsError::Io(e) if matches!(
                e.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            )
        )
    }
}
