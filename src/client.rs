//! Client library
//!
//! Speaks the session protocol from the client side.
//!
//! ## Connecting
//! 1. Create the three channels (request, response, notification)
//! 2. Write a connect frame to the server's registration channel
//! 3. Open notification, then response, then request; the server opens
//!    its ends in the same order, so FIFO opens pair up without deadlock
//! 4. Wait for the `1|OK` admission reply
//!
//! [`connect_fifo`] does all four over named pipes.

use std::io::{Read, Write};

use crate::error::{KvsError, Result};
use crate::protocol::{
    encode_connect, read_notification, read_response, write_frame, write_request,
    ConnectRequest, Notification, OpCode, Request, Response,
};

/// Send a connection request on the registration channel
pub fn register<W: Write>(registration: &mut W, request: &ConnectRequest) -> Result<()> {
    write_frame(registration, &encode_connect(request)?)
}

/// Request/response half of a client session
pub struct Client<R, W> {
    responses: R,
    requests: W,
}

impl<R: Read, W: Write> Client<R, W> {
    pub fn new(requests: W, responses: R) -> Self {
        Self {
            responses,
            requests,
        }
    }

    /// Block until the server acknowledges the connection
    pub fn await_admission(&mut self) -> Result<()> {
        let response = self.read_reply()?;
        if response.code == OpCode::Connect as u8 && response.is_ok() {
            Ok(())
        } else {
            Err(KvsError::Protocol(format!(
                "Connection refused: {}|{}",
                response.code,
                response.status.as_str()
            )))
        }
    }

    /// Returns whether the server accepted the subscription
    pub fn subscribe(&mut self, key: &str) -> Result<bool> {
        let response = self.roundtrip(&Request::Subscribe { key: key.into() })?;
        Ok(response.is_ok())
    }

    /// Returns whether the key was subscribed and present
    pub fn unsubscribe(&mut self, key: &str) -> Result<bool> {
        let response = self.roundtrip(&Request::Unsubscribe { key: key.into() })?;
        Ok(response.is_ok())
    }

    /// End the session. The server closes its channels afterwards.
    pub fn disconnect(mut self) -> Result<bool> {
        let response = self.roundtrip(&Request::Disconnect)?;
        Ok(response.is_ok())
    }

    /// Send one request and wait for its reply
    pub fn roundtrip(&mut self, request: &Request) -> Result<Response> {
        write_request(&mut self.requests, request)?;
        let response = self.read_reply()?;
        if response.code != request.code() {
            return Err(KvsError::Protocol(format!(
                "Reply for op code {} answered request {}",
                response.code,
                request.code()
            )));
        }
        Ok(response)
    }

    fn read_reply(&mut self) -> Result<Response> {
        read_response(&mut self.responses)?.ok_or_else(|| {
            KvsError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Server closed the response channel",
            ))
        })
    }
}

/// Notification half of a client session
pub struct NotificationReader<R> {
    inner: R,
}

impl<R: Read> NotificationReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next notification, or `None` once the server closes the channel
    pub fn next(&mut self) -> Result<Option<Notification>> {
        read_notification(&mut self.inner)
    }
}

/// Connect over named pipes: create the three FIFOs, register, open them in
/// server order, and wait for admission.
#[cfg(unix)]
pub fn connect_fifo(
    registration: &std::path::Path,
    request: &ConnectRequest,
) -> Result<(
    Client<std::fs::File, std::fs::File>,
    NotificationReader<std::fs::File>,
)> {
    use std::fs::{File, OpenOptions};
    use std::path::Path;

    use crate::network::create_fifo;

    for name in [&request.request, &request.response, &request.notification] {
        create_fifo(Path::new(name))?;
    }

    {
        let mut channel = OpenOptions::new().write(true).open(registration)?;
        register(&mut channel, request)?;
    }

    let notifications = File::open(&request.notification)?;
    let responses = File::open(&request.response)?;
    let requests = OpenOptions::new().write(true).open(&request.request)?;

    let mut client = Client::new(requests, responses);
    client.await_admission()?;
    tracing::debug!("Connected via {}", registration.display());
    Ok((client, NotificationReader::new(notifications)))
}
