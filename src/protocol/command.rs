//! Request definitions
//!
//! Represents frames sent by clients.

use crate::error::KvsError;

/// Op codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Connect = 1,
    Disconnect = 2,
    Subscribe = 3,
    Unsubscribe = 4,
}

impl TryFrom<u8> for OpCode {
    type Error = KvsError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(OpCode::Connect),
            2 => Ok(OpCode::Disconnect),
            3 => Ok(OpCode::Subscribe),
            4 => Ok(OpCode::Unsubscribe),
            _ => Err(KvsError::Protocol(format!("Unknown op code: {}", code))),
        }
    }
}

/// A connection request: the three channels a new session will use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Client → server requests (server reads)
    pub request: String,

    /// Server → client replies (server writes)
    pub response: String,

    /// Server → client change notifications (server writes)
    pub notification: String,
}

impl ConnectRequest {
    pub fn new(
        request: impl Into<String>,
        response: impl Into<String>,
        notification: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            response: response.into(),
            notification: notification.into(),
        }
    }
}

/// A parsed session request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Watch a key for changes
    Subscribe { key: String },

    /// Stop watching a key
    Unsubscribe { key: String },

    /// End the session
    Disconnect,

    /// Any other op code; answered with an error reply
    Unknown { code: u8 },
}

impl Request {
    /// The numeric op code carried by this request
    pub fn code(&self) -> u8 {
        match self {
            Request::Subscribe { .. } => OpCode::Subscribe as u8,
            Request::Unsubscribe { .. } => OpCode::Unsubscribe as u8,
            Request::Disconnect => OpCode::Disconnect as u8,
            Request::Unknown { code } => *code,
        }
    }
}
