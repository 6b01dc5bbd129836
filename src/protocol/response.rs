//! Response and notification definitions
//!
//! Represents frames sent to clients.

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
        }
    }
}

/// A reply on the response channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Op code of the request being answered
    pub code: u8,

    pub status: Status,
}

impl Response {
    pub fn ok(code: u8) -> Self {
        Self {
            code,
            status: Status::Ok,
        }
    }

    pub fn error(code: u8) -> Self {
        Self {
            code,
            status: Status::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// A key change pushed to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Updated { key: String, value: String },
    Deleted { key: String },
}

impl Notification {
    pub fn key(&self) -> &str {
        match self {
            Notification::Updated { key, .. } | Notification::Deleted { key } => key,
        }
    }
}
