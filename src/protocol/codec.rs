//! Protocol codec
//!
//! Encoding and decoding functions for the fixed-size text frames.
//!
//! ## Frame Sizes
//! ```text
//! Connect       3 * (MAX_CHANNEL_NAME + 1) + 2   "1|req|resp|notif\0..."
//! Request       MAX_STRING_SIZE + 3              "3|key\0..."
//! Response      8                                "3|ERROR\0"
//! Notification  2 * MAX_STRING_SIZE + 4          "(key,value)\0..."
//! ```

use std::io::{ErrorKind, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{KvsError, Result};
use super::{ConnectRequest, Notification, OpCode, Request, Response, Status};

/// Max key or value length carried in a frame
pub const MAX_STRING_SIZE: usize = 40;

/// Max channel name length in a connect frame
pub const MAX_CHANNEL_NAME: usize = 40;

pub const CONNECT_FRAME_SIZE: usize = 3 * (MAX_CHANNEL_NAME + 1) + 2;
pub const REQUEST_FRAME_SIZE: usize = MAX_STRING_SIZE + 3;
pub const RESPONSE_FRAME_SIZE: usize = 8;
pub const NOTIFICATION_FRAME_SIZE: usize = 2 * MAX_STRING_SIZE + 4;

/// Marker value carried by deletion notifications
const DELETED_MARKER: &str = "DELETED";

// =============================================================================
// Frame helpers
// =============================================================================

/// Pad `text` with NULs to exactly `size` bytes (at least one NUL)
fn pad_frame(text: &str, size: usize) -> Result<Bytes> {
    if text.len() >= size {
        return Err(KvsError::FrameTooLong {
            len: text.len(),
            max: size - 1,
        });
    }
    let mut frame = BytesMut::with_capacity(size);
    frame.put_slice(text.as_bytes());
    frame.put_bytes(0, size - text.len());
    Ok(frame.freeze())
}

/// Text of a frame up to its first NUL
fn frame_text(frame: &[u8]) -> Result<&str> {
    let end = frame.iter().position(|&b| b == 0).unwrap_or(frame.len());
    std::str::from_utf8(&frame[..end])
        .map_err(|e| KvsError::Protocol(format!("Frame is not valid UTF-8: {}", e)))
}

fn check_field(field: &str, max: usize) -> Result<()> {
    if field.len() > max {
        return Err(KvsError::FrameTooLong {
            len: field.len(),
            max,
        });
    }
    if field.contains(|c: char| c == '|' || c == '\0') {
        return Err(KvsError::Protocol(format!(
            "Field {:?} contains a reserved character",
            field
        )));
    }
    Ok(())
}

fn parse_code(text: &str) -> Result<u8> {
    text.parse()
        .map_err(|_| KvsError::Protocol(format!("Invalid op code: {:?}", text)))
}

// =============================================================================
// Connect
// =============================================================================

pub fn encode_connect(request: &ConnectRequest) -> Result<Bytes> {
    for name in [&request.request, &request.response, &request.notification] {
        check_field(name, MAX_CHANNEL_NAME)?;
    }
    let text = format!(
        "{}|{}|{}|{}",
        OpCode::Connect as u8,
        request.request,
        request.response,
        request.notification
    );
    pad_frame(&text, CONNECT_FRAME_SIZE)
}

pub fn decode_connect(frame: &[u8]) -> Result<ConnectRequest> {
    let text = frame_text(frame)?;
    let mut parts = text.split('|');

    let code = parse_code(parts.next().unwrap_or_default())?;
    if code != OpCode::Connect as u8 {
        return Err(KvsError::Protocol(format!(
            "Expected connect request, got op code {}",
            code
        )));
    }

    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(req), Some(resp), Some(notif), None)
            if !req.is_empty() && !resp.is_empty() && !notif.is_empty() =>
        {
            Ok(ConnectRequest::new(req, resp, notif))
        }
        _ => Err(KvsError::Protocol(format!(
            "Malformed connect request: {:?}",
            text
        ))),
    }
}

// =============================================================================
// Requests
// =============================================================================

pub fn encode_request(request: &Request) -> Result<Bytes> {
    let text = match request {
        Request::Subscribe { key } | Request::Unsubscribe { key } => {
            check_field(key, MAX_STRING_SIZE)?;
            format!("{}|{}", request.code(), key)
        }
        Request::Disconnect | Request::Unknown { .. } => format!("{}|", request.code()),
    };
    pad_frame(&text, REQUEST_FRAME_SIZE)
}

/// Decode a request frame.
///
/// Unrecognised numeric op codes decode to `Request::Unknown` so the session
/// can answer them; a non-numeric op code is a protocol error.
pub fn decode_request(frame: &[u8]) -> Result<Request> {
    let text = frame_text(frame)?;
    let (code, key) = text.split_once('|').unwrap_or((text, ""));
    let code = parse_code(code)?;

    let request = match OpCode::try_from(code) {
        Ok(OpCode::Subscribe) => Request::Subscribe {
            key: key.to_string(),
        },
        Ok(OpCode::Unsubscribe) => Request::Unsubscribe {
            key: key.to_string(),
        },
        Ok(OpCode::Disconnect) => Request::Disconnect,
        Ok(OpCode::Connect) | Err(_) => Request::Unknown { code },
    };
    Ok(request)
}

// =============================================================================
// Responses
// =============================================================================

pub fn encode_response(response: &Response) -> Result<Bytes> {
    let text = format!("{}|{}", response.code, response.status.as_str());
    pad_frame(&text, RESPONSE_FRAME_SIZE)
}

pub fn decode_response(frame: &[u8]) -> Result<Response> {
    let text = frame_text(frame)?;
    let (code, status) = text
        .split_once('|')
        .ok_or_else(|| KvsError::Protocol(format!("Malformed response: {:?}", text)))?;
    let code = parse_code(code)?;
    let status = match status {
        "OK" => Status::Ok,
        "ERROR" => Status::Error,
        other => {
            return Err(KvsError::Protocol(format!(
                "Unknown response status: {:?}",
                other
            )))
        }
    };
    Ok(Response { code, status })
}

// =============================================================================
// Notifications
// =============================================================================

pub fn encode_notification(notification: &Notification) -> Result<Bytes> {
    let text = match notification {
        Notification::Updated { key, value } => format!("({},{})", key, value),
        Notification::Deleted { key } => format!("({},{})", key, DELETED_MARKER),
    };
    pad_frame(&text, NOTIFICATION_FRAME_SIZE)
}

pub fn decode_notification(frame: &[u8]) -> Result<Notification> {
    let text = frame_text(frame)?;
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| KvsError::Protocol(format!("Malformed notification: {:?}", text)))?;
    let (key, value) = inner
        .split_once(',')
        .ok_or_else(|| KvsError::Protocol(format!("Malformed notification: {:?}", text)))?;

    let key = key.to_string();
    if value == DELETED_MARKER {
        Ok(Notification::Deleted { key })
    } else {
        Ok(Notification::Updated {
            key,
            value: value.to_string(),
        })
    }
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read exactly one frame of `size` bytes.
///
/// Returns `Ok(None)` if the stream ends before the first byte (peer
/// closed). A stream that ends mid-frame is an `UnexpectedEof` I/O error.
pub fn read_frame<R: Read>(reader: &mut R, size: usize) -> Result<Option<Vec<u8>>> {
    let mut frame = vec![0u8; size];
    let mut filled = 0;

    while filled < size {
        match reader.read(&mut frame[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(KvsError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("Channel closed mid-frame ({} of {} bytes)", filled, size),
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Some(frame))
}

/// Write a whole frame and flush
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    Ok(())
}

pub fn read_connect<R: Read>(reader: &mut R) -> Result<Option<ConnectRequest>> {
    read_frame(reader, CONNECT_FRAME_SIZE)?
        .map(|frame| decode_connect(&frame))
        .transpose()
}

pub fn read_request<R: Read>(reader: &mut R) -> Result<Option<Request>> {
    read_frame(reader, REQUEST_FRAME_SIZE)?
        .map(|frame| decode_request(&frame))
        .transpose()
}

pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    write_frame(writer, &encode_request(request)?)
}

pub fn read_response<R: Read>(reader: &mut R) -> Result<Option<Response>> {
    read_frame(reader, RESPONSE_FRAME_SIZE)?
        .map(|frame| decode_response(&frame))
        .transpose()
}

pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    write_frame(writer, &encode_response(response)?)
}

pub fn read_notification<R: Read>(reader: &mut R) -> Result<Option<Notification>> {
    read_frame(reader, NOTIFICATION_FRAME_SIZE)?
        .map(|frame| decode_notification(&frame))
        .transpose()
}
