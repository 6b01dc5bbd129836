//! Protocol Module
//!
//! Defines the text frames exchanged over the named channels.
//!
//! ## Frame Format
//!
//! Every frame is a fixed-size, NUL-padded ASCII record. A reader always
//! consumes exactly one frame size; the text ends at the first NUL.
//!
//! ```text
//! ┌───────────────────────────────┬──────────────┐
//! │ text                          │ NUL padding  │
//! └───────────────────────────────┴──────────────┘
//! ```
//!
//! ### Frames
//! - Connect (registration channel): `1|<req>|<resp>|<notif>`
//! - Request (request channel):      `<op>|<key>`
//! - Response (response channel):    `<op>|OK` or `<op>|ERROR`
//! - Notification:                   `(<key>,<value>)` or `(<key>,DELETED)`
//!
//! ### Op Codes
//! - 1: CONNECT
//! - 2: DISCONNECT
//! - 3: SUBSCRIBE
//! - 4: UNSUBSCRIBE

mod command;
mod response;
mod codec;

pub use command::{ConnectRequest, OpCode, Request};
pub use response::{Notification, Response, Status};
pub use codec::{
    decode_connect, decode_notification, decode_request, decode_response, encode_connect,
    encode_notification, encode_request, encode_response, read_connect, read_frame,
    read_notification, read_request, read_response, write_frame, write_request, write_response,
    CONNECT_FRAME_SIZE, MAX_CHANNEL_NAME, MAX_STRING_SIZE, NOTIFICATION_FRAME_SIZE,
    REQUEST_FRAME_SIZE, RESPONSE_FRAME_SIZE,
};
