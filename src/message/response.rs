//! Response frame encoding and decoding.
//!
//! The response header is fixed apart from the error bytes:
//!
//! ```text
//! offset    size            field
//! 0         4               head_len
//! 4         4               body_len
//! 8         4               message_id
//! 12        head_len - 12   err (UTF-8 diagnostic, may be empty)
//! head_len  body_len        body
//! ```
//!
//! Responses carry raw serialized bodies; there is no compressor code in
//! the response header and bodies are not compressed.

use crate::error::{Result, RpcError};

use super::{MAX_FRAME_SIZE, RESPONSE_FIXED_LEN};

/// One RPC response frame.
///
/// A non-empty `err` means failure regardless of `body`; both fields
/// empty is a void success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Exact encoded header size (12 + `err` length).
    pub head_len: u32,
    /// Body size in bytes.
    pub body_len: u32,
    /// Correlation identifier copied from the request.
    pub message_id: u32,
    /// Server-side error message; empty on success.
    pub err: Vec<u8>,
    /// Serialized result payload.
    pub body: Vec<u8>,
}

impl Response {
    /// Create an empty response echoing `message_id`.
    pub fn new(message_id: u32) -> Self {
        Self {
            message_id,
            ..Self::default()
        }
    }

    /// Recompute `head_len` and `body_len` from the current fields.
    pub fn set_length(&mut self) {
        self.head_len = (RESPONSE_FIXED_LEN + self.err.len()) as u32;
        self.body_len = self.body.len() as u32;
    }

    /// Encode the response into one contiguous frame.
    pub fn encode(&self) -> Vec<u8> {
        let head_len = RESPONSE_FIXED_LEN + self.err.len();
        let mut buf = Vec::with_capacity(head_len + self.body.len());
        buf.extend_from_slice(&(head_len as u32).to_be_bytes());
        buf.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.extend_from_slice(&self.err);
        buf.extend_from_slice(&self.body);
        buf
    }

    /// Decode a response from one complete frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < RESPONSE_FIXED_LEN {
            return Err(RpcError::MalformedFrame(format!(
                "response frame of {} bytes is shorter than the fixed header",
                data.len()
            )));
        }

        let head_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let body_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if (head_len as usize) < RESPONSE_FIXED_LEN {
            return Err(RpcError::MalformedFrame(format!(
                "response head_len {head_len} is below the fixed header size"
            )));
        }
        let total = head_len as usize + body_len as usize;
        if total > MAX_FRAME_SIZE {
            return Err(RpcError::FrameTooLarge {
                size: total,
                limit: MAX_FRAME_SIZE,
            });
        }
        if total > data.len() {
            return Err(RpcError::MalformedFrame(format!(
                "length fields announce {total} bytes but the buffer holds {}",
                data.len()
            )));
        }

        let message_id = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let err = data[RESPONSE_FIXED_LEN..head_len as usize].to_vec();
        let body = data[head_len as usize..total].to_vec();

        Ok(Self {
            head_len,
            body_len,
            message_id,
            err,
            body,
        })
    }
}
