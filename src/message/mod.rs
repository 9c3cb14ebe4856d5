//! Wire message types.
//!
//! A frame on the wire is either a [`Request`] or a [`Response`], both
//! led by an 8-byte big-endian length pair (`head_len`, `body_len`).
//! The request header is variable-length: fixed fields, then `service`,
//! `method` and the meta entries separated by `0x0A`, with meta keys and
//! values joined by `0x09`. The response header is fixed apart from the
//! error bytes. All multi-byte integers are big endian.

mod request;
mod response;

pub use request::Request;
pub use response::Response;

/// Protocol version written into every request.
pub const VERSION: u8 = 1;

/// Separator between header fields (service, method, meta entries).
pub(crate) const FIELD_SEPARATOR: u8 = b'\n';

/// Separator between a meta key and its value.
pub(crate) const KV_SEPARATOR: u8 = b'\t';

/// Fixed part of the request header: two length words, message id,
/// version, compressor, serializer and message type bytes.
pub(crate) const REQUEST_FIXED_LEN: usize = 16;

/// Fixed part of the response header: two length words and message id.
pub(crate) const RESPONSE_FIXED_LEN: usize = 12;

/// Meta key carrying the call deadline as decimal unix milliseconds.
pub const META_DEADLINE: &str = "deadline";

/// Meta key flagging a one-way call; the only recognised value is `"true"`.
pub const META_ONEWAY: &str = "oneway";

/// Largest frame (header plus body) either codec accepts.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reject header field content that would collide with the separators.
pub(crate) fn check_header_field(field: &'static str, value: &str) -> crate::Result<()> {
    if value
        .bytes()
        .any(|b| b == FIELD_SEPARATOR || b == KV_SEPARATOR)
    {
        return Err(crate::RpcError::MalformedFrame(format!(
            "{field} contains a reserved separator byte"
        )));
    }
    Ok(())
}
