//! Request frame encoding and decoding.
//!
//! Header layout, big endian:
//!
//! ```text
//! offset  size  field
//! 0       4     head_len
//! 4       4     body_len
//! 8       4     message_id
//! 12      1     version
//! 13      1     compressor
//! 14      1     serializer
//! 15      1     message_type
//! 16      ..    service  ++ 0x0A
//! ..      ..    method   ++ 0x0A
//! ..      ..    (key ++ 0x09 ++ value ++ 0x0A)*
//! head_len      body (body_len bytes)
//! ```
//!
//! The `0x0A` after `method` is written even when meta is empty; the
//! decoder also accepts a header that ends exactly at `method`. The body
//! is never scanned for separators (`head_len` bounds the header region),
//! so bodies containing `0x0A`/`0x09` round-trip unchanged.

use std::collections::BTreeMap;

use crate::error::{Result, RpcError};

use super::{
    check_header_field, FIELD_SEPARATOR, KV_SEPARATOR, MAX_FRAME_SIZE, REQUEST_FIXED_LEN, VERSION,
};

/// One RPC request frame.
///
/// `meta` is an ordered mapping; reserved keys are [`super::META_DEADLINE`]
/// and [`super::META_ONEWAY`], anything else travels untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Exact encoded header size. Kept in sync by [`Request::set_length`].
    pub head_len: u32,
    /// Body size in bytes. Kept in sync by [`Request::set_length`].
    pub body_len: u32,

    /// Caller-chosen correlation identifier, echoed by the response.
    pub message_id: u32,
    /// Protocol version, currently 1.
    pub version: u8,
    /// Compressor code applied to `body` (0 = identity).
    pub compressor: u8,
    /// Serializer code applied to `body` (1 = JSON).
    pub serializer: u8,
    /// Reserved, 0 by default.
    pub message_type: u8,

    /// Target service name. Non-empty, no separator bytes.
    pub service: String,
    /// Target method name. Non-empty, no separator bytes.
    pub method: String,
    /// Auxiliary string-to-string entries travelling in the header.
    pub meta: BTreeMap<String, String>,
    /// Opaque payload, already serialized and compressed.
    pub body: Vec<u8>,
}

impl Request {
    /// Create a request for `service.method` carrying `body`.
    ///
    /// Length fields are left at zero; call [`Request::set_length`]
    /// before encoding.
    pub fn new(service: impl Into<String>, method: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            version: VERSION,
            service: service.into(),
            method: method.into(),
            body,
            ..Self::default()
        }
    }

    /// Recompute `head_len` and `body_len` from the current fields.
    pub fn set_length(&mut self) {
        self.head_len = self.encoded_head_len() as u32;
        self.body_len = self.body.len() as u32;
    }

    /// Exact size of the encoded header for the current fields.
    fn encoded_head_len(&self) -> usize {
        let mut len = REQUEST_FIXED_LEN + self.service.len() + 1 + self.method.len() + 1;
        for (k, v) in &self.meta {
            len += k.len() + 1 + v.len() + 1;
        }
        len
    }

    /// Encode the request into one contiguous frame.
    ///
    /// Fails with `MalformedFrame` when `service`, `method` or any meta
    /// key/value is empty where it must not be, or contains one of the
    /// separator bytes. Nothing is escaped; reserved bytes are rejected.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.service.is_empty() {
            return Err(RpcError::MalformedFrame("empty service name".into()));
        }
        if self.method.is_empty() {
            return Err(RpcError::MalformedFrame("empty method name".into()));
        }
        check_header_field("service", &self.service)?;
        check_header_field("method", &self.method)?;
        for (k, v) in &self.meta {
            if k.is_empty() {
                return Err(RpcError::MalformedFrame("empty meta key".into()));
            }
            check_header_field("meta key", k)?;
            check_header_field("meta value", v)?;
        }

        let head_len = self.encoded_head_len();
        let total = head_len + self.body.len();
        if total > MAX_FRAME_SIZE {
            return Err(RpcError::FrameTooLarge {
                size: total,
                limit: MAX_FRAME_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(head_len as u32).to_be_bytes());
        buf.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.message_id.to_be_bytes());
        buf.push(self.version);
        buf.push(self.compressor);
        buf.push(self.serializer);
        buf.push(self.message_type);

        buf.extend_from_slice(self.service.as_bytes());
        buf.push(FIELD_SEPARATOR);
        buf.extend_from_slice(self.method.as_bytes());
        buf.push(FIELD_SEPARATOR);
        for (k, v) in &self.meta {
            buf.extend_from_slice(k.as_bytes());
            buf.push(KV_SEPARATOR);
            buf.extend_from_slice(v.as_bytes());
            buf.push(FIELD_SEPARATOR);
        }

        buf.extend_from_slice(&self.body);
        Ok(buf)
    }

    /// Decode a request from one complete frame.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < REQUEST_FIXED_LEN {
            return Err(RpcError::MalformedFrame(format!(
                "request frame of {} bytes is shorter than the fixed header",
                data.len()
            )));
        }

        let head_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let body_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if (head_len as usize) < REQUEST_FIXED_LEN {
            return Err(RpcError::MalformedFrame(format!(
                "request head_len {head_len} is below the fixed header size"
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
        let version = data[12];
        let compressor = data[13];
        let serializer = data[14];
        let message_type = data[15];

        // The header region is bounded by head_len; the body is never
        // scanned for separators.
        let mut head = &data[REQUEST_FIXED_LEN..head_len as usize];

        let service = split_field(&mut head)
            .ok_or_else(|| RpcError::MalformedFrame("missing service terminator".into()))?;
        let service = str_from(service)?;
        // The terminator after `method` is optional when meta is empty.
        let method = match split_field(&mut head) {
            Some(m) => str_from(m)?,
            None => {
                let m = str_from(head)?;
                head = &[];
                m
            }
        };

        let mut meta = BTreeMap::new();
        while !head.is_empty() {
            let entry = match head.iter().position(|&b| b == FIELD_SEPARATOR) {
                Some(idx) => {
                    let e = &head[..idx];
                    head = &head[idx + 1..];
                    e
                }
                None => {
                    let e = head;
                    head = &[];
                    e
                }
            };
            let kv_idx = entry
                .iter()
                .position(|&b| b == KV_SEPARATOR)
                .ok_or_else(|| RpcError::MalformedFrame("meta entry without separator".into()))?;
            meta.insert(str_from(&entry[..kv_idx])?, str_from(&entry[kv_idx + 1..])?);
        }

        let body = data[head_len as usize..total].to_vec();

        Ok(Self {
            head_len,
            body_len,
            message_id,
            version,
            compressor,
            serializer,
            message_type,
            service,
            method,
            meta,
            body,
        })
    }
}

/// Split off the bytes up to the next field separator, consuming it.
fn split_field<'a>(head: &mut &'a [u8]) -> Option<&'a [u8]> {
    let idx = head.iter().position(|&b| b == FIELD_SEPARATOR)?;
    let field = &head[..idx];
    *head = &head[idx + 1..];
    Some(field)
}

fn str_from(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| RpcError::MalformedFrame("header field is not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Request {
        let mut req = Request::new("user-service", "get_by_id", b"{\"id\":42}".to_vec());
        req.message_id = 7;
        req.compressor = 1;
        req.serializer = 1;
        req.meta.insert("deadline".into(), "1700000000000".into());
        req.meta.insert("trace-id".into(), "abc123".into());
        req.set_length();
        req
    }

    #[test]
    fn encode_decode_roundtrip() {
        let req = sample_request();
        let encoded = req.encode().unwrap();
        let decoded = Request::decode(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn set_length_matches_encoded_sizes() {
        let req = sample_request();
        let encoded = req.encode().unwrap();
        assert_eq!(req.head_len as usize + req.body.len(), encoded.len());
        assert_eq!(req.body_len as usize, req.body.len());
        // The head_len on the wire equals the struct's.
        assert_eq!(
            u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]),
            req.head_len
        );
    }

    #[test]
    fn big_endian_fixed_fields() {
        let mut req = Request::new("s", "m", vec![]);
        req.message_id = 0x01020304;
        req.compressor = 0x0A;
        req.serializer = 0x0B;
        req.message_type = 0x0C;
        req.set_length();
        let bytes = req.encode().unwrap();

        assert_eq!(&bytes[8..12], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[12], VERSION);
        assert_eq!(bytes[13], 0x0A);
        assert_eq!(bytes[14], 0x0B);
        assert_eq!(bytes[15], 0x0C);
    }

    #[test]
    fn empty_meta_still_terminates_method() {
        let mut req = Request::new("svc", "echo", vec![]);
        req.set_length();
        let bytes = req.encode().unwrap();

        assert_eq!(bytes.len(), req.head_len as usize);
        assert_eq!(*bytes.last().unwrap(), FIELD_SEPARATOR);

        let decoded = Request::decode(&bytes).unwrap();
        assert!(decoded.meta.is_empty());
        assert_eq!(decoded.method, "echo");
    }

    #[test]
    fn header_ending_at_method_is_tolerated() {
        // Hand-build a header whose last field is `method` with no
        // trailing separator.
        let service = b"svc";
        let method = b"echo";
        let head_len = (REQUEST_FIXED_LEN + service.len() + 1 + method.len()) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&head_len.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&9u32.to_be_bytes());
        bytes.extend_from_slice(&[VERSION, 0, 1, 0]);
        bytes.extend_from_slice(service);
        bytes.push(FIELD_SEPARATOR);
        bytes.extend_from_slice(method);

        let decoded = Request::decode(&bytes).unwrap();
        assert_eq!(decoded.service, "svc");
        assert_eq!(decoded.method, "echo");
        assert!(decoded.meta.is_empty());
    }

    #[test]
    fn body_with_separator_bytes_roundtrips() {
        let mut req = Request::new("svc", "blob", b"line1\nkey\tvalue\n\t\n".to_vec());
        req.serializer = 1;
        req.meta.insert("k".into(), "v".into());
        req.set_length();

        let decoded = Request::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(decoded.body, req.body);
        assert_eq!(decoded.meta, req.meta);
    }

    #[test]
    fn meta_with_empty_value_is_legal() {
        let mut req = Request::new("svc", "m", vec![]);
        req.meta.insert("flag".into(), String::new());
        req.set_length();

        let decoded = Request::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(decoded.meta.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn separator_in_header_fields_rejected() {
        let mut req = Request::new("svc", "m", vec![]);
        req.meta.insert("k".into(), "a\tb".into());
        req.set_length();
        assert!(matches!(
            req.encode(),
            Err(RpcError::MalformedFrame(_))
        ));

        let mut req = Request::new("bad\nsvc", "m", vec![]);
        req.set_length();
        assert!(matches!(req.encode(), Err(RpcError::MalformedFrame(_))));

        let mut req = Request::new("svc", "bad\tmethod", vec![]);
        req.set_length();
        assert!(matches!(req.encode(), Err(RpcError::MalformedFrame(_))));
    }

    #[test]
    fn empty_names_rejected() {
        let mut req = Request::new("", "m", vec![]);
        req.set_length();
        assert!(req.encode().is_err());

        let mut req = Request::new("svc", "", vec![]);
        req.set_length();
        assert!(req.encode().is_err());
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert!(matches!(
            Request::decode(&[0u8; 8]),
            Err(RpcError::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_rejects_undersized_head_len() {
        let mut bytes = vec![0u8; REQUEST_FIXED_LEN];
        bytes[..4].copy_from_slice(&8u32.to_be_bytes());
        assert!(matches!(
            Request::decode(&bytes),
            Err(RpcError::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_rejects_lengths_past_buffer() {
        let mut req = Request::new("svc", "m", b"body".to_vec());
        req.set_length();
        let mut bytes = req.encode().unwrap();
        // Claim a bigger body than the buffer carries.
        bytes[4..8].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            Request::decode(&bytes),
            Err(RpcError::MalformedFrame(_))
        ));
    }

    #[test]
    fn decode_rejects_meta_without_kv_separator() {
        let service = b"svc";
        let method = b"m";
        let meta = b"novalue";
        let head_len =
            (REQUEST_FIXED_LEN + service.len() + 1 + method.len() + 1 + meta.len()) as u32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&head_len.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&[VERSION, 0, 1, 0]);
        bytes.extend_from_slice(service);
        bytes.push(FIELD_SEPARATOR);
        bytes.extend_from_slice(method);
        bytes.push(FIELD_SEPARATOR);
        bytes.extend_from_slice(meta);

        assert!(matches!(
            Request::decode(&bytes),
            Err(RpcError::MalformedFrame(_))
        ));
    }
}
