//! Body serialization.
//!
//! Serialization formats are identified on the wire by a one-byte code
//! in the request header. Unlike compressors, serializers need the
//! value's type to do anything, so dispatch stays generic and the code
//! maps onto a closed set of formats:
//!
//! - 1: JSON (`serde_json`)
//! - 2: Protobuf (`prost`)
//! - 3: MessagePack (`rmp-serde`, struct-as-map encoding)
//! - 128-255: reserved for user extensions
//!
//! JSON and MessagePack carry serde values through
//! [`Serializer::marshal`]/[`Serializer::unmarshal`]; protobuf carries
//! `prost::Message` values through the dedicated
//! [`Serializer::marshal_message`]/[`Serializer::unmarshal_message`]
//! path. Offering a value to the wrong path fails with
//! `UnsupportedPayload` instead of crossing data models. Adding a
//! format means adding a variant here; the rest of the crate
//! dispatches through [`Serializer::from_code`].

use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, RpcError};

/// Code of the JSON serializer.
pub const SERIALIZER_JSON: u8 = 1;

/// Code of the Protobuf serializer.
pub const SERIALIZER_PROTOBUF: u8 = 2;

/// Code of the MessagePack serializer.
pub const SERIALIZER_MSGPACK: u8 = 3;

/// A wire serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Serializer {
    /// JSON via `serde_json`.
    #[default]
    Json,
    /// Protocol Buffers via `prost`. Payload types implement
    /// `prost::Message` and travel through the `*_message` methods.
    Protobuf,
    /// MessagePack via `rmp-serde`.
    ///
    /// Encodes structs as maps (`to_vec_named`) so payloads stay
    /// self-describing across peers with differing field order.
    MsgPack,
}

impl Serializer {
    /// Wire code identifying this format.
    pub const fn code(self) -> u8 {
        match self {
            Serializer::Json => SERIALIZER_JSON,
            Serializer::Protobuf => SERIALIZER_PROTOBUF,
            Serializer::MsgPack => SERIALIZER_MSGPACK,
        }
    }

    /// Resolve a wire code to a format.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            SERIALIZER_JSON => Ok(Serializer::Json),
            SERIALIZER_PROTOBUF => Ok(Serializer::Protobuf),
            SERIALIZER_MSGPACK => Ok(Serializer::MsgPack),
            other => Err(RpcError::UnknownSerializer(other)),
        }
    }

    /// Serialize a serde value into bytes.
    pub fn marshal<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Serializer::Json => Ok(serde_json::to_vec(value)?),
            Serializer::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
            Serializer::Protobuf => Err(RpcError::UnsupportedPayload(self.code())),
        }
    }

    /// Deserialize bytes into a freshly built serde value.
    pub fn unmarshal<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            Serializer::Json => Ok(serde_json::from_slice(data)?),
            Serializer::MsgPack => Ok(rmp_serde::from_slice(data)?),
            Serializer::Protobuf => Err(RpcError::UnsupportedPayload(self.code())),
        }
    }

    /// Serialize a protobuf message into bytes.
    pub fn marshal_message<T: Message>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            Serializer::Protobuf => Ok(value.encode_to_vec()),
            other => Err(RpcError::UnsupportedPayload(other.code())),
        }
    }

    /// Deserialize bytes into a freshly built protobuf message.
    pub fn unmarshal_message<T: Message + Default>(self, data: &[u8]) -> Result<T> {
        match self {
            Serializer::Protobuf => Ok(T::decode(data)?),
            other => Err(RpcError::UnsupportedPayload(other.code())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        id: u32,
        name: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct ProtoPayload {
        #[prost(uint32, tag = "1")]
        id: u32,
        #[prost(string, tag = "2")]
        name: String,
    }

    fn sample() -> Payload {
        Payload {
            id: 42,
            name: "wirecall".into(),
        }
    }

    fn proto_sample() -> ProtoPayload {
        ProtoPayload {
            id: 42,
            name: "wirecall".into(),
        }
    }

    #[test]
    fn json_roundtrip() {
        let bytes = Serializer::Json.marshal(&sample()).unwrap();
        let decoded: Payload = Serializer::Json.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn msgpack_roundtrip_as_map() {
        let bytes = Serializer::MsgPack.marshal(&sample()).unwrap();
        // fixmap marker: struct-as-map, not positional array.
        assert_eq!(bytes[0] & 0xF0, 0x80);
        let decoded: Payload = Serializer::MsgPack.unmarshal(&bytes).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn protobuf_roundtrip() {
        let bytes = Serializer::Protobuf.marshal_message(&proto_sample()).unwrap();
        let decoded: ProtoPayload = Serializer::Protobuf.unmarshal_message(&bytes).unwrap();
        assert_eq!(decoded, proto_sample());
    }

    #[test]
    fn code_mapping() {
        assert_eq!(Serializer::Json.code(), SERIALIZER_JSON);
        assert_eq!(Serializer::Protobuf.code(), SERIALIZER_PROTOBUF);
        assert_eq!(Serializer::MsgPack.code(), SERIALIZER_MSGPACK);
        assert_eq!(Serializer::from_code(1).unwrap(), Serializer::Json);
        assert_eq!(Serializer::from_code(2).unwrap(), Serializer::Protobuf);
        assert_eq!(Serializer::from_code(3).unwrap(), Serializer::MsgPack);
    }

    #[test]
    fn unknown_codes_fail() {
        for code in [0u8, 7, 128, 255] {
            assert!(matches!(
                Serializer::from_code(code),
                Err(RpcError::UnknownSerializer(c)) if c == code
            ));
        }
    }

    #[test]
    fn serde_path_rejects_protobuf_format() {
        assert!(matches!(
            Serializer::Protobuf.marshal(&sample()),
            Err(RpcError::UnsupportedPayload(SERIALIZER_PROTOBUF))
        ));
        let result: Result<Payload> = Serializer::Protobuf.unmarshal(b"\x08\x2a");
        assert!(matches!(
            result,
            Err(RpcError::UnsupportedPayload(SERIALIZER_PROTOBUF))
        ));
    }

    #[test]
    fn message_path_rejects_serde_formats() {
        assert!(matches!(
            Serializer::Json.marshal_message(&proto_sample()),
            Err(RpcError::UnsupportedPayload(SERIALIZER_JSON))
        ));
        let result: Result<ProtoPayload> = Serializer::MsgPack.unmarshal_message(b"");
        assert!(matches!(
            result,
            Err(RpcError::UnsupportedPayload(SERIALIZER_MSGPACK))
        ));
    }

    #[test]
    fn unmarshal_error_on_wrong_format() {
        let bytes = Serializer::MsgPack.marshal(&sample()).unwrap();
        let result: Result<Payload> = Serializer::Json.unmarshal(&bytes);
        assert!(matches!(result, Err(RpcError::Json(_))));
    }

    #[test]
    fn garbage_protobuf_is_a_decode_error() {
        let result: Result<ProtoPayload> =
            Serializer::Protobuf.unmarshal_message(b"not a protobuf message");
        assert!(matches!(result, Err(RpcError::ProtoDecode(_))));
    }
}
