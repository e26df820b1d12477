//! Length-prefixed binary envelope for Channel Broker transport.
//!
//! Wire format: `u32` total length prefix, `u8` version, `u8` compressed
//! flag, `u16` content-type length + content-type bytes, remaining bytes
//! are the body (a serialized [`super::Event`], optionally zstd-compressed
//! per [`super::compression`]).

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const WIRE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEnvelope {
    pub version: u8,
    pub compressed: bool,
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Truncated,
    UnsupportedVersion(u8),
    InvalidContentType,
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::Truncated => write!(f, "wire envelope truncated"),
            WireError::UnsupportedVersion(v) => write!(f, "unsupported wire version {v}"),
            WireError::InvalidContentType => write!(f, "wire envelope content-type is not valid utf-8"),
        }
    }
}

impl std::error::Error for WireError {}

impl WireEnvelope {
    pub fn new(compressed: bool, content_type: impl Into<String>, body: Bytes) -> Self {
        Self { version: WIRE_VERSION, compressed, content_type: content_type.into(), body }
    }

    pub fn encode(&self) -> Bytes {
        let content_type = self.content_type.as_bytes();
        let header_len = 1 + 1 + 2 + content_type.len();
        let total_len = header_len + self.body.len();

        let mut buf = BytesMut::with_capacity(4 + total_len);
        buf.put_u32(total_len as u32);
        buf.put_u8(self.version);
        buf.put_u8(self.compressed as u8);
        buf.put_u16(content_type.len() as u16);
        buf.put_slice(content_type);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Result<Self, WireError> {
        if bytes.len() < 4 {
            return Err(WireError::Truncated);
        }
        let total_len = bytes.get_u32() as usize;
        if bytes.len() < total_len {
            return Err(WireError::Truncated);
        }

        if bytes.len() < 2 {
            return Err(WireError::Truncated);
        }
        let version = bytes.get_u8();
        if version != WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let compressed = bytes.get_u8() != 0;

        if bytes.len() < 2 {
            return Err(WireError::Truncated);
        }
        let content_type_len = bytes.get_u16() as usize;
        if bytes.len() < content_type_len {
            return Err(WireError::Truncated);
        }
        let content_type_bytes = bytes.split_to(content_type_len);
        let content_type = String::from_utf8(content_type_bytes.to_vec()).map_err(|_| WireError::InvalidContentType)?;

        let body = bytes;
        Ok(Self { version, compressed, content_type, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_body() {
        let envelope = WireEnvelope::new(true, "application/json", Bytes::from_static(b"{}"));
        let encoded = envelope.encode();
        let decoded = WireEnvelope::decode(encoded).unwrap();

        assert_eq!(decoded.version, WIRE_VERSION);
        assert!(decoded.compressed);
        assert_eq!(decoded.content_type, "application/json");
        assert_eq!(&decoded.body[..], b"{}");
    }

    #[test]
    fn rejects_truncated_input() {
        let envelope = WireEnvelope::new(false, "t", Bytes::from_static(b"abc"));
        let mut encoded = envelope.encode();
        encoded.truncate(encoded.len() - 1);
        assert_eq!(WireEnvelope::decode(encoded), Err(WireError::Truncated));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut buf = BytesMut::new();
        buf.put_u32(4);
        buf.put_u8(99);
        buf.put_u8(0);
        buf.put_u16(0);
        assert_eq!(
            WireEnvelope::decode(buf.freeze()),
            Err(WireError::UnsupportedVersion(99))
        );
    }
}
