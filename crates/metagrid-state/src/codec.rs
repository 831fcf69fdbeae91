//! Versioned record encoding.
//!
//! Records are stored as a JSON envelope `{"v": <version>, "d": <payload>}`.
//! Newer optional fields are declared `#[serde(default)]` on the payload type,
//! so encodings written by older versions keep decoding. Encodings from a
//! version newer than the reader knows are rejected.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u32,
    d: &'a T,
}

#[derive(Deserialize)]
struct Header {
    v: u32,
}

#[derive(Deserialize)]
struct Envelope<T> {
    d: T,
}

pub fn encode_versioned<T: Serialize>(value: &T, version: u32) -> StateResult<Vec<u8>> {
    serde_json::to_vec(&EnvelopeRef { v: version, d: value })
        .map_err(|e| StateError::Serialize(e.to_string()))
}

/// Decode an envelope, returning the version it was written with.
pub fn decode_versioned<T: DeserializeOwned>(bytes: &[u8], newest: u32) -> StateResult<(u32, T)> {
    let header: Header =
        serde_json::from_slice(bytes).map_err(|e| StateError::Deserialize(e.to_string()))?;
    if header.v > newest {
        return Err(StateError::UnsupportedVersion {
            found: header.v,
            supported: newest,
        });
    }
    let envelope: Envelope<T> =
        serde_json::from_slice(bytes).map_err(|e| StateError::Deserialize(e.to_string()))?;
    Ok((header.v, envelope.d))
}

/// A type persisted as a versioned envelope.
pub trait VersionedRecord: Serialize + DeserializeOwned {
    /// Version written by this build.
    const VERSION: u32;

    fn encode(&self) -> StateResult<Vec<u8>> {
        encode_versioned(self, Self::VERSION)
    }

    fn decode(bytes: &[u8]) -> StateResult<Self> {
        decode_versioned(bytes, Self::VERSION).map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: i64,
        #[serde(default)]
        color: Option<String>,
    }

    impl VersionedRecord for Widget {
        const VERSION: u32 = 2;
    }

    #[test]
    fn encode_then_decode() {
        let widget = Widget {
            id: 4,
            color: Some("red".to_string()),
        };
        let bytes = widget.encode().unwrap();
        assert_eq!(Widget::decode(&bytes).unwrap(), widget);
    }

    #[test]
    fn older_encoding_without_new_field_decodes() {
        let v1 = br#"{"v":1,"d":{"id":9}}"#;
        assert_eq!(Widget::decode(v1).unwrap(), Widget { id: 9, color: None });
    }

    #[test]
    fn newer_encoding_rejected() {
        let v3 = br#"{"v":3,"d":{"id":9}}"#;
        assert!(matches!(
            Widget::decode(v3),
            Err(StateError::UnsupportedVersion { found: 3, supported: 2 })
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = Widget::decode(b"\x00\x01").unwrap_err();
        assert!(err.is_decode());
    }
}
