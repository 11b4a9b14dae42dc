//! Encoding of project and item content.
//!
//! Remote documents carry opaque byte blobs. This module turns them into
//! structured values and back, always writing compact JSON so that
//! re-encoding the same logical value yields the same bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Content could not be parsed as the expected structure.
#[derive(Debug, thiserror::Error)]
#[error("malformed content: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Content could not be serialized.
#[derive(Debug, thiserror::Error)]
#[error("unable to encode content: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Serialize a value into compact JSON bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(value)?)
}

/// Parse content bytes into `T`.
///
/// Required fields are checked here, so a document missing them is reported
/// as a `DecodeError` rather than surfacing later as a missing key.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    #[test]
    fn encode_is_compact() {
        let bytes = encode(&json!({"a": [1, 2], "b": {"c": null}})).unwrap();
        assert_eq!(bytes, br#"{"a":[1,2],"b":{"c":null}}"#.to_vec());
    }

    #[test]
    fn reencoding_is_reproducible() {
        let value = json!([{"id": "x", "fileInfo": {"width": 3, "height": 4}}]);
        let first = encode(&value).unwrap();
        let decoded: Value = decode(&first).unwrap();
        assert_eq!(encode(&decoded).unwrap(), first);
    }

    #[test]
    fn malformed_bytes_fail_with_decode_error() {
        let err = decode::<Value>(b"{not json").unwrap_err();
        assert!(err.to_string().contains("malformed content"));
    }

    #[test]
    fn wrong_shape_fails_with_decode_error() {
        assert!(decode::<Vec<String>>(br#"{"a":1}"#).is_err());
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in arb_json()) {
            let bytes = encode(&value).unwrap();
            let back: Value = decode(&bytes).unwrap();
            prop_assert_eq!(back, value);
        }
    }
}
