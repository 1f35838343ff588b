//! Wire encoding: JSON-equivalent values, and the topic-prefixed framing
//! used by the publish/subscribe primitives.

use crate::error::{Error, Result};

/// A decoded primitive value: null, boolean, integer, floating point, text,
/// sequence, or mapping. `serde_json::Value`'s variant set already matches
/// this exactly, so we use it directly rather than define a parallel enum.
pub type Value = serde_json::Value;

/// A message payload that distinguishes "no content" (`Empty`) from "no
/// message received at all" (`None` at the call site) and from JSON
/// `null` (`Value(Value::Null)`). See the GLOSSARY entry for `EMPTY`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The distinguished zero-payload sentinel.
    Empty,
    /// An application-supplied value, including JSON `null`.
    Value(Value),
}

impl Payload {
    /// The distinguished zero-payload sentinel.
    pub const EMPTY: Payload = Payload::Empty;

    /// Build a payload from any serializable value.
    pub fn from_value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// True if this is the `EMPTY` sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Empty
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Encode a value to its wire form (JSON text, as bytes).
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a value from its wire form.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| Error::DecodeFailed(e.to_string()))
}

/// Encode a [`Payload`] to its wire form: the empty byte string for
/// `Payload::Empty`, or `encode(value)` otherwise.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>> {
    match payload {
        Payload::Empty => Ok(Vec::new()),
        Payload::Value(value) => encode(value),
    }
}

/// Decode a [`Payload`] from its wire form. A zero-length byte string is
/// always the `EMPTY` marker, never a decode failure.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    if bytes.is_empty() {
        Ok(Payload::Empty)
    } else {
        decode(bytes).map(Payload::Value)
    }
}

/// Encode a pub/sub frame `(topic, payload)` into its two wire parts.
pub fn encode_topic(topic: &str, payload: &Payload) -> Result<(Vec<u8>, Vec<u8>)> {
    Ok((topic.as_bytes().to_vec(), encode_payload(payload)?))
}

/// Decode a pub/sub frame's two wire parts back into `(topic, payload)`.
pub fn decode_topic(topic_bytes: &[u8], data_bytes: &[u8]) -> Result<(String, Payload)> {
    let topic = String::from_utf8(topic_bytes.to_vec())
        .map_err(|e| Error::DecodeFailed(e.to_string()))?;
    let payload = decode_payload(data_bytes)?;
    Ok((topic, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_every_primitive_shape() {
        for value in [
            Value::Null,
            json!(true),
            json!(42),
            json!(3.5),
            json!("hello"),
            json!([1, "two", false]),
            json!({"a": 1, "b": [2, 3]}),
        ] {
            let bytes = encode(&value).unwrap();
            assert_eq!(decode(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn empty_payload_round_trips_as_zero_length() {
        let bytes = encode_payload(&Payload::Empty).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(decode_payload(&bytes).unwrap(), Payload::Empty);
    }

    #[test]
    fn null_is_distinct_from_empty() {
        let empty_bytes = encode_payload(&Payload::Empty).unwrap();
        let null_bytes = encode_payload(&Payload::Value(Value::Null)).unwrap();
        assert_ne!(empty_bytes, null_bytes);
        assert_eq!(
            decode_payload(&null_bytes).unwrap(),
            Payload::Value(Value::Null)
        );
    }

    #[test]
    fn topic_frame_round_trips() {
        let (topic_bytes, data_bytes) =
            encode_topic("weather", &Payload::from_value(json!("sunny"))).unwrap();
        let (topic, payload) = decode_topic(&topic_bytes, &data_bytes).unwrap();
        assert_eq!(topic, "weather");
        assert_eq!(payload, Payload::from_value(json!("sunny")));
    }

    #[test]
    fn zero_length_second_part_decodes_as_handshake_ping() {
        let (_, payload) = decode_topic(b"topic", b"").unwrap();
        assert_eq!(payload, Payload::Empty);
    }
}
