//! String-valued header maps.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{EnvelopeError, EnvelopeResult};

pub const CONTENT_TYPE: &str = "ContentType";
pub const HASH: &str = "Hash";
pub const DATE_TIME: &str = "DateTime";
pub const TO: &str = "To";
pub const FROM: &str = "From";
pub const CIPHER_KEY: &str = "CipherKey";
pub const CIPHER_CHUNK_SIZE: &str = "CipherChunkSize";
pub const PERMIT: &str = "Permit";

/// Keys every plaintext message must carry.
pub const MESSAGE_REQUIRED: [&str; 3] = [CONTENT_TYPE, HASH, DATE_TIME];

/// Keys every envelope must carry.
pub const ENVELOPE_REQUIRED: [&str; 4] = [TO, FROM, HASH, CIPHER_KEY];

/// Header metadata: string keys to string values.
///
/// Key order carries no meaning. The encoded form is a JSON object with keys
/// sorted, so encoding the same header twice yields the same bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header(BTreeMap<String, String>);

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The value for `key`, which must be present and non-empty.
    pub fn require(&self, key: &str) -> EnvelopeResult<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(EnvelopeError::MissingHeader(key.to_string())),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Check that every key in `required` is present and non-empty.
    pub fn validate(&self, required: &[&str]) -> EnvelopeResult<()> {
        for key in required {
            self.require(key)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> EnvelopeResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Decode a JSON object. Any non-string value is rejected.
    pub fn from_json(bytes: &[u8]) -> EnvelopeResult<Self> {
        let map: Map<String, Value> = serde_json::from_slice(bytes)?;
        Self::try_from(map)
    }
}

impl TryFrom<Map<String, Value>> for Header {
    type Error = EnvelopeError;

    fn try_from(map: Map<String, Value>) -> EnvelopeResult<Self> {
        let mut header = Header::new();
        for (key, value) in map {
            match value {
                Value::String(s) => {
                    header.insert(key, s);
                }
                _ => return Err(EnvelopeError::NonStringHeader(key)),
            }
        }
        Ok(header)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Header {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = Header::new();
        for (k, v) in iter {
            header.insert(k, v);
        }
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_missing_and_empty() {
        let header = Header::new().with(CONTENT_TYPE, "").with(HASH, "abc");
        assert_eq!(header.require(HASH).unwrap(), "abc");
        assert!(matches!(
            header.require(CONTENT_TYPE),
            Err(EnvelopeError::MissingHeader(k)) if k == CONTENT_TYPE
        ));
        assert!(matches!(
            header.validate(&MESSAGE_REQUIRED),
            Err(EnvelopeError::MissingHeader(_))
        ));
    }

    #[test]
    fn json_is_sorted_and_stable() {
        let header: Header = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(header.to_json().unwrap(), br#"{"a":"1","b":"2"}"#);
        assert_eq!(Header::from_json(&header.to_json().unwrap()).unwrap(), header);
    }

    #[test]
    fn non_string_values_are_rejected() {
        let err = Header::from_json(br#"{"ContentType":"text/plain","Size":12}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::NonStringHeader(k) if k == "Size"));
        let err = Header::from_json(br#"{"Nested":{"a":"b"}}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::NonStringHeader(_)));
    }

    #[test]
    fn non_object_is_an_encoding_error() {
        assert!(matches!(
            Header::from_json(b"[1,2,3]"),
            Err(EnvelopeError::Json(_))
        ));
    }
}
