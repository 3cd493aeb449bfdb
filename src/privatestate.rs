//! Resource private state.
//!
//! Private state is an opaque byte map stored next to a resource's state. The
//! orchestration engine never looks inside it. Keys starting with `.` belong
//! to the framework; every other key belongs to the provider.
//!
//! On the wire the map is a JSON object whose values are base64 encoded. Every
//! stored value must itself be valid UTF-8 JSON.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::diag::Diagnostic;

const FRAMEWORK_KEY_PREFIX: char = '.';

/// Key marking private state written by the legacy plugin SDK.
const LEGACY_SCHEMA_VERSION_KEY: &str = "schema_version";

/// The complete private state of a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrivateData {
    /// Framework owned values. Keys start with `.`.
    pub framework: BTreeMap<String, Vec<u8>>,
    /// Provider owned values.
    pub provider: Option<ProviderData>,
}

impl PrivateData {
    /// Decode private state bytes.
    ///
    /// Empty input and private state written by the legacy plugin SDK both
    /// decode to empty data.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Diagnostic> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }

        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|err| decode_error(format!("private state is not a JSON object: {}", err)))?;

        if entries.contains_key(LEGACY_SCHEMA_VERSION_KEY) {
            tracing::debug!("Ignoring private state written by the legacy plugin SDK");
            return Ok(Self::default());
        }

        let mut data = Self::default();
        let mut provider = BTreeMap::new();

        for (key, encoded) in entries {
            let encoded = encoded.as_str().ok_or_else(|| {
                decode_error(format!("the value for key {:?} is not a base64 string", key))
            })?;
            let value = BASE64.decode(encoded).map_err(|err| {
                decode_error(format!("the value for key {:?} is not valid base64: {}", key, err))
            })?;
            check_value(&key, &value).map_err(decode_error)?;

            if key.starts_with(FRAMEWORK_KEY_PREFIX) {
                data.framework.insert(key, value);
            } else {
                provider.insert(key, value);
            }
        }

        if !provider.is_empty() {
            data.provider = Some(ProviderData { data: provider });
        }

        Ok(data)
    }

    /// Encode private state into bytes.
    ///
    /// Empty values are dropped. Returns empty bytes when nothing is left.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Diagnostic> {
        let provider = self.provider.iter().flat_map(|p| p.data.iter());

        let mut encoded = BTreeMap::new();
        for (key, value) in self.framework.iter().chain(provider) {
            if value.is_empty() {
                continue;
            }
            check_value(key, value).map_err(encode_error)?;
            encoded.insert(key.as_str(), BASE64.encode(value));
        }

        if encoded.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::to_vec(&encoded).map_err(|err| encode_error(err.to_string()))
    }

    /// The provider namespace, or an empty one.
    pub fn provider_data(&self) -> ProviderData {
        self.provider.clone().unwrap_or_default()
    }
}

/// The provider namespace of private state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderData {
    data: BTreeMap<String, Vec<u8>>,
}

impl ProviderData {
    /// Create empty provider data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode provider data from the same JSON form used for full private
    /// state. Framework keys are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Diagnostic> {
        let decoded = PrivateData::from_bytes(bytes)?;
        if let Some(key) = decoded.framework.keys().next() {
            return Err(restricted_key(key));
        }
        Ok(decoded.provider.unwrap_or_default())
    }

    /// Read a key. Absent keys read as `None`.
    pub fn get_key(&self, key: &str) -> Result<Option<&[u8]>, Diagnostic> {
        if key.starts_with(FRAMEWORK_KEY_PREFIX) {
            return Err(restricted_key(key));
        }
        Ok(self.data.get(key).map(Vec::as_slice))
    }

    /// Store a value under a key. An empty value removes the key.
    pub fn set_key(&mut self, key: &str, value: &[u8]) -> Result<(), Diagnostic> {
        if key.starts_with(FRAMEWORK_KEY_PREFIX) {
            return Err(restricted_key(key));
        }

        if value.is_empty() {
            self.data.remove(key);
            return Ok(());
        }

        if std::str::from_utf8(value).is_err() {
            return Err(Diagnostic::error("UTF-8 Invalid").with_detail(format!(
                "Values stored in private state must be valid UTF-8.\n\n\
                 The value being supplied for key {:?} is invalid. \
                 Please verify that the value is valid UTF-8.",
                key
            )));
        }

        if serde_json::from_slice::<serde::de::IgnoredAny>(value).is_err() {
            return Err(Diagnostic::error("JSON Invalid").with_detail(format!(
                "Values stored in private state must be valid JSON.\n\n\
                 The value being supplied for key {:?} is invalid. \
                 Please verify that the value is valid JSON.",
                key
            )));
        }

        self.data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    /// Iterate over the stored keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn check_value(key: &str, value: &[u8]) -> Result<(), String> {
    if std::str::from_utf8(value).is_err() {
        return Err(format!("the value for key {:?} is not valid UTF-8", key));
    }
    if serde_json::from_slice::<serde::de::IgnoredAny>(value).is_err() {
        return Err(format!("the value for key {:?} is not valid JSON", key));
    }
    Ok(())
}

fn restricted_key(key: &str) -> Diagnostic {
    Diagnostic::error("Restricted Resource Private State Namespace").with_detail(format!(
        "Using a period ('.') as a prefix for a key used in private state is not allowed.\n\n\
         The key {:?} is invalid. Please check the key you are supplying does not use a \
         period ('.') as a prefix.",
        key
    ))
}

fn decode_error(reason: String) -> Diagnostic {
    Diagnostic::error("Error Decoding Private State").with_detail(format!(
        "An error was encountered when decoding private state: {}.\n\n\
         This is always a problem with the orchestration engine or the provider framework. \
         Please report this to the provider developer.",
        reason
    ))
}

fn encode_error(reason: String) -> Diagnostic {
    Diagnostic::error("Error Encoding Private State").with_detail(format!(
        "An error was encountered when encoding private state: {}.\n\n\
         This is always a problem with the provider framework. \
         Please report this to the provider developer.",
        reason
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_splits_namespaces() {
        let mut provider = ProviderData::empty();
        provider.set_key("etag", br#""abc""#).unwrap();

        let data = PrivateData {
            framework: BTreeMap::from([(".fw".to_string(), br#"{"v":1}"#.to_vec())]),
            provider: Some(provider.clone()),
        };

        let bytes = data.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json[".fw"], BASE64.encode(br#"{"v":1}"#));
        assert_eq!(json["etag"], BASE64.encode(br#""abc""#));

        let decoded = PrivateData::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.provider_data().get_key("etag").unwrap(), Some(&br#""abc""#[..]));
    }

    #[test]
    fn test_empty_bytes() {
        let data = PrivateData::from_bytes(&[]).unwrap();
        assert_eq!(data, PrivateData::default());
        assert!(data.to_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_empty_values_are_dropped() {
        let data = PrivateData {
            framework: BTreeMap::from([
                (".a".to_string(), b"1".to_vec()),
                (".b".to_string(), Vec::new()),
            ]),
            provider: None,
        };
        let json: serde_json::Value = serde_json::from_slice(&data.to_bytes().unwrap()).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_legacy_sdk_state_is_ignored() {
        let data = PrivateData::from_bytes(br#"{"schema_version":"2"}"#).unwrap();
        assert_eq!(data, PrivateData::default());
    }

    #[test]
    fn test_decode_errors() {
        let err = PrivateData::from_bytes(b"{").unwrap_err();
        assert_eq!(err.summary, "Error Decoding Private State");

        let not_json = BASE64.encode("}");
        let bytes = format!(r#"{{"key":"{}"}}"#, not_json);
        let err = PrivateData::from_bytes(bytes.as_bytes()).unwrap_err();
        assert!(err.detail.unwrap().contains("is not valid JSON"));

        let not_utf8 = BASE64.encode([0xff, 0xfe]);
        let bytes = format!(r#"{{".key":"{}"}}"#, not_utf8);
        let err = PrivateData::from_bytes(bytes.as_bytes()).unwrap_err();
        assert!(err.detail.unwrap().contains("is not valid UTF-8"));
    }

    #[test]
    fn test_encode_error() {
        let data = PrivateData {
            framework: BTreeMap::from([(".fw".to_string(), b"}".to_vec())]),
            provider: None,
        };
        let err = data.to_bytes().unwrap_err();
        assert_eq!(err.summary, "Error Encoding Private State");
    }

    #[test]
    fn test_provider_data_get_set() {
        let mut data = ProviderData::empty();
        assert_eq!(data.get_key("missing").unwrap(), None);

        data.set_key("k", br#"{"a":1}"#).unwrap();
        data.set_key("k", br#"{"a":2}"#).unwrap();
        assert_eq!(data.get_key("k").unwrap(), Some(&br#"{"a":2}"#[..]));

        data.set_key("k", b"").unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_provider_data_rejects_restricted_keys() {
        let mut data = ProviderData::empty();

        let err = data.get_key(".key").unwrap_err();
        assert_eq!(err.summary, "Restricted Resource Private State Namespace");

        let err = data.set_key(".key", b"{}").unwrap_err();
        assert!(err.detail.unwrap().contains(r#"The key ".key" is invalid"#));
    }

    #[test]
    fn test_provider_data_rejects_invalid_values() {
        let mut data = ProviderData::empty();

        let err = data.set_key("key", &[0xff]).unwrap_err();
        assert_eq!(err.summary, "UTF-8 Invalid");

        let err = data.set_key("key", b"{").unwrap_err();
        assert_eq!(err.summary, "JSON Invalid");
        assert!(data.is_empty());
    }

    #[test]
    fn test_provider_data_from_bytes_rejects_framework_keys() {
        let bytes = format!(r#"{{".fw":"{}"}}"#, BASE64.encode("1"));
        let err = ProviderData::from_bytes(bytes.as_bytes()).unwrap_err();
        assert_eq!(err.summary, "Restricted Resource Private State Namespace");
    }
}
