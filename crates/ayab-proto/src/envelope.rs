use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const METHOD_GET: &str = "GET";
pub const METHOD_POST: &str = "POST";
pub const METHOD_PUT: &str = "PUT";

/// One HTTP-equivalent request as the daemon expects it on the wire.
///
/// `uri_params` and `data` are omitted from the encoded object when absent:
/// the daemon treats a present-but-null field differently from a missing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub method: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri_params: Option<BTreeMap<String, String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed reply from daemon: {0}")]
    MalformedReply(#[source] serde_json::Error),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
}

impl EnvelopeError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::MalformedReply(_) => "malformed_reply",
            Self::MalformedEnvelope(_) => "malformed_envelope",
        }
    }
}

impl Envelope {
    #[must_use]
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            uri_params: None,
            data: None,
        }
    }

    /// Collapses `params` into `uri_params`, later keys overriding earlier ones.
    /// An empty parameter list leaves the field absent.
    #[must_use]
    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut collapsed = self.uri_params.take().unwrap_or_default();
        for (key, value) in params {
            collapsed.insert(key.into(), value.into());
        }
        self.uri_params = if collapsed.is_empty() {
            None
        } else {
            Some(collapsed)
        };
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::MalformedEnvelope)
    }
}

/// Parses a daemon reply without imposing any schema on it.
pub fn decode_reply(bytes: &[u8]) -> Result<Value, EnvelopeError> {
    serde_json::from_slice(bytes).map_err(EnvelopeError::MalformedReply)
}

// A present `"data": null` must stay distinguishable from a missing field.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn get_envelope_omits_optional_fields() {
        let bytes = Envelope::new(METHOD_GET, "/queue")
            .encode()
            .expect("encode envelope");
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"method":"GET","uri":"/queue"}"#
        );
    }

    #[test]
    fn duplicate_params_collapse_to_last_value() {
        let envelope = Envelope::new(METHOD_GET, "/cursor").with_params([
            ("entry", "1"),
            ("mode", "raw"),
            ("entry", "4"),
        ]);
        let params = envelope.uri_params.expect("params present");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("entry").map(String::as_str), Some("4"));
    }

    #[test]
    fn empty_param_list_leaves_field_absent() {
        let envelope =
            Envelope::new(METHOD_GET, "/machine").with_params(Vec::<(String, String)>::new());
        assert!(envelope.uri_params.is_none());
    }

    #[test]
    fn null_data_is_kept_as_present() {
        let envelope = Envelope::new(METHOD_POST, "/queue").with_data(Value::Null);
        let bytes = envelope.encode().expect("encode envelope");
        let encoded: Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(encoded["data"], Value::Null);
        assert!(encoded.as_object().expect("object").contains_key("data"));

        let decoded = Envelope::decode(&bytes).expect("decode envelope");
        assert_eq!(decoded.data, Some(Value::Null));
    }

    #[test]
    fn params_and_data_are_kept_independently() {
        let envelope = Envelope::new(METHOD_POST, "/cursor")
            .with_params([("setPosition", "3")])
            .with_data(json!({"setPosition": 77}));
        let encoded: Value =
            serde_json::from_slice(&envelope.encode().expect("encode")).expect("valid json");
        assert_eq!(encoded["uri_params"]["setPosition"], "3");
        assert_eq!(encoded["data"]["setPosition"], 77);
    }

    #[test]
    fn reply_with_trailing_newline_decodes() {
        let reply = decode_reply(b"{\"result\":{\"status\":3}}\n").expect("decode reply");
        assert_eq!(reply["result"]["status"], 3);
    }

    #[test]
    fn malformed_reply_is_a_distinct_error() {
        let error = decode_reply(b"{\"result\":").expect_err("truncated reply");
        assert!(matches!(error, EnvelopeError::MalformedReply(_)));
        assert_eq!(error.kind(), "malformed_reply");

        let empty = decode_reply(b"").expect_err("empty reply");
        assert_eq!(empty.kind(), "malformed_reply");
    }
}
