//! # JSON Format
//!
//! Newline-delimited JSON objects:
//!
//! ```text
//! {"id":1,"method":"add","params":[10,20]}
//! {"id":1,"result":30}
//! {"id":2,"error":{"code":-32601,"message":"method not found"}}
//! ```
//!
//! Parameters and results are captured as raw JSON text and decoded only
//! once the destination type is known. JSON `null` is a wire nil.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::CodecError;
use crate::error::ErrorObject;
use crate::error::Result;
use crate::format::Format;
use crate::format::Framing;
use crate::frame::Envelope;

/// The self-describing profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Json {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Vec<Option<Box<RawValue>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorObject>,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Box<RawValue>>,
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

fn to_raw(bytes: &[u8]) -> Result<Box<RawValue>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CodecError::Encode(format!("value is not UTF-8: {}", e)))?;
    Ok(RawValue::from_string(text.to_owned())?)
}

fn from_raw(raw: Box<RawValue>) -> Vec<u8> {
    raw.get().as_bytes().to_vec()
}

/// Split raw params into elements. Anything but an array or null is reported
/// instead of failing the whole frame, so the request can still be answered.
fn split_params(raw: Option<Box<RawValue>>) -> (Vec<Option<Vec<u8>>>, Option<String>) {
    let Some(raw) = raw else {
        return (Vec::new(), None);
    };

    match serde_json::from_str::<Vec<Option<Box<RawValue>>>>(raw.get()) {
        Ok(params) => (params.into_iter().map(|p| p.map(from_raw)).collect(), None),
        Err(e) => (Vec::new(), Some(format!("params must be an array: {}", e))),
    }
}

impl Format for Json {
    const FRAMING: Framing = Framing::Lines;

    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode_value<T: DeserializeOwned>(&self, raw: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(raw)?)
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let out = if envelope.is_request() {
            let params = envelope
                .params
                .iter()
                .map(|p| p.as_deref().map(to_raw).transpose())
                .collect::<Result<Vec<_>>>()?;

            OutgoingEnvelope {
                id: envelope.id,
                method: Some(&envelope.method),
                params: Some(params),
                result: None,
                error: None,
            }
        } else {
            // a success always carries a result, even a null one
            let result = match (&envelope.error, &envelope.result) {
                (Some(_), _) => None,
                (None, Some(raw)) => Some(to_raw(raw)?),
                (None, None) => Some(to_raw(b"null")?),
            };

            OutgoingEnvelope {
                id: envelope.id,
                method: None,
                params: None,
                result,
                error: envelope.error.as_ref(),
            }
        };

        Ok(serde_json::to_vec(&out)?)
    }

    fn decode_envelope(&self, bytes: &[u8]) -> Result<Envelope> {
        let incoming: IncomingEnvelope = serde_json::from_slice(bytes)?;
        let (params, params_error) = split_params(incoming.params);

        Ok(Envelope {
            id: incoming.id,
            method: incoming.method.unwrap_or_default(),
            params,
            result: incoming.result.map(from_raw),
            error: incoming.error,
            params_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let envelope = Envelope {
            id: 1,
            method: "add".into(),
            params: vec![Some(b"10".to_vec()), Some(b"20".to_vec()), None],
            ..Default::default()
        };

        let bytes = Json.encode_envelope(&envelope).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"id":1,"method":"add","params":[10,20,null]}"#
        );
    }

    #[test]
    fn response_wire_shape() {
        let ok = Envelope { id: 3, result: Some(b"30".to_vec()), ..Default::default() };
        let bytes = Json.encode_envelope(&ok).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"{"id":3,"result":30}"#);

        let err = Envelope {
            id: 4,
            error: Some(ErrorObject::new(-32601, "method not found")),
            ..Default::default()
        };
        let bytes = Json.encode_envelope(&err).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"id":4,"error":{"code":-32601,"message":"method not found"}}"#
        );
    }

    #[test]
    fn null_params_decode_as_nil() {
        let envelope = Json
            .decode_envelope(br#"{"id":9,"method":"echo","params":["hi",null]}"#)
            .unwrap();

        assert_eq!(envelope.method, "echo");
        assert_eq!(envelope.params, vec![Some(br#""hi""#.to_vec()), None]);
    }

    #[test]
    fn non_array_params_are_flagged() {
        let envelope = Json
            .decode_envelope(br#"{"id":1,"method":"add","params":{"a":1}}"#)
            .unwrap();

        assert!(envelope.is_request());
        assert_eq!(envelope.id, 1);
        assert!(envelope.params.is_empty());
        assert!(envelope.params_error.is_some());

        let envelope = Json.decode_envelope(br#"{"id":2,"method":"ping","params":null}"#).unwrap();
        assert!(envelope.params.is_empty());
        assert_eq!(envelope.params_error, None);
    }

    #[test]
    fn missing_fields_default() {
        let envelope = Json.decode_envelope(br#"{"id":5,"result":null}"#).unwrap();
        assert!(!envelope.is_request());
        assert_eq!(envelope.result, None);
        assert_eq!(envelope.error, None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Json.decode_envelope(b"{not json").is_err());
    }
}
