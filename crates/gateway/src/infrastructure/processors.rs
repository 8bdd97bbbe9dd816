//! Stock pre/post processors for `WsSession`

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::domain::{Payload, RawMessage, WsPostProcessor, WsPreProcessor, WsRequest};
use crate::error::TransportError;

/// Stamps a per-session request id into JSON requests that lack one.
/// A JSON request that is not an object is rejected.
pub struct RequestIdStamper {
    field: String,
    as_string: bool,
    next_id: AtomicU64,
}

impl RequestIdStamper {
    /// Ids written as JSON numbers
    pub fn numeric(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            as_string: false,
            next_id: AtomicU64::new(1),
        }
    }

    /// Ids written as JSON strings
    pub fn string(field: impl Into<String>) -> Self {
        Self {
            as_string: true,
            ..Self::numeric(field)
        }
    }
}

impl WsPreProcessor for RequestIdStamper {
    fn pre_process(&self, request: WsRequest) -> Result<WsRequest, TransportError> {
        let mut fields = match request {
            WsRequest::Json(Value::Object(fields)) => fields,
            WsRequest::Json(other) => {
                return Err(TransportError::Processor(format!(
                    "cannot stamp {} into {}",
                    self.field, other
                )));
            }
            other => return Ok(other),
        };
        if !fields.contains_key(&self.field) {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let value = if self.as_string {
                Value::from(id.to_string())
            } else {
                Value::from(id)
            };
            fields.insert(self.field.clone(), value);
        }
        Ok(WsRequest::Json(Value::Object(fields)))
    }
}

/// Decodes JSON text frames. Text that is not JSON is passed through as-is
/// so the classifier can still recognise plain-text control frames.
pub struct JsonDecoder;

impl WsPostProcessor for JsonDecoder {
    fn post_process(&self, mut message: RawMessage) -> Result<RawMessage, TransportError> {
        if let Payload::Text(text) = &message.payload
            && let Ok(value) = serde_json::from_str::<Value>(text)
        {
            message.payload = Payload::Json(value);
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stamper_keeps_existing_id() {
        let stamper = RequestIdStamper::numeric("id");
        let first = stamper
            .pre_process(WsRequest::Json(json!({"method": "SUBSCRIBE"})))
            .unwrap();
        let kept = stamper
            .pre_process(WsRequest::Json(json!({"method": "SUBSCRIBE", "id": 99})))
            .unwrap();
        let second = stamper
            .pre_process(WsRequest::Json(json!({"method": "SUBSCRIBE"})))
            .unwrap();

        assert_eq!(first, WsRequest::Json(json!({"method": "SUBSCRIBE", "id": 1})));
        assert_eq!(kept, WsRequest::Json(json!({"method": "SUBSCRIBE", "id": 99})));
        assert_eq!(second, WsRequest::Json(json!({"method": "SUBSCRIBE", "id": 2})));
    }

    #[test]
    fn test_string_stamper_ignores_non_json() {
        let stamper = RequestIdStamper::string("req_id");
        let stamped = stamper
            .pre_process(WsRequest::Json(json!({"op": "ping"})))
            .unwrap();
        assert_eq!(stamped, WsRequest::Json(json!({"op": "ping", "req_id": "1"})));

        let ping = stamper.pre_process(WsRequest::Ping(vec![])).unwrap();
        assert_eq!(ping, WsRequest::Ping(vec![]));
    }

    #[test]
    fn test_stamper_rejects_non_object_json() {
        let stamper = RequestIdStamper::numeric("id");
        let result = stamper.pre_process(WsRequest::Json(json!(["SUBSCRIBE", "btcusdt@depth"])));
        assert!(matches!(result, Err(TransportError::Processor(msg)) if msg.contains("id")));

        // The counter only advances for stamped requests
        let stamped = stamper.pre_process(WsRequest::Json(json!({}))).unwrap();
        assert_eq!(stamped, WsRequest::Json(json!({"id": 1})));
    }

    #[test]
    fn test_json_decoder() {
        let decoded = JsonDecoder
            .post_process(RawMessage::new(Payload::Text(r#"{"a":1}"#.into())))
            .unwrap();
        assert_eq!(decoded.as_json(), Some(&json!({"a": 1})));

        let plain = JsonDecoder
            .post_process(RawMessage::new(Payload::Text("pong".into())))
            .unwrap();
        assert_eq!(plain.as_text(), Some("pong"));
    }
}
