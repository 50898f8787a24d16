//! Maps one inbound stream message to the document written in the store.
//!
//! The mapping is parse, then default, then merge: the payload must be a
//! JSON object, a missing `id` or `name` is synthesized from the broker
//! metadata, and the reserved metadata keys are written last.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const SOURCE: &str = "eventhub";
pub const PROCESSED_BY: &str = "ingest-eventhub";

/// Keys owned by the normalizer, they override payload values.
pub const RESERVED_KEYS: [&str; 8] = [
    "received_at",
    "source",
    "partition_key",
    "sequence_number",
    "offset",
    "enqueued_time",
    "processed_by",
    "consumer_group",
];

/// Ordering metadata supplied by the broker with every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMetadata {
    pub partition_key: String,
    pub sequence_number: i64,
    pub offset: String,
    pub enqueued_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub payload: Vec<u8>,
    pub metadata: BrokerMetadata,
}

#[derive(Debug, Error)]
pub enum DiscardReason {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload is a JSON {0}, not an object")]
    NotAnObject(&'static str),
    #[error("payload id is a JSON {0}, expected a string")]
    InvalidId(&'static str),
}

/// A document ready for an upsert-style write. Always carries a non-empty
/// string `id`, also present in the fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    #[serde(skip)]
    id: String,
    fields: Map<String, Value>,
}

impl NormalizedRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Sets a field. The `id` key is left untouched.
    pub fn set(&mut self, key: &str, value: Value) {
        if key != "id" {
            drop(self.fields.insert(key.to_owned(), value));
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageNormalizer {
    consumer_group: String,
}

impl MessageNormalizer {
    pub fn new(consumer_group: &str) -> Self {
        Self {
            consumer_group: consumer_group.to_owned(),
        }
    }

    pub fn normalize(
        &self,
        message: &InboundMessage,
        received_at: &str,
    ) -> Result<NormalizedRecord, DiscardReason> {
        let metadata = &message.metadata;
        let mut fields = match serde_json::from_slice::<Value>(&message.payload)? {
            Value::Object(fields) => fields,
            other => return Err(DiscardReason::NotAnObject(json_kind(&other))),
        };

        let id = match fields.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            None | Some(Value::Null) | Some(Value::String(_)) => synthesized_id(metadata),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => return Err(DiscardReason::InvalidId(json_kind(other))),
        };
        drop(fields.insert("id".to_owned(), Value::String(id.clone())));

        if !fields.contains_key("name") {
            drop(fields.insert(
                "name".to_owned(),
                Value::String(format!("EventHub Message {id}")),
            ));
        }

        let enqueued_time = metadata
            .enqueued_time
            .and_then(|t| t.format(&Rfc3339).ok())
            .map_or(Value::Null, Value::String);

        for (key, value) in [
            ("received_at", Value::String(received_at.to_owned())),
            ("source", Value::String(SOURCE.to_owned())),
            (
                "partition_key",
                Value::String(metadata.partition_key.clone()),
            ),
            ("sequence_number", Value::from(metadata.sequence_number)),
            ("offset", Value::String(metadata.offset.clone())),
            ("enqueued_time", enqueued_time),
            ("processed_by", Value::String(PROCESSED_BY.to_owned())),
            (
                "consumer_group",
                Value::String(self.consumer_group.clone()),
            ),
        ] {
            drop(fields.insert(key.to_owned(), value));
        }

        Ok(NormalizedRecord { id, fields })
    }
}

/// Unique as long as the broker keeps sequence numbers unique per partition.
pub fn synthesized_id(metadata: &BrokerMetadata) -> String {
    format!(
        "eventhub-{}-{}",
        metadata.partition_key, metadata.sequence_number
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    const RECEIVED_AT: &str = "2025-06-01T12:00:00Z";

    fn message(payload: &str, partition: &str, sequence: i64) -> InboundMessage {
        InboundMessage {
            payload: payload.as_bytes().to_vec(),
            metadata: BrokerMetadata {
                partition_key: partition.to_string(),
                sequence_number: sequence,
                offset: sequence.to_string(),
                enqueued_time: Some(datetime!(2025-06-01 11:59:58 UTC)),
            },
        }
    }

    fn normalize(payload: &str) -> Result<NormalizedRecord, DiscardReason> {
        MessageNormalizer::new("$Default").normalize(&message(payload, "0", 42), RECEIVED_AT)
    }

    #[test]
    fn synthesizes_id_from_partition_and_sequence() {
        let record = normalize(r#"{"name":"Sensor A","data":{"t":21}}"#).unwrap();

        assert_eq!(record.id(), "eventhub-0-42");
        assert_eq!(record.get("id"), Some(&json!("eventhub-0-42")));
        assert_eq!(record.get("name"), Some(&json!("Sensor A")));
        assert_eq!(record.get("data"), Some(&json!({"t": 21})));
    }

    #[test]
    fn keeps_payload_id() {
        for id in ["device-001", "eventhub-9-9", " spaced "] {
            let payload = json!({"id": id, "name": "Sensor"}).to_string();
            let record = normalize(&payload).unwrap();
            assert_eq!(record.id(), id);
        }
    }

    #[test]
    fn empty_or_null_id_is_synthesized() {
        for payload in [r#"{"id":"","name":"x"}"#, r#"{"id":null,"name":"x"}"#] {
            assert_eq!(normalize(payload).unwrap().id(), "eventhub-0-42");
        }
    }

    #[test]
    fn numeric_id_becomes_string() {
        let record = normalize(r#"{"id":1234,"name":"x"}"#).unwrap();
        assert_eq!(record.id(), "1234");
        assert_eq!(record.get("id"), Some(&json!("1234")));
    }

    #[test]
    fn unusable_id_is_discarded() {
        for payload in [r#"{"id":true}"#, r#"{"id":["a"]}"#, r#"{"id":{"a":1}}"#] {
            assert!(matches!(
                normalize(payload),
                Err(DiscardReason::InvalidId(_))
            ));
        }
    }

    #[test]
    fn synthesizes_name_from_id() {
        let record = normalize(r#"{"id":"device-7"}"#).unwrap();
        assert_eq!(record.get("name"), Some(&json!("EventHub Message device-7")));

        let record = normalize("{}").unwrap();
        assert_eq!(
            record.get("name"),
            Some(&json!("EventHub Message eventhub-0-42"))
        );
    }

    #[test]
    fn non_json_is_discarded() {
        assert!(matches!(
            normalize("not-json"),
            Err(DiscardReason::InvalidJson(_))
        ));
        assert!(matches!(normalize(""), Err(DiscardReason::InvalidJson(_))));

        let invalid_utf8 = InboundMessage {
            payload: vec![0xff, 0xfe, b'{'],
            ..message("", "0", 1)
        };
        assert!(MessageNormalizer::new("$Default")
            .normalize(&invalid_utf8, RECEIVED_AT)
            .is_err());
    }

    #[test]
    fn non_object_json_is_discarded() {
        for (payload, kind) in [
            ("[1,2]", "array"),
            ("\"text\"", "string"),
            ("42", "number"),
            ("true", "bool"),
            ("null", "null"),
        ] {
            match normalize(payload) {
                Err(DiscardReason::NotAnObject(k)) => assert_eq!(k, kind),
                other => panic!("expected discard for {payload}, got {other:?}"),
            }
        }
    }

    #[test]
    fn merges_metadata() {
        let record = normalize(r#"{"id":"d1","name":"n","category":"temp"}"#).unwrap();

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "id": "d1",
                "name": "n",
                "category": "temp",
                "received_at": RECEIVED_AT,
                "source": "eventhub",
                "partition_key": "0",
                "sequence_number": 42,
                "offset": "42",
                "enqueued_time": "2025-06-01T11:59:58Z",
                "processed_by": "ingest-eventhub",
                "consumer_group": "$Default",
            })
        );
    }

    #[test]
    fn reserved_keys_override_payload() {
        let record =
            normalize(r#"{"id":"d1","source":"spoofed","sequence_number":1,"location":"lab"}"#)
                .unwrap();

        assert_eq!(record.get("source"), Some(&json!("eventhub")));
        assert_eq!(record.get("sequence_number"), Some(&json!(42)));
        assert_eq!(record.get("location"), Some(&json!("lab")));
        for key in RESERVED_KEYS {
            assert!(record.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn missing_enqueued_time_is_null() {
        let mut msg = message("{}", "3", 7);
        msg.metadata.enqueued_time = None;
        let record = MessageNormalizer::new("readers")
            .normalize(&msg, RECEIVED_AT)
            .unwrap();

        assert_eq!(record.id(), "eventhub-3-7");
        assert_eq!(record.get("enqueued_time"), Some(&Value::Null));
        assert_eq!(record.get("consumer_group"), Some(&json!("readers")));
    }

    #[test]
    fn set_never_changes_id() {
        let mut record = normalize(r#"{"id":"d1"}"#).unwrap();
        record.set("id", json!("other"));
        record.set("updated_at", json!(RECEIVED_AT));

        assert_eq!(record.id(), "d1");
        assert_eq!(record.get("id"), Some(&json!("d1")));
        assert_eq!(record.get("updated_at"), Some(&json!(RECEIVED_AT)));
    }
}
