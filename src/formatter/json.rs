use super::{FormatError, TimestampFormat};
use crate::domain::NormalizedRecord;
use bytes::Bytes;
use serde_json::{Map, Value};

const CORE_KEYS: [&str; 6] = [
    "timestamp",
    "source",
    "category",
    "severity",
    "message",
    "event_id",
];

/// One JSON object per record with the record fields merged at top level.
/// A field whose key collides with a core key is skipped.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    timestamp: TimestampFormat,
}

impl JsonFormatter {
    pub fn new(timestamp: TimestampFormat) -> Self {
        Self { timestamp }
    }

    pub fn format(&self, record: &NormalizedRecord) -> Result<Bytes, FormatError> {
        let mut object = Map::new();
        object.insert(
            "timestamp".into(),
            Value::String(self.timestamp.render(record.timestamp())?),
        );
        object.insert("source".into(), Value::String(record.source().to_string()));
        object.insert(
            "category".into(),
            Value::String(record.category().to_string()),
        );
        object.insert(
            "severity".into(),
            Value::String(record.severity().as_str().to_string()),
        );
        object.insert(
            "message".into(),
            Value::String(record.message().to_string()),
        );
        object.insert(
            "event_id".into(),
            record
                .event_id()
                .map_or(Value::Null, |id| Value::String(id.to_string())),
        );

        for (key, value) in record.fields() {
            if CORE_KEYS.contains(&key) {
                tracing::debug!("Skipping field '{}' that shadows a core key", key);
                continue;
            }
            object.insert(key.to_string(), Value::String(value.to_string()));
        }

        let mut buffer = serde_json::to_vec(&Value::Object(object))?;
        buffer.push(b'\n');
        Ok(Bytes::from(buffer))
    }
}
