use super::severity::Severity;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A normalized log event, the unit that flows from sources through the
/// queue to the delivery channel.
///
/// Records are immutable once built. `fields` keeps insertion order so that
/// formatters emitting positional output (CSV) are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    timestamp: DateTime<Utc>,
    source: String,
    category: String,
    severity: Severity,
    message: String,
    event_id: Option<String>,
    fields: Vec<(String, String)>,
}

impl NormalizedRecord {
    pub fn builder(source: impl Into<String>, message: impl Into<String>) -> RecordBuilder {
        RecordBuilder {
            record: NormalizedRecord {
                timestamp: Utc::now(),
                source: source.into(),
                category: "unknown".to_string(),
                severity: Severity::Info,
                message: message.into(),
                event_id: None,
                fields: Vec::new(),
            },
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    /// Source-specific attributes in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: NormalizedRecord,
}

impl RecordBuilder {
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.record.category = category.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.record.severity = severity;
        self
    }

    /// Set severity from free text; unknown levels become `Info`.
    pub fn severity_str(self, raw: &str) -> Self {
        self.severity(Severity::parse_lossy(raw))
    }

    pub fn event_id(mut self, event_id: impl Into<String>) -> Self {
        self.record.event_id = Some(event_id.into());
        self
    }

    pub fn maybe_event_id(mut self, event_id: Option<String>) -> Self {
        self.record.event_id = event_id;
        self
    }

    /// Add a field. Re-adding an existing key replaces its value in place.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.record.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.record.fields.push((key, value)),
        }
        self
    }

    pub fn maybe_field(self, key: impl Into<String>, value: Option<String>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    pub fn build(self) -> NormalizedRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builder_defaults() {
        let record = NormalizedRecord::builder("file", "hello").build();
        assert_eq!(record.source(), "file");
        assert_eq!(record.message(), "hello");
        assert_eq!(record.category(), "unknown");
        assert_eq!(record.severity(), Severity::Info);
        assert!(record.event_id().is_none());
        assert_eq!(record.field_count(), 0);
    }

    #[test]
    fn test_fields_keep_insertion_order() {
        let record = NormalizedRecord::builder("jira", "changed")
            .field("user", "alice")
            .field("ip_address", "10.0.0.1")
            .field("object", "project")
            .field("user", "bob")
            .build();

        let keys: Vec<&str> = record.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["user", "ip_address", "object"]);
        assert_eq!(record.field("user"), Some("bob"));
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn test_unknown_severity_maps_to_info() {
        let record = NormalizedRecord::builder("file", "x")
            .severity_str("shouting")
            .build();
        assert_eq!(record.severity(), Severity::Info);
    }

    #[test]
    fn test_explicit_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = NormalizedRecord::builder("file", "x").timestamp(ts).build();
        assert_eq!(record.timestamp(), ts);
    }
}
