use super::{FormatError, TimestampFormat};
use crate::domain::NormalizedRecord;
use bytes::Bytes;

const CEF_VERSION: u8 = 0;
const RESERVED_KEYS: [&str; 5] = ["rt", "cat", "msg", "eventId", "sourceServiceName"];

/// `CEF:0|Vendor|Product|Version|SignatureID|Name|Severity|Extension`
///
/// SignatureID is the record category and Name is the message. The extension
/// carries `rt`, `cat`, `msg`, `sourceServiceName`, `eventId` (when present),
/// then the record fields.
#[derive(Debug, Clone)]
pub struct CefFormatter {
    timestamp: TimestampFormat,
    vendor: String,
    product: String,
    version: String,
}

impl CefFormatter {
    pub fn new(timestamp: TimestampFormat, vendor: &str, product: &str, version: &str) -> Self {
        Self {
            timestamp,
            vendor: escape_header(vendor),
            product: escape_header(product),
            version: escape_header(version),
        }
    }

    pub fn format(&self, record: &NormalizedRecord) -> Result<Bytes, FormatError> {
        let mut line = String::with_capacity(256 + record.message().len() * 2);

        line.push_str("CEF:");
        line.push_str(&CEF_VERSION.to_string());
        for part in [&self.vendor, &self.product, &self.version] {
            line.push('|');
            line.push_str(part);
        }
        line.push('|');
        line.push_str(&escape_header(record.category()));
        line.push('|');
        line.push_str(&escape_header(record.message()));
        line.push('|');
        line.push_str(&record.severity().cef_level().to_string());
        line.push('|');

        let rendered_ts = self.timestamp.render(record.timestamp())?;
        let mut extension: Vec<(String, String)> = vec![
            ("rt".to_string(), rendered_ts),
            ("cat".to_string(), record.category().to_string()),
            ("msg".to_string(), record.message().to_string()),
            ("sourceServiceName".to_string(), record.source().to_string()),
        ];
        if let Some(event_id) = record.event_id() {
            extension.push(("eventId".to_string(), event_id.to_string()));
        }
        for (key, value) in record.fields() {
            let key = sanitize_key(key);
            if key.is_empty() || RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            extension.push((key, value.to_string()));
        }

        let rendered: Vec<String> = extension
            .iter()
            .map(|(key, value)| format!("{}={}", key, escape_extension_value(value)))
            .collect();
        line.push_str(&rendered.join(" "));
        line.push('\n');

        Ok(Bytes::from(line))
    }
}

/// Header fields escape backslash and pipe; line breaks become spaces.
fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\r' | '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Extension values escape backslash, `=`, space and `|`; line breaks are
/// written as `\n` / `\r`.
fn escape_extension_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '=' => out.push_str("\\="),
            ' ' => out.push_str("\\ "),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Extension keys cannot be escaped, so anything outside `[A-Za-z0-9_.]`
/// is replaced.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
