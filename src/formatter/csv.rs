use super::{FormatError, TimestampFormat};
use crate::domain::NormalizedRecord;
use bytes::Bytes;

const DELIMITER: char = ',';

/// `timestamp,source,category,severity,message,event_id,<field values>`
///
/// Values containing the delimiter, a quote or a line break are wrapped in
/// double quotes with internal quotes doubled.
#[derive(Debug, Clone)]
pub struct CsvFormatter {
    timestamp: TimestampFormat,
    columns: Option<Vec<String>>,
}

impl CsvFormatter {
    pub fn new(timestamp: TimestampFormat, columns: Option<Vec<String>>) -> Self {
        Self { timestamp, columns }
    }

    pub fn format(&self, record: &NormalizedRecord) -> Result<Bytes, FormatError> {
        let rendered_ts = self.timestamp.render(record.timestamp())?;
        let mut line = String::with_capacity(128 + record.message().len());

        push_value(&mut line, &rendered_ts);
        for value in [
            record.source(),
            record.category(),
            record.severity().as_str(),
            record.message(),
            record.event_id().unwrap_or_default(),
        ] {
            line.push(DELIMITER);
            push_value(&mut line, value);
        }

        match &self.columns {
            Some(columns) => {
                for column in columns {
                    line.push(DELIMITER);
                    push_value(&mut line, record.field(column).unwrap_or_default());
                }
            }
            None => {
                for (_, value) in record.fields() {
                    line.push(DELIMITER);
                    push_value(&mut line, value);
                }
            }
        }

        line.push('\n');
        Ok(Bytes::from(line))
    }
}

fn push_value(line: &mut String, value: &str) {
    if value.contains([DELIMITER, '"', '\n', '\r']) {
        line.push('"');
        line.push_str(&value.replace('"', "\"\""));
        line.push('"');
    } else {
        line.push_str(value);
    }
}
