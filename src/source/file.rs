use super::{LogSource, SourceError, parse_timestamp};
use crate::domain::NormalizedRecord;
use regex::Regex;
use serde_json::{Map, Value};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

pub const FILE_SOURCE_ID: &str = "file";

/// Upper bound on bytes consumed by a single poll.
const MAX_READ_PER_POLL: u64 = 8 * 1024 * 1024;

const TIMESTAMP_PATTERN: &str =
    r"(\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)";
const SEVERITY_PATTERN: &str = r"(ERROR|WARN|INFO|DEBUG|CRITICAL)";

/// Compiled once; `None` if a pattern fails to compile, in which case text
/// lines are forwarded without timestamp or severity extraction.
fn text_patterns() -> Option<&'static (Regex, Regex)> {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match (Regex::new(TIMESTAMP_PATTERN), Regex::new(SEVERITY_PATTERN)) {
            (Ok(timestamp), Ok(severity)) => Some((timestamp, severity)),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Text log patterns failed to compile: {}", e);
                None
            }
        })
        .as_ref()
}

/// Tails a local file by byte offset. Only newline-terminated lines are
/// consumed; a trailing partial line waits for the next poll.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    offset: u64,
    missing_reported: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            missing_reported: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    async fn read_new_lines(&mut self) -> Result<Vec<NormalizedRecord>, SourceError> {
        let io_err = |source| SourceError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !self.missing_reported {
                    warn!("Log file {} not found, waiting for it", self.path.display());
                    self.missing_reported = true;
                }
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_err(e)),
        };
        if self.missing_reported {
            info!("Log file {} appeared", self.path.display());
            self.missing_reported = false;
        }

        let len = file.metadata().await.map_err(io_err)?.len();
        if len < self.offset {
            info!(
                "Log file {} shrank from {} to {} bytes, reading from the start",
                self.path.display(),
                self.offset,
                len
            );
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await.map_err(io_err)?;
        let to_read = (len - self.offset).min(MAX_READ_PER_POLL);
        let mut buf = Vec::with_capacity(to_read as usize);
        file.take(to_read)
            .read_to_end(&mut buf)
            .await
            .map_err(io_err)?;

        let consumed = match buf.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => last_newline + 1,
            // A single line longer than the read window is taken as is.
            None if buf.len() as u64 == MAX_READ_PER_POLL => buf.len(),
            None => return Ok(Vec::new()),
        };
        self.offset += consumed as u64;

        let text = String::from_utf8_lossy(&buf[..consumed]);
        let records: Vec<NormalizedRecord> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_line)
            .collect();

        debug!(
            "Read {} records from {} (offset {})",
            records.len(),
            self.path.display(),
            self.offset
        );
        Ok(records)
    }
}

impl LogSource for FileSource {
    fn name(&self) -> &str {
        FILE_SOURCE_ID
    }

    async fn poll(&mut self) -> Result<Vec<NormalizedRecord>, SourceError> {
        self.read_new_lines().await
    }
}

/// JSON objects are mapped key by key; anything else is treated as a text line.
pub fn parse_line(line: &str) -> NormalizedRecord {
    match serde_json::from_str::<Map<String, Value>>(line) {
        Ok(object) => from_json(object),
        Err(_) => from_text(line),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn from_json(mut object: Map<String, Value>) -> NormalizedRecord {
    let mut take = |key: &str| object.remove(key).as_ref().and_then(scalar_to_string);

    let timestamp = take("timestamp");
    let category = take("category");
    let severity = take("severity");
    let message = take("message").unwrap_or_default();
    let event_id = take("event_id");

    let mut builder = NormalizedRecord::builder(FILE_SOURCE_ID, message)
        .category(category.unwrap_or_else(|| "unknown".to_string()))
        .severity_str(severity.as_deref().unwrap_or("info"))
        .maybe_event_id(event_id);

    if let Some(raw) = timestamp {
        match parse_timestamp(&raw) {
            Some(ts) => builder = builder.timestamp(ts),
            None => debug!("Unparseable timestamp {:?}, using receive time", raw),
        }
    }

    for (key, value) in &object {
        if let Some(value) = scalar_to_string(value) {
            builder = builder.field(key.as_str(), value);
        }
    }
    builder.build()
}

fn from_text(line: &str) -> NormalizedRecord {
    let mut builder = NormalizedRecord::builder(FILE_SOURCE_ID, line).category("system");

    if let Some((timestamp_re, severity_re)) = text_patterns() {
        if let Some(ts) = timestamp_re
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_timestamp(m.as_str()))
        {
            builder = builder.timestamp(ts);
        }
        if let Some(level) = severity_re.captures(line).and_then(|c| c.get(1)) {
            builder = builder.severity_str(level.as_str());
        }
    }
    builder.build()
}
