//! Wire formatters: `NormalizedRecord` -> bytes.
//!
//! The set of formats is closed and chosen once at startup, so `Formatter`
//! is an enum rather than a trait object. Every formatter output ends with
//! the newline that delimits records on the TCP stream.

pub mod cef;
pub mod csv;
pub mod json;

pub use cef::CefFormatter;
pub use csv::CsvFormatter;
pub use json::JsonFormatter;

use crate::domain::NormalizedRecord;
use bytes::Bytes;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use thiserror::Error;

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid timestamp format: '{0}'")]
    InvalidTimestampFormat(String),
    #[error("Failed to render timestamp with pattern '{0}'")]
    Timestamp(String),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatterKind {
    /// One JSON object per line
    #[default]
    Json,
    /// ArcSight Common Event Format
    Cef,
    /// Comma-delimited text
    Csv,
}

impl fmt::Display for FormatterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormatterKind::Json => "json",
            FormatterKind::Cef => "cef",
            FormatterKind::Csv => "csv",
        })
    }
}

/// Options shared by all formatters; each one reads the subset it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterOptions {
    pub timestamp_format: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    /// Fixed field columns for CSV. When unset, every record field is
    /// emitted in insertion order.
    pub csv_fields: Option<Vec<String>>,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            vendor: "LogForwarder".to_string(),
            product: "LogForwarder".to_string(),
            version: "1.0".to_string(),
            csv_fields: None,
        }
    }
}

/// A strftime pattern that has been checked for invalid specifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat(String);

impl TimestampFormat {
    pub fn new(pattern: &str) -> Result<Self, FormatError> {
        if pattern.is_empty()
            || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
        {
            return Err(FormatError::InvalidTimestampFormat(pattern.to_string()));
        }
        Ok(Self(pattern.to_string()))
    }

    pub fn pattern(&self) -> &str {
        &self.0
    }

    pub fn render(&self, timestamp: DateTime<Utc>) -> Result<String, FormatError> {
        let mut out = String::with_capacity(32);
        write!(out, "{}", timestamp.format(&self.0))
            .map_err(|_| FormatError::Timestamp(self.0.clone()))?;
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub enum Formatter {
    Json(JsonFormatter),
    Cef(CefFormatter),
    Csv(CsvFormatter),
}

impl Formatter {
    pub fn new(kind: FormatterKind, options: &FormatterOptions) -> Result<Self, FormatError> {
        let timestamp = TimestampFormat::new(&options.timestamp_format)?;
        Ok(match kind {
            FormatterKind::Json => Formatter::Json(JsonFormatter::new(timestamp)),
            FormatterKind::Cef => Formatter::Cef(CefFormatter::new(
                timestamp,
                &options.vendor,
                &options.product,
                &options.version,
            )),
            FormatterKind::Csv => {
                Formatter::Csv(CsvFormatter::new(timestamp, options.csv_fields.clone()))
            }
        })
    }

    pub fn kind(&self) -> FormatterKind {
        match self {
            Formatter::Json(_) => FormatterKind::Json,
            Formatter::Cef(_) => FormatterKind::Cef,
            Formatter::Csv(_) => FormatterKind::Csv,
        }
    }

    /// Render one record, trailing newline included.
    pub fn format(&self, record: &NormalizedRecord) -> Result<Bytes, FormatError> {
        match self {
            Formatter::Json(f) => f.format(record),
            Formatter::Cef(f) => f.format(record),
            Formatter::Csv(f) => f.format(record),
        }
    }
}
