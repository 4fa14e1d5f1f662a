//! Log sources feeding the event queue.
//!
//! A source only knows how to `poll` for new records; the [`SourceRunner`]
//! owns the loop around it (interval, category filter, error backoff,
//! enqueue and stop handling).

pub mod file;
pub mod filter;
pub mod jira;
pub mod runner;

pub use file::FileSource;
pub use filter::CategoryFilter;
pub use jira::{JiraConfig, JiraSource};
pub use runner::{SourceReport, SourceRunner};

use crate::domain::NormalizedRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Still rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid source configuration: {0}")]
    Config(String),
}

/// Anything that can be asked for the records produced since the last call.
pub trait LogSource: Send + 'static {
    /// Stable identifier, also used as the record `source`.
    fn name(&self) -> &str;

    fn poll(&mut self) -> impl Future<Output = Result<Vec<NormalizedRecord>, SourceError>> + Send;
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse the ISO-8601 shapes seen in log lines and audit APIs. Timestamps
/// without an offset are taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
