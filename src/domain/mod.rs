//! Domain layer for siem-log-forwarder.
//!
//! Contains the canonical types shared across all modules:
//! - `NormalizedRecord`: The pipeline's core data type
//! - `Severity`: Normalized event severity (Debug/Info/Warning/Error/Critical)
//! - `ForwarderError`: Top-level error type

pub mod error;
pub mod record;
pub mod severity;

pub use error::ForwarderError;
pub use record::{NormalizedRecord, RecordBuilder};
pub use severity::{Severity, UnknownSeverity};
