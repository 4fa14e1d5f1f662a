#![warn(rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation, // Counters and durations stay far below the limits
    clippy::cast_precision_loss,      // Acceptable for rates and ratios
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,  // e.g. SourceError in source module
    clippy::must_use_candidate
)]

pub mod app;
pub mod buffer;
pub mod domain;
pub mod formatter;
pub mod reliability;
pub mod sender;
pub mod source;

pub use app::{App, Config};
pub use domain::{ForwarderError, NormalizedRecord, Severity};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
