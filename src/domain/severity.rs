use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Normalized severity of a log event, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown severity: {0}")]
pub struct UnknownSeverity(pub String);

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// CEF severity on the 0-10 scale.
    pub fn cef_level(self) -> u8 {
        match self {
            Severity::Debug => 2,
            Severity::Info => 5,
            Severity::Warning => 7,
            Severity::Error => 8,
            Severity::Critical => 10,
        }
    }

    /// Parse a source-provided level, falling back to `Info` for anything
    /// unrecognised. Forwarding never rejects a record over its level.
    pub fn parse_lossy(raw: &str) -> Severity {
        match raw.parse() {
            Ok(severity) => severity,
            Err(UnknownSeverity(value)) => {
                tracing::warn!("Unrecognised severity '{}', mapping to info", value);
                Severity::Info
            }
        }
    }
}

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Severity::Debug),
            "info" | "information" | "notice" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            "critical" | "crit" | "fatal" | "alert" | "emergency" => Ok(Severity::Critical),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_low_to_high() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_cef_table_is_monotonic() {
        let levels: Vec<u8> = Severity::ALL.iter().map(|s| s.cef_level()).collect();
        assert_eq!(levels, vec![2, 5, 7, 8, 10]);
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(" Error ".parse::<Severity>().unwrap(), Severity::Error);
        assert_eq!("fatal".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_parse_lossy_falls_back_to_info() {
        assert_eq!(Severity::parse_lossy("bogus"), Severity::Info);
        assert_eq!(Severity::parse_lossy(""), Severity::Info);
        assert_eq!(Severity::parse_lossy("critical"), Severity::Critical);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
        let back: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(back, Severity::Critical);
    }
}
