use serial_test::serial;
use siem_log_forwarder::app::{ConfigError, Pipeline};
use siem_log_forwarder::formatter::FormatterKind;
use siem_log_forwarder::{App, Config};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_shipped_sample_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/forwarder.toml");
    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.formatter.kind, FormatterKind::Json);
    assert_eq!(config.sources.enabled_count(), 1);
    assert!(!config.sources.jira.as_ref().unwrap().enabled);
}

#[tokio::test]
async fn test_pipeline_built_from_config_with_both_sources() {
    let file = write_config(
        r#"
[tcp_server]
host = "127.0.0.1"
port = 6514

[formatter]
type = "cef"

[sources.file]
path = "/tmp/does-not-need-to-exist.log"
categories = ["auth", "system"]

[sources.jira]
api_url = "https://example.atlassian.net/"
username = "bot"
api_token = "secret"
categories = ["SECURITY"]
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.sources.enabled_count(), 2);

    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.source_count(), 2);

    let app = App::new(config);
    assert_eq!(app.config().tcp_server.port, 6514);
}

#[test]
fn test_config_without_sources_is_rejected() {
    let file = write_config("[tcp_server]\nhost = \"127.0.0.1\"\nport = 514\n");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig(_)));
}

#[test]
fn test_jira_token_not_in_debug_output() {
    let file = write_config(
        r#"
[sources.jira]
api_url = "https://example.atlassian.net"
username = "bot"
api_token = "very-secret-token"
"#,
    );
    let config = Config::from_file(file.path()).unwrap();
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("very-secret-token"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
#[serial]
fn test_environment_overrides_file_values() {
    let file = write_config(
        r#"
[tcp_server]
host = "from-file"
port = 514

[sources.file]
path = "/var/log/app.log"
"#,
    );

    // SAFETY: serialized with the other environment-mutating tests.
    unsafe {
        std::env::set_var("FORWARDER_PORT", "7000");
        std::env::set_var("FORWARDER_FORMAT", "csv");
    }
    let result = Config::from_args_and_env([
        "siem-log-forwarder",
        "--config",
        file.path().to_str().unwrap(),
    ]);
    unsafe {
        std::env::remove_var("FORWARDER_PORT");
        std::env::remove_var("FORWARDER_FORMAT");
    }

    let (_, config) = result.unwrap();
    assert_eq!(config.tcp_server.host, "from-file");
    assert_eq!(config.tcp_server.port, 7000);
    assert_eq!(config.formatter.kind, FormatterKind::Csv);
}
