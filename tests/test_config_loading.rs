//! Configuration loading and validation tests
//!
//! Observable outcomes of loading TOML files from disk.

use broker_host::config::{AppConfig, ConfigError, ConnectionSection};
use broker_host::handler::HandlerRegistry;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
context = "prod"
contexts_dir = "/etc/broker/context"

[connection]
connect_timeout_secs = 3
keep_alive_secs = 30

[[handle]]
handler = "forward"
subjects = ["sensors/+/temp", "sensors/+/hum"]
to = "archive"
retain = true

[[handle]]
handler = "reply"
subject = "svc/ping"
"#,
    );

    let config = AppConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.context, "prod");
    assert_eq!(config.context_store().dir(), Path::new("/etc/broker/context"));
    assert_eq!(config.connection.connect_timeout_secs, 3);
    assert_eq!(config.connection.keep_alive_secs, 30);
    assert_eq!(config.connection.max_reconnect_delay_ms, 250);

    assert_eq!(config.handlers.len(), 2);
    assert_eq!(config.handlers[0].handler, "forward");
    assert_eq!(config.handlers[0].options.get("retain"), Some(&json!(true)));
    assert_eq!(config.handlers[1].handler, "reply");
}

#[test]
fn test_loaded_handlers_build_with_builtins() {
    let temp_file = write_config(
        r#"
[[handle]]
handler = "forward"
subjects = ["in/#"]
to = "out"
"#,
    );
    let config = AppConfig::load_from_file(temp_file.path()).unwrap();
    let registry = HandlerRegistry::with_builtins();

    assert!(registry.build(&config.handlers[0]).is_ok());
}

#[test]
fn test_empty_file_uses_defaults() {
    let temp_file = write_config("");

    let config = AppConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.context, "");
    assert!(config.contexts_dir.is_none());
    assert!(config.handlers.is_empty());
    assert_eq!(config.connection, ConnectionSection::default());
}

#[test]
fn test_missing_file_is_read_error() {
    let result = AppConfig::load_from_file(Path::new("/nonexistent/broker-host.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[[handle]\nhandler = ");

    let result = AppConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_unknown_handler_kind_loads_but_does_not_build() {
    let temp_file = write_config(
        r#"
[[handle]]
handler = "webhook"
url = "https://example.com"
"#,
    );

    let config = AppConfig::load_from_file(temp_file.path()).unwrap();
    let registry = HandlerRegistry::with_builtins();

    assert!(registry.build(&config.handlers[0]).is_err());
}

#[test]
fn test_invalid_values_rejected() {
    for content in [
        "[connection]\nconnect_timeout_secs = 0\n",
        "[connection]\nkeep_alive_secs = 1\n",
        "[[handle]]\nhandler = \"\"\n",
    ] {
        let temp_file = write_config(content);
        let result = AppConfig::load_from_file(temp_file.path());
        assert!(
            matches!(result, Err(ConfigError::InvalidConfig(_))),
            "should reject: {content}"
        );
    }
}

#[test]
fn test_error_messages_are_descriptive() {
    let temp_file = write_config("[connection]\nconnect_timeout_secs = 0\n");

    let err = AppConfig::load_from_file(temp_file.path()).unwrap_err();

    assert!(err.to_string().contains("connect_timeout_secs"));
}
